//! Scripted in-memory secure-transport collaborator for unit tests.
//!
//! Tests queue inbound handshake flights and records on a [`MockPeer`]; the
//! matching [`MockConn`] becomes readable while anything is queued and hands
//! the scripted outcomes back one at a time.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::{CertChainOptions, ProtocolVersion, RetransmitTimer, VerifyMode};
use crate::core::{
    Connect, ConnectionId, ContextSetup, FaultKind, Outcome, SecureConnection, SecureListener,
    TransportFault,
};

pub(crate) const LOCAL_ADDR: &str = "127.0.0.1:5684";

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub(crate) fn fault(kind: FaultKind) -> TransportFault {
    TransportFault::new(kind, "scripted")
}

pub(crate) fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

enum Inbound {
    Flight(Outcome<()>),
    Record(Outcome<Vec<u8>>),
}

#[derive(Default)]
struct PeerState {
    inbound: VecDeque<Inbound>,
    sent: Vec<Vec<u8>>,
    send_fault: Option<FaultKind>,
    retransmit_deadline: Option<Instant>,
    retransmit_fault: Option<FaultKind>,
    retransmits: usize,
    shutdown_fault: bool,
    shutdown_calls: usize,
    close_calls: usize,
    nonblocking: Option<bool>,
    peer: Option<SocketAddr>,
    connect_fault: bool,
    ready_error: bool,
    waker: Option<Waker>,
}

impl PeerState {
    fn push(&mut self, inbound: Inbound) {
        self.inbound.push_back(inbound);
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

/// Test-side handle on one scripted connection.
#[derive(Clone)]
pub(crate) struct MockPeer {
    id: ConnectionId,
    state: Arc<Mutex<PeerState>>,
}

impl MockPeer {
    fn new(id: ConnectionId, peer: Option<SocketAddr>) -> Self {
        let state = PeerState {
            peer,
            ..PeerState::default()
        };
        Self {
            id,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// An unconnected client-side connection and its handle.
    pub(crate) fn client(id: u64) -> (MockPeer, MockConn) {
        let peer = Self::new(ConnectionId::new(id), None);
        let conn = peer.conn();
        (peer, conn)
    }

    fn lock(&self) -> MutexGuard<'_, PeerState> {
        self.state.lock().unwrap()
    }

    fn conn(&self) -> MockConn {
        MockConn {
            id: self.id,
            state: self.state.clone(),
        }
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) fn complete_handshake(&self) {
        self.lock().push(Inbound::Flight(Outcome::Done(())));
    }

    pub(crate) fn partial_flight(&self) {
        self.lock().push(Inbound::Flight(Outcome::WouldBlock));
    }

    pub(crate) fn fail_handshake(&self, kind: FaultKind) {
        self.lock().push(Inbound::Flight(Outcome::Fatal(fault(kind))));
    }

    pub(crate) fn deliver(&self, data: &[u8]) {
        self.lock().push(Inbound::Record(Outcome::Done(data.to_vec())));
    }

    pub(crate) fn deliver_empty(&self) {
        self.lock().push(Inbound::Record(Outcome::Done(Vec::new())));
    }

    pub(crate) fn fail_read(&self, kind: FaultKind) {
        self.lock().push(Inbound::Record(Outcome::Fatal(fault(kind))));
    }

    pub(crate) fn signal_ready_error(&self) {
        let mut state = self.lock();
        state.ready_error = true;
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
    }

    /// Arm the handshake timer to expire `left` from now.
    pub(crate) fn arm_retransmit(&self, left: Option<Duration>) {
        self.lock().retransmit_deadline = left.map(|left| Instant::now() + left);
    }

    pub(crate) fn fail_retransmit(&self, kind: FaultKind) {
        self.lock().retransmit_fault = Some(kind);
    }

    pub(crate) fn retransmits(&self) -> usize {
        self.lock().retransmits
    }

    pub(crate) fn fail_send(&self, kind: FaultKind) {
        self.lock().send_fault = Some(kind);
    }

    pub(crate) fn fail_connect(&self) {
        self.lock().connect_fault = true;
    }

    pub(crate) fn fail_shutdown(&self) {
        self.lock().shutdown_fault = true;
    }

    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    pub(crate) fn shutdown_calls(&self) -> usize {
        self.lock().shutdown_calls
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.lock().close_calls
    }

    pub(crate) fn is_nonblocking(&self) -> Option<bool> {
        self.lock().nonblocking
    }

    pub(crate) fn pinned_peer(&self) -> Option<SocketAddr> {
        self.lock().peer
    }

    pub(crate) fn queued(&self) -> usize {
        self.lock().inbound.len()
    }
}

/// Connection object handed to the code under test.
pub(crate) struct MockConn {
    id: ConnectionId,
    state: Arc<Mutex<PeerState>>,
}

impl fmt::Debug for MockConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockConn").field("id", &self.id).finish()
    }
}

impl MockConn {
    fn lock(&self) -> MutexGuard<'_, PeerState> {
        self.state.lock().unwrap()
    }
}

impl SecureConnection for MockConn {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn poll_read_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut state = self.lock();
        if state.ready_error {
            state.ready_error = false;
            return Poll::Ready(Err(io::Error::other("scripted readiness error")));
        }
        if state.inbound.is_empty() {
            state.waker = Some(cx.waker().clone());
            Poll::Pending
        } else {
            Poll::Ready(Ok(()))
        }
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<(), TransportFault> {
        self.lock().nonblocking = Some(nonblocking);
        Ok(())
    }

    fn do_handshake(&mut self) -> Outcome<()> {
        let mut state = self.lock();
        match state.inbound.front() {
            Some(Inbound::Flight(_)) => match state.inbound.pop_front() {
                Some(Inbound::Flight(outcome)) => outcome,
                _ => Outcome::WouldBlock,
            },
            _ => Outcome::WouldBlock,
        }
    }

    fn recv(&mut self, max_len: usize) -> Outcome<Vec<u8>> {
        let mut state = self.lock();
        match state.inbound.front() {
            Some(Inbound::Record(_)) => match state.inbound.pop_front() {
                Some(Inbound::Record(outcome)) => outcome.map(|mut data| {
                    data.truncate(max_len);
                    data
                }),
                _ => Outcome::WouldBlock,
            },
            _ => Outcome::WouldBlock,
        }
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, TransportFault> {
        let mut state = self.lock();
        if let Some(kind) = state.send_fault {
            return Err(fault(kind));
        }
        state.sent.push(data.to_vec());
        Ok(data.len())
    }

    fn retransmit_timeout(&self) -> Option<Duration> {
        self.lock()
            .retransmit_deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    fn fire_retransmit(&mut self) -> Result<usize, TransportFault> {
        let mut state = self.lock();
        if let Some(kind) = state.retransmit_fault {
            return Err(fault(kind));
        }
        state.retransmits += 1;
        // The engine re-arms its own timer; a scripted deadline fires once.
        state.retransmit_deadline = None;
        Ok(1)
    }

    fn shutdown(&mut self) -> Result<(), TransportFault> {
        let mut state = self.lock();
        state.shutdown_calls += 1;
        if state.shutdown_fault {
            return Err(fault(FaultKind::Protocol));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportFault> {
        self.lock().close_calls += 1;
        Ok(())
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.lock().peer
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(addr(LOCAL_ADDR))
    }
}

impl Connect for MockConn {
    fn connect(&mut self, peer: SocketAddr) -> Result<(), TransportFault> {
        let mut state = self.lock();
        if state.connect_fault {
            return Err(fault(FaultKind::Io(io::ErrorKind::ConnectionRefused)));
        }
        state.peer = Some(peer);
        Ok(())
    }
}

#[derive(Default)]
struct ListenerState {
    pending: VecDeque<Outcome<(MockConn, SocketAddr)>>,
    close_calls: usize,
    waker: Option<Waker>,
}

/// Test-side handle on the listening transport.
pub(crate) struct MockNet {
    state: Arc<Mutex<ListenerState>>,
    next_id: u64,
}

impl MockNet {
    pub(crate) fn new() -> (MockNet, MockListener) {
        let state = Arc::new(Mutex::new(ListenerState::default()));
        let net = MockNet {
            state: state.clone(),
            next_id: 1,
        };
        (net, MockListener { state })
    }

    fn push(&self, outcome: Outcome<(MockConn, SocketAddr)>) {
        let mut state = self.state.lock().unwrap();
        state.pending.push_back(outcome);
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
    }

    /// Queue a new peer for accept.
    pub(crate) fn dial(&mut self, peer: &str) -> MockPeer {
        let id = self.next_id;
        self.next_id += 1;
        self.dial_with_id(id, peer)
    }

    /// Queue a peer whose connection reuses an explicit handle.
    pub(crate) fn dial_with_id(&mut self, id: u64, peer: &str) -> MockPeer {
        let peer_addr = addr(peer);
        let handle = MockPeer::new(ConnectionId::new(id), Some(peer_addr));
        self.push(Outcome::Done((handle.conn(), peer_addr)));
        handle
    }

    /// Queue an accept that reports a fault on the listener.
    pub(crate) fn fail_accept(&self, kind: FaultKind) {
        self.push(Outcome::Fatal(fault(kind)));
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.state.lock().unwrap().close_calls
    }
}

/// Listening transport handed to the code under test.
pub(crate) struct MockListener {
    state: Arc<Mutex<ListenerState>>,
}

impl SecureListener for MockListener {
    type Conn = MockConn;

    fn poll_read_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut state = self.state.lock().unwrap();
        if state.pending.is_empty() {
            state.waker = Some(cx.waker().clone());
            Poll::Pending
        } else {
            Poll::Ready(Ok(()))
        }
    }

    fn accept(&mut self) -> Outcome<(MockConn, SocketAddr)> {
        self.state
            .lock()
            .unwrap()
            .pending
            .pop_front()
            .unwrap_or(Outcome::WouldBlock)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(addr(LOCAL_ADDR))
    }

    fn close(&mut self) -> Result<(), TransportFault> {
        self.state.lock().unwrap().close_calls += 1;
        Ok(())
    }
}

/// Records what a configuration installs during context setup.
#[derive(Debug, Default)]
pub(crate) struct MockContext {
    pub(crate) engine_logging: bool,
    pub(crate) protocol: Option<ProtocolVersion>,
    pub(crate) verify_mode: Option<VerifyMode>,
    pub(crate) certificate: Option<(PathBuf, Option<PathBuf>)>,
    pub(crate) ca_certs: Option<PathBuf>,
    pub(crate) cert_chain: Option<CertChainOptions>,
    pub(crate) ciphers: Option<Vec<String>>,
    pub(crate) curves: Option<Vec<String>>,
    pub(crate) sigalgs: Option<Vec<String>>,
    pub(crate) ecdh_curve: Option<Option<String>>,
    pub(crate) link_mtu: Option<usize>,
    pub(crate) timer: Option<RetransmitTimer>,
    pub(crate) reject_ciphers: bool,
    pub(crate) reject_certificate: bool,
}

impl ContextSetup for MockContext {
    fn set_engine_logging(&mut self, enabled: bool) {
        self.engine_logging = enabled;
    }

    fn set_protocol(&mut self, protocol: ProtocolVersion) -> Result<(), TransportFault> {
        self.protocol = Some(protocol);
        Ok(())
    }

    fn set_verify_mode(&mut self, mode: VerifyMode) {
        self.verify_mode = Some(mode);
    }

    fn load_certificate(&mut self, cert: &Path, key: Option<&Path>) -> Result<(), TransportFault> {
        if self.reject_certificate {
            return Err(fault(FaultKind::Io(io::ErrorKind::NotFound)));
        }
        self.certificate = Some((cert.to_path_buf(), key.map(Path::to_path_buf)));
        Ok(())
    }

    fn load_ca_certs(&mut self, ca_certs: &Path) -> Result<(), TransportFault> {
        self.ca_certs = Some(ca_certs.to_path_buf());
        Ok(())
    }

    fn build_cert_chain(&mut self, options: CertChainOptions) -> Result<(), TransportFault> {
        self.cert_chain = Some(options);
        Ok(())
    }

    fn set_ciphers(&mut self, ciphers: &[String]) -> Result<(), TransportFault> {
        if self.reject_ciphers {
            return Err(fault(FaultKind::Protocol));
        }
        self.ciphers = Some(ciphers.to_vec());
        Ok(())
    }

    fn set_curves(&mut self, curves: &[String]) -> Result<(), TransportFault> {
        self.curves = Some(curves.to_vec());
        Ok(())
    }

    fn set_sigalgs(&mut self, sigalgs: &[String]) -> Result<(), TransportFault> {
        self.sigalgs = Some(sigalgs.to_vec());
        Ok(())
    }

    fn set_ecdh_curve(&mut self, curve: Option<&str>) -> Result<(), TransportFault> {
        self.ecdh_curve = Some(curve.map(str::to_string));
        Ok(())
    }

    fn set_link_mtu(&mut self, mtu: usize) {
        self.link_mtu = Some(mtu);
    }

    fn set_retransmit_timer(&mut self, timer: RetransmitTimer) {
        self.timer = Some(timer);
    }
}
