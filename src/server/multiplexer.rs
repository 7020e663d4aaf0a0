//! Server-side session multiplexer.
//!
//! One listening transport, many peers. Each call to
//! [`receive`](ServerMultiplexer::receive) runs the reactor cycle:
//!
//! 1. wait for readiness on the listener and every session connection
//! 2. accept new peers, advance pending handshakes, decrypt established reads
//! 3. sweep timers: evict idle sessions, retransmit overdue handshake flights
//!
//! The wait in step 1 ends early at the earliest retransmission deadline of a
//! pending handshake. Such a wake only sweeps; the wait bound still runs.
//!
//! The first decrypted payload ends the call; other ready peers are served on
//! the next one.

use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, warn};

use super::session::ClientSession;
use super::table::SessionTable;
use crate::config::{DtlsConfig, Role};
use crate::core::{
    ConnectionId, FaultPhase, MAX_DATAGRAM_SIZE, MuxError, MuxResult, Outcome, SecureConnection,
    SecureListener, SessionFault, TransportFault, canonical_peer, teardown,
};
use crate::fault::{ErrorClassifier, FaultClass, FaultPolicy, Verdict};

/// Something the readiness wait reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Listener,
    Session(ConnectionId),
}

/// How a readiness wait ended.
#[derive(Debug)]
enum Wake {
    Ready(Vec<Source>),
    /// A pending handshake reached its retransmission deadline first.
    RetransmitDue,
    Elapsed,
}

/// Multi-peer secure datagram server on a single listening transport.
///
/// # Example
///
/// ```ignore
/// use dtls_mux::prelude::*;
///
/// let config = DtlsConfig::server()
///     .idle_timeout(Duration::from_secs(60))
///     .wait_timeout(Duration::from_millis(500))
///     .build()?;
///
/// let mut server = ServerMultiplexer::new(listener, config)?;
///
/// loop {
///     match server.receive(DEFAULT_RECV_BUFFER_SIZE).await {
///         Ok((payload, peer)) => {
///             server.send(&payload, peer)?;
///         }
///         Err(MuxError::Timeout) => continue,
///         Err(e) => return Err(e),
///     }
/// }
/// ```
pub struct ServerMultiplexer<L: SecureListener> {
    /// Listening transport; never itself a session.
    listener: L,

    /// Live sessions.
    table: SessionTable<L::Conn>,

    /// Readiness wait bound. `None` waits indefinitely.
    wait_timeout: Option<Duration>,

    /// Idle timeout applied to new sessions.
    idle_timeout: Option<Duration>,

    classifier: ErrorClassifier,

    policy: Option<Arc<dyn FaultPolicy>>,

    config: DtlsConfig,

    closed: bool,
}

impl<L: SecureListener> ServerMultiplexer<L> {
    /// Take ownership of `listener` and serve peers according to `config`.
    ///
    /// Fails with [`MuxError::WrongRole`] for a client configuration.
    pub fn new(listener: L, config: DtlsConfig) -> MuxResult<Self> {
        if config.role() != Role::Server {
            return Err(MuxError::WrongRole {
                expected: Role::Server,
                actual: config.role(),
            });
        }

        Ok(Self {
            listener,
            table: SessionTable::new(),
            wait_timeout: config.wait_timeout(),
            idle_timeout: config.idle_timeout(),
            classifier: ErrorClassifier::new(config.suppress_ragged_eofs()),
            policy: config.fault_policy().cloned(),
            config,
            closed: false,
        })
    }

    /// Wait for the next decrypted payload from any peer.
    ///
    /// Returns the payload (at most `buf_size` bytes) and the peer's address.
    /// Fails with [`MuxError::Timeout`] once a whole wait window passes with
    /// nothing ready. Retransmission wakes inside the window do not end it.
    pub async fn receive(&mut self, buf_size: usize) -> MuxResult<(Vec<u8>, SocketAddr)> {
        self.ensure_open()?;
        let max_len = buf_size.min(MAX_DATAGRAM_SIZE);

        let mut window = self.window_deadline();
        let mut swept = false;
        loop {
            let (ready, timer_wake) = match self.wait_ready(window, swept).await {
                Wake::Ready(ready) => (ready, false),
                Wake::RetransmitDue => (Vec::new(), true),
                Wake::Elapsed => (Vec::new(), false),
            };
            let mut rescan = false;

            for source in &ready {
                match *source {
                    Source::Listener => rescan |= self.accept_peer()?,
                    Source::Session(id) => {
                        if let Some(received) = self.service_session(id, max_len)? {
                            return Ok(received);
                        }
                    }
                }
            }

            self.sweep()?;
            swept = true;

            if !ready.is_empty() || rescan {
                window = self.window_deadline();
            } else if !timer_wake {
                return Err(MuxError::Timeout);
            }
        }
    }

    /// Encrypt and send `data` to the session for `peer`.
    ///
    /// Returns `Ok(0)` without error when no session matches `peer`. A fatal
    /// write fault leaves the session in place; it surfaces unless the write
    /// hook ignores it, in which case `Ok(0)` is returned.
    pub fn send(&mut self, data: &[u8], peer: SocketAddr) -> MuxResult<usize> {
        self.ensure_open()?;

        let Some(id) = self.table.find_by_addr(peer) else {
            debug!(%peer, bytes = data.len(), "no session for peer, datagram dropped");
            return Ok(0);
        };
        let Some(entry) = self.table.get_mut(id) else {
            return Ok(0);
        };

        match entry.conn.send(data) {
            Ok(sent) => {
                debug!(peer = %entry.session.address(), %id, bytes = sent, "sent to peer");
                Ok(sent)
            }
            Err(fault) => {
                self.on_session_fault(id, FaultPhase::Write, fault)?;
                Ok(0)
            }
        }
    }

    /// Drop the session for `peer`, shutting it down gracefully if established.
    ///
    /// Returns `false` if no session matches.
    pub fn disconnect(&mut self, peer: SocketAddr) -> bool {
        let Some(id) = self.table.find_by_addr(peer) else {
            return false;
        };
        match self.table.remove(id) {
            Some(mut entry) => {
                info!(peer = %entry.session.address(), %id, "disconnecting session");
                let graceful = entry.session.handshake_complete();
                entry.session.mark_closed();
                teardown(&mut entry.conn, entry.session.address(), graceful);
                true
            }
            None => false,
        }
    }

    /// Close every session and the listener.
    ///
    /// Teardown faults are logged, never returned. Later calls to `receive`
    /// or `send` fail with [`MuxError::Closed`].
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        for mut entry in self.table.drain() {
            let graceful = entry.session.handshake_complete();
            entry.session.mark_closed();
            teardown(&mut entry.conn, entry.session.address(), graceful);
        }
        if let Err(err) = self.listener.close() {
            warn!(error = %err, "error closing listener");
        }
        info!("multiplexer closed");
    }

    /// Set the readiness wait bound. `None` waits indefinitely.
    pub fn set_timeout(&mut self, wait: Option<Duration>) {
        self.wait_timeout = wait;
    }

    /// Current readiness wait bound.
    pub fn timeout(&self) -> Option<Duration> {
        self.wait_timeout
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Local address of the listener.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Number of live sessions (pending and established).
    pub fn session_count(&self) -> usize {
        self.table.len()
    }

    /// Iterate over live sessions.
    pub fn sessions(&self) -> impl Iterator<Item = &ClientSession> {
        self.table.sessions()
    }

    /// Session for `peer`, if one is live.
    pub fn session_for(&self, peer: SocketAddr) -> Option<&ClientSession> {
        let peer = canonical_peer(peer);
        self.table.sessions().find(|s| s.address() == peer)
    }

    /// Configuration this multiplexer was built with.
    pub fn config(&self) -> &DtlsConfig {
        &self.config
    }

    fn ensure_open(&self) -> MuxResult<()> {
        if self.closed {
            Err(MuxError::Closed)
        } else {
            Ok(())
        }
    }

    fn window_deadline(&self) -> Option<Instant> {
        self.wait_timeout.map(|wait| Instant::now() + wait)
    }

    /// Earliest retransmission deadline among pending handshakes.
    ///
    /// After a sweep, a deadline that is still due was not re-armed by the
    /// engine and is left for the next sweep.
    fn next_retransmit(&self, swept: bool) -> Option<Duration> {
        self.table
            .entries()
            .filter(|entry| !entry.session.handshake_complete())
            .filter_map(|entry| entry.conn.retransmit_timeout())
            .filter(|left| !(swept && left.is_zero()))
            .min()
    }

    /// Wait for readiness until `deadline` or the next retransmission
    /// deadline, whichever comes first.
    async fn wait_ready(&self, deadline: Option<Instant>, swept: bool) -> Wake {
        let window = deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));
        let (limit, timer_first) = match (window, self.next_retransmit(swept)) {
            (Some(window), Some(retransmit)) if retransmit < window => (Some(retransmit), true),
            (None, Some(retransmit)) => (Some(retransmit), true),
            (window, _) => (window, false),
        };

        let ready = poll_fn(|cx| self.poll_ready(cx));
        match limit {
            Some(limit) => match timeout(limit, ready).await {
                Ok(ready) => Wake::Ready(ready),
                Err(_) if timer_first => Wake::RetransmitDue,
                Err(_) => Wake::Elapsed,
            },
            None => Wake::Ready(ready.await),
        }
    }

    /// Poll the listener first, then sessions in handle order.
    ///
    /// A readiness error counts as ready: the next operation on that
    /// transport reports the underlying fault.
    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Vec<Source>> {
        let mut ready = Vec::new();

        match self.listener.poll_read_ready(cx) {
            Poll::Ready(Ok(())) => ready.push(Source::Listener),
            Poll::Ready(Err(err)) => {
                warn!(error = %err, "listener readiness error");
                ready.push(Source::Listener);
            }
            Poll::Pending => {}
        }

        for entry in self.table.entries() {
            match entry.conn.poll_read_ready(cx) {
                Poll::Ready(Ok(())) => ready.push(Source::Session(entry.session.id())),
                Poll::Ready(Err(err)) => {
                    warn!(peer = %entry.session.address(), error = %err, "readiness error");
                    ready.push(Source::Session(entry.session.id()));
                }
                Poll::Pending => {}
            }
        }

        if ready.is_empty() {
            Poll::Pending
        } else {
            Poll::Ready(ready)
        }
    }

    /// Accept one pending peer. Returns whether the listener should be
    /// scanned again.
    fn accept_peer(&mut self) -> MuxResult<bool> {
        match self.listener.accept() {
            Outcome::Done((mut conn, peer)) => {
                let id = conn.id();
                if let Err(err) = self.table.check_vacant(id, peer) {
                    warn!(%peer, %id, "peer or handle already tracked, rejecting connection");
                    teardown(&mut conn, peer, false);
                    return Err(err);
                }
                info!(%peer, %id, "accepted peer");

                let entry = self.table.insert(conn, peer, self.idle_timeout)?;
                if let Err(fault) = entry.conn.set_nonblocking(true) {
                    self.on_session_fault(id, FaultPhase::Handshake, fault)?;
                    return Ok(true);
                }

                // Peers that finish in one flight do not wait a cycle.
                self.advance_handshake(id)?;
                Ok(true)
            }
            Outcome::WouldBlock => Ok(false),
            Outcome::Fatal(fault) => {
                if self.classifier.classify(FaultPhase::Handshake, &fault) == FaultClass::Transient {
                    debug!(error = %fault, "listener not ready");
                    return Ok(false);
                }
                error!(error = %fault, "listener fault");
                Err(MuxError::ListenerFault(fault))
            }
        }
    }

    fn service_session(
        &mut self,
        id: ConnectionId,
        max_len: usize,
    ) -> MuxResult<Option<(Vec<u8>, SocketAddr)>> {
        // Absent if removed earlier in this scan.
        let Some(established) = self.table.session(id).map(ClientSession::handshake_complete)
        else {
            return Ok(None);
        };

        if established {
            self.read_session(id, max_len)
        } else {
            self.advance_handshake(id)?;
            Ok(None)
        }
    }

    fn advance_handshake(&mut self, id: ConnectionId) -> MuxResult<()> {
        let Some(entry) = self.table.get_mut(id) else {
            return Ok(());
        };

        match entry.conn.do_handshake() {
            Outcome::Done(()) => {
                if entry.session.mark_established() {
                    info!(peer = %entry.session.address(), %id, "handshake complete");
                }
                Ok(())
            }
            Outcome::WouldBlock => Ok(()),
            Outcome::Fatal(fault) => self.on_session_fault(id, FaultPhase::Handshake, fault),
        }
    }

    fn read_session(
        &mut self,
        id: ConnectionId,
        max_len: usize,
    ) -> MuxResult<Option<(Vec<u8>, SocketAddr)>> {
        let Some(entry) = self.table.get_mut(id) else {
            return Ok(None);
        };

        match entry.conn.recv(max_len) {
            Outcome::Done(data) if !data.is_empty() => match self.table.get_mut(id) {
                Some(entry) => {
                    entry.session.touch(Instant::now());
                    let peer = entry.session.address();
                    debug!(%peer, %id, bytes = data.len(), "received from peer");
                    Ok(Some((data, peer)))
                }
                None => {
                    warn!(%id, bytes = data.len(), "data for untracked session discarded");
                    Ok(None)
                }
            },
            Outcome::Done(_) | Outcome::WouldBlock => Ok(None),
            Outcome::Fatal(fault) => {
                self.on_session_fault(id, FaultPhase::Read, fault)?;
                Ok(None)
            }
        }
    }

    /// Evict idle sessions, then retransmit overdue handshake flights.
    fn sweep(&mut self) -> MuxResult<()> {
        let now = Instant::now();
        for id in self.table.expired(now) {
            if let Some(session) = self.table.session(id) {
                debug!(
                    peer = %session.address(),
                    %id,
                    idle_ms = session.idle_time(now).as_millis() as u64,
                    age_ms = session.age(now).as_millis() as u64,
                    "session idle past its timeout"
                );
            }
            self.remove_session(id, "idle timeout");
        }

        for id in self.table.ids() {
            let Some(entry) = self.table.get_mut(id) else {
                continue;
            };
            if entry.session.handshake_complete()
                || entry.conn.retransmit_timeout() != Some(Duration::ZERO)
            {
                continue;
            }

            match entry.conn.fire_retransmit() {
                Ok(sent) => {
                    let peer = entry.session.address();
                    debug!(%peer, %id, sent, "handshake retransmission triggered");
                }
                Err(fault) => self.on_session_fault(id, FaultPhase::Handshake, fault)?,
            }
        }
        Ok(())
    }

    /// Classify a session fault and act on it.
    ///
    /// `Ok(())` means the fault was absorbed (transient, noise, or ignored by
    /// the recovery hook).
    fn on_session_fault(
        &mut self,
        id: ConnectionId,
        phase: FaultPhase,
        fault: TransportFault,
    ) -> MuxResult<()> {
        match self.classifier.classify(phase, &fault) {
            FaultClass::Transient => {
                debug!(%id, %phase, error = %fault, "transient fault");
                Ok(())
            }
            FaultClass::ProtocolNoise => {
                self.remove_session(id, "protocol noise");
                Ok(())
            }
            FaultClass::Fatal => {
                let Some(peer) = self.table.session(id).map(|s| s.address()) else {
                    warn!(%id, %phase, error = %fault, "fault for untracked connection");
                    return Ok(());
                };
                let fault = SessionFault::new(peer, phase, fault);

                // Writes leave the session in place; it may still be readable.
                if phase != FaultPhase::Write {
                    self.drop_session(id, &fault);
                }

                match &self.policy {
                    Some(policy) if policy.verdict(&fault) == Verdict::Ignore => {
                        info!(%peer, %phase, error = %fault, "fault ignored by recovery hook");
                        Ok(())
                    }
                    _ => Err(MuxError::ProtocolFault(fault)),
                }
            }
        }
    }

    /// Remove after a fatal fault: graceful shutdown first if established.
    fn drop_session(&mut self, id: ConnectionId, reason: &SessionFault) {
        let Some(mut entry) = self.table.remove(id) else {
            warn!(%id, "drop requested for untracked connection");
            return;
        };
        let peer = entry.session.address();
        info!(%peer, %id, error = %reason, "dropping session");

        let graceful = entry.session.handshake_complete();
        entry.session.mark_closed();
        teardown(&mut entry.conn, peer, graceful);
    }

    /// Remove without graceful shutdown (noise or eviction).
    fn remove_session(&mut self, id: ConnectionId, reason: &'static str) {
        let Some(mut entry) = self.table.remove(id) else {
            return;
        };
        let peer = entry.session.address();
        info!(%peer, %id, reason, "removing session");

        entry.session.mark_closed();
        teardown(&mut entry.conn, peer, false);
    }
}

impl<L: SecureListener> Drop for ServerMultiplexer<L> {
    fn drop(&mut self) {
        self.close();
    }
}
