//! The secure-transport collaborator contract.
//!
//! The multiplexer never performs cryptography itself. A DTLS engine plugs in
//! by implementing these traits for its listening socket and its per-peer
//! connections. Every operation is non-blocking and reports expected
//! "not yet" conditions through [`Outcome::WouldBlock`] instead of an error.
//!
//! Readiness follows the tokio convention: `poll_read_ready` returns
//! `Poll::Ready` once an operation is likely to make progress and registers
//! the waker otherwise.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::task::{Context, Poll};
use std::time::Duration;

use tracing::{info, warn};

use super::error::TransportFault;
use crate::config::{CertChainOptions, ProtocolVersion, RetransmitTimer, VerifyMode};

/// Opaque handle identifying one secure connection.
///
/// Assigned by the collaborator; the session table is keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw handle value (typically a file descriptor or engine index).
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw handle value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for ConnectionId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Tri-state result of a non-blocking transport operation.
#[derive(Debug)]
#[must_use]
pub enum Outcome<T> {
    /// The operation completed.
    Done(T),
    /// The operation needs more input; try again after the next readiness event.
    WouldBlock,
    /// The operation failed.
    Fatal(TransportFault),
}

impl<T> Outcome<T> {
    /// Map the completed value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Done(v) => Outcome::Done(f(v)),
            Outcome::WouldBlock => Outcome::WouldBlock,
            Outcome::Fatal(fault) => Outcome::Fatal(fault),
        }
    }

    /// Returns `true` for [`Outcome::Done`].
    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }
}

impl<T> From<Result<T, TransportFault>> for Outcome<T> {
    fn from(res: Result<T, TransportFault>) -> Self {
        match res {
            Ok(v) => Outcome::Done(v),
            Err(fault) => Outcome::Fatal(fault),
        }
    }
}

/// One peer's secure connection.
pub trait SecureConnection {
    /// Handle identifying this connection.
    fn id(&self) -> ConnectionId;

    /// Poll for read readiness (incoming handshake flight or record).
    ///
    /// After an operation returns [`Outcome::WouldBlock`], the connection must
    /// not report ready again until new input arrives.
    fn poll_read_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>>;

    /// Switch the connection between blocking and non-blocking mode.
    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<(), TransportFault>;

    /// Advance the handshake with whatever input is available.
    fn do_handshake(&mut self) -> Outcome<()>;

    /// Decrypt the next application record, at most `max_len` bytes.
    ///
    /// `Done` with an empty buffer means "nothing this time", like `WouldBlock`.
    fn recv(&mut self, max_len: usize) -> Outcome<Vec<u8>>;

    /// Encrypt and send one application record.
    fn send(&mut self, data: &[u8]) -> Result<usize, TransportFault>;

    /// Time left until the current handshake flight must be retransmitted.
    ///
    /// `None` when no timer is armed; `Some(Duration::ZERO)` once it has elapsed.
    fn retransmit_timeout(&self) -> Option<Duration>;

    /// Re-send the last handshake flight. Returns the number of datagrams sent.
    fn fire_retransmit(&mut self) -> Result<usize, TransportFault>;

    /// Graceful shutdown: send a close notification and release the record layer.
    fn shutdown(&mut self) -> Result<(), TransportFault>;

    /// Hard close of the underlying socket.
    fn close(&mut self) -> Result<(), TransportFault>;

    /// Address of the connected peer, if any.
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Local address of the underlying socket.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Close `conn`, shutting it down gracefully first when `graceful`.
///
/// Teardown faults are logged and swallowed; `close` runs even if the
/// shutdown fails.
pub(crate) fn teardown<C: SecureConnection + ?Sized>(conn: &mut C, peer: SocketAddr, graceful: bool) {
    if graceful {
        if let Err(err) = conn.shutdown() {
            warn!(%peer, error = %err, "error in graceful shutdown");
        }
    }
    if let Err(err) = conn.close() {
        info!(%peer, error = %err, "error in close");
    }
}

/// Client-side connection that is pinned to its destination on first use.
pub trait Connect: SecureConnection {
    /// Bind the connection to `peer`. Does not run the handshake.
    fn connect(&mut self, peer: SocketAddr) -> Result<(), TransportFault>;

    /// Whether a destination is already pinned.
    fn is_connected(&self) -> bool {
        self.peer_addr().is_some()
    }
}

/// The listening transport on the server side.
pub trait SecureListener {
    /// Connection type handed out for each new peer.
    type Conn: SecureConnection;

    /// Poll for a pending new peer.
    fn poll_read_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>>;

    /// Accept the next peer, if its cookie exchange has completed.
    fn accept(&mut self) -> Outcome<(Self::Conn, SocketAddr)>;

    /// Local address the listener is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Close the listening socket.
    fn close(&mut self) -> Result<(), TransportFault>;
}

/// Hook points the collaborator exposes while its context is being set up.
///
/// [`DtlsConfig::configure_context`](crate::config::DtlsConfig::configure_context)
/// drives these.
pub trait ContextSetup {
    /// Turn the engine's own protocol trace on or off.
    fn set_engine_logging(&mut self, enabled: bool);

    /// Select the protocol version.
    fn set_protocol(&mut self, protocol: ProtocolVersion) -> Result<(), TransportFault>;

    /// Select how the peer's certificate is verified.
    fn set_verify_mode(&mut self, mode: VerifyMode);

    /// Load the local certificate, with its key from `key` or, if `None`,
    /// from the certificate file itself.
    fn load_certificate(&mut self, cert: &Path, key: Option<&Path>) -> Result<(), TransportFault>;

    /// Load the trust anchors used to verify peers.
    fn load_ca_certs(&mut self, ca_certs: &Path) -> Result<(), TransportFault>;

    /// Build the chain for the loaded certificate.
    fn build_cert_chain(&mut self, options: CertChainOptions) -> Result<(), TransportFault>;

    /// Restrict the cipher suites.
    fn set_ciphers(&mut self, ciphers: &[String]) -> Result<(), TransportFault>;

    /// Restrict the key-exchange curves.
    fn set_curves(&mut self, curves: &[String]) -> Result<(), TransportFault>;

    /// Restrict the signature algorithms.
    fn set_sigalgs(&mut self, sigalgs: &[String]) -> Result<(), TransportFault>;

    /// Select the server's ephemeral key-exchange curve (`None` = engine default).
    fn set_ecdh_curve(&mut self, curve: Option<&str>) -> Result<(), TransportFault>;

    /// Override the link MTU used to size handshake fragments and records.
    fn set_link_mtu(&mut self, mtu: usize);

    /// Install the callback consulted whenever the handshake timer is re-armed.
    fn set_retransmit_timer(&mut self, timer: RetransmitTimer);
}
