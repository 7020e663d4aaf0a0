//! Error types for the DTLS multiplexer.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use super::traits::ConnectionId;
use crate::config::Role;

/// What went wrong inside the secure-transport collaborator.
///
/// The collaborator picks the kind; the multiplexer decides what the kind
/// means for the session (see [`ErrorClassifier`](crate::fault::ErrorClassifier)).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The operation needs more input before it can make progress.
    WouldBlock,
    /// The handshake timer fired and a flight is due for retransmission.
    RetransmitPending,
    /// A blocking read hit its socket timeout.
    ReadTimeout,
    /// A record arrived that does not fit the connection's current state.
    UnexpectedMessage,
    /// The peer went away without sending a close notification.
    RaggedEof,
    /// Handshake or record-layer failure (bad certificate, MAC failure, alert).
    Protocol,
    /// The underlying socket or connection is already closed.
    Closed,
    /// Plain socket error.
    Io(io::ErrorKind),
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::WouldBlock => write!(f, "would block"),
            FaultKind::RetransmitPending => write!(f, "retransmit pending"),
            FaultKind::ReadTimeout => write!(f, "read timeout"),
            FaultKind::UnexpectedMessage => write!(f, "unexpected message"),
            FaultKind::RaggedEof => write!(f, "ragged eof"),
            FaultKind::Protocol => write!(f, "protocol error"),
            FaultKind::Closed => write!(f, "transport closed"),
            FaultKind::Io(kind) => write!(f, "i/o error ({kind})"),
        }
    }
}

/// A fault reported by the secure-transport collaborator.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct TransportFault {
    kind: FaultKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportFault {
    /// Create a fault of the given kind.
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the engine-level error that caused this fault.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for a [`FaultKind::Protocol`] fault.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Protocol, message)
    }

    /// Shorthand for a [`FaultKind::Closed`] fault.
    pub fn closed() -> Self {
        Self::new(FaultKind::Closed, "transport is closed")
    }

    /// The fault kind.
    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    /// Human-readable detail from the collaborator.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<io::Error> for TransportFault {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::WouldBlock => FaultKind::WouldBlock,
            io::ErrorKind::TimedOut => FaultKind::ReadTimeout,
            other => FaultKind::Io(other),
        };
        Self::new(kind, err.to_string()).with_source(err)
    }
}

/// The operation that was in progress when a fault occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPhase {
    /// Advancing (or retransmitting) a handshake.
    Handshake,
    /// Decrypting application data.
    Read,
    /// Encrypting and sending application data.
    Write,
}

impl fmt::Display for FaultPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultPhase::Handshake => write!(f, "handshake"),
            FaultPhase::Read => write!(f, "read"),
            FaultPhase::Write => write!(f, "write"),
        }
    }
}

/// A fatal transport fault, annotated with the peer it belongs to.
#[derive(Debug, Error)]
#[error("{phase} fault for peer {peer}: {fault}")]
pub struct SessionFault {
    peer: SocketAddr,
    phase: FaultPhase,
    #[source]
    fault: TransportFault,
}

impl SessionFault {
    /// Annotate a transport fault with its peer and phase.
    pub fn new(peer: SocketAddr, phase: FaultPhase, fault: TransportFault) -> Self {
        Self { peer, phase, fault }
    }

    /// Address of the peer whose session faulted.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Phase the fault occurred in.
    pub fn phase(&self) -> FaultPhase {
        self.phase
    }

    /// The underlying transport fault.
    pub fn fault(&self) -> &TransportFault {
        &self.fault
    }

    /// Shorthand for `self.fault().kind()`.
    pub fn kind(&self) -> FaultKind {
        self.fault.kind
    }
}

/// Errors surfaced by [`ServerMultiplexer`](crate::server::ServerMultiplexer)
/// and [`ClientEndpoint`](crate::client::ClientEndpoint).
#[derive(Debug, Error)]
pub enum MuxError {
    /// Nothing arrived within the wait window.
    #[error("timed out waiting for data")]
    Timeout,

    /// An accept collided with a tracked connection handle or peer address.
    #[error("duplicate connection {id} from {peer}")]
    DuplicateConnection {
        /// The colliding handle.
        id: ConnectionId,
        /// Address reported by the second accept.
        peer: SocketAddr,
    },

    /// A fatal fault on a peer connection that no recovery hook absorbed.
    #[error("protocol fault: {0}")]
    ProtocolFault(#[from] SessionFault),

    /// A fault on the listening transport; never absorbed.
    #[error("listener fault: {0}")]
    ListenerFault(#[source] TransportFault),

    /// The client endpoint has no peer yet.
    #[error("endpoint is not connected")]
    NotConnected,

    /// The endpoint was closed.
    #[error("endpoint is closed")]
    Closed,

    /// A configuration was used with the wrong endpoint type.
    #[error("configuration is for the {actual:?} role, expected {expected:?}")]
    WrongRole {
        /// Role the endpoint needs.
        expected: Role,
        /// Role the configuration carries.
        actual: Role,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl MuxError {
    /// Returns `true` for [`MuxError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, MuxError::Timeout)
    }
}

/// Result alias used throughout the crate.
pub type MuxResult<T> = Result<T, MuxError>;
