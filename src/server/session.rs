//! Per-peer session bookkeeping.
//!
//! A [`ClientSession`] is the multiplexer's record for one peer, separate from
//! the connection object itself:
//! - peer address and connection handle
//! - lifecycle state (pending handshake, established, closed)
//! - last activity and idle timeout

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::{ConnectionId, canonical_peer};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, handshake not complete.
    Pending,
    /// Handshake complete, application data flows.
    Established,
    /// Terminal. A closed session is never left in the table.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Pending => write!(f, "pending"),
            SessionState::Established => write!(f, "established"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// The server's record for one peer.
#[derive(Debug, Clone)]
pub struct ClientSession {
    /// Peer address as seen by the transport (canonical form).
    address: SocketAddr,

    /// Handle of the peer's connection; the table key.
    id: ConnectionId,

    /// Lifecycle state.
    state: SessionState,

    /// Last successful decrypted read (or creation).
    last_activity: Instant,

    /// Created time.
    created_at: Instant,

    /// Idle timeout; `None` never expires.
    idle_timeout: Option<Duration>,
}

impl ClientSession {
    /// Create a pending session.
    pub fn new(id: ConnectionId, address: SocketAddr, idle_timeout: Option<Duration>) -> Self {
        let now = Instant::now();
        Self {
            address: canonical_peer(address),
            id,
            state: SessionState::Pending,
            last_activity: now,
            created_at: now,
            idle_timeout,
        }
    }

    /// Peer address.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Connection handle.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the handshake has completed.
    pub fn handshake_complete(&self) -> bool {
        self.state == SessionState::Established
    }

    /// Move `Pending -> Established`.
    ///
    /// Returns `false` if the session was not pending, so completion is only
    /// ever observed once.
    pub fn mark_established(&mut self) -> bool {
        if self.state == SessionState::Pending {
            self.state = SessionState::Established;
            true
        } else {
            false
        }
    }

    /// Move to the terminal state.
    pub fn mark_closed(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Record activity at `now`.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Time of the last recorded activity.
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Idle timeout.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// Time since last activity, as of `now`.
    pub fn idle_time(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Session age, as of `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Whether the session has been idle for longer than its timeout.
    ///
    /// The comparison is strict: a session idle for exactly its timeout is
    /// still live, and expires on the first sweep after that instant.
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.idle_timeout {
            Some(timeout) => self.idle_time(now) > timeout,
            None => false,
        }
    }
}
