//! Session table: connection handle -> (session record, connection).

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::Instant;

use super::session::ClientSession;
use crate::core::{ConnectionId, MuxError, MuxResult, SecureConnection, canonical_peer};

/// A live peer: bookkeeping plus the connection it describes.
#[derive(Debug)]
pub(crate) struct SessionEntry<C> {
    pub(crate) session: ClientSession,
    pub(crate) conn: C,
}

/// Mapping from connection handle to live session.
///
/// Only the multiplexer's own task touches the table. Lookups by address
/// scan the table, since it is keyed by handle.
#[derive(Debug)]
pub struct SessionTable<C> {
    entries: BTreeMap<ConnectionId, SessionEntry<C>>,
}

impl<C: SecureConnection> SessionTable<C> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Track a newly accepted connection as a pending session.
    ///
    /// Fails with [`MuxError::DuplicateConnection`] if the handle or the peer
    /// address is already tracked; the existing session is left untouched.
    pub(crate) fn insert(
        &mut self,
        conn: C,
        address: SocketAddr,
        idle_timeout: Option<Duration>,
    ) -> MuxResult<&mut SessionEntry<C>> {
        let id = conn.id();
        self.check_vacant(id, address)?;
        let session = ClientSession::new(id, address, idle_timeout);
        Ok(self.entries.entry(id).or_insert(SessionEntry { session, conn }))
    }

    /// Fails with [`MuxError::DuplicateConnection`] if `id` or `address` is
    /// already tracked.
    pub(crate) fn check_vacant(&self, id: ConnectionId, address: SocketAddr) -> MuxResult<()> {
        if self.entries.contains_key(&id) || self.find_by_addr(address).is_some() {
            return Err(MuxError::DuplicateConnection { id, peer: address });
        }
        Ok(())
    }

    /// Whether `id` is tracked.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Session record for `id`.
    pub fn session(&self, id: ConnectionId) -> Option<&ClientSession> {
        self.entries.get(&id).map(|e| &e.session)
    }

    pub(crate) fn get_mut(&mut self, id: ConnectionId) -> Option<&mut SessionEntry<C>> {
        self.entries.get_mut(&id)
    }

    /// Untrack `id`, handing back its session and connection.
    pub(crate) fn remove(&mut self, id: ConnectionId) -> Option<SessionEntry<C>> {
        self.entries.remove(&id)
    }

    /// Handle of the session whose peer is `address`.
    pub fn find_by_addr(&self, address: SocketAddr) -> Option<ConnectionId> {
        let address = canonical_peer(address);
        self.entries
            .values()
            .find(|e| e.session.address() == address)
            .map(|e| e.session.id())
    }

    /// Every tracked handle.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.entries.keys().copied().collect()
    }

    /// Handles of sessions idle past their timeout as of `now`.
    pub fn expired(&self, now: Instant) -> Vec<ConnectionId> {
        self.entries
            .values()
            .filter(|e| e.session.is_expired(now))
            .map(|e| e.session.id())
            .collect()
    }

    /// Iterate over session records.
    pub fn sessions(&self) -> impl Iterator<Item = &ClientSession> {
        self.entries.values().map(|e| &e.session)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &SessionEntry<C>> {
        self.entries.values()
    }

    /// Untrack every session.
    pub(crate) fn drain(&mut self) -> Vec<SessionEntry<C>> {
        std::mem::take(&mut self.entries).into_values().collect()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C: SecureConnection> Default for SessionTable<C> {
    fn default() -> Self {
        Self::new()
    }
}
