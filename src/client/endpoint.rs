//! Single-peer client endpoint.
//!
//! The connection is pinned to its destination on the first `send`, not at
//! construction. With `handshake_on_connect` that first `send` also drives
//! the handshake to completion before any application data goes out.

use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::task::Poll;
use std::time::Duration;

use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use crate::config::{DtlsConfig, Role};
use crate::core::{
    Connect, FaultPhase, MAX_DATAGRAM_SIZE, MuxError, MuxResult, Outcome, SessionFault,
    TransportFault, canonical_peer, teardown,
};
use crate::fault::{ErrorClassifier, FaultClass};

/// Secure datagram client bound to one peer.
pub struct ClientEndpoint<C: Connect> {
    conn: C,
    connected: bool,
    timeout: Option<Duration>,
    handshake_on_connect: bool,
    classifier: ErrorClassifier,
    config: DtlsConfig,
    closed: bool,
}

impl<C: Connect> ClientEndpoint<C> {
    /// Wrap an unconnected client connection.
    ///
    /// Fails with [`MuxError::WrongRole`] for a server configuration.
    pub fn new(conn: C, config: DtlsConfig) -> MuxResult<Self> {
        if config.role() != Role::Client {
            return Err(MuxError::WrongRole {
                expected: Role::Client,
                actual: config.role(),
            });
        }

        Ok(Self {
            connected: conn.is_connected(),
            conn,
            timeout: config.wait_timeout(),
            handshake_on_connect: config.handshake_on_connect(),
            classifier: ErrorClassifier::new(config.suppress_ragged_eofs()),
            config,
            closed: false,
        })
    }

    /// Wait for one decrypted payload from the peer.
    ///
    /// Anything short of a fatal fault within the timeout (nothing readable,
    /// an empty record, a suppressed ragged EOF) fails with
    /// [`MuxError::Timeout`].
    pub async fn receive(&mut self, buf_size: usize) -> MuxResult<(Vec<u8>, SocketAddr)> {
        self.ensure_open()?;
        let Some(peer) = self.conn.peer_addr() else {
            return Err(MuxError::NotConnected);
        };
        let peer = canonical_peer(peer);

        if !self.wait_readable(self.timeout).await {
            return Err(MuxError::Timeout);
        }

        match self.conn.recv(buf_size.min(MAX_DATAGRAM_SIZE)) {
            Outcome::Done(data) if !data.is_empty() => {
                debug!(%peer, bytes = data.len(), "received from peer");
                Ok((data, peer))
            }
            Outcome::Done(_) | Outcome::WouldBlock => Err(MuxError::Timeout),
            Outcome::Fatal(fault) => match self.classifier.classify(FaultPhase::Read, &fault) {
                FaultClass::Fatal => Err(SessionFault::new(peer, FaultPhase::Read, fault).into()),
                class => {
                    debug!(%peer, ?class, error = %fault, "read produced no data");
                    Err(MuxError::Timeout)
                }
            },
        }
    }

    /// Encrypt and send `data`.
    ///
    /// The first call connects to `peer` (and handshakes, if configured);
    /// later calls reuse that connection and ignore `peer`.
    pub async fn send(&mut self, data: &[u8], peer: SocketAddr) -> MuxResult<usize> {
        self.ensure_open()?;
        if !self.connected {
            self.connect(peer).await?;
        }
        let peer = self.conn.peer_addr().map_or(peer, canonical_peer);

        match self.conn.send(data) {
            Ok(sent) => {
                debug!(%peer, bytes = sent, "sent to peer");
                Ok(sent)
            }
            Err(fault) => match self.classifier.classify(FaultPhase::Write, &fault) {
                FaultClass::Transient => {
                    debug!(%peer, error = %fault, "send would block");
                    Ok(0)
                }
                _ => Err(SessionFault::new(peer, FaultPhase::Write, fault).into()),
            },
        }
    }

    /// Shut down gracefully if connected, then close.
    ///
    /// Faults are logged, never returned.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let peer = self
            .conn
            .peer_addr()
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));
        teardown(&mut self.conn, peer, self.connected);
        info!(%peer, "client endpoint closed");
    }

    /// Set the socket timeout. `None` blocks indefinitely.
    pub fn set_timeout(&mut self, wait: Option<Duration>) {
        self.timeout = wait;
    }

    /// Current socket timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether the connection has been pinned to a peer.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The pinned peer, once connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.conn.peer_addr().map(canonical_peer)
    }

    /// Local address of the underlying socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.conn.local_addr()
    }

    /// Configuration this endpoint was built with.
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

    async fn connect(&mut self, peer: SocketAddr) -> MuxResult<()> {
        let peer = canonical_peer(peer);
        let handshake_fault =
            |fault| MuxError::from(SessionFault::new(peer, FaultPhase::Handshake, fault));

        self.conn.connect(peer).map_err(handshake_fault)?;
        self.conn.set_nonblocking(true).map_err(handshake_fault)?;
        self.connected = true;
        info!(%peer, "connected");

        if self.handshake_on_connect {
            self.drive_handshake(peer).await?;
        }
        Ok(())
    }

    /// Run the handshake to completion within the socket timeout.
    async fn drive_handshake(&mut self, peer: SocketAddr) -> MuxResult<()> {
        let deadline = self.timeout.map(|limit| Instant::now() + limit);

        loop {
            match self.conn.do_handshake() {
                Outcome::Done(()) => {
                    info!(%peer, "handshake complete");
                    return Ok(());
                }
                Outcome::WouldBlock => {}
                Outcome::Fatal(fault) => self.check_handshake_fault(peer, fault)?,
            }

            if self.conn.retransmit_timeout() == Some(Duration::ZERO) {
                match self.conn.fire_retransmit() {
                    Ok(sent) => debug!(%peer, sent, "handshake retransmission triggered"),
                    Err(fault) => self.check_handshake_fault(peer, fault)?,
                }
            }

            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        warn!(%peer, "handshake timed out");
                        return Err(MuxError::Timeout);
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            // Still due after firing means the engine did not re-arm it.
            let retransmit = self.conn.retransmit_timeout().filter(|left| !left.is_zero());
            let wait = match (remaining, retransmit) {
                (Some(left), Some(retransmit)) => Some(left.min(retransmit)),
                (left, retransmit) => left.or(retransmit),
            };
            self.wait_readable(wait).await;
        }
    }

    fn check_handshake_fault(&self, peer: SocketAddr, fault: TransportFault) -> MuxResult<()> {
        if self.classifier.classify(FaultPhase::Handshake, &fault) == FaultClass::Transient {
            debug!(%peer, error = %fault, "handshake in progress");
            return Ok(());
        }
        Err(SessionFault::new(peer, FaultPhase::Handshake, fault).into())
    }

    /// Wait until the connection is readable. Returns `false` if `limit`
    /// elapsed first.
    async fn wait_readable(&self, limit: Option<Duration>) -> bool {
        let ready = poll_fn(|cx| match self.conn.poll_read_ready(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(()),
            Poll::Ready(Err(err)) => {
                warn!(error = %err, "readiness error");
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        });

        match limit {
            Some(limit) => timeout(limit, ready).await.is_ok(),
            None => {
                ready.await;
                true
            }
        }
    }
}

impl<C: Connect> Drop for ClientEndpoint<C> {
    fn drop(&mut self) {
        self.close();
    }
}
