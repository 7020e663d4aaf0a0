//! Role-agnostic runtime API.
//!
//! [`wrap_server`] and [`wrap_client`] apply a [`DtlsConfig`] to the engine's
//! context and hand back the endpoint for that role. Both endpoints implement
//! [`DatagramEndpoint`], so code that only moves datagrams can be written once.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

#[cfg(feature = "client")]
use crate::client::ClientEndpoint;
use crate::config::{DtlsConfig, Role};
#[cfg(feature = "client")]
use crate::core::Connect;
#[cfg(feature = "server")]
use crate::core::SecureListener;
use crate::core::{ContextSetup, MuxError, MuxResult};
#[cfg(feature = "server")]
use crate::server::ServerMultiplexer;

/// Datagram-socket style operations shared by both roles.
#[allow(async_fn_in_trait)]
pub trait DatagramEndpoint {
    /// Role this endpoint plays.
    fn role(&self) -> Role;

    /// Receive one decrypted payload and the address it came from.
    async fn recv_from(&mut self, buf_size: usize) -> MuxResult<(Vec<u8>, SocketAddr)>;

    /// Send one payload to `peer`. `Ok(0)` means nothing was sent.
    async fn send_to(&mut self, data: &[u8], peer: SocketAddr) -> MuxResult<usize>;

    /// Set the wait bound for `recv_from`. `None` blocks indefinitely.
    fn set_timeout(&mut self, wait: Option<Duration>);

    /// Tear down every connection. Infallible.
    fn close(&mut self);

    /// Local socket address.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

fn expect_role(config: &DtlsConfig, expected: Role) -> MuxResult<()> {
    if config.role() == expected {
        Ok(())
    } else {
        Err(MuxError::WrongRole {
            expected,
            actual: config.role(),
        })
    }
}

/// Configure `ctx` for the server role and wrap `listener`.
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub fn wrap_server<L, X>(listener: L, ctx: &mut X, config: DtlsConfig) -> MuxResult<ServerMultiplexer<L>>
where
    L: SecureListener,
    X: ContextSetup + ?Sized,
{
    expect_role(&config, Role::Server)?;
    config.configure_context(ctx)?;
    ServerMultiplexer::new(listener, config)
}

/// Configure `ctx` for the client role and wrap `conn`.
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub fn wrap_client<C, X>(conn: C, ctx: &mut X, config: DtlsConfig) -> MuxResult<ClientEndpoint<C>>
where
    C: Connect,
    X: ContextSetup + ?Sized,
{
    expect_role(&config, Role::Client)?;
    config.configure_context(ctx)?;
    ClientEndpoint::new(conn, config)
}

#[cfg(feature = "server")]
impl<L: SecureListener> DatagramEndpoint for ServerMultiplexer<L> {
    fn role(&self) -> Role {
        Role::Server
    }

    async fn recv_from(&mut self, buf_size: usize) -> MuxResult<(Vec<u8>, SocketAddr)> {
        self.receive(buf_size).await
    }

    async fn send_to(&mut self, data: &[u8], peer: SocketAddr) -> MuxResult<usize> {
        self.send(data, peer)
    }

    fn set_timeout(&mut self, wait: Option<Duration>) {
        ServerMultiplexer::set_timeout(self, wait);
    }

    fn close(&mut self) {
        ServerMultiplexer::close(self);
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        ServerMultiplexer::local_addr(self)
    }
}

#[cfg(feature = "client")]
impl<C: Connect> DatagramEndpoint for ClientEndpoint<C> {
    fn role(&self) -> Role {
        Role::Client
    }

    async fn recv_from(&mut self, buf_size: usize) -> MuxResult<(Vec<u8>, SocketAddr)> {
        self.receive(buf_size).await
    }

    async fn send_to(&mut self, data: &[u8], peer: SocketAddr) -> MuxResult<usize> {
        self.send(data, peer).await
    }

    fn set_timeout(&mut self, wait: Option<Duration>) {
        ClientEndpoint::set_timeout(self, wait);
    }

    fn close(&mut self) {
        ClientEndpoint::close(self);
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        ClientEndpoint::local_addr(self)
    }
}
