//! # dtls-mux
//!
//! Single-socket, multi-peer secure datagram endpoints.
//!
//! UDP carries no connection identity, so a server that wants many encrypted
//! sessions on one socket has to synthesize per-peer state itself. This crate
//! does that on top of a pluggable DTLS-style engine:
//!
//! - **Demultiplexing**: one listening transport, one session per peer
//! - **Handshakes**: each peer's handshake advances independently, with
//!   handshake-specific retransmission
//! - **Lifecycle**: idle sessions are evicted, faulty ones dropped
//! - **Routing**: outbound datagrams go to the session for their address
//!
//! The engine itself (record protection, cookies, certificates) is supplied by
//! the caller through the [`core::SecureListener`], [`core::SecureConnection`],
//! [`core::Connect`] and [`core::ContextSetup`] traits.
//!
//! ## Feature Flags
//!
//! - `server` (default): [`server::ServerMultiplexer`]
//! - `client` (default): [`client::ClientEndpoint`]
//!
//! ## Modules
//!
//! - [`core`]: engine contract, errors, constants (always included)
//! - [`config`]: endpoint configuration and context setup
//! - [`fault`]: fault classification and recovery hooks
//! - [`server`]: multi-peer server (requires `server` feature)
//! - [`client`]: single-peer client (requires `client` feature)
//! - [`endpoint`]: role-agnostic API and constructors
//!
//! ## Example Usage
//!
//! ```ignore
//! use dtls_mux::prelude::*;
//!
//! let config = DtlsConfig::server()
//!     .idle_timeout(Duration::from_secs(30))
//!     .fault_policy(FaultHooks::new().on_read(|fault| {
//!         tracing::warn!(peer = %fault.peer(), "bad record, dropping peer");
//!         true
//!     }))
//!     .build()?;
//!
//! let mut server = wrap_server(engine.listen(addr)?, &mut engine.context(), config)?;
//! let (payload, peer) = server.receive(DEFAULT_RECV_BUFFER_SIZE).await?;
//! server.send(&payload, peer)?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

pub mod config;
pub mod fault;

// Client API (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

// Server API (feature-gated)
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;

pub mod endpoint;

#[cfg(test)]
mod testing;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use std::time::Duration;

    pub use crate::config::*;
    pub use crate::core::*;
    pub use crate::endpoint::*;
    pub use crate::fault::*;

    #[cfg(feature = "client")]
    pub use crate::client::ClientEndpoint;

    #[cfg(feature = "server")]
    pub use crate::server::{ClientSession, ServerMultiplexer, SessionState};
}

// Re-export commonly used items at crate root
pub use config::{DtlsConfig, Role};
pub use core::{MuxError, MuxResult};
pub use endpoint::DatagramEndpoint;

#[cfg(feature = "client")]
pub use client::ClientEndpoint;

#[cfg(feature = "server")]
pub use server::ServerMultiplexer;
