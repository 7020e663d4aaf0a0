//! Endpoint configuration.
//!
//! [`DtlsConfig`] carries every recognized construction option. Engine-facing
//! options (certificates, restriction lists, MTU, retransmission interval) are
//! applied through the [`ContextSetup`](crate::core::ContextSetup) hook points;
//! the rest configure the endpoints directly.

mod dtls;
mod options;
mod timer;

pub use dtls::*;
pub use options::*;
pub use timer::RetransmitTimer;
