//! Client role: one connection pinned to one peer.

mod endpoint;

pub use endpoint::*;
