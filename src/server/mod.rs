//! Server role: many peers over one listening transport.
//!
//! [`ServerMultiplexer`] owns the listener and a [`SessionTable`] of
//! [`ClientSession`] records, one per accepted peer.

mod multiplexer;
mod session;
mod table;

pub use multiplexer::*;
pub use session::*;
pub use table::SessionTable;
