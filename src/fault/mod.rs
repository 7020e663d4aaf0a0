//! Fault classification and recovery hooks.
//!
//! Every fault the secure-transport collaborator reports lands in one of three
//! classes (see [`FaultClass`]). Fatal session faults are then offered to the
//! caller's [`FaultPolicy`] for the phase they occurred in.

mod classify;
mod policy;

pub use classify::*;
pub use policy::*;
