//! Core types shared by every endpoint: the collaborator contract, errors,
//! defaults and address helpers.

mod addr;
mod constants;
mod error;
mod traits;

pub use addr::*;
pub use constants::*;
pub use error::*;
pub use traits::*;

pub(crate) use traits::teardown;
