// src/core/mod.rs

//! Wire protocols, reply values and the error type shared by every client.

pub mod errors;
pub mod protocol;

pub use errors::{ErrorClass, HarnessError};
pub use protocol::Reply;
