// src/lib.rs

//! A harness for checking that the nutcracker proxy behaves like the Redis
//! and memcached servers behind it.

pub mod assertions;
pub mod client;
pub mod config;
pub mod connection;
pub mod core;
pub mod logging;

// Re-export
pub use crate::assertions::{AssertionFailure, ExpectedErrors};
pub use crate::client::{MemcacheConnection, Pipeline, RedisConnection};
pub use crate::config::{Config, Endpoint, Limits};
pub use crate::connection::ConnectionFactory;
pub use crate::core::{ErrorClass, HarnessError, Reply};
