// src/client/mod.rs

//! Command executors: a RESP client for the proxy and Redis, and a memcached
//! text-protocol client, both over the same deadline-bound transport.

pub mod memcache;
pub mod pipeline;
pub mod redis;
pub mod transport;

pub use memcache::MemcacheConnection;
pub use pipeline::Pipeline;
pub use redis::{AuthState, BitOp, RedisConnection};
