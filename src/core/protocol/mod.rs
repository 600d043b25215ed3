// src/core/protocol/mod.rs

pub mod command;
pub mod memcache;
pub mod reply;
pub mod resp_frame;
pub use command::Command;
pub use memcache::{MemcacheCodec, MemcacheRequest, MemcacheResponse};
pub use reply::Reply;
pub use resp_frame::{RespFrame, RespFrameCodec};
