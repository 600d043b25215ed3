// src/core/protocol/reply.rs

//! Defines the value a successful command hands back to a scenario.

use super::RespFrame;
use crate::core::HarnessError;
use bytes::Bytes;
use std::fmt;

/// `Reply` is the successful half of a RESP reply.
///
/// Error frames never become a `Reply`: they are turned into
/// `HarnessError::Server` so scenarios can assert on their category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Status(String),
    Bulk(Bytes),
    Integer(i64),
    Array(Vec<Reply>),
    Nil,
}

impl Reply {
    /// Shorthand for the `+OK` status reply.
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    /// Shorthand for a bulk reply built from anything byte-like.
    pub fn bulk(value: impl Into<Bytes>) -> Self {
        Reply::Bulk(value.into())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    /// Truthiness in the sense scenarios use it: `OK`, a non-zero integer, a
    /// non-empty bulk or array.
    pub fn is_truthy(&self) -> bool {
        match self {
            Reply::Status(s) => s.eq_ignore_ascii_case("OK") || s.eq_ignore_ascii_case("PONG"),
            Reply::Bulk(b) => !b.is_empty(),
            Reply::Integer(i) => *i != 0,
            Reply::Array(items) => !items.is_empty(),
            Reply::Nil => false,
        }
    }
}

impl TryFrom<RespFrame> for Reply {
    type Error = HarnessError;

    fn try_from(frame: RespFrame) -> Result<Self, Self::Error> {
        match frame {
            RespFrame::SimpleString(s) => Ok(Reply::Status(s)),
            RespFrame::BulkString(b) => Ok(Reply::Bulk(b)),
            RespFrame::Integer(i) => Ok(Reply::Integer(i)),
            RespFrame::Null | RespFrame::NullArray => Ok(Reply::Nil),
            RespFrame::Error(message) => Err(HarnessError::server(message)),
            // A nested error inside an array (e.g. from EVAL) fails the whole reply.
            RespFrame::Array(frames) => frames
                .into_iter()
                .map(Reply::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Reply::Array),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{s}"),
            Reply::Bulk(b) if b.len() > 64 => {
                write!(f, "<{} bytes, starting {}>", b.len(), hex::encode(&b[..16]))
            }
            Reply::Bulk(b) => write!(f, "{:?}", String::from_utf8_lossy(b)),
            Reply::Integer(i) => write!(f, "(integer) {i}"),
            Reply::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Reply::Nil => write!(f, "(nil)"),
        }
    }
}
