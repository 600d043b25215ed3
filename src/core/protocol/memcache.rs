// src/core/protocol/memcache.rs

//! Client side of the memcached text protocol, as a `tokio_util` codec.
//!
//! Only the commands the suite issues are modelled: `get`/`gets`, `set`,
//! `incr` and `delete`. Retrieval replies are decoded as a whole block
//! (`VALUE ... END`), so one request always maps to one decoded response.

use crate::core::HarnessError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";
const CRLF_LEN: usize = 2;

/// Longest key the memcached text protocol accepts.
pub const MAX_KEY_LENGTH: usize = 250;

/// A request in the memcached text protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum MemcacheRequest {
    Get { keys: Vec<String>, with_cas: bool },
    Set {
        key: String,
        flags: u32,
        exptime: u32,
        data: Bytes,
    },
    Incr { key: String, delta: u64 },
    Delete { key: String },
}

impl MemcacheRequest {
    /// The command word, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            MemcacheRequest::Get { with_cas: false, .. } => "get",
            MemcacheRequest::Get { with_cas: true, .. } => "gets",
            MemcacheRequest::Set { .. } => "set",
            MemcacheRequest::Incr { .. } => "incr",
            MemcacheRequest::Delete { .. } => "delete",
        }
    }
}

/// One item of a retrieval reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemcacheValue {
    pub key: String,
    pub flags: u32,
    pub data: Bytes,
    pub cas: Option<u64>,
}

/// A complete response in the memcached text protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemcacheResponse {
    Values(Vec<MemcacheValue>),
    Stored,
    NotStored,
    Exists,
    NotFound,
    Deleted,
    Number(u64),
    Error,
    ClientError(String),
    ServerError(String),
}

impl MemcacheResponse {
    /// The error text of an error response, as memcached spells it on the wire.
    pub fn error_message(&self) -> Option<String> {
        match self {
            MemcacheResponse::Error => Some("ERROR".to_string()),
            MemcacheResponse::ClientError(msg) => Some(format!("CLIENT_ERROR {msg}")),
            MemcacheResponse::ServerError(msg) => Some(format!("SERVER_ERROR {msg}")),
            _ => None,
        }
    }
}

/// Checks a key against the text protocol's rules: non-empty, at most 250
/// bytes, no whitespace or control characters.
pub fn validate_key(key: &str) -> Result<(), HarnessError> {
    if key.is_empty() {
        return Err(HarnessError::Protocol("memcached key is empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(HarnessError::Protocol(format!(
            "memcached key of {} bytes exceeds {MAX_KEY_LENGTH}",
            key.len()
        )));
    }
    if key.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        return Err(HarnessError::Protocol(format!(
            "memcached key {key:?} contains whitespace or control characters"
        )));
    }
    Ok(())
}

/// Encodes requests and incrementally decodes responses.
///
/// A retrieval reply is assembled value by value: each complete `VALUE`
/// header and data block leaves the read buffer as soon as it is buffered,
/// so a multi-megabyte reply is never rescanned from its start.
#[derive(Debug, Default)]
pub struct MemcacheCodec {
    /// Values of a retrieval reply still waiting for its `END`.
    block: Option<Vec<MemcacheValue>>,
    /// A `VALUE` header whose data block has not fully arrived.
    header: Option<ValueHeader>,
    /// Bytes at the front of the buffer known to hold no line terminator.
    scanned: usize,
}

#[derive(Debug)]
struct ValueHeader {
    key: String,
    flags: u32,
    len: usize,
    cas: Option<u64>,
}

impl MemcacheCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encoder<MemcacheRequest> for MemcacheCodec {
    type Error = HarnessError;

    fn encode(&mut self, item: MemcacheRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let name = item.name();
        match item {
            MemcacheRequest::Get { keys, .. } => {
                if keys.is_empty() {
                    return Err(HarnessError::Protocol(format!("{name} needs at least one key")));
                }
                dst.extend_from_slice(name.as_bytes());
                for key in &keys {
                    validate_key(key)?;
                    dst.extend_from_slice(b" ");
                    dst.extend_from_slice(key.as_bytes());
                }
                dst.extend_from_slice(CRLF);
            }
            MemcacheRequest::Set {
                key,
                flags,
                exptime,
                data,
            } => {
                validate_key(&key)?;
                dst.reserve(data.len() + key.len() + 48);
                dst.extend_from_slice(
                    format!("set {key} {flags} {exptime} {}\r\n", data.len()).as_bytes(),
                );
                dst.extend_from_slice(&data);
                dst.extend_from_slice(CRLF);
            }
            MemcacheRequest::Incr { key, delta } => {
                validate_key(&key)?;
                dst.extend_from_slice(format!("incr {key} {delta}\r\n").as_bytes());
            }
            MemcacheRequest::Delete { key } => {
                validate_key(&key)?;
                dst.extend_from_slice(format!("delete {key}\r\n").as_bytes());
            }
        }
        Ok(())
    }
}

impl Decoder for MemcacheCodec {
    type Item = MemcacheResponse;
    type Error = HarnessError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if let Some(header) = self.header.take() {
                match take_data(header, src)? {
                    Ok(value) => self.block.get_or_insert_with(Vec::new).push(value),
                    Err(header) => {
                        self.header = Some(header);
                        return Ok(None);
                    }
                }
            }

            let Some(line) = self.next_line(src)? else {
                return Ok(None);
            };

            if self.block.is_some() || line.starts_with("VALUE ") {
                if line == "END" {
                    let values = self.block.take().unwrap_or_default();
                    return Ok(Some(MemcacheResponse::Values(values)));
                }
                self.block.get_or_insert_with(Vec::new);
                self.header = Some(parse_header(&line)?);
                continue;
            }
            return parse_status(&line).map(Some);
        }
    }
}

impl MemcacheCodec {
    /// Splits one CRLF-terminated line off the buffer.
    fn next_line(&mut self, src: &mut BytesMut) -> Result<Option<String>, HarnessError> {
        let from = self.scanned.saturating_sub(1).min(src.len());
        let Some(offset) = src[from..].windows(CRLF_LEN).position(|w| w == CRLF) else {
            self.scanned = src.len();
            return Ok(None);
        };
        let line = src.split_to(from + offset);
        src.advance(CRLF_LEN);
        self.scanned = 0;
        String::from_utf8(line.to_vec())
            .map_err(|e| HarnessError::Protocol(format!("non UTF-8 response line: {e}")))
            .map(Some)
    }
}

fn parse_status(line: &str) -> Result<MemcacheResponse, HarnessError> {
    match line {
        "STORED" => Ok(MemcacheResponse::Stored),
        "NOT_STORED" => Ok(MemcacheResponse::NotStored),
        "EXISTS" => Ok(MemcacheResponse::Exists),
        "NOT_FOUND" => Ok(MemcacheResponse::NotFound),
        "DELETED" => Ok(MemcacheResponse::Deleted),
        "ERROR" => Ok(MemcacheResponse::Error),
        "END" => Ok(MemcacheResponse::Values(Vec::new())),
        _ => {
            if let Some(msg) = line.strip_prefix("CLIENT_ERROR") {
                Ok(MemcacheResponse::ClientError(msg.trim().to_string()))
            } else if let Some(msg) = line.strip_prefix("SERVER_ERROR") {
                Ok(MemcacheResponse::ServerError(msg.trim().to_string()))
            } else if let Ok(n) = line.trim().parse::<u64>() {
                Ok(MemcacheResponse::Number(n))
            } else {
                Err(HarnessError::Protocol(format!(
                    "unexpected memcached response line {line:?}"
                )))
            }
        }
    }
}

/// Parses `VALUE <key> <flags> <bytes> [<cas>]`.
fn parse_header(line: &str) -> Result<ValueHeader, HarnessError> {
    let mut parts = line.split_ascii_whitespace();
    if parts.next() != Some("VALUE") {
        return Err(HarnessError::Protocol(format!(
            "expected VALUE or END, got {line:?}"
        )));
    }
    let malformed = || HarnessError::Protocol(format!("malformed VALUE line {line:?}"));
    Ok(ValueHeader {
        key: parts.next().ok_or_else(malformed)?.to_string(),
        flags: parts.next().ok_or_else(malformed)?.parse::<u32>()?,
        len: parts.next().ok_or_else(malformed)?.parse::<usize>()?,
        cas: parts.next().map(str::parse::<u64>).transpose()?,
    })
}

/// Takes the data block announced by `header`, or hands the header back
/// while the block is still incomplete.
fn take_data(
    header: ValueHeader,
    src: &mut BytesMut,
) -> Result<Result<MemcacheValue, ValueHeader>, HarnessError> {
    let len = header.len;
    if src.len() < len + CRLF_LEN {
        src.reserve(len + CRLF_LEN - src.len());
        return Ok(Err(header));
    }
    if &src[len..len + CRLF_LEN] != CRLF {
        return Err(HarnessError::Protocol(format!(
            "data block for {:?} is not terminated by CRLF",
            header.key
        )));
    }
    let data = src.split_to(len).freeze();
    src.advance(CRLF_LEN);
    Ok(Ok(MemcacheValue {
        key: header.key,
        flags: header.flags,
        data,
        cas: header.cas,
    }))
}
