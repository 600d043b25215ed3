// src/core/protocol/resp_frame.rs

//! Client side of RESP2: commands go out through [`Command`], replies come
//! back as [`RespFrame`]s.
//!
//! The decoder is incremental. Every complete line and bulk payload is taken
//! out of the read buffer as soon as it arrives, and unfinished arrays wait on
//! a stack inside the codec, so a reply of many megabytes is never re-parsed
//! from its first byte when the next chunk lands.

use super::Command;
use crate::core::HarnessError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";

// Replies past these bounds are rejected instead of buffered.
const MAX_LINE_LENGTH: usize = 64 * 1024;
const MAX_ARRAY_LENGTH: usize = 16 * 1024 * 1024;
const MAX_BULK_LENGTH: usize = 512 * 1024 * 1024;
const MAX_NESTING: usize = 256;

/// A reply as it appears on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Null,
    NullArray,
    Array(Vec<RespFrame>),
}

#[derive(Debug)]
struct OpenArray {
    expected: usize,
    items: Vec<RespFrame>,
}

/// Encodes commands and incrementally decodes replies.
#[derive(Debug, Default)]
pub struct RespFrameCodec {
    /// Arrays still collecting elements, innermost last.
    open: Vec<OpenArray>,
    /// Payload length of a bulk string whose header was already consumed.
    bulk: Option<usize>,
    /// Bytes at the front of the buffer known to hold no line terminator.
    scanned: usize,
}

impl RespFrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no reply is half-way through decoding.
    pub fn is_idle(&self) -> bool {
        self.open.is_empty() && self.bulk.is_none()
    }

    /// Splits one CRLF-terminated line off the buffer, or returns `None` and
    /// remembers how far it looked.
    fn next_line(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, HarnessError> {
        let from = self.scanned.saturating_sub(1).min(src.len());
        match src[from..].windows(2).position(|w| w == CRLF) {
            Some(offset) => {
                let line = src.split_to(from + offset).freeze();
                src.advance(CRLF.len());
                self.scanned = 0;
                Ok(Some(line))
            }
            None if src.len() > MAX_LINE_LENGTH => Err(HarnessError::Protocol(format!(
                "reply line longer than {MAX_LINE_LENGTH} bytes"
            ))),
            None => {
                self.scanned = src.len();
                Ok(None)
            }
        }
    }

    /// Interprets a header line. Scalars come back immediately; bulk strings
    /// and arrays leave state behind and yield `None`.
    fn start(&mut self, line: Bytes) -> Result<Option<RespFrame>, HarnessError> {
        let Some((&kind, body)) = line.split_first() else {
            return Err(HarnessError::Protocol("empty reply line".to_string()));
        };
        match kind {
            b'+' => Ok(Some(RespFrame::SimpleString(lossy(body)))),
            b'-' => Ok(Some(RespFrame::Error(lossy(body)))),
            b':' => Ok(Some(RespFrame::Integer(parse_int(body)?))),
            b'$' => match parse_length(body, MAX_BULK_LENGTH, "bulk string")? {
                None => Ok(Some(RespFrame::Null)),
                Some(len) => {
                    self.bulk = Some(len);
                    Ok(None)
                }
            },
            b'*' => match parse_length(body, MAX_ARRAY_LENGTH, "array")? {
                None => Ok(Some(RespFrame::NullArray)),
                Some(0) => Ok(Some(RespFrame::Array(Vec::new()))),
                Some(len) => {
                    if self.open.len() >= MAX_NESTING {
                        return Err(HarnessError::Protocol(format!(
                            "reply nested deeper than {MAX_NESTING} arrays"
                        )));
                    }
                    self.open.push(OpenArray {
                        expected: len,
                        items: Vec::with_capacity(len.min(1024)),
                    });
                    Ok(None)
                }
            },
            other => Err(HarnessError::Protocol(format!(
                "unexpected RESP type byte 0x{other:02x}"
            ))),
        }
    }

    /// Takes the pending bulk payload once all of it and its CRLF are buffered.
    fn finish_bulk(
        &mut self,
        len: usize,
        src: &mut BytesMut,
    ) -> Result<Option<RespFrame>, HarnessError> {
        if src.len() < len + CRLF.len() {
            src.reserve(len + CRLF.len() - src.len());
            return Ok(None);
        }
        if &src[len..len + CRLF.len()] != CRLF {
            return Err(HarnessError::Protocol(
                "bulk string is not terminated by CRLF".to_string(),
            ));
        }
        let data = src.split_to(len).freeze();
        src.advance(CRLF.len());
        self.bulk = None;
        Ok(Some(RespFrame::BulkString(data)))
    }

    /// Hands a finished element to the innermost open array. Returns the
    /// top-level frame once nothing is left open.
    fn attach(&mut self, mut frame: RespFrame) -> Option<RespFrame> {
        while let Some(mut array) = self.open.pop() {
            array.items.push(frame);
            if array.items.len() < array.expected {
                self.open.push(array);
                return None;
            }
            frame = RespFrame::Array(array.items);
        }
        Some(frame)
    }
}

impl Encoder<Command> for RespFrameCodec {
    type Error = HarnessError;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.write_to(dst);
        Ok(())
    }
}

impl Decoder for RespFrameCodec {
    type Item = RespFrame;
    type Error = HarnessError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let element = match self.bulk {
                Some(len) => match self.finish_bulk(len, src)? {
                    Some(frame) => frame,
                    None => return Ok(None),
                },
                None => {
                    let Some(line) = self.next_line(src)? else {
                        return Ok(None);
                    };
                    match self.start(line)? {
                        Some(frame) => frame,
                        None => continue,
                    }
                }
            };
            if let Some(frame) = self.attach(element) {
                return Ok(Some(frame));
            }
        }
    }
}

fn lossy(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

fn parse_int(body: &[u8]) -> Result<i64, HarnessError> {
    std::str::from_utf8(body)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| HarnessError::Protocol(format!("invalid integer {:?}", lossy(body))))
}

/// Parses a bulk or array length. `-1` is the null marker.
fn parse_length(body: &[u8], max: usize, what: &str) -> Result<Option<usize>, HarnessError> {
    match parse_int(body)? {
        -1 => Ok(None),
        n if n < 0 => Err(HarnessError::Protocol(format!("invalid {what} length {n}"))),
        n if n as u64 > max as u64 => Err(HarnessError::Protocol(format!(
            "{what} of length {n} exceeds the client limit"
        ))),
        n => Ok(Some(n as usize)),
    }
}
