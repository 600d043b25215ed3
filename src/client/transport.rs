// src/client/transport.rs

//! The framed TCP transport shared by the Redis and memcached clients.
//!
//! Every exchange runs under a single deadline: a lone command gets the
//! configured window, and so does a whole pipeline. When the deadline passes
//! the exchange fails as a unit and the transport refuses further use, since
//! replies still in flight would otherwise be matched to the wrong request.

use crate::config::Endpoint;
use crate::core::HarnessError;
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info};

const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug)]
pub struct Transport<C> {
    endpoint: Endpoint,
    stream: TcpStream,
    codec: C,
    read_buf: BytesMut,
    command_timeout: Duration,
    poisoned: bool,
}

impl<C> Transport<C> {
    /// Opens a TCP connection to `endpoint`. No retry: a refused or timed out
    /// connect is reported as `HarnessError::Connection`.
    pub async fn connect(
        endpoint: Endpoint,
        codec: C,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> Result<Self, HarnessError> {
        let addr = endpoint.addr();
        let stream = match timeout(connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(HarnessError::Connection {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(HarnessError::Connection {
                    endpoint: endpoint.to_string(),
                    reason: format!("connect timed out after {connect_timeout:?}"),
                });
            }
        };
        stream.set_nodelay(true)?;
        info!("Connected to {endpoint}");

        Ok(Self {
            endpoint,
            stream,
            codec,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            command_timeout,
            poisoned: false,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// The deadline for an exchange starting now.
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.command_timeout
    }

    fn timed_out(&mut self, operation: &str) -> HarnessError {
        self.poisoned = true;
        HarnessError::Timeout {
            operation: operation.to_string(),
            duration: self.command_timeout,
        }
    }

    fn ensure_usable(&self) -> Result<(), HarnessError> {
        if self.poisoned {
            return Err(HarnessError::Protocol(format!(
                "connection to {} is unusable after an earlier failed exchange",
                self.endpoint
            )));
        }
        Ok(())
    }

    /// Writes an encoded batch before `deadline`.
    pub async fn send(
        &mut self,
        buf: &[u8],
        deadline: Instant,
        operation: &str,
    ) -> Result<(), HarnessError> {
        self.ensure_usable()?;
        match timeout_at(deadline, self.stream.write_all(buf)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.poisoned = true;
                Err(e.into())
            }
            Err(_) => Err(self.timed_out(operation)),
        }
    }

    /// Encodes `items` into one buffer, flushes it, then reads one response
    /// per item. Any transport failure fails the whole exchange.
    pub async fn round_trip<I>(
        &mut self,
        items: Vec<I>,
        operation: &str,
    ) -> Result<Vec<C::Item>, HarnessError>
    where
        C: Encoder<I, Error = HarnessError> + Decoder<Error = HarnessError>,
    {
        let count = items.len();
        let mut write_buf = BytesMut::new();
        for item in items {
            self.codec.encode(item, &mut write_buf)?;
        }

        let deadline = self.deadline();
        debug!(
            "{} -> {operation}: {count} request(s), {} bytes",
            self.endpoint,
            write_buf.len()
        );
        self.send(&write_buf, deadline, operation).await?;

        let mut responses = Vec::with_capacity(count);
        for _ in 0..count {
            responses.push(self.receive(deadline, operation).await?);
        }
        Ok(responses)
    }

    /// Reads one complete response before `deadline`.
    pub async fn receive(
        &mut self,
        deadline: Instant,
        operation: &str,
    ) -> Result<C::Item, HarnessError>
    where
        C: Decoder<Error = HarnessError>,
    {
        self.ensure_usable()?;
        loop {
            match self.codec.decode(&mut self.read_buf) {
                Ok(Some(item)) => return Ok(item),
                Ok(None) => {}
                Err(e) => {
                    self.poisoned = true;
                    return Err(e);
                }
            }

            self.read_buf.reserve(READ_CHUNK);
            match timeout_at(deadline, self.stream.read_buf(&mut self.read_buf)).await {
                Ok(Ok(0)) => {
                    self.poisoned = true;
                    return Err(HarnessError::ConnectionClosed);
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    self.poisoned = true;
                    return Err(e.into());
                }
                Err(_) => return Err(self.timed_out(operation)),
            }
        }
    }
}
