// src/client/redis.rs

//! A RESP client session bound to one endpoint: the proxy or a Redis store.

use super::pipeline::Pipeline;
use super::transport::Transport;
use crate::config::Endpoint;
use crate::core::protocol::{Command, RespFrame, RespFrameCodec};
use crate::core::{ErrorClass, HarnessError, Reply};
use bytes::Bytes;
use indexmap::IndexMap;
use std::time::Duration;
use strum_macros::{AsRefStr, Display};
use tracing::{debug, warn};

/// Authentication state as observed from this session's AUTH replies.
///
/// Every AUTH moves the session fully: a successful one to `Authenticated`,
/// a failed one to `Unauthenticated`. `Unknown` means no AUTH was sent yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Unknown,
    Authenticated,
    Unauthenticated,
}

/// The operations accepted by BITOP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum BitOp {
    And,
    Or,
    Xor,
    Not,
}

#[derive(Debug)]
pub struct RedisConnection {
    transport: Transport<RespFrameCodec>,
    auth: AuthState,
}

impl RedisConnection {
    pub async fn connect(
        endpoint: Endpoint,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> Result<Self, HarnessError> {
        let transport =
            Transport::connect(endpoint, RespFrameCodec::new(), connect_timeout, command_timeout)
                .await?;
        Ok(Self {
            transport,
            auth: AuthState::default(),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.transport.endpoint()
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth
    }

    /// Sends one command and waits for its reply.
    pub async fn execute(&mut self, command: Command) -> Result<Reply, HarnessError> {
        let name = command.name();
        let mut replies = self.transport.round_trip(vec![command], &name).await?;
        let reply = replies
            .pop()
            .ok_or_else(|| HarnessError::Protocol(format!("no reply to {name}")))?;
        self.interpret(&name, reply)
    }

    /// Sends `name` with `args` as one command.
    pub async fn command<I, A>(&mut self, name: &str, args: I) -> Result<Reply, HarnessError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        self.execute(Command::new(name, args)).await
    }

    /// Flushes every queued command of `pipeline` at once and collects the
    /// replies in order.
    ///
    /// Error replies stay attached to the command that caused them. A
    /// transport failure (timeout, closed connection) fails the whole batch:
    /// no partial results are returned.
    pub async fn execute_pipeline(
        &mut self,
        pipeline: Pipeline,
    ) -> Result<Vec<Result<Reply, HarnessError>>, HarnessError> {
        let commands = pipeline.into_commands();
        let names: Vec<String> = commands.iter().map(Command::name).collect();
        let operation = format!("pipeline of {} commands", commands.len());
        let replies = self.transport.round_trip(commands, &operation).await?;
        Ok(names
            .iter()
            .zip(replies)
            .map(|(name, reply)| self.interpret(name, reply))
            .collect())
    }

    fn interpret(&self, name: &str, frame: RespFrame) -> Result<Reply, HarnessError> {
        match Reply::try_from(frame) {
            Ok(reply) => {
                debug!("{} <- {name}: {reply}", self.endpoint());
                Ok(reply)
            }
            Err(e) => {
                if e.class() == ErrorClass::Unclassified {
                    warn!("{} <- {name}: unclassified error '{e}'", self.endpoint());
                } else {
                    debug!("{} <- {name}: {} error '{e}'", self.endpoint(), e.class());
                }
                Err(e)
            }
        }
    }

    fn unexpected(name: &str, reply: Reply) -> HarnessError {
        HarnessError::Protocol(format!("unexpected reply to {name}: {reply}"))
    }

    /// Sends `PING`. True when the server answered `PONG`.
    pub async fn ping(&mut self) -> Result<bool, HarnessError> {
        match self.command("PING", Vec::<Bytes>::new()).await? {
            Reply::Status(s) => Ok(s.eq_ignore_ascii_case("PONG")),
            other => Err(Self::unexpected("PING", other)),
        }
    }

    /// Sends `AUTH` and records the outcome in the session's auth state.
    pub async fn auth(&mut self, password: &str) -> Result<(), HarnessError> {
        let result = self
            .command("AUTH", [Bytes::copy_from_slice(password.as_bytes())])
            .await;
        match result {
            Ok(Reply::Status(s)) if s.eq_ignore_ascii_case("OK") => {
                self.auth = AuthState::Authenticated;
                Ok(())
            }
            Ok(other) => {
                self.auth = AuthState::Unauthenticated;
                Err(Self::unexpected("AUTH", other))
            }
            Err(e) => {
                self.auth = AuthState::Unauthenticated;
                Err(e)
            }
        }
    }

    pub async fn get(&mut self, key: impl Into<Bytes>) -> Result<Option<Bytes>, HarnessError> {
        match self.command("GET", [key.into()]).await? {
            Reply::Bulk(b) => Ok(Some(b)),
            Reply::Nil => Ok(None),
            other => Err(Self::unexpected("GET", other)),
        }
    }

    /// One value slot per key, `None` where the key does not exist.
    pub async fn mget<K: AsRef<str>>(
        &mut self,
        keys: &[K],
    ) -> Result<Vec<Option<Bytes>>, HarnessError> {
        let args = keys.iter().map(|k| Bytes::copy_from_slice(k.as_ref().as_bytes()));
        match self.command("MGET", args).await? {
            Reply::Array(values) if values.len() == keys.len() => values
                .into_iter()
                .map(|v| match v {
                    Reply::Bulk(b) => Ok(Some(b)),
                    Reply::Nil => Ok(None),
                    other => Err(Self::unexpected("MGET", other)),
                })
                .collect(),
            other => Err(Self::unexpected("MGET", other)),
        }
    }

    /// `MGET` folded into a mapping. Absent keys are left out, the same
    /// shape `MemcacheConnection::get_multi` returns.
    pub async fn mget_map<K: AsRef<str>>(
        &mut self,
        keys: &[K],
    ) -> Result<IndexMap<String, Bytes>, HarnessError> {
        let values = self.mget(keys).await?;
        Ok(keys
            .iter()
            .zip(values)
            .filter_map(|(k, v)| v.map(|v| (k.as_ref().to_string(), v)))
            .collect())
    }

    pub async fn set(
        &mut self,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Result<(), HarnessError> {
        match self.command("SET", [key.into(), value.into()]).await? {
            reply if reply == Reply::ok() => Ok(()),
            other => Err(Self::unexpected("SET", other)),
        }
    }

    pub async fn incr(&mut self, key: impl Into<Bytes>) -> Result<i64, HarnessError> {
        match self.command("INCR", [key.into()]).await? {
            Reply::Integer(i) => Ok(i),
            other => Err(Self::unexpected("INCR", other)),
        }
    }

    /// Deletes `keys`, returning how many existed.
    pub async fn del<I, K>(&mut self, keys: I) -> Result<i64, HarnessError>
    where
        I: IntoIterator<Item = K>,
        K: Into<Bytes>,
    {
        match self.command("DEL", keys).await? {
            Reply::Integer(i) => Ok(i),
            other => Err(Self::unexpected("DEL", other)),
        }
    }

    pub async fn mset<I, K, V>(&mut self, pairs: I) -> Result<(), HarnessError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Bytes>,
        V: Into<Bytes>,
    {
        match self.command("MSET", flatten_pairs(pairs)).await? {
            reply if reply == Reply::ok() => Ok(()),
            other => Err(Self::unexpected("MSET", other)),
        }
    }

    /// True when every key was set, false when none was because one existed.
    pub async fn msetnx<I, K, V>(&mut self, pairs: I) -> Result<bool, HarnessError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Bytes>,
        V: Into<Bytes>,
    {
        match self.command("MSETNX", flatten_pairs(pairs)).await? {
            Reply::Integer(i) => Ok(i == 1),
            other => Err(Self::unexpected("MSETNX", other)),
        }
    }

    pub async fn hmset<I, F, V>(
        &mut self,
        key: impl Into<Bytes>,
        fields: I,
    ) -> Result<(), HarnessError>
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<Bytes>,
        V: Into<Bytes>,
    {
        let mut args = vec![key.into()];
        args.extend(flatten_pairs(fields));
        match self.command("HMSET", args).await? {
            reply if reply == Reply::ok() => Ok(()),
            other => Err(Self::unexpected("HMSET", other)),
        }
    }

    pub async fn rename(
        &mut self,
        src: impl Into<Bytes>,
        dst: impl Into<Bytes>,
    ) -> Result<(), HarnessError> {
        match self.command("RENAME", [src.into(), dst.into()]).await? {
            reply if reply == Reply::ok() => Ok(()),
            other => Err(Self::unexpected("RENAME", other)),
        }
    }

    /// True when the key was renamed, false when `dst` already existed.
    pub async fn renamenx(
        &mut self,
        src: impl Into<Bytes>,
        dst: impl Into<Bytes>,
    ) -> Result<bool, HarnessError> {
        match self.command("RENAMENX", [src.into(), dst.into()]).await? {
            Reply::Integer(i) => Ok(i == 1),
            other => Err(Self::unexpected("RENAMENX", other)),
        }
    }

    /// Runs BITOP and returns the length of the destination string.
    pub async fn bitop<I, K>(
        &mut self,
        op: BitOp,
        dest: impl Into<Bytes>,
        keys: I,
    ) -> Result<i64, HarnessError>
    where
        I: IntoIterator<Item = K>,
        K: Into<Bytes>,
    {
        let mut args = vec![Bytes::from(op.to_string()), dest.into()];
        args.extend(keys.into_iter().map(Into::into));
        match self.command("BITOP", args).await? {
            Reply::Integer(i) => Ok(i),
            other => Err(Self::unexpected("BITOP", other)),
        }
    }

    /// One SCAN step: the next cursor and the keys of this page.
    pub async fn scan(
        &mut self,
        cursor: u64,
        pattern: Option<&str>,
        count: Option<usize>,
    ) -> Result<(u64, Vec<Bytes>), HarnessError> {
        let mut args = vec![Bytes::from(cursor.to_string())];
        if let Some(pattern) = pattern {
            args.push(Bytes::from_static(b"MATCH"));
            args.push(Bytes::copy_from_slice(pattern.as_bytes()));
        }
        if let Some(count) = count {
            args.push(Bytes::from_static(b"COUNT"));
            args.push(Bytes::from(count.to_string()));
        }

        match self.command("SCAN", args).await? {
            Reply::Array(mut parts) if parts.len() == 2 => {
                let keys = match parts.pop() {
                    Some(Reply::Array(keys)) => keys
                        .into_iter()
                        .map(|k| match k {
                            Reply::Bulk(b) => Ok(b),
                            other => Err(Self::unexpected("SCAN", other)),
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    Some(other) => return Err(Self::unexpected("SCAN", other)),
                    None => Vec::new(),
                };
                let next = match parts.pop() {
                    Some(Reply::Bulk(b)) => String::from_utf8(b.to_vec())?.parse::<u64>()?,
                    Some(other) => return Err(Self::unexpected("SCAN", other)),
                    None => 0,
                };
                Ok((next, keys))
            }
            other => Err(Self::unexpected("SCAN", other)),
        }
    }

    /// Runs a Lua script with `EVAL` and returns its reply untouched.
    pub async fn eval<K, A>(
        &mut self,
        script: &str,
        keys: &[K],
        args: &[A],
    ) -> Result<Reply, HarnessError>
    where
        K: AsRef<[u8]>,
        A: AsRef<[u8]>,
    {
        let mut parts = vec![
            Bytes::copy_from_slice(script.as_bytes()),
            Bytes::from(keys.len().to_string()),
        ];
        parts.extend(keys.iter().map(|k| Bytes::copy_from_slice(k.as_ref())));
        parts.extend(args.iter().map(|a| Bytes::copy_from_slice(a.as_ref())));
        self.command("EVAL", parts).await
    }

    /// Sends `QUIT`. The session cannot be used afterwards; a peer that closes
    /// without replying yields `HarnessError::ConnectionClosed`.
    pub async fn quit(&mut self) -> Result<Reply, HarnessError> {
        self.command("QUIT", Vec::<Bytes>::new()).await
    }
}

fn flatten_pairs<I, K, V>(pairs: I) -> Vec<Bytes>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<Bytes>,
    V: Into<Bytes>,
{
    pairs
        .into_iter()
        .flat_map(|(k, v)| [k.into(), v.into()])
        .collect()
}
