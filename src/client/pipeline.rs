// src/client/pipeline.rs

//! A queue of Redis commands flushed to the server in one write.

use super::redis::RedisConnection;
use crate::core::protocol::Command;
use crate::core::{HarnessError, Reply};
use bytes::Bytes;

/// Commands queued for a single round trip. Nothing is sent until
/// [`Pipeline::execute`] is called.
#[derive(Debug, Default, Clone)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Queues an arbitrary command.
    pub fn cmd<I, A>(&mut self, name: &str, args: I) -> &mut Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        self.commands.push(Command::new(name, args));
        self
    }

    pub fn set(&mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> &mut Self {
        self.cmd("SET", [key.into(), value.into()])
    }

    pub fn get(&mut self, key: impl Into<Bytes>) -> &mut Self {
        self.cmd("GET", [key.into()])
    }

    pub fn hmset<I, F, V>(&mut self, key: impl Into<Bytes>, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<Bytes>,
        V: Into<Bytes>,
    {
        let mut args = vec![key.into()];
        for (field, value) in fields {
            args.push(field.into());
            args.push(value.into());
        }
        self.cmd("HMSET", args)
    }

    pub(crate) fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    /// Sends every queued command on `conn` and returns the replies in order.
    /// See [`RedisConnection::execute_pipeline`] for the failure contract.
    pub async fn execute(
        self,
        conn: &mut RedisConnection,
    ) -> Result<Vec<Result<Reply, HarnessError>>, HarnessError> {
        conn.execute_pipeline(self).await
    }
}
