// src/client/memcache.rs

//! A memcached text-protocol session bound to one endpoint.

use super::transport::Transport;
use crate::config::Endpoint;
use crate::core::HarnessError;
use crate::core::protocol::memcache::MemcacheValue;
use crate::core::protocol::{MemcacheCodec, MemcacheRequest, MemcacheResponse};
use bytes::Bytes;
use indexmap::IndexMap;
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub struct MemcacheConnection {
    transport: Transport<MemcacheCodec>,
}

impl MemcacheConnection {
    pub async fn connect(
        endpoint: Endpoint,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> Result<Self, HarnessError> {
        let codec = MemcacheCodec::new();
        let transport =
            Transport::connect(endpoint, codec, connect_timeout, command_timeout).await?;
        Ok(Self { transport })
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.transport.endpoint()
    }

    /// Sends `requests` in one write and returns one response per request.
    /// Error responses are turned into classified `HarnessError::Server`s.
    async fn exchange(
        &mut self,
        requests: Vec<MemcacheRequest>,
    ) -> Result<Vec<MemcacheResponse>, HarnessError> {
        let operation = match requests.as_slice() {
            [single] => single.name().to_string(),
            many => format!("{} batched requests", many.len()),
        };
        let responses = self.transport.round_trip(requests, &operation).await?;
        for response in &responses {
            if let Some(message) = response.error_message() {
                return Err(HarnessError::server(message));
            }
        }
        debug!("{} <- {operation}: ok", self.endpoint());
        Ok(responses)
    }

    async fn request(
        &mut self,
        request: MemcacheRequest,
    ) -> Result<MemcacheResponse, HarnessError> {
        let name = request.name();
        self.exchange(vec![request])
            .await?
            .pop()
            .ok_or_else(|| HarnessError::Protocol(format!("no response to {name}")))
    }

    fn unexpected(name: &str, response: MemcacheResponse) -> HarnessError {
        HarnessError::Protocol(format!("unexpected response to {name}: {response:?}"))
    }

    pub async fn get(&mut self, key: &str) -> Result<Option<Bytes>, HarnessError> {
        let mut found = self.retrieve(&[key], false).await?;
        Ok(found.shift_remove(key))
    }

    /// Stores `value` under `key`. True when the server answered `STORED`.
    pub async fn set(&mut self, key: &str, value: impl Into<Bytes>) -> Result<bool, HarnessError> {
        match self.request(set_request(key, value.into())).await? {
            MemcacheResponse::Stored => Ok(true),
            MemcacheResponse::NotStored => Ok(false),
            other => Err(Self::unexpected("set", other)),
        }
    }

    /// Increments a counter. `None` when the key does not exist.
    pub async fn incr(&mut self, key: &str, delta: u64) -> Result<Option<u64>, HarnessError> {
        let request = MemcacheRequest::Incr {
            key: key.to_string(),
            delta,
        };
        match self.request(request).await? {
            MemcacheResponse::Number(n) => Ok(Some(n)),
            MemcacheResponse::NotFound => Ok(None),
            other => Err(Self::unexpected("incr", other)),
        }
    }

    /// Deletes `key`. True when it existed.
    pub async fn delete(&mut self, key: &str) -> Result<bool, HarnessError> {
        let request = MemcacheRequest::Delete {
            key: key.to_string(),
        };
        match self.request(request).await? {
            MemcacheResponse::Deleted => Ok(true),
            MemcacheResponse::NotFound => Ok(false),
            other => Err(Self::unexpected("delete", other)),
        }
    }

    /// Fetches `keys` in one request. Keys the server does not hold are simply
    /// absent from the result; they never appear with an empty value.
    pub async fn get_multi<K: AsRef<str>>(
        &mut self,
        keys: &[K],
    ) -> Result<IndexMap<String, Bytes>, HarnessError> {
        self.retrieve(keys, false).await
    }

    /// Same as [`get_multi`](Self::get_multi) but through `gets`; the CAS
    /// tokens are dropped.
    pub async fn gets_multi<K: AsRef<str>>(
        &mut self,
        keys: &[K],
    ) -> Result<IndexMap<String, Bytes>, HarnessError> {
        self.retrieve(keys, true).await
    }

    async fn retrieve<K: AsRef<str>>(
        &mut self,
        keys: &[K],
        with_cas: bool,
    ) -> Result<IndexMap<String, Bytes>, HarnessError> {
        if keys.is_empty() {
            return Ok(IndexMap::new());
        }
        let request = MemcacheRequest::Get {
            keys: keys.iter().map(|k| k.as_ref().to_string()).collect(),
            with_cas,
        };
        let name = request.name();
        match self.request(request).await? {
            MemcacheResponse::Values(values) => Ok(values
                .into_iter()
                .map(|MemcacheValue { key, data, .. }| (key, data))
                .collect()),
            other => Err(Self::unexpected(name, other)),
        }
    }

    /// Stores every item with one batched write. True when all were `STORED`.
    pub async fn set_multi<I, K, V>(&mut self, items: I) -> Result<bool, HarnessError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Bytes>,
    {
        let requests: Vec<_> = items
            .into_iter()
            .map(|(k, v)| set_request(k.as_ref(), v.into()))
            .collect();
        if requests.is_empty() {
            return Ok(true);
        }
        let responses = self.exchange(requests).await?;
        Ok(responses
            .iter()
            .all(|r| matches!(r, MemcacheResponse::Stored)))
    }

    /// Deletes every key with one batched write and returns how many existed.
    pub async fn delete_multi<K: AsRef<str>>(&mut self, keys: &[K]) -> Result<usize, HarnessError> {
        let requests: Vec<_> = keys
            .iter()
            .map(|k| MemcacheRequest::Delete {
                key: k.as_ref().to_string(),
            })
            .collect();
        if requests.is_empty() {
            return Ok(0);
        }
        let responses = self.exchange(requests).await?;
        Ok(responses
            .iter()
            .filter(|r| matches!(r, MemcacheResponse::Deleted))
            .count())
    }
}

fn set_request(key: &str, data: Bytes) -> MemcacheRequest {
    MemcacheRequest::Set {
        key: key.to_string(),
        flags: 0,
        exptime: 0,
        data,
    }
}
