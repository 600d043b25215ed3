// src/connection/mod.rs

//! Hands out fresh client sessions by role name. No pooling and no retry:
//! every call opens a new TCP connection that the caller owns exclusively.

use crate::client::{MemcacheConnection, RedisConnection};
use crate::config::{Config, roles};
use crate::core::HarnessError;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ConnectionFactory {
    config: Arc<Config>,
}

impl ConnectionFactory {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The credential shared by the proxy pools and the stores.
    pub fn password(&self) -> &str {
        &self.config.password
    }

    /// Opens a RESP session to the endpoint serving `role`.
    pub async fn redis(&self, role: &str) -> Result<RedisConnection, HarnessError> {
        if self.config.is_memcache_role(role) {
            return Err(HarnessError::Config(format!(
                "role '{role}' speaks the memcached protocol"
            )));
        }
        let endpoint = self.config.resolve(role)?;
        debug!("Opening RESP session to {endpoint}");
        RedisConnection::connect(
            endpoint,
            self.config.connect_timeout,
            self.config.command_timeout,
        )
        .await
    }

    /// Opens a RESP session and authenticates it with the shared credential.
    pub async fn authenticated_redis(&self, role: &str) -> Result<RedisConnection, HarnessError> {
        let mut conn = self.redis(role).await?;
        conn.auth(&self.config.password).await?;
        Ok(conn)
    }

    /// The proxy pool in front of the master/slave pair when `master_slave`
    /// is set, otherwise the pool sharding over the Redis shards.
    pub async fn proxy(&self, master_slave: bool) -> Result<RedisConnection, HarnessError> {
        if master_slave {
            self.redis(roles::PROXY_MASTER_SLAVE).await
        } else {
            self.redis(roles::PROXY_SHARDS).await
        }
    }

    /// Opens a memcached session to the endpoint serving `role`.
    pub async fn memcache(&self, role: &str) -> Result<MemcacheConnection, HarnessError> {
        if !self.config.is_memcache_role(role) {
            return Err(HarnessError::Config(format!(
                "role '{role}' does not speak the memcached protocol"
            )));
        }
        let endpoint = self.config.resolve(role)?;
        debug!("Opening memcached session to {endpoint}");
        MemcacheConnection::connect(
            endpoint,
            self.config.connect_timeout,
            self.config.command_timeout,
        )
        .await
    }
}
