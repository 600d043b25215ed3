// src/config.rs

//! Endpoint tables: which host and port serves each logical role, plus the
//! shared credential. Loaded once and passed around as an immutable value.

use crate::core::HarnessError;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Names of the roles every endpoint table must define.
pub mod roles {
    /// The proxy pool in front of the Redis master/slave pair.
    pub const PROXY_MASTER_SLAVE: &str = "redis-ms";
    /// The proxy pool sharding over the Redis shards.
    pub const PROXY_SHARDS: &str = "redis-shards";
    /// The proxy pool sharding over the memcached shards.
    pub const PROXY_MEMCACHE: &str = "mc-shards";

    pub const REDIS_MASTER: &str = "redis-master";
    pub const REDIS_SLAVE: &str = "redis-slave";
    pub const REDIS_SHARD1: &str = "redis-shard1";
    pub const REDIS_SHARD2: &str = "redis-shard2";
    pub const REDIS_SHARD3: &str = "redis-shard3";

    pub const MEMCACHE_SHARD1: &str = "mc-shard1";
    pub const MEMCACHE_SHARD2: &str = "mc-shard2";

    pub const NUTCRACKER: &[&str] = &[PROXY_MASTER_SLAVE, PROXY_SHARDS, PROXY_MEMCACHE];
    pub const REDIS: &[&str] = &[
        REDIS_MASTER,
        REDIS_SLAVE,
        REDIS_SHARD1,
        REDIS_SHARD2,
        REDIS_SHARD3,
    ];
    pub const MEMCACHE: &[&str] = &[MEMCACHE_SHARD1, MEMCACHE_SHARD2];
}

/// Environment variable pointing at a TOML endpoint table.
pub const CONFIG_PATH_ENV: &str = "NC_TEST_CONFIG";
/// Environment variable naming a built-in profile (`local` or `ci`).
pub const PROFILE_ENV: &str = "NC_TEST_PROFILE";
/// Environment variable bounding the size of generated test data.
pub const LARGE_ENV: &str = "T_LARGE";

const DEFAULT_PASSWORD: &str = "foobared";
const DEFAULT_LARGE: usize = 1000;

/// A host and port pair, as written in the endpoint tables.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

/// A resolved endpoint: the role it serves and where to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub role: String,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// `host:port`, suitable for `TcpStream::connect`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.role, self.host, self.port)
    }
}

/// The built-in endpoint tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    /// Everything on 127.0.0.1, on the ports the local start scripts use.
    #[default]
    Local,
    /// Container hostnames, as wired by the CI compose file.
    Ci,
}

impl FromStr for Profile {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "dev" => Ok(Profile::Local),
            "ci" | "docker" => Ok(Profile::Ci),
            other => Err(HarnessError::Config(format!(
                "unknown profile '{other}', expected 'local' or 'ci'"
            ))),
        }
    }
}

/// A raw representation of the config file before validation.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_password")]
    password: String,
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    connect_timeout: Duration,
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    command_timeout: Duration,
    #[serde(default)]
    nutcracker: BTreeMap<String, Address>,
    #[serde(default)]
    redis: BTreeMap<String, Address>,
    #[serde(default)]
    memcache: BTreeMap<String, Address>,
}

fn default_password() -> String {
    DEFAULT_PASSWORD.to_string()
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(2)
}
fn default_command_timeout() -> Duration {
    Duration::from_secs(5)
}

/// The validated endpoint table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The credential shared by the proxy pools and the stores that require one.
    pub password: String,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// The fixed client-side window for a command or a whole pipeline.
    #[serde(with = "humantime_serde")]
    pub command_timeout: Duration,
    pub nutcracker: BTreeMap<String, Address>,
    pub redis: BTreeMap<String, Address>,
    pub memcache: BTreeMap<String, Address>,
}

impl Default for Config {
    fn default() -> Self {
        Self::local()
    }
}

impl Config {
    /// The table used when the proxy and the stores run on this machine.
    pub fn local() -> Self {
        Self::with_tables(
            [
                (roles::PROXY_MASTER_SLAVE, Address::new("127.0.0.1", 32121)),
                (roles::PROXY_SHARDS, Address::new("127.0.0.1", 32122)),
                (roles::PROXY_MEMCACHE, Address::new("127.0.0.1", 32123)),
            ],
            [
                (roles::REDIS_MASTER, Address::new("127.0.0.1", 2100)),
                (roles::REDIS_SLAVE, Address::new("127.0.0.1", 2101)),
                (roles::REDIS_SHARD1, Address::new("127.0.0.1", 3100)),
                (roles::REDIS_SHARD2, Address::new("127.0.0.1", 3101)),
                (roles::REDIS_SHARD3, Address::new("127.0.0.1", 3102)),
            ],
            [
                (roles::MEMCACHE_SHARD1, Address::new("127.0.0.1", 8100)),
                (roles::MEMCACHE_SHARD2, Address::new("127.0.0.1", 8101)),
            ],
        )
    }

    /// The table used inside the CI containers.
    pub fn ci() -> Self {
        Self::with_tables(
            [
                (roles::PROXY_MASTER_SLAVE, Address::new("twemproxy", 32121)),
                (roles::PROXY_SHARDS, Address::new("twemproxy", 32122)),
                (roles::PROXY_MEMCACHE, Address::new("twemproxy", 32123)),
            ],
            [
                (roles::REDIS_MASTER, Address::new("redis_master", 6379)),
                (roles::REDIS_SLAVE, Address::new("redis_slave", 6379)),
                (roles::REDIS_SHARD1, Address::new("redis_shard1", 6379)),
                (roles::REDIS_SHARD2, Address::new("redis_shard2", 6379)),
                (roles::REDIS_SHARD3, Address::new("redis_shard3", 6379)),
            ],
            [
                (roles::MEMCACHE_SHARD1, Address::new("mc_shard1", 11211)),
                (roles::MEMCACHE_SHARD2, Address::new("mc_shard2", 11211)),
            ],
        )
    }

    pub fn for_profile(profile: Profile) -> Self {
        match profile {
            Profile::Local => Self::local(),
            Profile::Ci => Self::ci(),
        }
    }

    fn with_tables<const N: usize, const R: usize, const M: usize>(
        nutcracker: [(&str, Address); N],
        redis: [(&str, Address); R],
        memcache: [(&str, Address); M],
    ) -> Self {
        fn table(entries: &[(&str, Address)]) -> BTreeMap<String, Address> {
            entries
                .iter()
                .map(|(role, addr)| (role.to_string(), addr.clone()))
                .collect()
        }
        Self {
            password: default_password(),
            connect_timeout: default_connect_timeout(),
            command_timeout: default_command_timeout(),
            nutcracker: table(&nutcracker),
            redis: table(&redis),
            memcache: table(&memcache),
        }
    }

    /// Reads and validates an endpoint table from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file '{path}'"))
    }

    /// Parses and validates an endpoint table from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(contents).context("Failed to parse TOML")?;
        let config = Config {
            password: raw.password,
            connect_timeout: raw.connect_timeout,
            command_timeout: raw.command_timeout,
            nutcracker: raw.nutcracker,
            redis: raw.redis,
            memcache: raw.memcache,
        };
        config.validate()?;
        Ok(config)
    }

    /// Selects the active table from the process environment.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Selects the active table using `lookup` in place of the environment.
    ///
    /// An explicit file wins over a profile name; with neither set the local
    /// table is used.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(path) = lookup(CONFIG_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            info!("Loading endpoint table from {path}");
            return Self::from_file(&path);
        }
        let profile = match lookup(PROFILE_ENV) {
            Some(name) => name.parse::<Profile>()?,
            None => Profile::default(),
        };
        info!("Using built-in {profile:?} endpoint table");
        Ok(Self::for_profile(profile))
    }

    /// Looks up the endpoint serving `role`.
    pub fn resolve(&self, role: &str) -> Result<Endpoint, HarnessError> {
        self.address(role)
            .map(|addr| Endpoint {
                role: role.to_string(),
                host: addr.host.clone(),
                port: addr.port,
            })
            .ok_or_else(|| HarnessError::Config(format!("unknown role '{role}'")))
    }

    fn address(&self, role: &str) -> Option<&Address> {
        self.nutcracker
            .get(role)
            .or_else(|| self.redis.get(role))
            .or_else(|| self.memcache.get(role))
    }

    /// Every role name the table defines, proxy pools first.
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.nutcracker
            .keys()
            .chain(self.redis.keys())
            .chain(self.memcache.keys())
            .map(String::as_str)
    }

    /// True if `role` names one of the memcached endpoints or the memcached proxy pool.
    pub fn is_memcache_role(&self, role: &str) -> bool {
        self.memcache.contains_key(role) || role == roles::PROXY_MEMCACHE
    }

    fn validate(&self) -> Result<()> {
        if self.command_timeout.is_zero() {
            return Err(anyhow!("command_timeout cannot be 0"));
        }
        if self.connect_timeout.is_zero() {
            return Err(anyhow!("connect_timeout cannot be 0"));
        }

        let groups = [
            ("nutcracker", &self.nutcracker, roles::NUTCRACKER),
            ("redis", &self.redis, roles::REDIS),
            ("memcache", &self.memcache, roles::MEMCACHE),
        ];
        let mut seen = std::collections::BTreeSet::new();
        for (group, table, required) in groups {
            for role in required {
                if !table.contains_key(*role) {
                    return Err(anyhow!("{group}.{role} is missing"));
                }
            }
            for (role, addr) in table {
                if addr.host.trim().is_empty() {
                    return Err(anyhow!("{group}.{role}.host cannot be empty"));
                }
                if addr.port == 0 {
                    return Err(anyhow!("{group}.{role}.port cannot be 0"));
                }
                if !seen.insert(role.as_str()) {
                    return Err(anyhow!("role '{role}' is defined more than once"));
                }
            }
        }
        Ok(())
    }
}

/// Bounds on generated test data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Upper bound for the large-payload scenarios.
    pub large: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            large: DEFAULT_LARGE,
        }
    }
}

impl Limits {
    pub fn from_env() -> Result<Self, HarnessError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, HarnessError> {
        match lookup(LARGE_ENV) {
            None => Ok(Self::default()),
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map(|large| Self { large })
                .map_err(|e| HarnessError::Config(format!("{LARGE_ENV}={raw:?} is invalid: {e}"))),
        }
    }
}
