// tests/harness/mock_server.rs

//! In-process stand-ins for the proxy and the stores.
//!
//! `MockRedis` follows the behaviour the live suite asserts on: password
//! gating with non-sticky AUTH, read-only replicas, shard-mode rejection of
//! multi-key commands, QUIT closing without a reply, and a stall on oversized
//! HMSET. `MockMemcache` is a tiny in-memory memcached.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use nutcracker_compat::config::{Address, Config};
use nutcracker_compat::core::HarnessError;
use nutcracker_compat::core::protocol::{RespFrame, RespFrameCodec};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, Encoder, Framed};

/// HMSET calls with more fields than this make the mock stop answering.
pub const STALL_FIELDS: usize = 1_000;

pub type Store = Arc<Mutex<HashMap<Bytes, Bytes>>>;

#[derive(Debug, Clone, Default)]
pub struct MockRedisOptions {
    pub password: Option<String>,
    pub shard_mode: bool,
    pub read_only: bool,
}

pub struct MockServer {
    pub addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl MockServer {
    /// An endpoint table where `roles` all point at this server and command
    /// timeouts are short enough for tests.
    pub fn config_for(&self, roles: &[&str]) -> Config {
        let mut config = Config::local();
        config.command_timeout = Duration::from_millis(400);
        config.connect_timeout = Duration::from_millis(400);
        let addr = Address {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
        };
        for role in roles {
            for table in [
                &mut config.nutcracker,
                &mut config.redis,
                &mut config.memcache,
            ] {
                if let Some(entry) = table.get_mut(*role) {
                    *entry = addr.clone();
                }
            }
        }
        config
    }
}

enum Action {
    Reply(RespFrame),
    Silent,
    Close,
}

fn error(message: &str) -> Action {
    Action::Reply(RespFrame::Error(message.to_string()))
}

struct Session {
    options: Arc<MockRedisOptions>,
    store: Store,
    authed: bool,
    stalled: bool,
}

impl Session {
    fn handle(&mut self, args: Vec<Bytes>) -> Action {
        if self.stalled {
            return Action::Silent;
        }
        let Some(name) = args.first() else {
            return error("ERR empty command");
        };
        let name = String::from_utf8_lossy(name).to_ascii_uppercase();
        let args = &args[1..];

        if name == "AUTH" {
            return match (&self.options.password, args.first()) {
                (None, _) => error("ERR Client sent AUTH, but no password is set"),
                (Some(expected), Some(given)) if given.as_ref() == expected.as_bytes() => {
                    self.authed = true;
                    Action::Reply(RespFrame::SimpleString("OK".into()))
                }
                _ => {
                    self.authed = false;
                    error("ERR invalid password")
                }
            };
        }
        if self.options.password.is_some() && !self.authed {
            return error("NOAUTH Authentication required.");
        }
        if self.options.shard_mode
            && matches!(
                name.as_str(),
                "RENAME" | "RENAMENX" | "MSETNX" | "BITOP" | "SCAN"
            )
        {
            return error(&format!("ERR unknown command '{name}'"));
        }
        let is_write = matches!(
            name.as_str(),
            "SET" | "MSET" | "MSETNX" | "DEL" | "INCR" | "RENAME" | "RENAMENX" | "HMSET"
        );
        if self.options.read_only && is_write {
            return error("READONLY You can't write against a read only slave.");
        }

        let mut store = self.store.lock().unwrap();
        match name.as_str() {
            "PING" => Action::Reply(RespFrame::SimpleString("PONG".into())),
            "QUIT" => Action::Close,
            "MGET" => Action::Reply(RespFrame::Array(
                args.iter()
                    .map(|k| store.get(k).cloned().map_or(RespFrame::Null, RespFrame::BulkString))
                    .collect(),
            )),
            "GET" => Action::Reply(
                store
                    .get(&args[0])
                    .cloned()
                    .map(RespFrame::BulkString)
                    .unwrap_or(RespFrame::Null),
            ),
            "SET" => {
                store.insert(args[0].clone(), args[1].clone());
                Action::Reply(RespFrame::SimpleString("OK".into()))
            }
            "MSET" => {
                for pair in args.chunks(2) {
                    store.insert(pair[0].clone(), pair[1].clone());
                }
                Action::Reply(RespFrame::SimpleString("OK".into()))
            }
            "DEL" => {
                let removed = args.iter().filter(|k| store.remove(*k).is_some()).count();
                Action::Reply(RespFrame::Integer(removed as i64))
            }
            "INCR" => {
                let current = store
                    .get(&args[0])
                    .map(|v| String::from_utf8_lossy(v).parse::<i64>().unwrap_or(0))
                    .unwrap_or(0);
                store.insert(args[0].clone(), Bytes::from((current + 1).to_string()));
                Action::Reply(RespFrame::Integer(current + 1))
            }
            "RENAME" => match store.remove(&args[0]) {
                Some(v) => {
                    store.insert(args[1].clone(), v);
                    Action::Reply(RespFrame::SimpleString("OK".into()))
                }
                None => error("ERR no such key"),
            },
            "HMSET" if (args.len() - 1) / 2 > STALL_FIELDS => {
                self.stalled = true;
                Action::Silent
            }
            "HMSET" => Action::Reply(RespFrame::SimpleString("OK".into())),
            "EVAL" => Action::Reply(RespFrame::Array(vec![
                RespFrame::Integer(1),
                RespFrame::SimpleString("OK".into()),
            ])),
            other => error(&format!("ERR unknown command '{other}'")),
        }
    }
}

fn command_args(frame: RespFrame) -> Vec<Bytes> {
    match frame {
        RespFrame::Array(parts) => parts
            .into_iter()
            .filter_map(|p| match p {
                RespFrame::BulkString(b) => Some(b),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Reads commands with the client's decoder and writes replies itself.
#[derive(Default)]
struct RedisServerCodec {
    commands: RespFrameCodec,
}

impl Decoder for RedisServerCodec {
    type Item = RespFrame;
    type Error = HarnessError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.commands.decode(src)
    }
}

impl Encoder<RespFrame> for RedisServerCodec {
    type Error = HarnessError;

    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        write_reply(&item, dst);
        Ok(())
    }
}

fn write_reply(frame: &RespFrame, dst: &mut BytesMut) {
    match frame {
        RespFrame::SimpleString(s) => dst.put_slice(format!("+{s}\r\n").as_bytes()),
        RespFrame::Error(s) => dst.put_slice(format!("-{s}\r\n").as_bytes()),
        RespFrame::Integer(n) => dst.put_slice(format!(":{n}\r\n").as_bytes()),
        RespFrame::BulkString(b) => {
            dst.put_slice(format!("${}\r\n", b.len()).as_bytes());
            dst.put_slice(b);
            dst.put_slice(b"\r\n");
        }
        RespFrame::Null => dst.put_slice(b"$-1\r\n"),
        RespFrame::NullArray => dst.put_slice(b"*-1\r\n"),
        RespFrame::Array(items) => {
            dst.put_slice(format!("*{}\r\n", items.len()).as_bytes());
            for item in items {
                write_reply(item, dst);
            }
        }
    }
}

pub struct MockRedis;

impl MockRedis {
    pub async fn start(options: MockRedisOptions) -> MockServer {
        Self::start_with_store(options, Store::default()).await
    }

    /// Starts a server sharing `store` with others, e.g. a master and its replica.
    pub async fn start_with_store(options: MockRedisOptions, store: Store) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let options = Arc::new(options);

        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let mut session = Session {
                    options: options.clone(),
                    store: store.clone(),
                    authed: false,
                    stalled: false,
                };
                tokio::spawn(async move {
                    let mut framed = Framed::new(socket, RedisServerCodec::default());
                    while let Some(Ok(frame)) = framed.next().await {
                        match session.handle(command_args(frame)) {
                            Action::Reply(reply) => {
                                if framed.send(reply).await.is_err() {
                                    break;
                                }
                            }
                            Action::Silent => {}
                            Action::Close => break,
                        }
                    }
                });
            }
        });

        MockServer { addr, handle }
    }

    pub fn shared_store() -> Store {
        Store::default()
    }
}

/// Server side of the memcached text protocol, just enough for the client.
#[derive(Default)]
struct MemcacheServerCodec;

impl Decoder for MemcacheServerCodec {
    type Item = Vec<String>;
    type Error = HarnessError;

    /// Yields the command words; for `set` the data block is appended as the
    /// last element.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(pos) = src.windows(2).position(|w| w == b"\r\n") else {
            return Ok(None);
        };
        let line = String::from_utf8_lossy(&src[..pos]).to_string();
        let mut words: Vec<String> = line.split_ascii_whitespace().map(str::to_string).collect();

        if words.first().map(String::as_str) == Some("set") {
            let len: usize = words[4].parse().unwrap();
            if src.len() < pos + 2 + len + 2 {
                return Ok(None);
            }
            let data = String::from_utf8_lossy(&src[pos + 2..pos + 2 + len]).to_string();
            words.push(data);
            src.advance(pos + 2 + len + 2);
        } else {
            src.advance(pos + 2);
        }
        Ok(Some(words))
    }
}

impl Encoder<Bytes> for MemcacheServerCodec {
    type Error = HarnessError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

pub struct MockMemcache;

impl MockMemcache {
    pub async fn start() -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store: Arc<Mutex<HashMap<String, String>>> = Arc::default();

        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let store = store.clone();
                tokio::spawn(async move {
                    let mut framed = Framed::new(socket, MemcacheServerCodec);
                    while let Some(Ok(words)) = framed.next().await {
                        let reply = Self::handle(&store, words);
                        if framed.send(Bytes::from(reply)).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        MockServer { addr, handle }
    }

    fn handle(store: &Mutex<HashMap<String, String>>, words: Vec<String>) -> String {
        let mut store = store.lock().unwrap();
        match words.first().map(String::as_str) {
            Some(cmd @ ("get" | "gets")) => {
                let mut out = String::new();
                for key in &words[1..] {
                    if let Some(value) = store.get(key) {
                        let cas = if cmd == "gets" { " 1" } else { "" };
                        out.push_str(&format!("VALUE {key} 0 {}{cas}\r\n", value.len()));
                        out.push_str(&format!("{value}\r\n"));
                    }
                }
                out.push_str("END\r\n");
                out
            }
            Some("set") => {
                store.insert(words[1].clone(), words[5].clone());
                "STORED\r\n".to_string()
            }
            Some("incr") => match store.get(&words[1]).map(|v| v.parse::<u64>()) {
                Some(Ok(n)) => {
                    let next = n + words[2].parse::<u64>().unwrap();
                    store.insert(words[1].clone(), next.to_string());
                    format!("{next}\r\n")
                }
                Some(Err(_)) => {
                    "CLIENT_ERROR cannot increment or decrement non-numeric value\r\n".to_string()
                }
                None => "NOT_FOUND\r\n".to_string(),
            },
            Some("delete") => match store.remove(&words[1]) {
                Some(_) => "DELETED\r\n".to_string(),
                None => "NOT_FOUND\r\n".to_string(),
            },
            _ => "ERROR\r\n".to_string(),
        }
    }
}
