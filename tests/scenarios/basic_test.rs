// tests/scenarios/basic_test.rs

//! Everyday commands through the sharded proxy pool.

use super::fixtures::{LARGE_BINARY_SIZE, MIXED_ARRAY_SCRIPT, random_bytes, slow_request_fields};
use super::test_helpers::TestContext;
use bytes::Bytes;
use indexmap::IndexMap;
use nutcracker_compat::assertions::{
    assert_equal, assert_fails_with, assert_mapping_eq, assert_succeeds_with,
};
use nutcracker_compat::{Pipeline, Reply};

#[tokio::test]
#[ignore = "requires a running nutcracker deployment"]
async fn test_setget() {
    let ctx = TestContext::new();
    let mut conn = ctx.proxy(false).await;

    conn.set("k", "v").await.unwrap();
    assert_equal(conn.get("k").await.unwrap(), Some(Bytes::from("v")));
}

#[tokio::test]
#[ignore = "requires a running nutcracker deployment"]
async fn test_null_key() {
    let ctx = TestContext::new();
    let mut conn = ctx.proxy(false).await;

    conn.set("", "v").await.unwrap();
    assert_equal(conn.get("").await.unwrap(), Some(Bytes::from("v")));

    conn.set("", "").await.unwrap();
    assert_equal(conn.get("").await.unwrap(), Some(Bytes::new()));

    conn.mset([("", "val"), ("k", "v")]).await.unwrap();
    assert_equal(conn.get("").await.unwrap(), Some(Bytes::from("val")));
    assert_equal(conn.get("k").await.unwrap(), Some(Bytes::from("v")));
}

#[tokio::test]
#[ignore = "requires a running nutcracker deployment"]
async fn test_ping_quit() {
    let ctx = TestContext::new();
    let mut conn = ctx.proxy(false).await;

    assert!(conn.ping().await.unwrap());
    conn.set("k", "v").await.unwrap();
    assert_equal(conn.get("k").await.unwrap(), Some(Bytes::from("v")));

    assert_fails_with("Socket closed|Connection closed", conn.quit()).await;
}

#[tokio::test]
#[ignore = "requires a running nutcracker deployment"]
async fn test_slow_req() {
    let ctx = TestContext::new();
    let mut conn = ctx.proxy(false).await;

    let mut pipe = Pipeline::new();
    pipe.set("key-1", "v1")
        .get("key-1")
        .hmset("xxx", slow_request_fields())
        .get("key-2")
        .get("key-3");

    assert_fails_with("timed out", pipe.execute(&mut conn)).await;
}

#[tokio::test]
#[ignore = "requires a running nutcracker deployment"]
async fn test_eval_returns_mixed_array() {
    let ctx = TestContext::new();
    let mut conn = ctx.proxy(false).await;

    assert_succeeds_with(
        conn.eval(MIXED_ARRAY_SCRIPT, &["tmp"], &[] as &[&str]).await,
        Reply::Array(vec![Reply::Integer(1), Reply::ok()]),
    );
}

/// Values larger than memcached's item limit, mixed with empty ones, come
/// back intact through MSET and MGET.
#[tokio::test]
#[ignore = "requires a running nutcracker deployment"]
async fn test_mget_binary_value() {
    let ctx = TestContext::new();
    let mut conn = ctx.proxy(false).await;

    let mut kv: IndexMap<String, Bytes> = (0..5)
        .map(|i| (format!("kkk-{i}"), random_bytes(LARGE_BINARY_SIZE)))
        .collect();
    kv.extend((0..5).map(|i| (format!("kkk2-{i}"), Bytes::new())));
    let keys: Vec<String> = kv.keys().cloned().collect();

    conn.del(keys.iter().map(|k| Bytes::from(k.clone()))).await.unwrap();
    conn.mset(kv.iter().map(|(k, v)| (Bytes::from(k.clone()), v.clone())))
        .await
        .unwrap();
    assert_mapping_eq(&conn.mget_map(&keys).await.unwrap(), &kv);

    conn.del(keys.iter().map(|k| Bytes::from(k.clone()))).await.unwrap();
    assert_mapping_eq(&conn.mget_map(&keys).await.unwrap(), &IndexMap::new());
}
