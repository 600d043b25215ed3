// tests/scenarios/auth_test.rs

//! Password gating must look the same through the proxy as on Redis itself.

use super::test_helpers::TestContext;
use nutcracker_compat::ErrorClass;
use nutcracker_compat::assertions::{assert_equal, assert_fails_with, assert_fails_with_class};
use nutcracker_compat::client::{AuthState, RedisConnection};
use nutcracker_compat::config::roles;

const UNAUTHENTICATED: &str = "NOAUTH|operation not permitted";
const BAD_PASSWORD: &str = "invalid password";

async fn check_auth_basic(conn: &mut RedisConnection, password: &str) {
    assert_fails_with(UNAUTHENTICATED, conn.ping()).await;
    assert_fails_with(UNAUTHENTICATED, conn.set("k", "v")).await;
    assert_fails_with(UNAUTHENTICATED, conn.get("k")).await;

    assert_fails_with(BAD_PASSWORD, conn.auth("hellopasswd")).await;
    assert_equal(conn.auth_state(), AuthState::Unauthenticated);

    conn.auth(password).await.unwrap();
    assert_equal(conn.auth_state(), AuthState::Authenticated);
    conn.set("k", "v").await.unwrap();
    assert!(conn.ping().await.unwrap());
    assert_equal(conn.get("k").await.unwrap(), Some("v".into()));

    // A later bad AUTH drops the session back to unauthenticated.
    assert_fails_with(BAD_PASSWORD, conn.auth("hellopasswd")).await;
    assert_fails_with(UNAUTHENTICATED, conn.ping()).await;
    assert_fails_with(UNAUTHENTICATED, conn.set("k", "v")).await;
    assert_fails_with(UNAUTHENTICATED, conn.get("k")).await;
}

#[tokio::test]
#[ignore = "requires a running nutcracker deployment"]
async fn test_auth_basic() {
    let ctx = TestContext::new();

    let mut master = ctx.redis(roles::REDIS_MASTER).await;
    check_auth_basic(&mut master, ctx.password()).await;

    let mut proxy = ctx.proxy(true).await;
    check_auth_basic(&mut proxy, ctx.password()).await;
}

#[tokio::test]
#[ignore = "requires a running nutcracker deployment"]
async fn test_nopass_on_proxy() {
    let ctx = TestContext::new();
    let mut conn = ctx.proxy(false).await;

    assert!(conn.ping().await.unwrap());
    let err = assert_fails_with(
        "Client sent AUTH, but no password is set",
        conn.auth(ctx.password()),
    )
    .await;
    assert_equal(err.class(), ErrorClass::AuthNotConfigured);
}

#[tokio::test]
#[ignore = "requires a running nutcracker deployment"]
async fn test_badpass_on_proxy() {
    let ctx = TestContext::new();
    let mut conn = ctx.proxy(true).await;

    assert_fails_with_class(ErrorClass::NotAuthenticated, conn.ping()).await;
    assert_fails_with_class(ErrorClass::InvalidCredential, conn.auth("badpasswd")).await;
    assert_fails_with_class(ErrorClass::NotAuthenticated, conn.get("k")).await;
}
