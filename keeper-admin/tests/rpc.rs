use std::time::{Duration, Instant};

use serde_json::json;

use keeper_admin::{config, AdminApp};
use keeper_auth::{TokenStatus, TokenStore};
use keeper_core::{ErrorKind, KeeperConfig, SharedConfig};
use keeper_admin::repositories::{AuditRepository, RoleRepository, UserRepository};

fn app(max_in_flight: &str, delay_seconds: &str) -> AdminApp {
    let mut base = KeeperConfig::new();
    base.set("login.max_in_flight", max_in_flight);
    base.set("login.delay_seconds", delay_seconds);
    base.set("auth.hash_cost", "4");
    config::apply_defaults(&mut base);
    AdminApp::in_memory(SharedConfig::new(base))
}

#[tokio::test]
async fn test_login_and_logout_over_rpc() {
    let app = app("5", "0");
    let user = app.create_user("admin", "s3cret", &["admin"]).await.unwrap();

    let response = app
        .router
        .call("auth/login", json!({ "username": "admin", "password": "s3cret" }))
        .await
        .unwrap();
    assert_eq!(response["user_id"], json!(user.id));
    let token = response["token"].as_str().unwrap().to_string();
    assert!(app.sessions.get(&token).is_some());

    let out = app.router.call("auth/logout", json!({ "token": token })).await.unwrap();
    assert_eq!(out, json!({ "ok": true }));
    assert_eq!(
        app.tokens.get(&token).await.unwrap().unwrap().status,
        TokenStatus::Revoked
    );
}

#[tokio::test]
async fn test_wrong_password_is_not_authenticated() {
    let app = app("5", "0");
    app.create_user("admin", "s3cret", &[]).await.unwrap();

    let err = app
        .router
        .call("auth/login", json!({ "username": "admin", "password": "guess" }))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotAuthenticated);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exhausted_login_is_distinct_and_fast() {
    let app = std::sync::Arc::new(app("1", "1"));
    app.create_user("admin", "s3cret", &[]).await.unwrap();

    let slow = {
        let app = app.clone();
        tokio::spawn(async move {
            app.router
                .call("auth/login", json!({ "username": "admin", "password": "guess" }))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    let err = app
        .router
        .call("auth/login", json!({ "username": "admin", "password": "guess" }))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::TooManyRequests);
    assert!(started.elapsed() < Duration::from_secs(1));

    let slow = slow.await.unwrap().unwrap_err();
    assert_eq!(slow.kind, ErrorKind::NotAuthenticated);
}

#[tokio::test]
async fn test_block_user_over_rpc() {
    let app = app("5", "0");
    let user = app.create_user("operator", "s3cret", &["operator"]).await.unwrap();
    let login = app
        .router
        .call("auth/login", json!({ "username": "operator", "password": "s3cret" }))
        .await
        .unwrap();
    let token = login["token"].as_str().unwrap().to_string();

    let out = app
        .router
        .call("user/block_user", json!({ "user_id": user.id, "reason": "left the company" }))
        .await
        .unwrap();
    assert_eq!(out["blocked"], json!(true));

    assert!(app.users.get(&user.id).await.unwrap().unwrap().blocked);
    assert!(app.roles.roles_for(&user.id).await.unwrap().is_empty());
    assert_eq!(
        app.tokens.get(&token).await.unwrap().unwrap().status,
        TokenStatus::Revoked
    );
    let audit = app.audit.list().await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].detail, "left the company");

    // Second block is a no-op
    let again = app
        .router
        .call("user/block_user", json!({ "user_id": user.id }))
        .await
        .unwrap();
    assert_eq!(again["blocked"], json!(false));
    assert_eq!(app.audit.list().await.unwrap().len(), 1);

    // Blocked users cannot log back in
    let err = app
        .router
        .call("auth/login", json!({ "username": "operator", "password": "s3cret" }))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Forbidden);
}

#[tokio::test]
async fn test_rpc_errors() {
    let app = app("5", "0");

    let unknown = app.router.call("user/delete", json!({})).await.unwrap_err();
    assert_eq!(unknown.kind, ErrorKind::NotFound);

    let bad = app.router.call("auth/login", json!({ "username": 5 })).await.unwrap_err();
    assert_eq!(bad.kind, ErrorKind::BadRequest);

    let missing = app
        .router
        .call("user/block_user", json!({ "user_id": "nobody" }))
        .await
        .unwrap_err();
    assert_eq!(missing.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_dispatch_envelope() {
    let app = app("0", "0");

    let rejected = app
        .router
        .dispatch("auth/login", json!({ "username": "admin", "password": "s3cret" }))
        .await;
    assert_eq!(rejected["error"]["code"], json!(429));
    assert_eq!(rejected["error"]["status"], json!("ResourceExhausted"));

    let unknown = app.router.dispatch("nope", json!({})).await;
    assert_eq!(unknown["error"]["status"], json!("NotFound"));
    assert_eq!(
        unknown["error"]["data"]["methods"],
        json!(["auth/login", "auth/logout", "user/block_user"])
    );
}
