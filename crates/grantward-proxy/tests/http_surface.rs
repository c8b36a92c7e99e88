//! HTTP surface tests: routes, cookies and status codes.

mod common;

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use serde_json::{Value, json};
use tempfile::tempdir;
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, header as header_eq, method, path};
use wiremock::{Mock, ResponseTemplate};

use common::{MockAuthServer, set_cookie, token_body};
use grantward_proxy::{ProxyConfig, ProxyServer, ServerState, SqliteTokenStore, TokenStore};

fn json_post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn bearer(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: Response) -> Result<Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn router(auth: &MockAuthServer) -> Router {
    ProxyServer::with_state(auth.config(), ServerState::new(auth.proxy())).router()
}

fn router_with_store(auth: &MockAuthServer, store: Arc<SqliteTokenStore>) -> Router {
    let proxy = auth
        .proxy()
        .with_token_store(store.clone())
        .with_introspector(store.clone());
    ProxyServer::with_state(auth.config(), ServerState::new(proxy).with_sessions(store)).router()
}

#[tokio::test]
async fn test_login_sets_http_only_cookie() -> Result<()> {
    let auth = MockAuthServer::start().await;
    auth.mock_token_success(1).await;

    let response = router(&auth)
        .oneshot(json_post(
            "/auth/login",
            json!({"username": "a@b.com", "password": "pw"}),
        ))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = set_cookie(response.headers(), "refresh_token")
        .expect("refresh token cookie")
        .to_string();
    assert!(cookie.starts_with("refresh_token=RT1"));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Max-Age=864000"));
    assert!(!cookie.contains("Secure"));

    let body = body_json(response).await?;
    assert_eq!(body["access_token"], "AT1");
    assert!(body.get("refresh_token").is_none());
    Ok(())
}

#[tokio::test]
async fn test_login_explicit_mode_returns_refresh_token_in_body() -> Result<()> {
    let auth = MockAuthServer::start().await;
    auth.mock_token_success(1).await;

    let config = ProxyConfig {
        include_refresh_token: true,
        ..auth.config()
    };
    let state = ServerState::new(auth.proxy().include_refresh_token());
    let response = ProxyServer::with_state(config, state)
        .router()
        .oneshot(json_post(
            "/auth/login",
            json!({"username": "a@b.com", "password": "pw", "scopes": ["read"]}),
        ))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(response.headers(), "refresh_token").is_none());
    let body = body_json(response).await?;
    assert_eq!(body["refresh_token"], "RT1");
    Ok(())
}

#[tokio::test]
async fn test_rejected_login_is_generic_401() -> Result<()> {
    let auth = MockAuthServer::start().await;
    auth.mock_token(
        401,
        json!({"message": "The user credentials were incorrect."}),
        1,
    )
    .await;

    let response = router(&auth)
        .oneshot(json_post(
            "/auth/login",
            json!({"username": "a@b.com", "password": "wrong"}),
        ))
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookie(response.headers(), "refresh_token").is_none());
    let body = body_json(response).await?;
    assert_eq!(body["message"], "Invalid Credentials!");
    assert!(!body.to_string().contains("incorrect"));
    Ok(())
}

#[tokio::test]
async fn test_refresh_reads_cookie_and_ignores_body() -> Result<()> {
    let auth = MockAuthServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("refresh_token=RT1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("AT2", "RT2")))
        .expect(1)
        .mount(&auth.server)
        .await;

    let mut request = json_post("/auth/refresh", json!({"refresh_token": "SMUGGLED"}));
    request
        .headers_mut()
        .insert(header::COOKIE, "refresh_token=RT1".parse()?);

    let response = router(&auth).oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = set_cookie(response.headers(), "refresh_token").expect("rotated cookie");
    assert!(cookie.starts_with("refresh_token=RT2"));
    let body = body_json(response).await?;
    assert_eq!(body["access_token"], "AT2");
    Ok(())
}

#[tokio::test]
async fn test_refresh_without_cookie_is_401_and_never_calls_upstream() -> Result<()> {
    let auth = MockAuthServer::start().await;
    auth.mock_token_success(0).await;

    let response = router(&auth)
        .oneshot(json_post("/auth/refresh", json!({"refresh_token": "RT1"})))
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await?;
    assert_eq!(body["message"], "Invalid Credentials!");
    Ok(())
}

#[tokio::test]
async fn test_refresh_explicit_mode_reads_body() -> Result<()> {
    let auth = MockAuthServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("refresh_token=RT1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("AT2", "RT2")))
        .expect(1)
        .mount(&auth.server)
        .await;

    let state = ServerState::new(auth.proxy().include_refresh_token());
    let router = ProxyServer::with_state(auth.config(), state).router();

    let response = router
        .clone()
        .oneshot(json_post("/auth/refresh", json!({"refresh_token": "RT1"})))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert_eq!(body["refresh_token"], "RT2");

    // No body at all: nothing to refresh with.
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_logout_revokes_session_and_clears_cookie() -> Result<()> {
    let auth = MockAuthServer::start().await;
    let store = Arc::new(SqliteTokenStore::open_in_memory()?);
    store.insert_access_token("at-1", 42, None)?;
    store.insert_refresh_token("rt-1", "at-1", None)?;
    let router = router_with_store(&auth, store.clone());

    let response = router
        .clone()
        .oneshot(bearer("GET", "/auth/user", "at-1"))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await?, json!({"user_id": 42}));

    let response = router
        .clone()
        .oneshot(bearer("POST", "/auth/logout", "at-1"))
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cookie = set_cookie(response.headers(), "refresh_token").expect("removal cookie");
    assert!(cookie.contains("Max-Age=0"));

    assert_eq!(store.refresh_token_revoked("rt-1")?, Some(true));
    assert!(store.access_token("at-1")?.map(|t| t.revoked).unwrap_or(false));

    let response = router.oneshot(bearer("GET", "/auth/user", "at-1")).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_anonymous_logout_is_silent() -> Result<()> {
    let auth = MockAuthServer::start().await;
    let store = Arc::new(SqliteTokenStore::open_in_memory()?);
    store.insert_access_token("at-1", 42, None)?;
    store.insert_refresh_token("rt-1", "at-1", None)?;
    let router = router_with_store(&auth, store.clone());

    for request in [
        Request::builder()
            .method("POST")
            .uri("/auth/logout")
            .body(Body::empty())?,
        bearer("POST", "/auth/logout", "unknown-token"),
    ] {
        let response = router.clone().oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(set_cookie(response.headers(), "refresh_token").is_none());
    }

    assert_eq!(store.refresh_token_revoked("rt-1")?, Some(false));
    assert_eq!(store.revoke_refresh_tokens("none").await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_user_endpoint_uses_resource_server() -> Result<()> {
    let auth = MockAuthServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth/introspect"))
        .and(header_eq("authorization", "Bearer AT1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"oauth_user_id": 42})))
        .mount(&auth.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/oauth/introspect"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Unauthenticated."})))
        .mount(&auth.server)
        .await;

    let router = router(&auth);

    let response = router.clone().oneshot(bearer("GET", "/auth/user", "AT1")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await?, json!({"user_id": 42}));

    let response = router.clone().oneshot(bearer("GET", "/auth/user", "bogus")).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/user")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_server_from_config_uses_database() -> Result<()> {
    let auth = MockAuthServer::start().await;
    let temp = tempdir()?;
    let db_path = temp.path().join("tokens.db");
    {
        let seed = SqliteTokenStore::open(&db_path)?;
        seed.insert_access_token("at-7", 7, None)?;
        seed.insert_refresh_token("rt-7", "at-7", None)?;
    }

    let config = ProxyConfig {
        database: Some(db_path.clone()),
        ..auth.config()
    };
    let router = ProxyServer::new(config)?.router();

    let response = router
        .clone()
        .oneshot(bearer("GET", "/auth/user", "at-7"))
        .await?;
    assert_eq!(body_json(response).await?, json!({"user_id": 7}));

    let response = router.oneshot(bearer("POST", "/auth/logout", "at-7")).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let check = SqliteTokenStore::open(&db_path)?;
    assert_eq!(check.refresh_token_revoked("rt-7")?, Some(true));
    Ok(())
}

#[tokio::test]
async fn test_run_with_shutdown_serves_health() -> Result<()> {
    let auth = MockAuthServer::start().await;
    let config = ProxyConfig {
        bind_address: "127.0.0.1:0".parse()?,
        ..auth.config()
    };

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let addr = ProxyServer::with_state(config, ServerState::new(auth.proxy()))
        .run_with_shutdown(async {
            let _ = rx.await;
        })
        .await?;

    let body: Value = reqwest::get(format!("http://{}/health", addr))
        .await?
        .json()
        .await?;
    assert_eq!(body["status"], "ok");

    let _ = tx.send(());
    Ok(())
}

#[tokio::test]
async fn test_logout_without_store_fails_loudly() -> Result<()> {
    let auth = MockAuthServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth/introspect"))
        .and(header_eq("authorization", "Bearer AT1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"oauth_user_id": 42})))
        .mount(&auth.server)
        .await;

    let router = ProxyServer::new(auth.config())?.router();
    let mut request = bearer("POST", "/auth/logout", "AT1");
    request
        .headers_mut()
        .insert(header::COOKIE, "refresh_token=RT1".parse()?);

    let response = router.oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let cookie = set_cookie(response.headers(), "refresh_token").expect("removal cookie");
    assert!(cookie.contains("Max-Age=0"));
    let body = body_json(response).await?;
    assert_eq!(body["code"], 500);
    Ok(())
}

#[tokio::test]
async fn test_malformed_login_body_is_json_400() -> Result<()> {
    let auth = MockAuthServer::start().await;
    auth.mock_token_success(0).await;
    let router = router(&auth);

    for body in ["not json", r#"{"username": "a@b.com"}"#] {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(set_cookie(response.headers(), "refresh_token").is_none());
        assert_eq!(
            body_json(response).await?,
            json!({"message": "Invalid request", "code": 400})
        );
    }
    Ok(())
}
