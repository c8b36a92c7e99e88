//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use grantward_proxy::{
    AuthProxy, ClientCredentials, HttpGrantClient, HttpIntrospector, ProxyConfig,
};

pub const CLIENT_ID: &str = "2";
pub const CLIENT_SECRET: &str = "test-secret";

/// A mocked authorization server.
pub struct MockAuthServer {
    pub server: MockServer,
}

impl MockAuthServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.server.uri())
    }

    pub fn introspection_url(&self) -> String {
        format!("{}/oauth/introspect", self.server.uri())
    }

    /// Answer every token request with `status` and `body`, expecting
    /// exactly `times` calls.
    pub async fn mock_token(&self, status: u16, body: Value, times: u64) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Successful grant returning `AT1` / `RT1`.
    pub async fn mock_token_success(&self, times: u64) {
        self.mock_token(200, token_body("AT1", "RT1"), times).await;
    }

    /// Config pointing at this server.
    pub fn config(&self) -> ProxyConfig {
        ProxyConfig {
            authorization_server: self.uri(),
            client_id: Some(CLIENT_ID.to_string()),
            client_secret: Some(CLIENT_SECRET.to_string()),
            request_logging: false,
            ..ProxyConfig::default()
        }
    }

    /// Proxy in the default cookie custody mode, talking to this server.
    pub fn proxy(&self) -> AuthProxy {
        AuthProxy::new(
            Arc::new(HttpGrantClient::new(self.token_url())),
            Arc::new(HttpIntrospector::new(self.introspection_url())),
        )
        .with_credentials(ClientCredentials::new(CLIENT_ID, CLIENT_SECRET))
    }
}

pub fn token_body(access: &str, refresh: &str) -> Value {
    json!({
        "token_type": "Bearer",
        "expires_in": 1209600,
        "access_token": access,
        "refresh_token": refresh
    })
}

/// Find the `Set-Cookie` header for `name`.
pub fn set_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    let prefix = format!("{}=", name);
    headers
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&prefix))
}
