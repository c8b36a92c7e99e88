//! Access token introspection: which user does a bearer token belong to?

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// Attribute carrying the subject id in a validated introspection response.
pub const USER_ID_ATTRIBUTE: &str = "oauth_user_id";

/// A successfully validated access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Introspection {
    pub user_id: i64,
}

/// Why a token could not be resolved to a user.
///
/// These causes are logged and then collapsed to "no user" at the proxy
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntrospectionError {
    #[error("empty access token")]
    EmptyToken,

    #[error("unknown access token")]
    UnknownToken,

    #[error("access token revoked")]
    Revoked,

    #[error("access token expired")]
    Expired,

    #[error("resource server rejected token with status {0}")]
    Rejected(u16),

    #[error("introspection response malformed: {0}")]
    MalformedResponse(String),

    #[error("introspection request failed: {0}")]
    Network(String),

    #[error("introspection storage error: {0}")]
    Storage(String),
}

/// Validates bearer access tokens.
#[async_trait]
pub trait TokenIntrospector: Send + Sync + std::fmt::Debug {
    async fn introspect(
        &self,
        access_token: &str,
    ) -> std::result::Result<Introspection, IntrospectionError>;
}

/// Shared introspector for use across requests.
pub type SharedIntrospector = Arc<dyn TokenIntrospector>;

/// Introspector that replays the token as a Bearer request against the
/// resource server and reads `oauth_user_id` from the JSON reply.
#[derive(Debug, Clone)]
pub struct HttpIntrospector {
    client: reqwest::Client,
    introspection_url: String,
}

impl HttpIntrospector {
    pub fn new(introspection_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), introspection_url)
    }

    pub fn with_client(client: reqwest::Client, introspection_url: impl Into<String>) -> Self {
        Self {
            client,
            introspection_url: introspection_url.into(),
        }
    }
}

#[async_trait]
impl TokenIntrospector for HttpIntrospector {
    async fn introspect(
        &self,
        access_token: &str,
    ) -> std::result::Result<Introspection, IntrospectionError> {
        if access_token.is_empty() {
            return Err(IntrospectionError::EmptyToken);
        }

        let response = self
            .client
            .get(&self.introspection_url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| IntrospectionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IntrospectionError::Rejected(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| IntrospectionError::MalformedResponse(e.to_string()))?;

        parse_user_id(&body).map(|user_id| Introspection { user_id })
    }
}

/// Read `oauth_user_id` as an integer or a numeric string.
pub fn parse_user_id(body: &Value) -> std::result::Result<i64, IntrospectionError> {
    match body.get(USER_ID_ATTRIBUTE) {
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
            IntrospectionError::MalformedResponse(format!("{} is not an integer", USER_ID_ATTRIBUTE))
        }),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| {
            IntrospectionError::MalformedResponse(format!("{} is not numeric", USER_ID_ATTRIBUTE))
        }),
        Some(_) => Err(IntrospectionError::MalformedResponse(format!(
            "{} has an unexpected type",
            USER_ID_ATTRIBUTE
        ))),
        None => Err(IntrospectionError::MalformedResponse(format!(
            "missing {}",
            USER_ID_ATTRIBUTE
        ))),
    }
}
