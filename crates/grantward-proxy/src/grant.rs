//! OAuth 2.0 grant requests against the authorization server's token endpoint.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ClientCredentials;
use crate::error::{ProxyError, Result};

/// Key of the refresh token in a token response.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Grant types the proxy forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    Password,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::Password => "password",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Grant Request
// ─────────────────────────────────────────────────────────────────────────────

/// A single grant request, built per call and never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct GrantRequest {
    pub grant_type: GrantType,
    pub fields: BTreeMap<String, String>,
}

impl std::fmt::Debug for GrantRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantRequest")
            .field("grant_type", &self.grant_type)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl GrantRequest {
    /// Resource owner password grant. Scopes are joined with single spaces.
    pub fn password(username: &str, password: &str, scopes: &[&str]) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("username".to_string(), username.to_string());
        fields.insert("password".to_string(), password.to_string());
        fields.insert("scope".to_string(), scopes.join(" "));
        Self {
            grant_type: GrantType::Password,
            fields,
        }
    }

    /// Refresh token grant.
    pub fn refresh_token(refresh_token: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(REFRESH_TOKEN_KEY.to_string(), refresh_token.to_string());
        Self {
            grant_type: GrantType::RefreshToken,
            fields,
        }
    }

    /// The full form body: grant type and client credentials first, then the
    /// grant-specific fields.
    pub fn form(&self, credentials: &ClientCredentials) -> Vec<(String, String)> {
        let mut form = vec![
            ("grant_type".to_string(), self.grant_type.as_str().to_string()),
            ("client_id".to_string(), credentials.client_id.clone()),
            ("client_secret".to_string(), credentials.client_secret.clone()),
        ];
        form.extend(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        form
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Token Set
// ─────────────────────────────────────────────────────────────────────────────

/// Token response from the authorization server.
///
/// Kept as an opaque JSON object so that fields the proxy does not know about
/// pass through to the caller untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSet(Map<String, Value>);

impl TokenSet {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Parse a token response body. Anything other than a JSON object is rejected.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(other) => Err(ProxyError::MalformedTokenResponse(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(ProxyError::MalformedTokenResponse(format!(
                "invalid JSON: {}",
                e
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn access_token(&self) -> Option<&str> {
        self.0.get("access_token").and_then(Value::as_str)
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.0.get(REFRESH_TOKEN_KEY).and_then(Value::as_str)
    }

    pub fn token_type(&self) -> Option<&str> {
        self.0.get("token_type").and_then(Value::as_str)
    }

    pub fn expires_in(&self) -> Option<i64> {
        self.0.get("expires_in").and_then(Value::as_i64)
    }

    /// Remove and return the refresh token entry, whatever its JSON type.
    pub fn take_refresh_token(&mut self) -> Option<Value> {
        self.0.remove(REFRESH_TOKEN_KEY)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for TokenSet {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Pull the `message` field out of an error body, or an empty string.
pub fn rejection_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// GrantClient
// ─────────────────────────────────────────────────────────────────────────────

/// Sends grant requests to the authorization server.
#[async_trait]
pub trait GrantClient: Send + Sync + std::fmt::Debug {
    /// Exchange a grant for a token set.
    ///
    /// Any non-success status becomes `InvalidCredentials`; wrong passwords
    /// and unknown clients are not told apart.
    async fn exchange(
        &self,
        credentials: &ClientCredentials,
        request: GrantRequest,
    ) -> Result<TokenSet>;
}

/// `GrantClient` that POSTs form-encoded grants with reqwest.
#[derive(Debug, Clone)]
pub struct HttpGrantClient {
    client: reqwest::Client,
    token_url: String,
}

impl HttpGrantClient {
    pub fn new(token_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), token_url)
    }

    pub fn with_client(client: reqwest::Client, token_url: impl Into<String>) -> Self {
        Self {
            client,
            token_url: token_url.into(),
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

#[async_trait]
impl GrantClient for HttpGrantClient {
    async fn exchange(
        &self,
        credentials: &ClientCredentials,
        request: GrantRequest,
    ) -> Result<TokenSet> {
        let response = self
            .client
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&request.form(credentials))
            .send()
            .await
            .map_err(|e| {
                ProxyError::Network(format!("{} grant request failed: {}", request.grant_type, e))
            })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            ProxyError::Network(format!("Failed to read token response: {}", e))
        })?;

        if !status.is_success() {
            let message = rejection_message(&body);
            tracing::warn!(
                grant_type = %request.grant_type,
                status = status.as_u16(),
                "Authorization server rejected grant"
            );
            return Err(ProxyError::invalid_credentials(message));
        }

        TokenSet::from_slice(&body)
    }
}
