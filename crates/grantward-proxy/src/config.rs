//! Proxy configuration.
//!
//! Configuration comes from an optional TOML file, with the OAuth client
//! credentials and the authorization server URL falling back to environment
//! variables when the file leaves them out.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ProxyError, Result};

/// Environment variable holding the default password-grant client id.
pub const CLIENT_ID_ENV: &str = "PASSWORD_CLIENT_ID";

/// Environment variable holding the default password-grant client secret.
pub const CLIENT_SECRET_ENV: &str = "PASSWORD_CLIENT_SECRET";

/// Environment variable overriding the authorization server base URL.
pub const AUTHORIZATION_SERVER_ENV: &str = "GRANTWARD_AUTHORIZATION_SERVER";

/// Default token endpoint path on the authorization server.
pub const DEFAULT_TOKEN_PATH: &str = "/oauth/token";

/// Default introspection endpoint path on the resource server.
pub const DEFAULT_INTROSPECTION_PATH: &str = "/oauth/introspect";

/// Read a variable from the process environment.
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

// ─────────────────────────────────────────────────────────────────────────────
// Client Credentials
// ─────────────────────────────────────────────────────────────────────────────

/// OAuth client id/secret pair sent with every grant request.
///
/// Values are not validated locally; an empty id or secret is forwarded as-is
/// and rejected by the authorization server.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .finish()
    }
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Credentials from `PASSWORD_CLIENT_ID` / `PASSWORD_CLIENT_SECRET`.
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    /// Credentials resolved through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            client_id: lookup(CLIENT_ID_ENV).unwrap_or_default(),
            client_secret: lookup(CLIENT_SECRET_ENV).unwrap_or_default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Proxy Config
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level configuration for the grant proxy and its HTTP surface.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Base URL of the authorization server, e.g. `https://auth.example.com`.
    pub authorization_server: String,

    /// Token endpoint path, joined onto `authorization_server`.
    pub token_path: String,

    /// Bearer-authenticated introspection path on the resource server.
    pub introspection_path: String,

    /// Client id; `None` falls back to `PASSWORD_CLIENT_ID`.
    pub client_id: Option<String>,

    /// Client secret; `None` falls back to `PASSWORD_CLIENT_SECRET`.
    pub client_secret: Option<String>,

    /// Return refresh tokens in response bodies instead of an HTTP-only cookie.
    pub include_refresh_token: bool,

    /// Address the HTTP surface binds to.
    pub bind_address: SocketAddr,

    /// SQLite database holding the token tables. `None` disables local
    /// revocation and introspection is delegated to the resource server.
    pub database: Option<PathBuf>,

    /// Wrap the router in a request tracing layer.
    pub request_logging: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            authorization_server: "http://127.0.0.1:8000".to_string(),
            token_path: DEFAULT_TOKEN_PATH.to_string(),
            introspection_path: DEFAULT_INTROSPECTION_PATH.to_string(),
            client_id: None,
            client_secret: None,
            include_refresh_token: false,
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            database: None,
            request_logging: true,
        }
    }
}

impl ProxyConfig {
    /// Load configuration from a TOML file (if given) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_env_overrides(env_lookup))
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ProxyError::Config(format!("failed to parse config: {}", e)))
    }

    /// Fill unset values from environment variables.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(server) = lookup(AUTHORIZATION_SERVER_ENV) {
            self.authorization_server = server;
        }
        if self.client_id.is_none() {
            self.client_id = lookup(CLIENT_ID_ENV);
        }
        if self.client_secret.is_none() {
            self.client_secret = lookup(CLIENT_SECRET_ENV);
        }
        self
    }

    /// The client credentials this config resolves to.
    pub fn credentials(&self) -> ClientCredentials {
        ClientCredentials::new(
            self.client_id.clone().unwrap_or_default(),
            self.client_secret.clone().unwrap_or_default(),
        )
    }

    /// Absolute URL of the token endpoint.
    pub fn token_url(&self) -> String {
        join_url(&self.authorization_server, &self.token_path)
    }

    /// Absolute URL of the introspection endpoint.
    pub fn introspection_url(&self) -> String {
        join_url(&self.authorization_server, &self.introspection_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
