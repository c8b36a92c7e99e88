//! HTTP surface for the auth proxy.
//!
//! Routes:
//! - `POST /auth/login`: password grant
//! - `POST /auth/refresh`: refresh grant (cookie or body, per custody mode)
//! - `POST /auth/logout`: revoke the bearer's session
//! - `GET /auth/user`: resolve the bearer token to a user id
//! - `GET /health`

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::custody::CookieExchange;
use crate::error::{ProxyError, Result};
use crate::grant::TokenSet;
use crate::proxy::AuthProxy;
use crate::revoke::{AccessTokenRef, AuthenticatedUser, ResolvedSession, SessionResolver};
use crate::store::SqliteTokenStore;

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Refresh request body. Only read in explicit custody mode.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Shared state for the HTTP surface.
#[derive(Debug, Clone)]
pub struct ServerState {
    proxy: AuthProxy,
    sessions: Option<Arc<dyn SessionResolver>>,
}

impl ServerState {
    pub fn new(proxy: AuthProxy) -> Self {
        Self {
            proxy,
            sessions: None,
        }
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionResolver>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Resolve the bearer's session, falling back to introspection when no
    /// session resolver is configured.
    async fn session(&self, headers: &HeaderMap) -> Result<ResolvedSession> {
        let Some(token) = bearer_token(headers) else {
            return Ok(ResolvedSession(None));
        };

        let user = match &self.sessions {
            Some(sessions) => sessions.resolve(token).await?,
            None => self
                .proxy
                .user_id_from_access_token(token)
                .await
                .map(|user_id| AuthenticatedUser {
                    user_id,
                    access_token: Some(AccessTokenRef {
                        id: token.to_string(),
                    }),
                }),
        };
        Ok(ResolvedSession(user))
    }
}

/// The proxy's HTTP server.
pub struct ProxyServer {
    config: ProxyConfig,
    state: ServerState,
}

impl ProxyServer {
    /// Wire up the proxy described by `config`.
    ///
    /// With a database configured, logout revokes tokens in it and access
    /// tokens are validated against it instead of the resource server.
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let mut proxy = AuthProxy::from_config(&config);
        let mut sessions: Option<Arc<dyn SessionResolver>> = None;

        if let Some(path) = &config.database {
            let store = Arc::new(SqliteTokenStore::open(path)?);
            proxy = proxy
                .with_token_store(store.clone())
                .with_introspector(store.clone());
            sessions = Some(store);
        }

        let mut state = ServerState::new(proxy);
        if let Some(sessions) = sessions {
            state = state.with_sessions(sessions);
        }
        Ok(Self::with_state(config, state))
    }

    pub fn with_state(config: ProxyConfig, state: ServerState) -> Self {
        Self { config, state }
    }

    /// Build the axum router.
    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/auth/login", post(handle_login))
            .route("/auth/refresh", post(handle_refresh))
            .route("/auth/logout", post(handle_logout))
            .route("/auth/user", get(handle_user))
            .route("/health", get(handle_health))
            .with_state(self.state.clone());

        if self.config.request_logging {
            router.layer(TraceLayer::new_for_http())
        } else {
            router
        }
    }

    /// Run the server until the process exits.
    pub async fn run(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "Starting auth proxy server");
        axum::serve(listener, self.router()).await
    }

    /// Run with graceful shutdown, returning the bound address.
    pub async fn run_with_shutdown(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(self.config.bind_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "Starting auth proxy server");
        let router = self.router();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!(error = %e, "Auth proxy server stopped");
            }
        });
        Ok(local_addr)
    }
}

/// Extract the token from an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Handle POST /auth/login
async fn handle_login(
    State(state): State<ServerState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<TokenSet>)> {
    let request: LoginRequest = serde_json::from_slice(&body)
        .map_err(|e| ProxyError::InvalidRequest(format!("login body: {}", e)))?;
    let mut cookies = CookieExchange::from_jar(&jar);
    let scopes: Vec<&str> = request.scopes.iter().map(String::as_str).collect();

    let tokens = state
        .proxy
        .clone()
        .attempt_login(&request.username, &request.password, &scopes, &mut cookies)
        .await?;

    Ok((cookies.apply(jar), Json(tokens)))
}

/// Handle POST /auth/refresh
async fn handle_refresh(
    State(state): State<ServerState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<TokenSet>)> {
    // An unreadable body counts as "no refresh token supplied".
    let request: RefreshRequest = serde_json::from_slice(&body).unwrap_or_default();
    let mut cookies = CookieExchange::from_jar(&jar);

    let tokens = state
        .proxy
        .clone()
        .attempt_refresh(request.refresh_token.as_deref(), &mut cookies)
        .await?;

    Ok((cookies.apply(jar), Json(tokens)))
}

/// Handle POST /auth/logout
///
/// Queued cookies are sent even when revocation fails.
async fn handle_logout(
    State(state): State<ServerState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Response> {
    let session = state.session(&headers).await?;
    let mut cookies = CookieExchange::from_jar(&jar);

    let outcome = state.proxy.clone().logout(&session, &mut cookies).await;
    let jar = cookies.apply(jar);

    Ok(match outcome {
        Ok(_) => (jar, StatusCode::NO_CONTENT).into_response(),
        Err(e) => (jar, e).into_response(),
    })
}

/// Handle GET /auth/user
async fn handle_user(
    State(state): State<ServerState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    let token = bearer_token(&headers).unwrap_or_default();
    let user_id = state
        .proxy
        .user_id_from_access_token(token)
        .await
        .ok_or_else(|| ProxyError::invalid_credentials(""))?;

    Ok(Json(serde_json::json!({ "user_id": user_id })))
}

/// Handle GET /health
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "grantward"
    }))
}
