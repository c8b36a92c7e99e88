//! The auth proxy: login, refresh, logout and token introspection.

use std::sync::Arc;

use crate::config::{ClientCredentials, ProxyConfig, env_lookup};
use crate::custody::{CookieExchange, REFRESH_TOKEN_COOKIE, RefreshTokenCustody};
use crate::error::{ProxyError, Result};
use crate::grant::{GrantClient, GrantRequest, HttpGrantClient, TokenSet};
use crate::introspect::{HttpIntrospector, SharedIntrospector};
use crate::revoke::{LogoutOutcome, SessionContext, SessionRevoker, SharedTokenStore};

/// Proxy between API clients and an OAuth 2.0 authorization server.
///
/// Cheap to clone; each inbound request should work on its own clone so that
/// configuration changes never leak between requests.
#[derive(Debug, Clone)]
pub struct AuthProxy {
    credentials: ClientCredentials,
    custody: RefreshTokenCustody,
    grants: Arc<dyn GrantClient>,
    revoker: Option<SessionRevoker>,
    introspector: SharedIntrospector,
    env: fn(&str) -> Option<String>,
}

impl AuthProxy {
    /// Create a proxy in HTTP-only cookie custody mode with credentials from
    /// the environment.
    pub fn new(grants: Arc<dyn GrantClient>, introspector: SharedIntrospector) -> Self {
        Self {
            credentials: ClientCredentials::from_env(),
            custody: RefreshTokenCustody::HttpOnlyCookie,
            grants,
            revoker: None,
            introspector,
            env: env_lookup,
        }
    }

    /// Build a proxy talking HTTP to the endpoints in `config`.
    pub fn from_config(config: &ProxyConfig) -> Self {
        let client = reqwest::Client::new();
        let grants = Arc::new(HttpGrantClient::with_client(
            client.clone(),
            config.token_url(),
        ));
        let introspector = Arc::new(HttpIntrospector::with_client(
            client,
            config.introspection_url(),
        ));

        let proxy = Self::new(grants, introspector).with_credentials(config.credentials());
        if config.include_refresh_token {
            proxy.include_refresh_token()
        } else {
            proxy
        }
    }

    pub fn with_credentials(mut self, credentials: ClientCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Revoke tokens through `store` on logout.
    pub fn with_token_store(mut self, store: SharedTokenStore) -> Self {
        self.revoker = Some(SessionRevoker::new(store));
        self
    }

    pub fn with_introspector(mut self, introspector: SharedIntrospector) -> Self {
        self.introspector = introspector;
        self
    }

    /// Replace the variable lookup the credential setters fall back to.
    pub fn with_env_lookup(mut self, lookup: fn(&str) -> Option<String>) -> Self {
        self.env = lookup;
        self
    }

    /// Switch to returning refresh tokens in response bodies.
    ///
    /// One-way: there is no way back to cookie custody for this instance.
    pub fn include_refresh_token(mut self) -> Self {
        self.custody = RefreshTokenCustody::ExplicitToken;
        self
    }

    pub fn custody(&self) -> RefreshTokenCustody {
        self.custody
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Client credentials
    // ─────────────────────────────────────────────────────────────────────────

    /// Set the client id; `None` reloads it from `PASSWORD_CLIENT_ID`.
    pub fn set_client_id(&mut self, id: Option<String>) -> &mut Self {
        self.credentials.client_id =
            id.unwrap_or_else(|| ClientCredentials::from_lookup(self.env).client_id);
        self
    }

    pub fn client_id(&self) -> &str {
        &self.credentials.client_id
    }

    /// Set the client secret; `None` reloads it from `PASSWORD_CLIENT_SECRET`.
    pub fn set_client_secret(&mut self, secret: Option<String>) -> &mut Self {
        self.credentials.client_secret =
            secret.unwrap_or_else(|| ClientCredentials::from_lookup(self.env).client_secret);
        self
    }

    pub fn client_secret(&self) -> &str {
        &self.credentials.client_secret
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Exchange user credentials for tokens via the password grant.
    pub async fn attempt_login(
        &self,
        username: &str,
        password: &str,
        scopes: &[&str],
        cookies: &mut CookieExchange,
    ) -> Result<TokenSet> {
        let tokens = self
            .grant(GrantRequest::password(username, password, scopes), cookies)
            .await?;
        tracing::info!(custody = ?self.custody, "Password grant succeeded");
        Ok(tokens)
    }

    /// Exchange a refresh token for new tokens.
    ///
    /// In cookie custody the refresh token is read from the inbound cookie and
    /// `refresh_token` is ignored. A missing token fails before the
    /// authorization server is contacted.
    pub async fn attempt_refresh(
        &self,
        refresh_token: Option<&str>,
        cookies: &mut CookieExchange,
    ) -> Result<TokenSet> {
        let refresh_token = self
            .custody
            .source_refresh_token(refresh_token, cookies)
            .inspect_err(|e| tracing::warn!(error = %e, "Refresh rejected locally"))?;

        let tokens = self
            .grant(GrantRequest::refresh_token(&refresh_token), cookies)
            .await?;
        tracing::info!(custody = ?self.custody, "Refresh grant succeeded");
        Ok(tokens)
    }

    /// Log out the session's user.
    ///
    /// A no-op for anonymous sessions. Without a configured token store the
    /// user's access token cannot be revoked: the refresh cookie is still
    /// expired and `ProxyError::Config` is returned.
    pub async fn logout(
        &self,
        session: &dyn SessionContext,
        cookies: &mut CookieExchange,
    ) -> Result<LogoutOutcome> {
        if let Some(revoker) = &self.revoker {
            return revoker.logout(session, cookies).await;
        }

        let Some(user) = session.current_user().await else {
            return Ok(LogoutOutcome::Anonymous);
        };
        cookies.forget(REFRESH_TOKEN_COOKIE);

        if user.access_token.is_none() {
            return Ok(LogoutOutcome::CookieCleared);
        }
        tracing::warn!(
            user_id = user.user_id,
            "Logout without a token store; access token left valid"
        );
        Err(ProxyError::Config(
            "no token store configured; cannot revoke access tokens".to_string(),
        ))
    }

    /// Resolve an access token to its user id. Every failure yields `None`.
    pub async fn user_id_from_access_token(&self, access_token: &str) -> Option<i64> {
        match self.introspector.introspect(access_token).await {
            Ok(introspection) => Some(introspection.user_id),
            Err(e) => {
                tracing::debug!(error = %e, "Access token introspection failed");
                None
            }
        }
    }

    async fn grant(&self, request: GrantRequest, cookies: &mut CookieExchange) -> Result<TokenSet> {
        let grant_type = request.grant_type;
        let tokens = self
            .grants
            .exchange(&self.credentials, request)
            .await
            .inspect_err(|e| tracing::warn!(%grant_type, error = %e, "Grant failed"))?;

        self.custody.shape(tokens, cookies).inspect_err(|e| {
            tracing::warn!(%grant_type, error = %e, "Token response violated contract")
        })
    }
}
