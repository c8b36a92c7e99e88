//! Logout: revoke the current session's tokens and expire the refresh cookie.

use std::sync::Arc;

use async_trait::async_trait;

use crate::custody::{CookieExchange, REFRESH_TOKEN_COOKIE};
use crate::error::Result;

// ─────────────────────────────────────────────────────────────────────────────
// Session Context
// ─────────────────────────────────────────────────────────────────────────────

/// The access token an authenticated user is currently acting with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTokenRef {
    pub id: String,
}

/// A user resolved by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub access_token: Option<AccessTokenRef>,
}

/// The authentication state of the current request.
#[async_trait]
pub trait SessionContext: Send + Sync {
    /// The authenticated user, or `None` for anonymous requests.
    async fn current_user(&self) -> Option<AuthenticatedUser>;
}

/// Fixed session state, for requests whose user has already been resolved.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSession(pub Option<AuthenticatedUser>);

#[async_trait]
impl SessionContext for ResolvedSession {
    async fn current_user(&self) -> Option<AuthenticatedUser> {
        self.0.clone()
    }
}

/// Resolves a bearer access token to the user it was issued for.
#[async_trait]
pub trait SessionResolver: Send + Sync + std::fmt::Debug {
    async fn resolve(&self, access_token: &str) -> Result<Option<AuthenticatedUser>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Token Store
// ─────────────────────────────────────────────────────────────────────────────

/// Persistence for issued tokens.
#[async_trait]
pub trait TokenStore: Send + Sync + std::fmt::Debug {
    /// Mark every refresh token issued alongside `access_token_id` revoked.
    /// Returns the number of records updated.
    async fn revoke_refresh_tokens(&self, access_token_id: &str) -> Result<u64>;

    /// Mark the access token itself revoked.
    async fn revoke_access_token(&self, access_token_id: &str) -> Result<()>;

    /// Revoke the refresh records, then the access token.
    ///
    /// Stores that support transactions should override this so that both
    /// updates land together.
    async fn revoke_session(&self, access_token_id: &str) -> Result<u64> {
        let revoked = self.revoke_refresh_tokens(access_token_id).await?;
        self.revoke_access_token(access_token_id).await?;
        Ok(revoked)
    }
}

/// Shared token store for use across requests.
pub type SharedTokenStore = Arc<dyn TokenStore>;

// ─────────────────────────────────────────────────────────────────────────────
// Session Revoker
// ─────────────────────────────────────────────────────────────────────────────

/// What a logout call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// No authenticated user; nothing was touched.
    Anonymous,
    /// The user had no current access token; only the cookie was expired.
    CookieCleared,
    /// Tokens were revoked and the cookie was expired.
    Revoked {
        access_token_id: String,
        refresh_tokens: u64,
    },
}

/// Revokes the current session's tokens on logout.
#[derive(Debug, Clone)]
pub struct SessionRevoker {
    store: SharedTokenStore,
}

impl SessionRevoker {
    pub fn new(store: SharedTokenStore) -> Self {
        Self { store }
    }

    /// Log the current user out.
    ///
    /// Anonymous requests are a silent no-op. For an authenticated user the
    /// refresh cookie is always expired, but this is not infallible: if the
    /// store fails, the `ProxyError::Storage` error is returned after the
    /// cookie has been queued, and the HTTP surface renders it as a 500.
    pub async fn logout(
        &self,
        session: &dyn SessionContext,
        cookies: &mut CookieExchange,
    ) -> Result<LogoutOutcome> {
        let Some(user) = session.current_user().await else {
            tracing::debug!("Logout without an authenticated session");
            return Ok(LogoutOutcome::Anonymous);
        };

        let outcome = match &user.access_token {
            Some(token) => self
                .store
                .revoke_session(&token.id)
                .await
                .map(|refresh_tokens| LogoutOutcome::Revoked {
                    access_token_id: token.id.clone(),
                    refresh_tokens,
                }),
            None => Ok(LogoutOutcome::CookieCleared),
        };

        cookies.forget(REFRESH_TOKEN_COOKIE);

        match &outcome {
            Ok(LogoutOutcome::Revoked { refresh_tokens, .. }) => {
                tracing::info!(user_id = user.user_id, refresh_tokens, "User logged out");
            }
            Ok(_) => tracing::info!(user_id = user.user_id, "User logged out without a token"),
            Err(e) => tracing::warn!(user_id = user.user_id, error = %e, "Token revocation failed"),
        }

        outcome
    }
}
