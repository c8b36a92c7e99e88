//! OAuth 2.0 grant proxy with HTTP-only refresh token custody.
//!
//! Sits between API clients and an OAuth 2.0 authorization server: forwards
//! password and refresh grants with the proxy's client credentials, decides
//! whether refresh tokens are returned in the body or kept in an HTTP-only
//! cookie, revokes sessions on logout, and resolves access tokens to users.
//!
//! # Components
//!
//! - [`grant`]: token endpoint client and the token response type
//! - [`custody`]: refresh token custody modes and cookie handling
//! - [`revoke`]: session revocation on logout
//! - [`introspect`]: access token → user id resolution
//! - [`store`]: SQLite token tables
//! - [`proxy`]: [`AuthProxy`], tying the above together
//! - [`server`]: Axum-based HTTP surface

pub mod config;
pub mod custody;
pub mod error;
pub mod grant;
pub mod introspect;
pub mod proxy;
pub mod revoke;
pub mod server;
pub mod store;

pub use config::{ClientCredentials, ProxyConfig};
pub use custody::{CookieExchange, CookieInstruction, RefreshTokenCookie, RefreshTokenCustody};
pub use error::{ProxyError, Result};
pub use grant::{GrantClient, GrantRequest, GrantType, HttpGrantClient, TokenSet};
pub use introspect::{HttpIntrospector, Introspection, IntrospectionError, TokenIntrospector};
pub use proxy::AuthProxy;
pub use revoke::{
    AccessTokenRef, AuthenticatedUser, LogoutOutcome, ResolvedSession, SessionContext,
    SessionResolver, SessionRevoker, TokenStore,
};
pub use server::{ProxyServer, ServerState};
pub use store::SqliteTokenStore;
