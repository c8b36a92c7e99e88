//! Refresh token custody: where a refresh token lives between grants.
//!
//! In the default [`RefreshTokenCustody::HttpOnlyCookie`] mode the refresh
//! token never reaches client-side code. It is stripped from every token
//! response and handed back as an HTTP-only cookie, and refresh requests only
//! ever read it from that cookie. A refresh token passed as a parameter is
//! ignored, so a client cannot inject a token the proxy did not set.
//!
//! [`RefreshTokenCustody::ExplicitToken`] returns the refresh token in the
//! response body and expects the caller to send it back.

use std::collections::HashMap;

use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde_json::Value;

use crate::error::{ProxyError, Result};
use crate::grant::TokenSet;

/// Name of the refresh token cookie.
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// Lifetime of the refresh token cookie (10 days).
pub const REFRESH_TOKEN_MAX_AGE_SECS: i64 = 864_000;

/// Where refresh tokens are kept. Fixed for the life of a proxy instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshTokenCustody {
    /// Refresh tokens travel only in an HTTP-only cookie.
    #[default]
    HttpOnlyCookie,
    /// Refresh tokens are returned to and supplied by the caller.
    ExplicitToken,
}

impl RefreshTokenCustody {
    /// Shape a successful token response for the caller.
    ///
    /// In cookie mode the `refresh_token` entry is moved out of the token set
    /// into a queued cookie. A response without a usable refresh token is an
    /// upstream contract violation and nothing is queued.
    pub fn shape(&self, mut tokens: TokenSet, cookies: &mut CookieExchange) -> Result<TokenSet> {
        match self {
            RefreshTokenCustody::ExplicitToken => Ok(tokens),
            RefreshTokenCustody::HttpOnlyCookie => {
                let refresh_token = match tokens.take_refresh_token() {
                    Some(Value::String(token)) if !token.is_empty() => token,
                    Some(_) => {
                        return Err(ProxyError::MalformedTokenResponse(
                            "refresh_token is not a non-empty string".to_string(),
                        ));
                    }
                    None => {
                        return Err(ProxyError::MalformedTokenResponse(
                            "token response has no refresh_token".to_string(),
                        ));
                    }
                };

                cookies.queue(CookieInstruction::Set(RefreshTokenCookie::new(refresh_token)));
                Ok(tokens)
            }
        }
    }

    /// Pick the refresh token to send upstream.
    ///
    /// Cookie mode reads the inbound cookie and ignores `caller_supplied`
    /// entirely; explicit mode uses `caller_supplied`.
    pub fn source_refresh_token(
        &self,
        caller_supplied: Option<&str>,
        cookies: &CookieExchange,
    ) -> Result<String> {
        match self {
            RefreshTokenCustody::HttpOnlyCookie => cookies
                .inbound(REFRESH_TOKEN_COOKIE)
                .filter(|token| !token.is_empty())
                .map(str::to_string)
                .ok_or(ProxyError::MissingRefreshTokenCookie),
            RefreshTokenCustody::ExplicitToken => caller_supplied
                .filter(|token| !token.is_empty())
                .map(str::to_string)
                .ok_or(ProxyError::MissingRefreshToken),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Refresh Token Cookie
// ─────────────────────────────────────────────────────────────────────────────

/// The cookie carrying a refresh token in cookie custody mode.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshTokenCookie {
    pub name: String,
    pub value: String,
    pub max_age_seconds: i64,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: bool,
    pub http_only: bool,
}

impl std::fmt::Debug for RefreshTokenCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTokenCookie")
            .field("name", &self.name)
            .field("value", &format_args!("[{} bytes]", self.value.len()))
            .field("max_age_seconds", &self.max_age_seconds)
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("http_only", &self.http_only)
            .finish()
    }
}

impl RefreshTokenCookie {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            name: REFRESH_TOKEN_COOKIE.to_string(),
            value: value.into(),
            max_age_seconds: REFRESH_TOKEN_MAX_AGE_SECS,
            domain: None,
            path: None,
            secure: false,
            http_only: true,
        }
    }

    /// Render as a `Set-Cookie`-ready cookie.
    pub fn to_cookie(&self) -> Cookie<'static> {
        let mut builder = Cookie::build((self.name.clone(), self.value.clone()))
            .max_age(time::Duration::seconds(self.max_age_seconds))
            .secure(self.secure)
            .http_only(self.http_only);

        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        if let Some(path) = &self.path {
            builder = builder.path(path.clone());
        }

        builder.build()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cookie Exchange
// ─────────────────────────────────────────────────────────────────────────────

/// A cookie change queued for the outgoing response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieInstruction {
    /// Set a refresh token cookie.
    Set(RefreshTokenCookie),
    /// Expire the named cookie on the client.
    Forget(String),
}

impl CookieInstruction {
    pub fn name(&self) -> &str {
        match self {
            CookieInstruction::Set(cookie) => &cookie.name,
            CookieInstruction::Forget(name) => name,
        }
    }
}

/// Per-request cookie state: cookies the client sent and cookie changes
/// queued for the response.
#[derive(Debug, Clone, Default)]
pub struct CookieExchange {
    inbound: HashMap<String, String>,
    queued: Vec<CookieInstruction>,
}

impl CookieExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an inbound cookie (builder style).
    pub fn with_inbound(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inbound.insert(name.into(), value.into());
        self
    }

    /// Capture the inbound cookies of an axum request.
    pub fn from_jar(jar: &CookieJar) -> Self {
        Self {
            inbound: jar
                .iter()
                .map(|c| (c.name().to_string(), c.value().to_string()))
                .collect(),
            queued: Vec::new(),
        }
    }

    /// Value of an inbound cookie.
    pub fn inbound(&self, name: &str) -> Option<&str> {
        self.inbound.get(name).map(String::as_str)
    }

    pub fn queue(&mut self, instruction: CookieInstruction) {
        self.queued.push(instruction);
    }

    /// Queue expiry of a cookie, whether or not the client holds it.
    pub fn forget(&mut self, name: impl Into<String>) {
        self.queue(CookieInstruction::Forget(name.into()));
    }

    pub fn queued(&self) -> &[CookieInstruction] {
        &self.queued
    }

    pub fn take_queued(&mut self) -> Vec<CookieInstruction> {
        std::mem::take(&mut self.queued)
    }

    /// Apply queued changes to an outgoing cookie jar.
    pub fn apply(self, mut jar: CookieJar) -> CookieJar {
        for instruction in self.queued {
            jar = match instruction {
                CookieInstruction::Set(cookie) => jar.add(cookie.to_cookie()),
                CookieInstruction::Forget(name) => {
                    // Always emit an expiring cookie; `CookieJar::remove` only
                    // does so for cookies present on the request.
                    let mut removal = Cookie::new(name, "");
                    removal.make_removal();
                    jar.add(removal)
                }
            };
        }
        jar
    }
}
