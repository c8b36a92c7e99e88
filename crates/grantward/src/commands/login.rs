//! Login command - runs a password grant through the proxy.

use anyhow::Result;
use clap::Args;

use grantward_proxy::{AuthProxy, CookieExchange, CookieInstruction};

use super::Context;

/// Arguments for the login command.
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Resource owner username
    #[arg(short, long)]
    pub username: String,

    /// Resource owner password (or set GRANTWARD_PASSWORD env var)
    #[arg(short, long, env = "GRANTWARD_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Scope to request (can be specified multiple times)
    #[arg(short, long = "scope")]
    pub scopes: Vec<String>,

    /// Return the refresh token in the output instead of cookie custody
    #[arg(long)]
    pub include_refresh_token: bool,
}

/// Run the login command.
pub async fn run(args: LoginArgs, ctx: &Context) -> Result<()> {
    let mut config = ctx.load_config()?;
    if args.include_refresh_token {
        config.include_refresh_token = true;
    }

    let proxy = AuthProxy::from_config(&config);
    let scopes: Vec<&str> = args.scopes.iter().map(String::as_str).collect();
    let mut cookies = CookieExchange::new();

    let tokens = proxy
        .attempt_login(&args.username, &args.password, &scopes, &mut cookies)
        .await?;

    println!("{}", serde_json::to_string_pretty(&tokens)?);

    for instruction in cookies.queued() {
        if let CookieInstruction::Set(cookie) = instruction {
            eprintln!(
                "refresh token held in HTTP-only cookie '{}' (max-age {}s)",
                cookie.name, cookie.max_age_seconds
            );
        }
    }
    Ok(())
}
