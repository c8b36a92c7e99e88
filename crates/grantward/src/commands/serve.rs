//! Serve command - runs the proxy's HTTP server.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use grantward_proxy::ProxyServer;

use super::Context;

/// Arguments for the serve command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<SocketAddr>,

    /// Authorization server base URL (overrides config)
    #[arg(long)]
    pub authorization_server: Option<String>,

    /// Return refresh tokens in response bodies instead of a cookie
    #[arg(long)]
    pub include_refresh_token: bool,

    /// SQLite database with the token tables (overrides config)
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Disable per-request trace logging
    #[arg(long)]
    pub no_request_logging: bool,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let mut config = ctx.load_config()?;

    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(server) = args.authorization_server {
        config.authorization_server = server;
    }
    if args.include_refresh_token {
        config.include_refresh_token = true;
    }
    if let Some(database) = args.database {
        config.database = Some(database);
    }
    if args.no_request_logging {
        config.request_logging = false;
    }

    tracing::info!(
        token_url = %config.token_url(),
        include_refresh_token = config.include_refresh_token,
        database = ?config.database,
        "Configured auth proxy"
    );

    let server = ProxyServer::new(config)?;
    server.run().await?;
    Ok(())
}
