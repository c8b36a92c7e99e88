//! Introspect command - resolves an access token to a user id.

use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Args;

use grantward_proxy::{AuthProxy, SqliteTokenStore};

use super::Context;

/// Arguments for the introspect command.
#[derive(Args, Debug)]
pub struct IntrospectArgs {
    /// Access token to resolve
    pub token: String,
}

/// Run the introspect command.
pub async fn run(args: IntrospectArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;

    let mut proxy = AuthProxy::from_config(&config);
    if let Some(path) = &config.database {
        proxy = proxy.with_introspector(Arc::new(SqliteTokenStore::open(path)?));
    }

    match proxy.user_id_from_access_token(&args.token).await {
        Some(user_id) => {
            println!("{}", serde_json::json!({ "user_id": user_id }));
            Ok(())
        }
        None => bail!("access token is not valid"),
    }
}
