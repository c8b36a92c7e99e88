//! CLI command handlers.

use std::path::PathBuf;

use anyhow::{Context as _, Result};

use grantward_proxy::ProxyConfig;

pub mod introspect;
pub mod login;
pub mod serve;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config file, if one was given.
    pub config_path: Option<PathBuf>,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load the proxy configuration, applying environment overrides.
    pub fn load_config(&self) -> Result<ProxyConfig> {
        let config = ProxyConfig::load(self.config_path.as_deref()).with_context(|| {
            match &self.config_path {
                Some(path) => format!("failed to load config from {}", path.display()),
                None => "failed to load config".to_string(),
            }
        })?;

        if self.verbose {
            eprintln!("authorization server: {}", config.authorization_server);
        }
        Ok(config)
    }
}
