use std::{env, path::Path, path::PathBuf};

use anyhow::{Context, Result};
use ::tracing::debug;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_SETTINGS_PATH: &str = "data/explorer.toml";

pub struct ExplorerConfig {
    /// Base URL of the audit query API, e.g. `https://audit.internal`
    pub api_url: String,
    /// Sent verbatim as the `authorization` header on upstream requests
    pub api_token: Option<String>,
    pub bind_addr: String,
    /// TOML file holding column and chart settings
    pub settings_path: PathBuf,
}

impl ExplorerConfig {
    pub fn load(manifest_dir: &Path) -> Result<Self> {
        #[cfg(debug_assertions)]
        if let Err(e) = dotenvy::from_path(manifest_dir.join(".env")) {
            debug!("no .env file loaded: {e}");
        }
        #[cfg(not(debug_assertions))]
        let _ = manifest_dir;

        let api_url = env::var("AUDIT_API_URL").context("Expected AUDIT_API_URL in environment")?;

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_owned(),
            api_token: env::var("AUDIT_API_TOKEN").ok().filter(|t| !t.is_empty()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_owned()),
            settings_path: env::var("EXPLORER_SETTINGS")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_SETTINGS_PATH)),
        })
    }
}

/// Load explorer config using the calling crate's manifest directory.
#[macro_export]
macro_rules! load_explorer_config {
    () => {
        $crate::config::ExplorerConfig::load(std::path::Path::new(env!("CARGO_MANIFEST_DIR")))
    };
}
