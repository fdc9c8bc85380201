//! Tunnel configuration
//!
//! Each setting is resolved in this order (first found wins):
//! 1. Command line flag
//! 2. Environment variable (PGTUNNEL_*)
//! 3. Config file (`<config dir>/pgtunnel/config.toml`, or `--config`)
//! 4. Default value (where applicable)

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use pgtunnel_provision::{
    ProvisionerConfig, TokenSource, DEFAULT_ADDON_API_URL, DEFAULT_PLATFORM_API_URL,
};

/// Environment variable prefix
const ENV_PREFIX: &str = "PGTUNNEL";

/// Settings read from the config file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Platform API base URL
    pub api_url: Option<String>,

    /// Add-on API base URL
    pub addon_api_url: Option<String>,

    /// Platform API token (env://, file://, keychain:// or the token itself)
    pub api_token: Option<TokenSource>,
}

impl FileConfig {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pgtunnel")
            .join("config.toml")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `explicit` (which must exist), or the default file if present
    pub fn discover(explicit: Option<&str>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(&expand_path(path)),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Settings given on the command line
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub api_url: Option<String>,
    pub addon_api_url: Option<String>,
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub api_url: String,
    pub addon_api_url: String,
    pub api_token: TokenSource,
}

impl ResolvedConfig {
    pub fn resolve(file: FileConfig, cli: &CliOverrides) -> Result<Self> {
        Self::resolve_with(file, cli, get_env)
    }

    /// Resolve with a custom environment lookup
    pub fn resolve_with<F>(file: FileConfig, cli: &CliOverrides, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = cli
            .api_url
            .clone()
            .or_else(|| env("API_URL"))
            .or(file.api_url)
            .unwrap_or_else(|| DEFAULT_PLATFORM_API_URL.to_string());

        let addon_api_url = cli
            .addon_api_url
            .clone()
            .or_else(|| env("ADDON_API_URL"))
            .or(file.addon_api_url)
            .unwrap_or_else(|| DEFAULT_ADDON_API_URL.to_string());

        let api_token = match env("API_TOKEN") {
            Some(value) => value.parse().context("Invalid PGTUNNEL_API_TOKEN")?,
            None => file.api_token.context(
                "No platform API token configured. Set PGTUNNEL_API_TOKEN or api_token in the config file",
            )?,
        };

        Ok(Self {
            api_url,
            addon_api_url,
            api_token: expand_token_path(api_token),
        })
    }

    /// Read the API token and build the provisioner settings
    pub fn provisioner_config(&self) -> Result<ProvisionerConfig> {
        let api_token = self
            .api_token
            .resolve()
            .context("Failed to resolve the platform API token")?;

        Ok(ProvisionerConfig {
            platform_api_url: self.api_url.clone(),
            addon_api_url: self.addon_api_url.clone(),
            api_token,
        })
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{}_{}", ENV_PREFIX, name))
        .ok()
        .filter(|v| !v.is_empty())
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

fn expand_token_path(source: TokenSource) -> TokenSource {
    match source {
        TokenSource::File { path } => TokenSource::File {
            path: expand_path(&path.to_string_lossy()),
        },
        other => other,
    }
}
