//! CLI configuration.
//!
//! Configuration can be loaded from:
//! - A TOML file (`--config`, `./muster.toml` or `~/.config/muster/muster.toml`)
//! - Environment variables (`MUSTER_TOKEN`, `MUSTER_GATEWAY_URL`)

use anyhow::{Context, Result};
use muster_core::ClientConfig;
use muster_protocol::{ApiVersion, Encoding};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Account token used to identify.
    #[serde(default = "default_token")]
    pub token: Option<String>,

    /// Gateway base URL.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Frame encoding.
    #[serde(default)]
    pub encoding: Encoding,

    /// Gateway API version.
    #[serde(default)]
    pub api_version: ApiVersion,

    /// Query client settings.
    #[serde(default)]
    pub client: ClientSection,
}

/// `[client]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSection {
    /// Maintain a guild cache.
    #[serde(default = "default_true")]
    pub cache: bool,

    /// Query deadline in milliseconds.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_ms: u64,

    /// Windows per member list request.
    #[serde(default = "default_ranges_per_request")]
    pub ranges_per_request: usize,
}

fn default_token() -> Option<String> {
    std::env::var("MUSTER_TOKEN").ok()
}

fn default_gateway_url() -> String {
    std::env::var("MUSTER_GATEWAY_URL").unwrap_or_else(|_| "wss://gateway.discord.gg".to_string())
}

fn default_true() -> bool {
    true
}

fn default_query_timeout() -> u64 {
    30_000
}

fn default_ranges_per_request() -> usize {
    muster_core::DEFAULT_RANGES_PER_REQUEST
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: default_token(),
            gateway_url: default_gateway_url(),
            encoding: Encoding::default(),
            api_version: ApiVersion::default(),
            client: ClientSection::default(),
        }
    }
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            cache: true,
            query_timeout_ms: default_query_timeout(),
            ranges_per_request: default_ranges_per_request(),
        }
    }
}

impl ClientSection {
    /// Build the query client configuration.
    #[must_use]
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            cache: self.cache,
            query_timeout: Duration::from_millis(self.query_timeout_ms),
            ranges_per_request: self.ranges_per_request,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the first default path that
    /// exists, or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        let config_paths = ["muster.toml", "~/.config/muster/muster.toml"];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if !config.api_version.is_supported() {
            anyhow::bail!(
                "Unsupported gateway API version {} in {}",
                config.api_version,
                path.display()
            );
        }

        Ok(config)
    }

    /// Get the configured token.
    ///
    /// # Errors
    ///
    /// Returns an error if no token is configured.
    pub fn token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .context("No token configured: set MUSTER_TOKEN or `token` in muster.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_client_section() {
        let client = ClientSection::default().to_client_config();
        assert_eq!(client, ClientConfig::default());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            token = "secret"
            gateway_url = "ws://127.0.0.1:9000"
            encoding = "msgpack"
            api_version = 8

            [client]
            cache = false
            query_timeout_ms = 5000
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.token().unwrap(), "secret");
        assert_eq!(config.gateway_url, "ws://127.0.0.1:9000");
        assert_eq!(config.encoding, Encoding::Msgpack);
        assert_eq!(config.api_version, ApiVersion(8));

        let client = config.client.to_client_config();
        assert!(!client.cache);
        assert_eq!(client.query_timeout, Duration::from_secs(5));
        assert_eq!(client.ranges_per_request, 1);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "token = \"from-file\"\n[client]\nranges_per_request = 3").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.token.as_deref(), Some("from-file"));
        assert_eq!(config.client.ranges_per_request, 3);
    }

    #[test]
    fn test_unsupported_version_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api_version = 42").unwrap();

        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Some(Path::new("/nonexistent/muster.toml")));
        assert!(result.is_err());
    }
}
