//! Daemon configuration.
//!
//! Configuration is loaded from `~/.config/uinveil/config.toml` unless
//! `UINVEIL_CONFIG` names another file.
//!
//! ## Example Configuration
//!
//! ```toml
//! port = 3000
//!
//! [site]
//! aes_key = "123456789"
//! aes_iv = "987654321"
//! xor_key = [207, 186, 141, 1]
//!
//! [proxy]
//! base_url = "https://thirdqq.qlogo.cn/headimg_dl"
//! default_search = "spec=640&img_type=jpg"
//!
//! [[license]]
//! id = "test"
//! key = "a9a6446b"
//! secret = "secret_to_sign"
//! extra_param_policy = "allow"
//! sign_policy = "important"
//!
//! [[authentication]]
//! token = "change-me"
//! permissions = { allow_license = ["test"] }
//!
//! [upstream]
//! connect_timeout_secs = 10
//! timeout_secs = 30
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use serde::Deserialize;
use uinveil::CipherKeys;
use uinveil_common::{Authentication, License, ProxyConfig, SiteConfig};

use crate::error::{DaemonError, Result};
use crate::paths;

/// Daemon configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Listening port (default: 3000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Public parameter names and key material
    pub site: SiteConfig,

    /// Upstream provider
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Licenses allowed to mint signed URLs
    #[serde(default)]
    pub license: Vec<License>,

    /// Bearer tokens for the signing endpoints
    #[serde(default)]
    pub authentication: Vec<Authentication>,

    /// Outbound HTTP client settings
    #[serde(default)]
    pub upstream: UpstreamSettings,
}

/// Outbound HTTP client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamSettings {
    /// Connection timeout in seconds (default: 10)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Whole-request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            timeout_secs: default_timeout(),
        }
    }
}

const fn default_port() -> u16 {
    3000
}

const fn default_connect_timeout() -> u64 {
    10
}

const fn default_timeout() -> u64 {
    30
}

impl DaemonConfig {
    /// Loads configuration from the default location.
    ///
    /// Reads the file named by `UINVEIL_CONFIG`, or
    /// `~/.config/uinveil/config.toml`.
    ///
    /// # Errors
    ///
    /// See [`DaemonConfig::load_from`].
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Loads and validates configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist or cannot be read
    /// - Deserialization fails
    /// - Validation fails
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DaemonError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| DaemonError::Config(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization or validation fails.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the configuration file path.
    ///
    /// # Errors
    ///
    /// Returns an error if `UINVEIL_CONFIG` is unset and the config directory
    /// cannot be determined.
    pub fn config_path() -> Result<PathBuf> {
        if let Some(path) = paths::config_override() {
            return Ok(path);
        }

        let config_dir = paths::config_dir()
            .ok_or_else(|| DaemonError::Config("Failed to determine config directory".to_string()))?
            .join("uinveil");

        Ok(config_dir.join("config.toml"))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The AES key or IV is 16 bytes or longer, or the XOR key is empty
    /// - `proxy.base_url` is not a valid URL
    /// - Two licenses share an id or two authentications share a token
    /// - A token allows a license that isn't configured
    pub fn validate(&self) -> Result<()> {
        CipherKeys::from_site(&self.site).map_err(|e| DaemonError::Config(e.to_string()))?;

        url::Url::parse(&self.proxy.base_url).map_err(|e| {
            DaemonError::Config(format!("Invalid proxy.base_url '{}': {e}", self.proxy.base_url))
        })?;

        let mut ids = HashSet::new();
        for license in &self.license {
            if !ids.insert(license.id.as_str()) {
                return Err(DaemonError::Config(format!(
                    "Duplicate license id '{}'",
                    license.id
                )));
            }
        }

        let mut tokens = HashSet::new();
        for auth in &self.authentication {
            if !tokens.insert(auth.token.expose_secret()) {
                return Err(DaemonError::Config(
                    "Duplicate authentication token".to_string(),
                ));
            }

            if let Some(unknown) = auth
                .permissions
                .allow_license
                .iter()
                .find(|id| !ids.contains(id.as_str()))
            {
                return Err(DaemonError::Config(format!(
                    "Authentication allows unknown license '{unknown}'"
                )));
            }
        }

        Ok(())
    }

    /// Gets a license by id.
    #[must_use]
    pub fn get_license(&self, id: &str) -> Option<&License> {
        self.license.iter().find(|l| l.id == id)
    }
}
