//! Configuration management.
//!
//! `WorkerConfig` holds what the interceptor needs: the cache generation,
//! the seed list and the bypass patterns. `Config` wraps it with the
//! deployment settings of the proxy (origin, listen address, cache dir,
//! TLS trust for the origin).
//!
//! Configuration is stored at `~/.config/airtransfer-offline/config.json`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::validate_cache_name;
use crate::http::CacheKey;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "airtransfer-offline";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Current cache generation. Bump on redeploy to invalidate old assets.
pub const DEFAULT_CACHE_NAME: &str = "airtransfer-v1";

/// App shell resources cached at install
pub const DEFAULT_SEED_URLS: [&str; 3] = ["/", "/static/manifest.json", "/static/icon-192.png"];

/// Share-target and upload endpoints must always reach the server
pub const DEFAULT_BYPASS_PATTERNS: [&str; 2] = ["/share", "/upload"];

/// First port the AirTransfer server tries. It serves HTTPS with a
/// self-signed certificate, see [`TlsConfig`].
pub const DEFAULT_ORIGIN: &str = "https://127.0.0.1:5000";

pub const DEFAULT_LISTEN: &str = "127.0.0.1:5080";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub cache_name: String,
    pub seed_urls: Vec<String>,
    pub bypass_patterns: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            seed_urls: DEFAULT_SEED_URLS.iter().map(|s| s.to_string()).collect(),
            bypass_patterns: DEFAULT_BYPASS_PATTERNS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<()> {
        validate_cache_name(&self.cache_name)?;
        if self.seed_urls.iter().any(|u| u.trim().is_empty()) {
            bail!("Seed list contains an empty URL");
        }
        let mut seen = HashSet::new();
        for url in &self.seed_urls {
            let key = CacheKey::get(url);
            if !seen.insert(key.url.clone()) {
                bail!("Seed list contains {} more than once", key.url);
            }
        }
        // An empty pattern is a substring of every URL and would disable caching
        if self.bypass_patterns.iter().any(|p| p.is_empty()) {
            bail!("Bypass patterns must not be empty strings");
        }
        Ok(())
    }
}

/// Trust settings for an HTTPS origin.
///
/// The AirTransfer server generates its own certificate, so the system
/// roots alone will not verify it. Either pin that certificate as an extra
/// root (`ca_cert`, PEM) or turn verification off.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub accept_invalid_certs: bool,
    pub ca_cert: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub origin: String,
    pub listen: String,
    pub cache_dir: Option<PathBuf>,
    pub tls: TlsConfig,
    pub worker: WorkerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            listen: DEFAULT_LISTEN.to_string(),
            cache_dir: None,
            tls: TlsConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl Config {
    /// Load from the default location, or defaults if no file exists
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the cache generations
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn validate(&self) -> Result<()> {
        let origin = reqwest::Url::parse(&self.origin)
            .with_context(|| format!("Invalid origin URL: {}", self.origin))?;
        if !matches!(origin.scheme(), "http" | "https") {
            bail!("Origin must be an http(s) URL, got {}", self.origin);
        }
        if let Some(ref ca_cert) = self.tls.ca_cert {
            if !ca_cert.is_file() {
                bail!("CA certificate not found: {}", ca_cert.display());
            }
        }
        self.worker.validate()
    }
}
