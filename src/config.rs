//! Configuration types for the synchronizer and its on-disk layout.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Names of the three persistent cache stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheNames {
    /// Currently servable resources.
    pub content: String,
    /// Core shell files staged during install.
    pub staging: String,
    /// Holds the manifest of the last successful activation.
    pub manifest: String,
}

impl Default for CacheNames {
    fn default() -> Self {
        Self {
            content: "app-cache".to_string(),
            staging: "app-temp-cache".to_string(),
            manifest: "app-manifest".to_string(),
        }
    }
}

/// Configuration for cache synchronization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Origin the application is served from, e.g. `https://app.example.com`.
    /// Empty by default; a synchronizer refuses to start without one.
    pub origin: String,
    /// Names of the cache stores.
    pub cache_names: CacheNames,
    /// Number of concurrent downloads during a full prefetch.
    pub prefetch_concurrency: usize,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            origin: String::new(),
            cache_names: CacheNames::default(),
            prefetch_concurrency: 4,
            request_timeout_secs: 30,
        }
    }
}

impl SyncConfig {
    /// Creates a configuration for `origin` with default values.
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Self::default()
        }
    }

    /// Sets the application origin.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Sets the cache store names.
    #[must_use]
    pub fn with_cache_names(mut self, names: CacheNames) -> Self {
        self.cache_names = names;
        self
    }

    /// Sets the number of concurrent prefetch downloads.
    #[must_use]
    pub const fn with_prefetch_concurrency(mut self, concurrency: usize) -> Self {
        self.prefetch_concurrency = concurrency;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }
}

/// Directories for cache storage and configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Root directory holding one subdirectory per cache store.
    pub cache_dir: PathBuf,
    /// Directory where `config.toml` is looked up.
    pub config_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            cache_dir: data_dir.join("shellsync").join("caches"),
            config_dir: config_dir.join("shellsync"),
        }
    }
}

impl PathConfig {
    /// Returns the default config file location.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

/// Complete application configuration.
///
/// ```toml
/// [sync]
/// origin = "https://app.example.com"
/// prefetch_concurrency = 8
///
/// [paths]
/// cache_dir = "/var/lib/shellsync"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Synchronizer configuration.
    pub sync: SyncConfig,
    /// Path configuration.
    pub paths: PathConfig,
}

impl AppConfig {
    /// Loads configuration from a TOML file. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Loads the default config file if it exists, otherwise returns defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_default() -> crate::Result<Self> {
        let path = PathConfig::default().config_file();
        if path.exists() {
            log::debug!("Loading config from {}", path.display());
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}
