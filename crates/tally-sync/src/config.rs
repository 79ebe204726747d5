//! # Terminal Configuration
//!
//! Configuration for the sync engine and checkout.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_DEVICE_ID, TALLY_REMOTE_URL, TALLY_REQUEST_TIMEOUT_SECS,     │
//! │     TALLY_TAX_RATE_BPS, TALLY_CACHE_PATH                               │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally-pos/tally.toml (Linux)                             │
//! │     ~/Library/Application Support/com.tally.pos/tally.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     10 s request timeout, 12% tax, all tables monitored                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Front Counter"
//!
//! [remote]
//! url = "https://example.supabase.co"
//! request_timeout_secs = 10
//!
//! [sync]
//! monitored_tables = ["products", "transactions", "suppliers"]
//!
//! [pos]
//! tax_rate_bps = 1200
//!
//! [cache]
//! path = "/var/lib/tally/cache.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tally_core::{validation::validate_tax_rate_bps, Table, TaxRate};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Device
// =============================================================================

/// Identity of this terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Auto-generated on first run if not provided.
    pub id: String,

    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "POS Terminal".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Remote
// =============================================================================

/// Remote store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL of the remote store. `None` until onboarding sets it.
    #[serde(default)]
    pub url: Option<String>,

    /// Upper bound on any single remote call (seconds).
    ///
    /// A call that exceeds it is treated as a network failure.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            url: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// =============================================================================
// Sync
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Tables loaded, subscribed to and reported on by diagnostics.
    #[serde(default = "default_monitored_tables")]
    pub monitored_tables: Vec<Table>,
}

fn default_monitored_tables() -> Vec<Table> {
    Table::ALL.to_vec()
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            monitored_tables: default_monitored_tables(),
        }
    }
}

// =============================================================================
// POS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosSettings {
    /// Default tax rate in basis points. A business may override it.
    #[serde(default = "default_tax_rate_bps")]
    pub tax_rate_bps: u32,
}

fn default_tax_rate_bps() -> u32 {
    1200
}

impl Default for PosSettings {
    fn default() -> Self {
        PosSettings {
            tax_rate_bps: default_tax_rate_bps(),
        }
    }
}

// =============================================================================
// Cache
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete terminal configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TallyConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub pos: PosSettings,

    #[serde(default)]
    pub cache: CacheSettings,
}

impl TallyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (tally.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            Self::default()
        })
    }

    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("device.id must not be empty".into()));
        }

        if let Some(ref raw) = self.remote.url {
            let url = Url::parse(raw)?;
            if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
                return Err(SyncError::InvalidUrl(format!(
                    "Remote URL must use http(s) or ws(s), got: {}",
                    raw
                )));
            }
        }

        if self.remote.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        validate_tax_rate_bps(self.pos.tax_rate_bps)
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;

        if self.sync.monitored_tables.is_empty() {
            return Err(SyncError::InvalidConfig(
                "monitored_tables must list at least one table".into(),
            ));
        }

        Ok(())
    }

    /// Applies `TALLY_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("TALLY_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Some(url) = lookup("TALLY_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.url = Some(url);
        }

        if let Some(raw) = lookup("TALLY_REQUEST_TIMEOUT_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) => self.remote.request_timeout_secs = secs,
                Err(_) => warn!(value = %raw, "Ignoring invalid TALLY_REQUEST_TIMEOUT_SECS"),
            }
        }

        if let Some(raw) = lookup("TALLY_TAX_RATE_BPS") {
            match raw.parse::<u32>() {
                Ok(bps) => self.pos.tax_rate_bps = bps,
                Err(_) => warn!(value = %raw, "Ignoring invalid TALLY_TAX_RATE_BPS"),
            }
        }

        if let Some(path) = lookup("TALLY_CACHE_PATH") {
            self.cache.path = Some(PathBuf::from(path));
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "tally", "pos")
    }

    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("tally.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.request_timeout_secs)
    }

    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.pos.tax_rate_bps)
    }

    pub fn monitored_tables(&self) -> &[Table] {
        &self.sync.monitored_tables
    }

    /// Configured cache file, or `cache.db` in the platform data directory.
    pub fn cache_path(&self) -> Option<PathBuf> {
        self.cache
            .path
            .clone()
            .or_else(|| Self::project_dirs().map(|dirs| dirs.data_dir().join("cache.db")))
    }
}
