//! # Sync Configuration
//!
//! Configuration management for the tax sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     LEDGER_TAX_BASE_URL=https://tax.example.gov/api                    │
//! │     LEDGER_TAX_PASSWORD=...                                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/ledger-sync/sync.toml (Linux)                            │
//! │     ~/Library/Application Support/com.ledger.sync/sync.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     30 min interval, page size 100, 10 min token lifetime             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [service]
//! base_url = "https://tax.example.gov/api"
//! request_timeout_secs = 30
//! page_size = 100
//! token_lifetime_secs = 600
//!
//! [principal]
//! tenant_id = "302563778"
//! username = "operator"
//! password = "..."
//!
//! [schedule]
//! interval_secs = 1800
//! status_poll_secs = 30
//! initial_watermark = "2024-01-01T00:00:00Z"
//!
//! [database]
//! path = "/var/lib/ledger/ledger.db"
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use ledger_core::SyncPrincipal;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Service Settings
// =============================================================================

/// Where and how to talk to the tax service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Base URL every endpoint path is appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Invoices requested per list page.
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// How long a session token is trusted after the handshake (seconds).
    #[serde(default = "default_token_lifetime")]
    pub token_lifetime_secs: u64,
}

fn default_base_url() -> String {
    "https://tax.example.gov/api".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_page_size() -> u64 {
    100
}

fn default_token_lifetime() -> u64 {
    600
}

impl Default for ServiceSettings {
    fn default() -> Self {
        ServiceSettings {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            page_size: default_page_size(),
            token_lifetime_secs: default_token_lifetime(),
        }
    }
}

impl ServiceSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_lifetime(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_lifetime_secs as i64)
    }
}

// =============================================================================
// Principal Settings
// =============================================================================

/// Tax-service credentials of the tenant.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PrincipalSettings {
    /// The tenant's TIN.
    #[serde(default)]
    pub tenant_id: String,

    #[serde(default)]
    pub username: String,

    /// Usually supplied through `LEDGER_TAX_PASSWORD` rather than the file.
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for PrincipalSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrincipalSettings")
            .field("tenant_id", &self.tenant_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Schedule Settings
// =============================================================================

/// Recurring run cadence.
///
/// ## Timing
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                                                                         │
/// │  last_run_at            now                    next run                 │
/// │      │◄──── elapsed ────►│◄──── delay ─────────►│                        │
/// │      │◄─────────────── interval ──────────────►│                        │
/// │                                                                         │
/// │  delay = max(0, interval - elapsed)                                    │
/// │  A restarted daemon keeps the cadence of the persisted last run.       │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    /// Interval between successful runs (seconds).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Cadence of the status refresh poll (seconds).
    #[serde(default = "default_status_poll")]
    pub status_poll_secs: u64,

    /// Window start used when no watermark has been persisted yet.
    #[serde(default)]
    pub initial_watermark: Option<DateTime<Utc>>,
}

fn default_interval() -> u64 {
    30 * 60
}

fn default_status_poll() -> u64 {
    30
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        ScheduleSettings {
            interval_secs: default_interval(),
            status_poll_secs: default_status_poll(),
            initial_watermark: None,
        }
    }
}

impl ScheduleSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn status_poll(&self) -> Duration {
        Duration::from_secs(self.status_poll_secs)
    }
}

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to `ledger.db` in the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub service: ServiceSettings,

    #[serde(default)]
    pub principal: PrincipalSettings,

    #[serde(default)]
    pub schedule: ScheduleSettings,

    #[serde(default)]
    pub database: DatabaseSettings,
}

impl SyncConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        let url = url::Url::parse(&self.service.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "Service URL must start with http:// or https://, got: {}",
                self.service.base_url
            )));
        }

        if self.service.page_size == 0 {
            return Err(SyncError::InvalidConfig(
                "page_size must be greater than 0".into(),
            ));
        }

        if self.schedule.interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "interval_secs must be greater than 0".into(),
            ));
        }

        if self.schedule.status_poll_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "status_poll_secs must be greater than 0".into(),
            ));
        }

        if self.principal.tenant_id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("principal.tenant_id is required".into()));
        }

        if self.principal.username.trim().is_empty() {
            return Err(SyncError::InvalidConfig("principal.username is required".into()));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary variable source.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("LEDGER_TAX_BASE_URL") {
            debug!(url = %url, "Overriding service URL from environment");
            self.service.base_url = url;
        }

        if let Some(size) = var("LEDGER_PAGE_SIZE") {
            match size.parse::<u64>() {
                Ok(n) => self.service.page_size = n,
                Err(_) => warn!(value = %size, "Ignoring invalid LEDGER_PAGE_SIZE"),
            }
        }

        if let Some(tenant) = var("LEDGER_TAX_TENANT") {
            debug!(tenant_id = %tenant, "Overriding tenant from environment");
            self.principal.tenant_id = tenant;
        }

        if let Some(username) = var("LEDGER_TAX_USERNAME") {
            self.principal.username = username;
        }

        if let Some(password) = var("LEDGER_TAX_PASSWORD") {
            debug!("Using tax service password from environment");
            self.principal.password = password;
        }

        if let Some(interval) = var("LEDGER_SYNC_INTERVAL_SECS") {
            match interval.parse::<u64>() {
                Ok(secs) => self.schedule.interval_secs = secs,
                Err(_) => warn!(value = %interval, "Ignoring invalid LEDGER_SYNC_INTERVAL_SECS"),
            }
        }

        if let Some(watermark) = var("LEDGER_INITIAL_WATERMARK") {
            match DateTime::parse_from_rfc3339(&watermark) {
                Ok(ts) => self.schedule.initial_watermark = Some(ts.with_timezone(&Utc)),
                Err(e) => warn!(value = %watermark, error = %e, "Ignoring invalid LEDGER_INITIAL_WATERMARK"),
            }
        }

        if let Some(path) = var("LEDGER_DB_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "ledger", "ledger-sync")
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Builds the principal the client authenticates as.
    pub fn principal(&self) -> SyncPrincipal {
        SyncPrincipal::new(
            self.principal.tenant_id.trim(),
            self.principal.username.trim(),
            self.principal.password.clone(),
        )
    }

    /// Database file, falling back to the platform data directory.
    pub fn database_path(&self) -> SyncResult<PathBuf> {
        if let Some(path) = &self.database.path {
            return Ok(path.clone());
        }

        Self::project_dirs()
            .map(|dirs| dirs.data_dir().join("ledger.db"))
            .ok_or_else(|| SyncError::InvalidConfig("No database path available".into()))
    }
}
