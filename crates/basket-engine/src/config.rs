//! # Engine Configuration
//!
//! Configuration management for the cart engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     BASKET_DB_PATH=/var/lib/basket/basket.db                           │
//! │     BASKET_RESERVATION_TTL_HOURS=12                                    │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/basket/basket.toml (Linux)                               │
//! │     ~/Library/Application Support/com.basket.basket/basket.toml (macOS)│
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     24 h reservations, reaper off, 100 lines × 999 per line            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # basket.toml
//! [database]
//! path = "basket.db"
//! max_connections = 5
//!
//! [reservations]
//! ttl_hours = 24
//! reaper_enabled = true
//! reaper_interval_secs = 300
//!
//! [cart]
//! max_lines = 100
//! max_line_quantity = 999
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use basket_core::{CartLimits, MAX_CART_LINES, MAX_LINE_QUANTITY, RESERVATION_TTL_HOURS};
use basket_db::DbConfig;

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Database Settings
// =============================================================================

/// Where the SQLite database lives and how many connections to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database file. `":memory:"` for a throwaway database.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("basket.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Reservation Settings
// =============================================================================

/// Reservation lifetime and the optional expiry sweep.
///
/// Expired reservations stop counting whether or not the reaper runs;
/// the reaper only deletes the rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationSettings {
    /// Hours a reservation counts after it was last written.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,

    #[serde(default)]
    pub reaper_enabled: bool,

    /// Seconds between reaper sweeps.
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_secs: u64,
}

fn default_ttl_hours() -> i64 {
    RESERVATION_TTL_HOURS
}

fn default_reaper_interval() -> u64 {
    300
}

impl Default for ReservationSettings {
    fn default() -> Self {
        ReservationSettings {
            ttl_hours: default_ttl_hours(),
            reaper_enabled: false,
            reaper_interval_secs: default_reaper_interval(),
        }
    }
}

// =============================================================================
// Cart Settings
// =============================================================================

/// Cart size limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSettings {
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,

    /// Gram lines are measured in kilograms against this.
    #[serde(default = "default_max_line_quantity")]
    pub max_line_quantity: i64,
}

fn default_max_lines() -> usize {
    MAX_CART_LINES
}

fn default_max_line_quantity() -> i64 {
    MAX_LINE_QUANTITY
}

impl Default for CartSettings {
    fn default() -> Self {
        CartSettings {
            max_lines: default_max_lines(),
            max_line_quantity: default_max_line_quantity(),
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub reservations: ReservationSettings,

    #[serde(default)]
    pub cart: CartSettings,
}

impl EngineConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config on a throwaway in-memory database.
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.database.path = PathBuf::from(":memory:");
        config.database.max_connections = 1;
        config
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (basket.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
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
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a TOML document. Missing sections and keys take defaults.
    pub fn from_toml(contents: &str) -> EngineResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::Config("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(EngineError::Config("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(EngineError::Config(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.reservations.ttl_hours <= 0 {
            return Err(EngineError::Config(
                "reservations.ttl_hours must be greater than 0".into(),
            ));
        }

        if self.reservations.reaper_enabled && self.reservations.reaper_interval_secs == 0 {
            return Err(EngineError::Config(
                "reservations.reaper_interval_secs must be greater than 0".into(),
            ));
        }

        if self.cart.max_lines == 0 {
            return Err(EngineError::Config("cart.max_lines must be greater than 0".into()));
        }

        if self.cart.max_line_quantity <= 0 {
            return Err(EngineError::Config(
                "cart.max_line_quantity must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies `BASKET_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Applies overrides from `lookup`. Unparseable values are logged and
    /// skipped.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("BASKET_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(raw) = lookup("BASKET_DB_MAX_CONNECTIONS") {
            match raw.parse() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %raw, "Ignoring invalid BASKET_DB_MAX_CONNECTIONS"),
            }
        }

        if let Some(raw) = lookup("BASKET_RESERVATION_TTL_HOURS") {
            match raw.parse() {
                Ok(hours) => {
                    debug!(hours, "Overriding reservation TTL from environment");
                    self.reservations.ttl_hours = hours;
                }
                Err(_) => warn!(value = %raw, "Ignoring invalid BASKET_RESERVATION_TTL_HOURS"),
            }
        }

        if let Some(raw) = lookup("BASKET_REAPER_ENABLED") {
            match raw.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.reservations.reaper_enabled = true,
                "0" | "false" | "no" | "off" => self.reservations.reaper_enabled = false,
                _ => warn!(value = %raw, "Ignoring invalid BASKET_REAPER_ENABLED"),
            }
        }

        if let Some(raw) = lookup("BASKET_REAPER_INTERVAL_SECS") {
            match raw.parse() {
                Ok(secs) => self.reservations.reaper_interval_secs = secs,
                Err(_) => warn!(value = %raw, "Ignoring invalid BASKET_REAPER_INTERVAL_SECS"),
            }
        }

        if let Some(raw) = lookup("BASKET_CART_MAX_LINES") {
            match raw.parse() {
                Ok(n) => self.cart.max_lines = n,
                Err(_) => warn!(value = %raw, "Ignoring invalid BASKET_CART_MAX_LINES"),
            }
        }

        if let Some(raw) = lookup("BASKET_CART_MAX_LINE_QUANTITY") {
            match raw.parse() {
                Ok(n) => self.cart.max_line_quantity = n,
                Err(_) => warn!(value = %raw, "Ignoring invalid BASKET_CART_MAX_LINE_QUANTITY"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "basket", "basket")
            .map(|dirs| dirs.config_dir().join("basket.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Reservation lifetime.
    pub fn reservation_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.reservations.ttl_hours)
    }

    /// Interval between reaper sweeps.
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reservations.reaper_interval_secs)
    }

    /// Cart limits for guest and signed-in carts.
    pub fn cart_limits(&self) -> CartLimits {
        CartLimits {
            max_lines: self.cart.max_lines,
            max_line_quantity: self.cart.max_line_quantity,
        }
    }

    /// Database pool configuration.
    pub fn db_config(&self) -> DbConfig {
        if self.database.path.as_os_str() == ":memory:" {
            return DbConfig::in_memory();
        }
        DbConfig::new(&self.database.path).max_connections(self.database.max_connections)
    }
}
