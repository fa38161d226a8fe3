//! # Ledger Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     PAWN_DB_PATH=/var/lib/pawn/ledger.db                               │
//! │     PAWN_BRANCH_ID=branch-002                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/pawn-ledger/ledger.toml (Linux)                          │
//! │     ~/Library/Application Support/com.pawn.ledger/ledger.toml (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/pawn/ledger.db"
//! max_connections = 5
//! busy_timeout_secs = 5
//!
//! [branch]
//! id = "branch-001"
//!
//! [loans]
//! min_loan_cents = 1000
//! max_loan_cents = 100000000
//! min_term_days = 1
//! max_term_days = 365
//! late_fee_period_days = 30
//! late_fee_grace_days = 0
//! confiscation_grace_days = 30
//!
//! [accounts]
//! cash = "1100"
//! bank = "1200"
//! loans_receivable = "1300"
//! inventory = "1400"
//! interest_income = "4100"
//! late_fee_income = "4200"
//! ```

use pawn_core::accounting::AccountMap;
use pawn_core::loan::LoanPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::pool::DbConfig;
use crate::service::LedgerSettings;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No config path available")]
    NoPath,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Sections
// =============================================================================

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to `ledger.db` in the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits on a locked database before `Conflict`.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

/// `[branch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchSettings {
    pub id: String,
}

impl Default for BranchSettings {
    fn default() -> Self {
        BranchSettings {
            id: "branch-001".to_string(),
        }
    }
}

// =============================================================================
// LedgerConfig
// =============================================================================

/// Complete ledger configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub branch: BranchSettings,

    #[serde(default)]
    pub loans: LoanPolicy,

    #[serde(default)]
    pub accounts: AccountMap,
}

impl LedgerConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (ledger.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading ledger config from file");
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
            warn!("Failed to load ledger config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoPath)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Ledger config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.branch.id.trim().is_empty() {
            return Err(ConfigError::Invalid("branch.id must not be empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        self.loans
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let accounts = [
            &self.accounts.cash,
            &self.accounts.bank,
            &self.accounts.loans_receivable,
            &self.accounts.inventory,
            &self.accounts.interest_income,
            &self.accounts.late_fee_income,
        ];
        if accounts.iter().any(|id| id.trim().is_empty()) {
            return Err(ConfigError::Invalid("every [accounts] entry must be set".into()));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `PAWN_*` overrides from a lookup function.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("PAWN_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(id) = lookup("PAWN_BRANCH_ID") {
            self.branch.id = id;
        }

        if let Some(max) = lookup("PAWN_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid PAWN_MAX_CONNECTIONS"),
            }
        }

        if let Some(days) = lookup("PAWN_CONFISCATION_GRACE_DAYS") {
            match days.parse::<i64>() {
                Ok(n) => self.loans.confiscation_grace_days = n,
                Err(_) => warn!(value = %days, "Ignoring invalid PAWN_CONFISCATION_GRACE_DAYS"),
            }
        }

        if let Some(days) = lookup("PAWN_LATE_FEE_PERIOD_DAYS") {
            match days.parse::<i64>() {
                Ok(n) => self.loans.late_fee_period_days = n,
                Err(_) => warn!(value = %days, "Ignoring invalid PAWN_LATE_FEE_PERIOD_DAYS"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "pawn", "ledger")
            .map(|dirs| dirs.config_dir().join("ledger.toml"))
    }

    /// Database file path, falling back to the platform data directory.
    pub fn database_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("com", "pawn", "ledger")
                .map(|dirs| dirs.data_dir().join("ledger.db"))
                .unwrap_or_else(|| PathBuf::from("ledger.db"))
        })
    }

    /// Pool configuration for [`crate::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path())
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_secs(self.database.busy_timeout_secs))
    }

    /// Settings shared by the ledger services.
    pub fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings {
            branch_id: self.branch.id.clone(),
            policy: self.loans.clone(),
            accounts: self.accounts.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = LedgerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.loans.late_fee_period_days, 30);
        assert_eq!(config.accounts.cash, "1100");
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: LedgerConfig = toml::from_str(
            r#"
            [branch]
            id = "north"

            [loans]
            confiscation_grace_days = 45
            "#,
        )
        .unwrap();
        assert_eq!(config.branch.id, "north");
        assert_eq!(config.loans.confiscation_grace_days, 45);
        assert_eq!(config.loans.max_term_days, 365);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PAWN_DB_PATH", "/tmp/pawn.db"),
            ("PAWN_BRANCH_ID", "south"),
            ("PAWN_MAX_CONNECTIONS", "not-a-number"),
            ("PAWN_LATE_FEE_PERIOD_DAYS", "7"),
        ]
        .into_iter()
        .collect();

        let mut config = LedgerConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database_path(), PathBuf::from("/tmp/pawn.db"));
        assert_eq!(config.branch.id, "south");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.loans.late_fee_period_days, 7);
    }

    #[test]
    fn test_validation_rejects_inverted_limits() {
        let mut config = LedgerConfig::default();
        config.loans.min_loan_cents = config.loans.max_loan_cents + 1;
        assert!(config.validate().is_err());

        let mut config = LedgerConfig::default();
        config.loans.late_fee_period_days = 0;
        assert!(config.validate().is_err());

        let mut config = LedgerConfig::default();
        config.accounts.inventory = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_sections() {
        let toml_str = toml::to_string_pretty(&LedgerConfig::default()).unwrap();
        assert!(toml_str.contains("[loans]"));
        assert!(toml_str.contains("[accounts]"));
    }
}
