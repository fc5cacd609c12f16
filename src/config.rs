use crate::statement::{FraudSet, Statement};
use crate::verifier::{ClaimVerifier, DEFAULT_TOLERANCE};
use anyhow::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Environment variable pointing at an explicit config file
pub const CONFIG_ENV_VAR: &str = "CLAIM_VERIFIER_CONFIG";

/// Where the submission log lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

/// Ground-truth inputs for the verifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Absolute amount tolerance (strict `<`)
    #[serde(default = "default_tolerance")]
    pub tolerance: Decimal,

    /// CSV with `reference,amount` headers; built-in statement when absent
    #[serde(default)]
    pub statement_path: Option<PathBuf>,

    /// JSON array of blocklisted references; built-in blocklist when absent
    #[serde(default)]
    pub blocklist_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub currency_symbol: String,
}

fn default_tolerance() -> Decimal {
    DEFAULT_TOLERANCE
}

/// Application configuration (TOML)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub verification: VerificationConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("claims.db"),
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            statement_path: None,
            blocklist_path: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            currency_symbol: "₹".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            verification: VerificationConfig::default(),
            server: ServerConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

/// Error types for configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file could not be read: {0}")]
    FileNotFound(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AppConfig {
    /// Load configuration from the standard locations, falling back to defaults
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            return Self::load_from_file(Path::new(&path));
        }

        let config_paths = [
            PathBuf::from("./config/claims.toml"),
            PathBuf::from("./claims.toml"),
        ];

        for path in config_paths {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!(path = ?path, "loaded configuration");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(content).map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let tolerance = self.verification.tolerance;
        if tolerance <= Decimal::ZERO {
            return Err(ConfigError::InvalidConfig(format!(
                "verification.tolerance must be a positive number, got {}",
                tolerance
            )));
        }

        if self.server.bind_address.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "server.bind_address must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the verifier from configured statement and blocklist
    pub fn build_verifier(&self) -> Result<ClaimVerifier> {
        let statement = match &self.verification.statement_path {
            Some(path) => Statement::from_csv(path)?,
            None => Statement::default_entries(),
        };

        let fraud_set = match &self.verification.blocklist_path {
            Some(path) => FraudSet::from_file(path)?,
            None => FraudSet::default_blocklist(),
        };

        info!(
            statement_entries = statement.len(),
            blocklisted = fraud_set.len(),
            tolerance = %self.verification.tolerance,
            "verifier ready"
        );

        Ok(ClaimVerifier::with_tolerance(
            statement,
            fraud_set,
            self.verification.tolerance,
        ))
    }
}
