//! Loading and validation of settings.
//!
//! Values defined in the configuration file can be overridden by environment variables with the
//! prefix `LEDGER_FL` and `__` as the separator of nested keys, e.g. `LEDGER_FL_LEDGER__MODE`. An
//! example configuration file can be found in the `configs/` directory located in the repository
//! root.

use std::{
    fmt,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, ConfigError, Environment};
use serde::{
    de::{self, Deserializer, Visitor},
    Deserialize,
};
use thiserror::Error;
use tracing_subscriber::filter::EnvFilter;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::proof::VerificationMode;

#[derive(Error, Debug)]
/// An error related to loading and validation of settings.
pub enum SettingsError {
    #[error("configuration loading failed: {0}")]
    Loading(#[from] ConfigError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

#[derive(Debug, Validate, Deserialize)]
/// The combined settings.
///
/// Each section in the configuration file corresponds to the identically named settings field.
pub struct Settings {
    pub api: ApiSettings,
    pub log: LoggingSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    #[validate]
    pub training: TrainingSettings,
    #[validate]
    pub ledger: LedgerSettings,
}

impl Settings {
    /// Loads and validates the settings via a configuration file.
    ///
    /// # Errors
    /// Fails when the loading of the configuration file or its validation failed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let settings: Settings = Self::load(path)?;
        settings.validate()?;
        Ok(settings)
    }

    fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Config::new();
        config.merge(config::File::from(path.as_ref()))?;
        config.merge(Environment::with_prefix("ledger_fl").separator("__"))?;
        config.try_into()
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
/// REST API settings.
pub struct ApiSettings {
    /// The address to which the REST API should be bound.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [api]
    /// bind_address = "0.0.0.0:3000"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// LEDGER_FL_API__BIND_ADDRESS=127.0.0.1:3000
    /// ```
    pub bind_address: SocketAddr,
}

#[derive(Debug, Deserialize)]
/// Logging settings.
pub struct LoggingSettings {
    /// A comma-separated list of logging directives. More information about logging directives
    /// can be found [here].
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [log]
    /// filter = "info"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// LEDGER_FL_LOG__FILTER=info
    /// ```
    ///
    /// [here]: https://docs.rs/tracing-subscriber/0.2.17/tracing_subscriber/filter/struct.EnvFilter.html#directives
    #[serde(deserialize_with = "deserialize_env_filter")]
    pub filter: EnvFilter,
}

fn deserialize_env_filter<'de, D>(deserializer: D) -> Result<EnvFilter, D::Error>
where
    D: Deserializer<'de>,
{
    struct EnvFilterVisitor;

    impl<'de> Visitor<'de> for EnvFilterVisitor {
        type Value = EnvFilter;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "a valid tracing filter directive: https://docs.rs/tracing-subscriber/0.2.17/tracing_subscriber/filter/struct.EnvFilter.html#directives")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            EnvFilter::try_new(value)
                .map_err(|_| de::Error::invalid_value(serde::de::Unexpected::Str(value), &self))
        }
    }

    deserializer.deserialize_str(EnvFilterVisitor)
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
/// The storage backend.
pub enum StorageBackend {
    /// JSON files below [`StorageSettings::path`].
    File,
    /// Process memory. Everything is lost on shutdown.
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
/// Storage settings.
pub struct StorageSettings {
    /// The storage backend.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [storage]
    /// backend = "file"
    /// path = "data"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// LEDGER_FL_STORAGE__BACKEND=memory
    /// ```
    pub backend: StorageBackend,
    /// The root directory of the file backend.
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("data")
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            path: default_storage_path(),
        }
    }
}

#[derive(Debug, Validate, Deserialize, Clone, Copy, PartialEq)]
#[validate(schema(function = "validate_training"))]
/// Local training settings.
pub struct TrainingSettings {
    /// The number of gradient descent epochs. Must be at least `1`.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [training]
    /// epochs = 1000
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// LEDGER_FL_TRAINING__EPOCHS=1000
    /// ```
    #[serde(default = "TrainingSettings::default_epochs")]
    #[validate(range(min = 1))]
    pub epochs: u32,
    /// The learning rate. Must be positive.
    #[serde(default = "TrainingSettings::default_learning_rate")]
    pub learning_rate: f64,
    /// The number of epochs between two entries of the training history.
    #[serde(default = "TrainingSettings::default_history_interval")]
    #[validate(range(min = 1))]
    pub history_interval: u32,
}

impl TrainingSettings {
    fn default_epochs() -> u32 {
        1000
    }

    fn default_learning_rate() -> f64 {
        0.000_001
    }

    fn default_history_interval() -> u32 {
        100
    }

    fn validate_training(&self) -> Result<(), ValidationError> {
        if self.learning_rate > 0. && self.learning_rate.is_finite() {
            Ok(())
        } else {
            Err(ValidationError::new("learning rate must be positive"))
        }
    }
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            epochs: Self::default_epochs(),
            learning_rate: Self::default_learning_rate(),
            history_interval: Self::default_history_interval(),
        }
    }
}

/// A wrapper for validate derive.
fn validate_training(s: &TrainingSettings) -> Result<(), ValidationError> {
    s.validate_training()
}

#[derive(Debug, Validate, Deserialize, Clone)]
#[validate(schema(function = "validate_ledger"))]
/// Ledger settings.
pub struct LedgerSettings {
    /// How records are proven.
    ///
    /// `trust_all` accepts every record without consulting the ledger and must be set
    /// explicitly, there is no fallback to it.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [ledger]
    /// mode = "verified"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// LEDGER_FL_LEDGER__MODE=trust_all
    /// ```
    pub mode: VerificationMode,
    /// The deadline of a single ledger lookup in milliseconds.
    #[serde(default = "LedgerSettings::default_timeout_ms")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,
    /// The maximal number of concurrent ledger lookups of a batch.
    #[serde(default = "LedgerSettings::default_concurrency")]
    #[validate(range(min = 1))]
    pub concurrency: usize,
    /// The JSON-RPC endpoint. Required if the mode is `verified`.
    #[serde(default)]
    pub rpc: Option<RpcLedgerSettings>,
}

impl LedgerSettings {
    fn default_timeout_ms() -> u64 {
        5000
    }

    fn default_concurrency() -> usize {
        8
    }

    /// Gets the deadline of a single ledger lookup.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate_ledger(&self) -> Result<(), ValidationError> {
        match (self.mode, &self.rpc) {
            (VerificationMode::TrustAll, _) => Ok(()),
            (VerificationMode::Verified, Some(rpc)) => rpc.validate_rpc(),
            (VerificationMode::Verified, None) => Err(ValidationError::new(
                "verified mode requires the [ledger.rpc] settings",
            )),
        }
    }
}

/// A wrapper for validate derive.
fn validate_ledger(s: &LedgerSettings) -> Result<(), ValidationError> {
    s.validate_ledger()
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
/// Settings of the JSON-RPC ledger.
pub struct RpcLedgerSettings {
    /// The URL of the JSON-RPC endpoint.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [ledger.rpc]
    /// url = "http://127.0.0.1:8545"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// LEDGER_FL_LEDGER__RPC__URL=http://127.0.0.1:8545
    /// ```
    pub url: String,
    /// The address of the contract, 20 hex encoded bytes.
    pub contract_address: String,
    /// The selector of the contract getter `(uint256) -> string`, 4 hex encoded bytes.
    pub function_selector: String,
}

impl RpcLedgerSettings {
    fn validate_rpc(&self) -> Result<(), ValidationError> {
        match reqwest::Url::parse(&self.url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(()),
            _ => Err(ValidationError::new("invalid ledger url")),
        }
    }
}
