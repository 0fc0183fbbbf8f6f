//! Configuration loader and validator for the CNAB reconciliation service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub bank: Bank,
    pub mailer: MailerConfig,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    /// Root under which processed files are archived, laid out as
    /// `{storage_root}/{contractor}/{year}/{month}/{filename}`.
    pub storage_root: String,
    pub poll_interval_ms: u64,
    pub max_backoff_seconds: u64,
}

/// Beneficiary bank account used for billet and shipping-file generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bank {
    /// Three-digit bank code (e.g. 237).
    pub code: u16,
    pub agency: u32,
    pub account: u32,
    /// Collection wallet ("carteira"), two digits.
    pub wallet: u8,
}

/// Outbound mail service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MailerConfig {
    pub endpoint: String,
    pub token: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.storage_root` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.storage_root.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.storage_root)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.storage_root.trim().is_empty() {
        return Err(ConfigError::Invalid("app.storage_root must be non-empty"));
    }
    if cfg.app.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_ms must be > 0"));
    }

    if cfg.bank.code == 0 || cfg.bank.code > 999 {
        return Err(ConfigError::Invalid("bank.code must be 1..=999"));
    }
    if cfg.bank.agency == 0 {
        return Err(ConfigError::Invalid("bank.agency must be non-zero"));
    }
    if cfg.bank.account == 0 {
        return Err(ConfigError::Invalid("bank.account must be non-zero"));
    }
    if cfg.bank.wallet == 0 || cfg.bank.wallet > 99 {
        return Err(ConfigError::Invalid("bank.wallet must be 1..=99"));
    }

    if cfg.mailer.endpoint.trim().is_empty() {
        return Err(ConfigError::Invalid("mailer.endpoint must be non-empty"));
    }

    Ok(())
}

/// Example YAML used by docs and tests.
pub fn example() -> &'static str {
    r#"app:
  storage_root: "./data/cnab"
  poll_interval_ms: 500
  max_backoff_seconds: 60

bank:
  code: 237
  agency: 1234
  account: 56789
  wallet: 9

mailer:
  endpoint: "https://mailer.internal/api/enqueue"
  token: "YOUR_MAILER_TOKEN"
"#
}
