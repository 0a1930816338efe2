//! Configuration management
//!
//! Settings live in `settings.json` inside the library directory:
//! ```json
//! {
//!   "registry": { "enabled": true, "baseUrl": "https://api.school.com/students",
//!                 "timeoutSecs": 10, "maxAttempts": 3 },
//!   "lending": { "loanPeriodDays": 14 }
//! }
//! ```
//! Keys this crate does not manage are kept when saving.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::result::{Error, Result};

pub const SETTINGS_FILE: &str = "settings.json";

pub const DEFAULT_REGISTRY_URL: &str = "https://api.school.com/students";

/// Overrides `registry.baseUrl`
pub const ENV_REGISTRY_URL: &str = "SHELF_REGISTRY_URL";

/// Overrides `registry.enabled`
pub const ENV_REGISTRY_ENABLED: &str = "SHELF_REGISTRY_ENABLED";

/// Longest accepted loan period, ten years
pub const MAX_LOAN_PERIOD_DAYS: i64 = 3650;

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    registry: RegistrySettings,
    #[serde(default)]
    lending: LendingSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Student registry client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySettings {
    /// When off, borrowing skips registry verification entirely
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_registry_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LendingSettings {
    #[serde(default = "default_loan_period_days")]
    pub loan_period_days: i64,
}

fn default_registry_url() -> String {
    DEFAULT_REGISTRY_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_loan_period_days() -> i64 {
    14
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_registry_url(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for LendingSettings {
    fn default() -> Self {
        Self {
            loan_period_days: default_loan_period_days(),
        }
    }
}

impl RegistrySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl LendingSettings {
    /// Loan period, clamped to `1..=MAX_LOAN_PERIOD_DAYS` days
    pub fn loan_period(&self) -> chrono::Duration {
        chrono::Duration::days(self.loan_period_days.clamp(1, MAX_LOAN_PERIOD_DAYS))
    }
}

/// Library configuration (typed view of settings.json plus env overrides)
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub registry: RegistrySettings,
    pub lending: LendingSettings,
    // Keep the raw settings for preservation when saving
    raw: SettingsFile,
}

impl Config {
    /// Load settings from the library directory.
    ///
    /// A missing file yields defaults; a malformed one is a `Config` error.
    /// `SHELF_REGISTRY_URL` and `SHELF_REGISTRY_ENABLED` override the file.
    pub fn load(shelf_dir: &Path) -> Result<Self> {
        let mut config = Self::load_file(shelf_dir)?;
        config.apply_overrides(
            std::env::var(ENV_REGISTRY_URL).ok(),
            std::env::var(ENV_REGISTRY_ENABLED).ok(),
        );
        config.validate()?;
        Ok(config)
    }

    fn load_file(shelf_dir: &Path) -> Result<Self> {
        let settings_path = shelf_dir.join(SETTINGS_FILE);

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str(&content).map_err(|e| {
                Error::Config(format!("{} is not valid: {}", settings_path.display(), e))
            })?
        } else {
            SettingsFile::default()
        };

        Ok(Self {
            registry: raw.registry.clone(),
            lending: raw.lending.clone(),
            raw,
        })
    }

    fn apply_overrides(&mut self, url: Option<String>, enabled: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.registry.base_url = url.trim().to_string();
        }
        if let Some(flag) = enabled.as_deref().and_then(parse_flag) {
            self.registry.enabled = flag;
        }
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.registry.base_url).map_err(|e| {
            Error::Config(format!(
                "registry.baseUrl '{}' is not a URL: {}",
                self.registry.base_url, e
            ))
        })?;
        if self.registry.timeout_secs == 0 {
            return Err(Error::Config("registry.timeoutSecs must be at least 1".into()));
        }
        if self.registry.max_attempts == 0 {
            return Err(Error::Config("registry.maxAttempts must be at least 1".into()));
        }
        if self.lending.loan_period_days < 1 {
            return Err(Error::Config("lending.loanPeriodDays must be at least 1".into()));
        }
        if self.lending.loan_period_days > MAX_LOAN_PERIOD_DAYS {
            return Err(Error::Config(format!(
                "lending.loanPeriodDays must be at most {}",
                MAX_LOAN_PERIOD_DAYS
            )));
        }
        Ok(())
    }

    /// Save settings, preserving keys this crate doesn't manage
    pub fn save(&self, shelf_dir: &Path) -> Result<()> {
        let settings_path = shelf_dir.join(SETTINGS_FILE);

        let mut settings = self.raw.clone();
        settings.registry = self.registry.clone();
        settings.lending = self.lending.clone();

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
