use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AssentError, Result};
use crate::types::IntentKind;

/// Top-level configuration for the confirmation subsystem.
///
/// Loaded from `~/.assent/config.toml` by default. Every section falls back
/// to its defaults when missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssentConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub intents: IntentConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
}

impl AssentConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AssentConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AssentError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.assent/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// SQLite settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file name, relative to `general.data_dir`.
    pub db_file: String,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_file: "assent.db".to_string(),
            busy_timeout_ms: 5_000,
        }
    }
}

/// Intent lifetime and maintenance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentConfig {
    /// TTL applied when no per-kind override is set.
    pub default_ttl_secs: i64,
    pub email_send_ttl_secs: Option<i64>,
    pub declaration_create_ttl_secs: Option<i64>,
    pub payment_execute_ttl_secs: Option<i64>,
    /// Lifetime of a numbered disambiguation prompt.
    pub choice_ttl_secs: i64,
    /// Period of the background expiry sweep.
    pub sweep_interval_secs: u64,
    /// Age after which an `executing` row is reported as stuck.
    pub stuck_executing_after_secs: i64,
    /// Move stuck rows to `cancelled` instead of only reporting them.
    pub cancel_stuck_executing: bool,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            email_send_ttl_secs: None,
            declaration_create_ttl_secs: None,
            payment_execute_ttl_secs: Some(180),
            choice_ttl_secs: 300,
            sweep_interval_secs: 60,
            stuck_executing_after_secs: 900,
            cancel_stuck_executing: false,
        }
    }
}

impl IntentConfig {
    /// TTL for a kind, honouring per-kind overrides.
    pub fn ttl_for(&self, kind: IntentKind) -> i64 {
        let specific = match kind {
            IntentKind::EmailSend => self.email_send_ttl_secs,
            IntentKind::DeclarationCreate => self.declaration_create_ttl_secs,
            IntentKind::PaymentExecute => self.payment_execute_ttl_secs,
        };
        specific.unwrap_or(self.default_ttl_secs)
    }
}

/// Preview rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Maximum preview length in characters, ellipsis included.
    pub max_chars: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_chars: crate::preview::DEFAULT_MAX_PREVIEW_CHARS,
        }
    }
}
