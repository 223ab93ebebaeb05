use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::AgentSettings;

/// Environment variable that overrides the default config location.
pub const CONFIG_ENV_VAR: &str = "HELPDESK_CONFIG";

/// Top-level configuration loaded from `~/.helpdesk-agent/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub patrol: PatrolConfig,
    #[serde(default)]
    pub kpi: KpiConfig,
}

impl Config {
    /// Load config from `$HELPDESK_CONFIG` or `~/.helpdesk-agent/config.toml`,
    /// falling back to defaults when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not expressible via type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.general.validate()?;
        self.store.validate()?;
        self.agent.validate()?;
        self.worker.validate()?;
        self.patrol.validate()?;
        if self.kpi.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "kpi.interval_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
            if !explicit.trim().is_empty() {
                return PathBuf::from(explicit);
            }
        }
        home_dir().join(".helpdesk-agent").join("config.toml")
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => home_dir().join(rest),
        None => Path::new(path).to_path_buf(),
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `pretty` or `json`.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl GeneralConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.log_format.as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "general.log_format must be 'pretty' or 'json', got '{other}'"
            ))),
        }
    }

    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }
}

fn default_service_name() -> String {
    "helpdesk-agent".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
    /// Bounded retries when another worker wins the claim race.
    #[serde(default = "default_claim_attempts")]
    pub claim_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            claim_attempts: default_claim_attempts(),
        }
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.path.trim().is_empty() {
            return Err(ConfigError::Validation("store.path must not be empty".into()));
        }
        if self.claim_attempts == 0 {
            return Err(ConfigError::Validation(
                "store.claim_attempts must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// The database path with `~/` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        expand_home(&self.path)
    }
}

fn default_store_path() -> String {
    "~/.helpdesk-agent/helpdesk.db".into()
}
fn default_claim_attempts() -> u32 {
    3
}

/// Seed values for the global agent settings row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_true")]
    pub enable_auto_assign: bool,
    #[serde(default = "default_true")]
    pub enable_auto_ask_clarifying_questions: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_threshold(),
            enable_auto_assign: true,
            enable_auto_ask_clarifying_questions: true,
        }
    }
}

impl AgentConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Validation(format!(
                "agent.confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }

    pub fn settings(&self) -> AgentSettings {
        AgentSettings {
            confidence_threshold: self.confidence_threshold,
            enable_auto_assign: self.enable_auto_assign,
            enable_auto_ask_clarifying_questions: self.enable_auto_ask_clarifying_questions,
        }
    }
}

fn default_threshold() -> f64 {
    0.7
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent driving loops in this process.
    #[serde(default = "default_worker_count")]
    pub count: u32,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl WorkerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.count == 0 {
            return Err(ConfigError::Validation(
                "worker.count must be greater than zero".into(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "worker.tick_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn default_worker_count() -> u32 {
    1
}
fn default_tick_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatrolConfig {
    #[serde(default = "default_patrol_interval")]
    pub interval_secs: u64,
    /// A ticket in `Processing` longer than this is considered stuck.
    #[serde(default = "default_processing_timeout")]
    pub processing_timeout_secs: u64,
    /// Move stuck tickets back to `Queued` instead of only reporting them.
    #[serde(default)]
    pub requeue_stale: bool,
}

impl Default for PatrolConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_patrol_interval(),
            processing_timeout_secs: default_processing_timeout(),
            requeue_stale: false,
        }
    }
}

/// Upper bound for `patrol.processing_timeout_secs` (one year).
pub const MAX_PROCESSING_TIMEOUT_SECS: u64 = 365 * 24 * 60 * 60;

impl PatrolConfig {
    /// The stuck-ticket timeout, saturating at [`MAX_PROCESSING_TIMEOUT_SECS`].
    pub fn processing_timeout(&self) -> chrono::Duration {
        let secs = self.processing_timeout_secs.min(MAX_PROCESSING_TIMEOUT_SECS) as i64;
        chrono::Duration::seconds(secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 || self.processing_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "patrol.interval_secs and patrol.processing_timeout_secs must be greater than zero"
                    .into(),
            ));
        }
        if self.processing_timeout_secs > MAX_PROCESSING_TIMEOUT_SECS {
            return Err(ConfigError::Validation(format!(
                "patrol.processing_timeout_secs must be at most {MAX_PROCESSING_TIMEOUT_SECS}, got {}",
                self.processing_timeout_secs
            )));
        }
        Ok(())
    }
}

fn default_patrol_interval() -> u64 {
    60
}
fn default_processing_timeout() -> u64 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiConfig {
    #[serde(default = "default_kpi_interval")]
    pub interval_secs: u64,
}

impl Default for KpiConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_kpi_interval(),
        }
    }
}

fn default_kpi_interval() -> u64 {
    300
}
