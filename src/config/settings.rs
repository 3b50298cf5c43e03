//! Triage configuration structs: all tunables as operator-editable TOML.
//!
//! Every struct implements `Default` with values matching the original
//! deployment, so a missing or partial config file always yields a runnable
//! setup. Fields carry `#[serde(default)]` so operators only write the keys
//! they want to change.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable that points at an alternate config file.
pub const CONFIG_ENV_VAR: &str = "TRIAGE_CONFIG";

/// Default config file name searched in the working directory.
pub const CONFIG_FILE_NAME: &str = "triage.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one triage deployment.
///
/// Load with [`TriageConfig::load`], which searches `$TRIAGE_CONFIG`, then
/// `./triage.toml`, then falls back to built-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TriageConfig {
    /// Portal connection and credential lookup
    #[serde(default)]
    pub portal: PortalConfig,

    /// Feature layer location and field names
    #[serde(default)]
    pub layer: LayerConfig,

    /// Classification strategy selection and tuning
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

impl TriageConfig {
    /// Load configuration using the standard search order.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded triage config from {CONFIG_ENV_VAR}");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {CONFIG_ENV_VAR}, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{CONFIG_ENV_VAR} points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded triage config from ./{CONFIG_FILE_NAME}");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{CONFIG_FILE_NAME}, using defaults");
                }
            }
        }

        info!("No config file found, using built-in defaults");
        Self::default()
    }

    /// Load and parse a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Sanity-check the assembled configuration before a run starts.
    ///
    /// Returns every problem found, not just the first, so an operator can
    /// fix the file in one pass.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        if self.layer.url.trim().is_empty() {
            problems.push("layer.url is empty; set it to the feature layer REST endpoint".into());
        }
        if self.layer.page_size == 0 {
            problems.push("layer.page_size must be at least 1".into());
        }
        if self.layer.notes_field.trim().is_empty() {
            problems.push("layer.notes_field is empty".into());
        }
        if self.layer.flag_field.trim().is_empty() {
            problems.push("layer.flag_field is empty".into());
        }

        match self.classifier.strategy {
            Strategy::Keyword | Strategy::Staged
                if self.classifier.keyword.terms.iter().all(|t| t.trim().is_empty()) =>
            {
                problems.push(format!(
                    "classifier.keyword.terms is empty but strategy is '{}'",
                    self.classifier.strategy
                ));
            }
            _ => {}
        }

        if matches!(self.classifier.strategy, Strategy::Remote | Strategy::Staged) {
            if self.classifier.remote.endpoint.trim().is_empty() {
                problems.push("classifier.remote.endpoint is empty".into());
            }
            if self.classifier.remote.timeout_secs == 0 {
                problems.push("classifier.remote.timeout_secs must be at least 1".into());
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

/// Errors produced while loading a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ============================================================================
// Portal
// ============================================================================

/// Portal connection settings. Credentials stay in the environment; the
/// config only names the variables that hold them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Portal root URL used for token generation.
    #[serde(default = "default_portal_url")]
    pub url: String,

    /// Environment variable holding the portal username.
    #[serde(default = "default_username_env")]
    pub username_env: String,

    /// Environment variable holding the portal password.
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// Environment variable holding a pre-issued token. When set, token
    /// generation is skipped and expired tokens cannot be refreshed.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Requested token lifetime in minutes.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_minutes: u32,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            url: default_portal_url(),
            username_env: default_username_env(),
            password_env: default_password_env(),
            token_env: default_token_env(),
            token_ttl_minutes: default_token_ttl(),
        }
    }
}

fn default_portal_url() -> String {
    "https://www.arcgis.com".to_string()
}

fn default_username_env() -> String {
    "ARCGIS_USERNAME".to_string()
}

fn default_password_env() -> String {
    "ARCGIS_PASSWORD".to_string()
}

fn default_token_env() -> String {
    "ARCGIS_TOKEN".to_string()
}

fn default_token_ttl() -> u32 {
    60
}

// ============================================================================
// Layer
// ============================================================================

/// Feature layer location and the attribute fields the pipeline touches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerConfig {
    /// REST endpoint of the feature layer (ends in the layer index, e.g.
    /// `.../FeatureServer/0`).
    #[serde(default)]
    pub url: String,

    /// Field containing the citizen-submitted free text.
    #[serde(default = "default_notes_field")]
    pub notes_field: String,

    /// Unique identifier field, usually `objectid` or `fid`.
    #[serde(default = "default_objectid_field")]
    pub objectid_field: String,

    /// Field the pipeline writes the triage verdict into.
    #[serde(default = "default_flag_field")]
    pub flag_field: String,

    /// Records requested per query page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Add the flag field to the layer definition when it is missing.
    /// When disabled, a missing flag field aborts the run.
    #[serde(default = "default_create_flag_field")]
    pub create_flag_field: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            notes_field: default_notes_field(),
            objectid_field: default_objectid_field(),
            flag_field: default_flag_field(),
            page_size: default_page_size(),
            create_flag_field: default_create_flag_field(),
        }
    }
}

fn default_notes_field() -> String {
    "other_info_provided".to_string()
}

fn default_objectid_field() -> String {
    "objectid".to_string()
}

fn default_flag_field() -> String {
    "ai_flag".to_string()
}

fn default_page_size() -> u32 {
    200
}

fn default_create_flag_field() -> bool {
    true
}

// ============================================================================
// Classifier
// ============================================================================

/// Which classification strategy the run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Case-insensitive substring match against the alarm-term set.
    Keyword,
    /// Remote language-model call with a fixed triage instruction.
    Remote,
    /// Keyword first, remote escalation when no term matches.
    Staged,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Keyword => write!(f, "keyword"),
            Strategy::Remote => write!(f, "remote"),
            Strategy::Staged => write!(f, "staged"),
        }
    }
}

/// Classification strategy selection and per-strategy tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Strategy used for this run. Overridable from the CLI.
    #[serde(default = "default_strategy")]
    pub strategy: Strategy,

    #[serde(default)]
    pub keyword: KeywordConfig,

    #[serde(default)]
    pub remote: RemoteConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            keyword: KeywordConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

fn default_strategy() -> Strategy {
    Strategy::Keyword
}

/// Alarm terms for the keyword strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordConfig {
    /// Matched case-insensitively as substrings of the note text.
    #[serde(default = "default_alarm_terms")]
    pub terms: Vec<String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            terms: default_alarm_terms(),
        }
    }
}

fn default_alarm_terms() -> Vec<String> {
    [
        "trapped",
        "unconscious",
        "fire",
        "injured",
        "can't breathe",
        "emergency",
        "urgent",
        "help",
        "attack",
        "bleeding",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Remote classification service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Chat-completions endpoint of the classification service.
    #[serde(default = "default_remote_endpoint")]
    pub endpoint: String,

    /// Model identifier sent with each request.
    #[serde(default = "default_remote_model")]
    pub model: String,

    /// Environment variable holding the service API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout bound in seconds.
    #[serde(default = "default_remote_timeout")]
    pub timeout_secs: u64,

    /// Retry once when a request times out. Other failures never retry.
    #[serde(default = "default_retry_on_timeout")]
    pub retry_on_timeout: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: default_remote_endpoint(),
            model: default_remote_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_remote_timeout(),
            retry_on_timeout: default_retry_on_timeout(),
        }
    }
}

fn default_remote_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_remote_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_remote_timeout() -> u64 {
    20
}

fn default_retry_on_timeout() -> bool {
    true
}

// ============================================================================
// Tests
// ============================================================================
