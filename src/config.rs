//! Registry configuration
//!
//! Loaded from TOML with every field defaulted, then overridden from the
//! environment. Secrets never live in the file: the file names the
//! environment variable that holds them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Bounds applied to `requests_per_minute`
pub const MIN_RPM: u32 = 10;
pub const MAX_RPM: u32 = 600;
/// Upper bound applied to `max_page_size`
pub const MAX_PAGE_SIZE_CEILING: usize = 200;
/// Upper bound for submission age and future skew (one day)
pub const MAX_SUBMISSION_WINDOW_SECS: u64 = 86_400;

/// Main registry configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RegistryConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub data: DataSection,
    #[serde(default)]
    pub upstream: UpstreamSection,
    #[serde(default)]
    pub submission: SubmissionSection,
}

/// HTTP query surface settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Prefix for agent routes (trailing slash ignored)
    #[serde(default = "default_api_base_path")]
    pub api_base_path: String,
    /// Per-client requests allowed per one-minute window
    #[serde(default = "default_rpm")]
    pub requests_per_minute: u32,
    /// Largest page size a client may request
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    /// Reject unknown tag slugs instead of dropping them
    #[serde(default = "default_strict_tags")]
    pub strict_tags: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            api_base_path: default_api_base_path(),
            requests_per_minute: default_rpm(),
            max_page_size: default_max_page_size(),
            strict_tags: default_strict_tags(),
        }
    }
}

fn default_port() -> u16 {
    8787
}

fn default_api_base_path() -> String {
    "/api".to_string()
}

fn default_rpm() -> u32 {
    120
}

fn default_max_page_size() -> usize {
    50
}

fn default_strict_tags() -> bool {
    true
}

/// Which storage backend serves the catalog
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DataMode {
    /// Embedded SQLite database
    #[default]
    Local,
    /// Hosted PostgREST backend
    Online,
    /// Read-only static seed data
    Seed,
}

impl DataMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataMode::Local => "local",
            DataMode::Online => "online",
            DataMode::Seed => "seed",
        }
    }
}

impl FromStr for DataMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(DataMode::Local),
            "online" => Ok(DataMode::Online),
            "seed" => Ok(DataMode::Seed),
            other => Err(ConfigError::InvalidConfig(format!(
                "data mode '{other}' must be one of local, online, seed"
            ))),
        }
    }
}

/// Storage settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DataSection {
    #[serde(default)]
    pub mode: DataMode,
    /// SQLite file; in-memory when unset
    pub database_path: Option<PathBuf>,
}

/// Hosted backend settings, required in online mode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpstreamSection {
    /// Base URL of the hosted backend
    pub url: Option<String>,
    /// Environment variable containing the anonymous API key
    #[serde(default = "default_anon_key_env")]
    pub anon_key_env: String,
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            url: None,
            anon_key_env: default_anon_key_env(),
        }
    }
}

fn default_anon_key_env() -> String {
    "REGISTRY_UPSTREAM_ANON_KEY".to_string()
}

/// Signed submission acceptance rules
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionSection {
    /// Oldest accepted message timestamp, in seconds before now
    #[serde(default = "default_max_message_age")]
    pub max_message_age_secs: u64,
    /// Tolerated clock skew for timestamps ahead of now
    #[serde(default = "default_max_future_skew")]
    pub max_future_skew_secs: u64,
    /// Maximum tags per listing
    #[serde(default = "default_max_tags")]
    pub max_tags: usize,
}

impl Default for SubmissionSection {
    fn default() -> Self {
        Self {
            max_message_age_secs: default_max_message_age(),
            max_future_skew_secs: default_max_future_skew(),
            max_tags: default_max_tags(),
        }
    }
}

fn default_max_message_age() -> u64 {
    600
}

fn default_max_future_skew() -> u64 {
    60
}

fn default_max_tags() -> usize {
    4
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RegistryConfig {
    /// Load configuration from a TOML file, apply environment overrides and validate
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: RegistryConfig = toml::from_str(&content)?;
        config.finish(|name| std::env::var(name).ok())
    }

    /// Defaults plus environment overrides, for running without a file
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().finish(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, then normalise and validate
    pub fn finish<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.apply_overrides(lookup)?;
        self.normalize();
        self.validate()?;
        Ok(self)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("REGISTRY_PORT") {
            self.server.port = parse_override("REGISTRY_PORT", &port)?;
        }
        if let Some(base) = lookup("REGISTRY_API_BASE_PATH") {
            self.server.api_base_path = base;
        }
        if let Some(rpm) = lookup("REGISTRY_RPM") {
            self.server.requests_per_minute = parse_override("REGISTRY_RPM", &rpm)?;
        }
        if let Some(limit) = lookup("REGISTRY_MAX_LIMIT") {
            self.server.max_page_size = parse_override("REGISTRY_MAX_LIMIT", &limit)?;
        }
        if let Some(strict) = lookup("REGISTRY_STRICT_TAGS") {
            self.server.strict_tags = strict.trim().eq_ignore_ascii_case("true");
        }
        if let Some(mode) = lookup("REGISTRY_DATA_MODE") {
            self.data.mode = mode.parse()?;
        }
        if let Some(path) = lookup("REGISTRY_DATABASE_PATH") {
            self.data.database_path = Some(PathBuf::from(path));
        }
        if let Some(url) = lookup("REGISTRY_UPSTREAM_URL") {
            self.upstream.url = Some(url);
        }
        Ok(())
    }

    fn normalize(&mut self) {
        self.server.requests_per_minute = self.server.requests_per_minute.clamp(MIN_RPM, MAX_RPM);
        self.server.max_page_size = self.server.max_page_size.clamp(1, MAX_PAGE_SIZE_CEILING);

        let base = self.server.api_base_path.trim().trim_end_matches('/');
        self.server.api_base_path = if base.is_empty() || base.starts_with('/') {
            base.to_string()
        } else {
            format!("/{base}")
        };
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.data.mode == DataMode::Online {
            match self.upstream.url.as_deref() {
                Some(url) if url::Url::parse(url).is_ok() => {}
                Some(url) => {
                    return Err(ConfigError::InvalidConfig(format!(
                        "upstream url '{url}' is not a valid URL"
                    )))
                }
                None => {
                    return Err(ConfigError::InvalidConfig(
                        "online data mode requires [upstream] url".to_string(),
                    ))
                }
            }
        }
        for (name, secs) in [
            ("submission.max_message_age_secs", self.submission.max_message_age_secs),
            ("submission.max_future_skew_secs", self.submission.max_future_skew_secs),
        ] {
            if secs > MAX_SUBMISSION_WINDOW_SECS {
                return Err(ConfigError::InvalidConfig(format!(
                    "{name} must be at most {MAX_SUBMISSION_WINDOW_SECS}, got {secs}"
                )));
            }
        }
        if self.submission.max_message_age_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "submission.max_message_age_secs must be at least 1".to_string(),
            ));
        }
        if self.submission.max_tags == 0 {
            return Err(ConfigError::InvalidConfig(
                "submission.max_tags must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Anonymous key for the hosted backend
    pub fn get_upstream_anon_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.upstream.anon_key_env)
            .map_err(|_| ConfigError::EnvVarNotFound(self.upstream.anon_key_env.clone()))
    }
}

fn parse_override<T: FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidConfig(format!("{name}='{raw}' is not a valid value")))
}
