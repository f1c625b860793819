//! Configuration management for newswatch
//!
//! All configuration is loaded from `./config/newswatch.toml`.
//! The embedded template is the single source of defaults; `--init` writes it out.
//!
//! `${VAR}` placeholders anywhere in the file are replaced with the matching
//! environment variable before parsing. Unset variables leave the placeholder
//! in place so validation can name the field that still needs a value.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::{MonitorError, MonitorResult};

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/newswatch.toml";

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = include_str!("../config/newswatch.toml");

/// The search API serves no results past the 100th.
pub const MAX_SEARCH_RESULTS: usize = 100;

/// Ten years.
pub const MAX_DAYS_BACK: u32 = 3650;

static ENV_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"));

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid URL in '{field}': {url}")]
    InvalidUrl { field: String, url: String },

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Configuration field '{field}' must be greater than zero")]
    ZeroValue { field: String },

    #[error("Configuration field '{field}' still contains an unresolved placeholder: {value}")]
    UnresolvedPlaceholder { field: String, value: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub search: SearchConfig,
    pub extractor: ExtractorConfig,
    pub registry: RegistryConfig,
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Page fetching
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub per_host_interval_ms: u64,
    /// Sent with every page request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

/// News search provider
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub keywords: Vec<String>,
    pub days_back: u32,
    pub max_results: usize,
    pub locale: String,
    pub pacing_interval_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub endpoint: String,
    pub api_key_env: String,
    pub engine_id_env: String,
    #[serde(default)]
    pub blocked_domains: Vec<String>,
}

/// LLM-backed entity extractor
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractorConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    /// Merchant table queried through the BigQuery REST API
    BigQuery,
    /// Local `user_id,merchant_name` CSV export
    Csv,
}

/// Merchant registry
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    pub backend: RegistryBackend,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub table: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub access_token_env: String,
    #[serde(default)]
    pub token_command: Vec<String>,
    #[serde(default)]
    pub csv_path: PathBuf,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertBackend {
    Slack,
    Stdout,
}

/// Alert channel
#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    pub backend: AlertBackend,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Entity denylists
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterConfig {
    /// Replaces the built-in tables when set
    #[serde(default)]
    pub denylist_path: Option<PathBuf>,
    /// Appended to whichever tables are loaded
    #[serde(default)]
    pub extra: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_page_concurrency")]
    pub page_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_concurrency: default_page_concurrency(),
        }
    }
}

fn default_page_concurrency() -> usize {
    1
}

fn default_timeout_secs() -> u64 {
    20
}

/// Replace `${VAR}` with the value of `VAR`, leaving unset variables untouched.
pub fn substitute_env(content: &str) -> String {
    ENV_PLACEHOLDER
        .replace_all(content, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

impl AppConfig {
    /// Load and validate configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read_from_path(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration file without validating it.
    ///
    /// Used when command-line overrides still have to be applied.
    pub fn read_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(&substitute_env(content))?;
        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        // HTTP
        if self.http.request_timeout_secs == 0 {
            return Err(zero("http.request_timeout_secs"));
        }
        if self.http.max_body_bytes == 0 {
            return Err(zero("http.max_body_bytes"));
        }

        // Search
        if self.search.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(empty("search.keywords"));
        }
        if self.search.max_results == 0 {
            return Err(zero("search.max_results"));
        }
        if self.search.max_results > MAX_SEARCH_RESULTS {
            return Err(ConfigError::InvalidValue {
                field: "search.max_results".to_string(),
                reason: format!("{} exceeds the provider limit of {}", self.search.max_results, MAX_SEARCH_RESULTS),
            });
        }
        if self.search.days_back > MAX_DAYS_BACK {
            return Err(ConfigError::InvalidValue {
                field: "search.days_back".to_string(),
                reason: format!("{} is more than {} days", self.search.days_back, MAX_DAYS_BACK),
            });
        }
        if self.search.timeout_secs == 0 {
            return Err(zero("search.timeout_secs"));
        }
        validate_url("search.endpoint", &self.search.endpoint)?;
        require("search.api_key_env", &self.search.api_key_env)?;
        require("search.engine_id_env", &self.search.engine_id_env)?;

        // Extractor
        validate_url("extractor.endpoint", &self.extractor.endpoint)?;
        require("extractor.model", &self.extractor.model)?;
        require("extractor.api_key_env", &self.extractor.api_key_env)?;
        if self.extractor.timeout_secs == 0 {
            return Err(zero("extractor.timeout_secs"));
        }
        if !(0.0..=2.0).contains(&self.extractor.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "extractor.temperature".to_string(),
                reason: format!("{} is outside 0.0..=2.0", self.extractor.temperature),
            });
        }

        // Registry
        match self.registry.backend {
            RegistryBackend::BigQuery => {
                validate_url("registry.endpoint", &self.registry.endpoint)?;
                require("registry.project_id", &self.registry.project_id)?;
                require("registry.table", &self.registry.table)?;
                if self.registry.timeout_secs == 0 {
                    return Err(zero("registry.timeout_secs"));
                }
                if self.registry.access_token_env.trim().is_empty() && self.registry.token_command.is_empty() {
                    return Err(empty("registry.access_token_env or registry.token_command"));
                }
            }
            RegistryBackend::Csv => {
                if self.registry.csv_path.as_os_str().is_empty() {
                    return Err(empty("registry.csv_path"));
                }
            }
        }

        // Alerts
        if self.alerts.backend == AlertBackend::Slack {
            validate_url("alerts.endpoint", &self.alerts.endpoint)?;
            require("alerts.channel", &self.alerts.channel)?;
            require("alerts.token_env", &self.alerts.token_env)?;
            if self.alerts.timeout_secs == 0 {
                return Err(zero("alerts.timeout_secs"));
            }
        }

        // Pipeline
        if self.pipeline.page_concurrency == 0 {
            return Err(zero("pipeline.page_concurrency"));
        }

        Ok(())
    }

    /// Write the bundled default configuration to `path`
    pub fn create_default_config_at(path: &Path) -> Result<PathBuf, ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }

    /// Check if stdin is a TTY (interactive terminal)
    pub fn is_interactive() -> bool {
        io::stdin().is_terminal()
    }

    /// Prompt user to create default config (only in interactive mode)
    pub fn prompt_create_config(path: &Path) -> Result<Option<PathBuf>, ConfigError> {
        if !Self::is_interactive() {
            return Ok(None);
        }

        print!("Configuration file not found. Create default config? [Y/n] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input.is_empty() || input == "y" || input == "yes" {
            Self::create_default_config_at(path).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Read a credential from the environment. A missing value is an authentication failure.
pub fn read_secret(env_var: &str) -> MonitorResult<String> {
    match std::env::var(env_var) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(MonitorError::Authentication(format!(
            "environment variable {} is not set",
            env_var
        ))),
    }
}

fn zero(field: &str) -> ConfigError {
    ConfigError::ZeroValue {
        field: field.to_string(),
    }
}

fn empty(field: &str) -> ConfigError {
    ConfigError::EmptyRequired {
        field: field.to_string(),
    }
}

fn require(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(empty(field));
    }
    if ENV_PLACEHOLDER.is_match(value) {
        return Err(ConfigError::UnresolvedPlaceholder {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

fn validate_url(field: &str, value: &str) -> Result<(), ConfigError> {
    require(field, value)?;
    match url::Url::parse(value) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => Ok(()),
        _ => Err(ConfigError::InvalidUrl {
            field: field.to_string(),
            url: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFLINE_CONFIG: &str = r#"
[http]
request_timeout_secs = 20

[search]
keywords = ["fraude"]
days_back = 3
max_results = 5
locale = "pt"
pacing_interval_ms = 0
endpoint = "http://127.0.0.1:9/search"
api_key_env = "TEST_SEARCH_KEY"
engine_id_env = "TEST_SEARCH_CX"

[extractor]
endpoint = "http://127.0.0.1:9/v1"
model = "test-model"
api_key_env = "TEST_LLM_KEY"

[registry]
backend = "csv"
csv_path = "merchants.csv"

[alerts]
backend = "stdout"
"#;

    #[test]
    fn test_default_config_parses() {
        let config: Result<AppConfig, _> = toml::from_str(DEFAULT_CONFIG);
        assert!(config.is_ok(), "Default config should parse: {:?}", config.err());
    }

    #[test]
    fn test_default_config_values() {
        let config: AppConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.http.request_timeout_secs, 20);
        assert_eq!(config.http.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(config.search.days_back, 1);
        assert_eq!(config.search.max_results, 10);
        assert_eq!(config.search.pacing_interval_ms, 2000);
        assert_eq!(config.search.blocked_domains.len(), 6);
        assert_eq!(config.registry.backend, RegistryBackend::BigQuery);
        assert_eq!(config.alerts.backend, AlertBackend::Slack);
        assert_eq!(config.pipeline.page_concurrency, 1);
        assert!(config.http.headers.contains_key("User-Agent"));
    }

    #[test]
    fn test_offline_config_validates_with_defaults() {
        let config = AppConfig::from_toml_str(OFFLINE_CONFIG).expect("Config should parse");
        assert!(config.validate().is_ok(), "{:?}", config.validate().err());
        assert_eq!(config.http.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(config.pipeline.page_concurrency, 1);
        assert!(config.filter.denylist_path.is_none());
    }

    #[test]
    fn test_empty_keywords_rejected() {
        let mut config = AppConfig::from_toml_str(OFFLINE_CONFIG).unwrap();
        config.search.keywords = vec!["  ".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::EmptyRequired { .. })));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = AppConfig::from_toml_str(OFFLINE_CONFIG).unwrap();
        config.pipeline.page_concurrency = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroValue { .. })));
    }

    #[test]
    fn test_search_window_limits() {
        let mut config = AppConfig::from_toml_str(OFFLINE_CONFIG).unwrap();
        config.search.max_results = MAX_SEARCH_RESULTS;
        config.search.days_back = MAX_DAYS_BACK;
        assert!(config.validate().is_ok(), "{:?}", config.validate().err());

        config.search.max_results = MAX_SEARCH_RESULTS + 1;
        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "search.max_results"),
            other => panic!("expected InvalidValue, got {:?}", other),
        }

        config.search.max_results = 10;
        config.search.days_back = u32::MAX;
        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "search.days_back"),
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_url_rejected() {
        let mut config = AppConfig::from_toml_str(OFFLINE_CONFIG).unwrap();
        config.search.endpoint = "ftp://search.example".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn test_unknown_backend_is_parse_error() {
        let content = OFFLINE_CONFIG.replace(r#"backend = "csv""#, r#"backend = "postgres""#);
        assert!(matches!(AppConfig::from_toml_str(&content), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_unresolved_placeholder_rejected() {
        let mut config = AppConfig::from_toml_str(OFFLINE_CONFIG).unwrap();
        config.alerts.backend = AlertBackend::Slack;
        config.alerts.endpoint = "https://slack.example/api".to_string();
        config.alerts.token_env = "TEST_SLACK_TOKEN".to_string();
        config.alerts.channel = "${NEWSWATCH_TEST_UNSET_CHANNEL}".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnresolvedPlaceholder { .. })
        ));
    }

    #[test]
    fn test_substitute_env() {
        std::env::set_var("NEWSWATCH_TEST_PROJECT", "acme-prod");
        let out = substitute_env(r#"project_id = "${NEWSWATCH_TEST_PROJECT}" other = "${NEWSWATCH_TEST_MISSING}""#);
        assert_eq!(out, r#"project_id = "acme-prod" other = "${NEWSWATCH_TEST_MISSING}""#);
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::load_from_path(Path::new("/nonexistent/newswatch.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
