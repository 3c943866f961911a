//! Configuration for the estimator and the reshape tool
//!
//! Loads configuration from funnel.yml, with environment variable overrides

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::analytics::funnel::DEFAULT_PREVIEW_ROWS;
use crate::analytics::posterior::{
    DEFAULT_CONFIDENCE_LEVEL, DEFAULT_PRIOR_ALPHA, DEFAULT_PRIOR_BETA,
};
use crate::analytics::report::DEFAULT_TARGET_RATE;
use crate::reshape::{DEFAULT_CONVERTS_EVENT, DEFAULT_SKIP_ROWS, DEFAULT_STARTS_EVENT};
use crate::{Error, Result};

/// Default config file name (looked up in the current and parent directory)
pub const CONFIG_FILE: &str = "funnel.yml";
pub const DEFAULT_FORMAT: &str = "table";

/// YAML config structures
#[derive(Debug, Deserialize)]
struct YamlConfig {
    prior: Option<PriorConfig>,
    report: Option<ReportConfig>,
    reshape: Option<ReshapeConfig>,
}

#[derive(Debug, Deserialize)]
struct PriorConfig {
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    alpha: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    beta: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReportConfig {
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    confidence_level: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    target_rate: Option<String>,
    format: Option<String>,
    preview_rows: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ReshapeConfig {
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    skip_rows: Option<String>,
    starts_event: Option<String>,
    converts_event: Option<String>,
}

/// Deserialize a value that can be either a string or a number
fn deserialize_string_or_number<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<serde_yaml::Value> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {:?}",
            other
        ))),
    }
}

/// Main configuration struct
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub prior_alpha: f64,
    pub prior_beta: f64,
    pub confidence_level: f64,
    pub target_rate: f64,
    pub format: String,
    pub preview_rows: usize,
    pub skip_rows: usize,
    pub starts_event: String,
    pub converts_event: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Load configuration from funnel.yml or fall back to defaults
    /// Environment variables fill values the file leaves unset
    pub fn new() -> Self {
        Self::load_from_file(CONFIG_FILE)
            .or_else(|_| Self::load_from_file(format!("../{}", CONFIG_FILE)))
            .unwrap_or_else(|_| Self::from_env())
    }

    /// Resolve a value: prefer env var if config value looks like ${VAR}
    fn resolve_env_string(value: Option<String>, env_key: &str) -> Option<String> {
        if let Some(ref v) = value {
            if v.starts_with("${") && v.ends_with('}') {
                let var_name = &v[2..v.len() - 1];
                if let Ok(env_val) = std::env::var(var_name) {
                    return Some(env_val);
                }
            } else if !v.trim().is_empty() {
                return value;
            }
        }
        std::env::var(env_key).ok()
    }

    /// Resolve a numeric value from string config or env var
    ///
    /// Literal numbers in the file win over the environment.
    fn resolve_env_number<T: std::str::FromStr>(value: Option<String>, env_key: &str) -> Option<T> {
        if let Some(ref v) = value {
            if v.starts_with("${") && v.ends_with('}') {
                let var_name = &v[2..v.len() - 1];
                if let Ok(env_val) = std::env::var(var_name) {
                    if let Ok(parsed) = env_val.trim().parse::<T>() {
                        return Some(parsed);
                    }
                }
            }
            if let Ok(parsed) = v.trim().parse::<T>() {
                return Some(parsed);
            }
        }
        if let Ok(env_val) = std::env::var(env_key) {
            if let Ok(parsed) = env_val.trim().parse::<T>() {
                return Some(parsed);
            }
        }
        None
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_dotenv();

        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| Error::ConfigError(format!("Failed to read config file: {}", e)))?;

        let yaml: YamlConfig = serde_yaml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config file: {}", e)))?;

        Ok(Self::resolve(yaml))
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        Self::load_dotenv();
        Self::resolve(YamlConfig {
            prior: None,
            report: None,
            reshape: None,
        })
    }

    fn resolve(yaml: YamlConfig) -> Self {
        let prior = yaml.prior.unwrap_or(PriorConfig {
            alpha: None,
            beta: None,
        });

        let report = yaml.report.unwrap_or(ReportConfig {
            confidence_level: None,
            target_rate: None,
            format: None,
            preview_rows: None,
        });

        let reshape = yaml.reshape.unwrap_or(ReshapeConfig {
            skip_rows: None,
            starts_event: None,
            converts_event: None,
        });

        Self {
            prior_alpha: Self::resolve_env_number(prior.alpha, "FUNNEL_PRIOR_ALPHA")
                .unwrap_or(DEFAULT_PRIOR_ALPHA),
            prior_beta: Self::resolve_env_number(prior.beta, "FUNNEL_PRIOR_BETA")
                .unwrap_or(DEFAULT_PRIOR_BETA),
            confidence_level: Self::resolve_env_number(
                report.confidence_level,
                "FUNNEL_CONFIDENCE_LEVEL",
            )
            .unwrap_or(DEFAULT_CONFIDENCE_LEVEL),
            target_rate: Self::resolve_env_number(report.target_rate, "FUNNEL_TARGET_RATE")
                .unwrap_or(DEFAULT_TARGET_RATE),
            format: report.format.unwrap_or_else(|| DEFAULT_FORMAT.to_string()),
            preview_rows: report.preview_rows.unwrap_or(DEFAULT_PREVIEW_ROWS),
            skip_rows: Self::resolve_env_number(reshape.skip_rows, "FUNNEL_SKIP_ROWS")
                .unwrap_or(DEFAULT_SKIP_ROWS),
            starts_event: Self::resolve_env_string(reshape.starts_event, "FUNNEL_STARTS_EVENT")
                .unwrap_or_else(|| DEFAULT_STARTS_EVENT.to_string()),
            converts_event: Self::resolve_env_string(
                reshape.converts_event,
                "FUNNEL_CONVERTS_EVENT",
            )
            .unwrap_or_else(|| DEFAULT_CONVERTS_EVENT.to_string()),
        }
    }

    /// Built-in defaults, ignoring files and environment
    pub fn defaults() -> Self {
        Self {
            prior_alpha: DEFAULT_PRIOR_ALPHA,
            prior_beta: DEFAULT_PRIOR_BETA,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            target_rate: DEFAULT_TARGET_RATE,
            format: DEFAULT_FORMAT.to_string(),
            preview_rows: DEFAULT_PREVIEW_ROWS,
            skip_rows: DEFAULT_SKIP_ROWS,
            starts_event: DEFAULT_STARTS_EVENT.to_string(),
            converts_event: DEFAULT_CONVERTS_EVENT.to_string(),
        }
    }
}
