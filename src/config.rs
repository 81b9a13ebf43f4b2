//! Service configuration read from the environment

use crate::runtime::PollBudget;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;
const DEFAULT_SLA_HOURS: u32 = 24;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Connection settings for the external assistant API
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

/// Complete service configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub port: u16,
    pub assistant: AssistantConfig,
    /// Search collaborator endpoint; search answers with an explanation when unset
    pub search_url: Option<String>,
    /// Document tracking endpoint; the local ledger is used when unset
    pub tracking_url: Option<String>,
    pub poll: PollBudget,
    pub default_sla_hours: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = lookup("LEXDRAFT_DB_PATH").unwrap_or_else(|| {
            let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
            format!("{home}/.lexdraft/lexdraft.db")
        });

        let port = parse_var(&lookup, "LEXDRAFT_PORT")?.unwrap_or(DEFAULT_PORT);
        let interval_ms =
            parse_var(&lookup, "LEXDRAFT_POLL_INTERVAL_MS")?.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        let max_attempts =
            parse_var(&lookup, "LEXDRAFT_MAX_POLL_ATTEMPTS")?.unwrap_or(DEFAULT_MAX_POLL_ATTEMPTS);
        let default_sla_hours =
            parse_var(&lookup, "LEXDRAFT_DEFAULT_SLA_HOURS")?.unwrap_or(DEFAULT_SLA_HOURS);

        if interval_ms == 0 {
            return Err(ConfigError::Invalid {
                var: "LEXDRAFT_POLL_INTERVAL_MS",
                value: "0".to_string(),
            });
        }
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "LEXDRAFT_MAX_POLL_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            db_path,
            port,
            assistant: AssistantConfig {
                api_key: lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()),
                base_url: lookup("OPENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            },
            search_url: lookup("LEXDRAFT_SEARCH_URL").filter(|u| !u.is_empty()),
            tracking_url: lookup("LEXDRAFT_TRACKING_URL").filter(|u| !u.is_empty()),
            poll: PollBudget::new(Duration::from_millis(interval_ms), max_attempts),
            default_sla_hours,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}
