//! # Configuration Module
//!
//! Runtime settings are read from environment variables (a `.env` file is
//! loaded first when present). Both binaries share the same [`Settings`].

use std::env;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ADMIN_BIND: &str = "0.0.0.0:8000";

/// Errors raised while building [`Settings`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Output format for log lines
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Public contact details of the clinic, rendered into bot replies
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClinicInfo {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub website: String,
    pub address: String,
}

impl Default for ClinicInfo {
    fn default() -> Self {
        Self {
            name: "Мед-Пластик".to_string(),
            phone: "+74951234567".to_string(),
            email: "info@med-plastic.ru".to_string(),
            website: "https://med-plastic.ru/plastika-verhnih-vek/".to_string(),
            address: "Москва, ул. Примерная, д. 123".to_string(),
        }
    }
}

/// Connection settings for the OpenAI-compatible chat completions API
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LlmSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

/// Retry policy shared by the circuit breaker and outbound sends
///
/// Mirrors the recovery knobs used for external calls: a bounded number of
/// attempts with exponential backoff, plus a circuit breaker that stops
/// calling a failing dependency for a cool-down period.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveryConfig {
    pub max_retries: u32,
    pub base_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_retry_delay_ms: 1000,
            max_retry_delay_ms: 10_000,
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60,
        }
    }
}

/// Complete runtime configuration
#[derive(Clone, Debug)]
pub struct Settings {
    /// Telegram bot token. Only the bot binary requires it.
    pub bot_token: Option<String>,
    pub database_url: String,
    /// `None` when no API key is configured; answers then come from canned replies only.
    pub llm: Option<LlmSettings>,
    /// Telegram chat that receives new-request notifications
    pub admin_chat_id: Option<i64>,
    pub clinic: ClinicInfo,
    pub admin_bind: String,
    pub log_level: String,
    pub log_format: LogFormat,
    pub recovery: RecoveryConfig,
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let llm = match get("OPENAI_API_KEY") {
            Some(api_key) => {
                let timeout_secs = match get("LLM_TIMEOUT_SECS") {
                    Some(raw) => raw.parse::<u64>().map_err(|_| ConfigError::Invalid {
                        name: "LLM_TIMEOUT_SECS",
                        value: raw.clone(),
                    })?,
                    None => 30,
                };
                Some(LlmSettings {
                    api_key,
                    model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                    base_url: get("OPENAI_BASE_URL")
                        .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
                        .trim_end_matches('/')
                        .to_string(),
                    timeout: Duration::from_secs(timeout_secs),
                })
            }
            None => None,
        };

        let admin_chat_id = match get("ADMIN_TELEGRAM_ID") {
            Some(raw) => Some(raw.parse::<i64>().map_err(|_| ConfigError::Invalid {
                name: "ADMIN_TELEGRAM_ID",
                value: raw.clone(),
            })?),
            None => None,
        };

        let defaults = ClinicInfo::default();
        let clinic = ClinicInfo {
            name: get("CLINIC_NAME").unwrap_or(defaults.name),
            phone: get("CLINIC_PHONE").unwrap_or(defaults.phone),
            email: get("CLINIC_EMAIL").unwrap_or(defaults.email),
            website: get("CLINIC_WEBSITE").unwrap_or(defaults.website),
            address: get("CLINIC_ADDRESS").unwrap_or(defaults.address),
        };

        let log_format = match get("LOG_FORMAT").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("pretty") | Some("text") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            bot_token: get("BOT_TOKEN"),
            database_url,
            llm,
            admin_chat_id,
            clinic,
            admin_bind: get("ADMIN_BIND").unwrap_or_else(|| DEFAULT_ADMIN_BIND.to_string()),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()).to_lowercase(),
            log_format,
            recovery: RecoveryConfig::default(),
        })
    }

    /// Bot token, or an error naming the missing variable
    pub fn require_bot_token(&self) -> Result<&str, ConfigError> {
        self.bot_token.as_deref().ok_or(ConfigError::Missing("BOT_TOKEN"))
    }
}
