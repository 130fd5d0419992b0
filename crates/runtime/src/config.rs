//! Configuration for the orchestration runtime
//!
//! Environment-variable driven with validation and secure defaults. All
//! knobs that shape the knowledge pipeline, rate limiting and SSRF
//! protection live here; logging setup belongs to the binary.

use crate::types::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Master switch for the auto-connection pipeline in KNOWLEDGE.
    pub auto_connection_enabled: bool,
    /// Maximum concurrent outbound requests (`C_max`).
    pub knowledge_max_concurrency: usize,
    /// Per-request timeout and the knowledge-phase soft budget, in ms.
    pub knowledge_timeout_ms: u64,
    /// Minimum confidence for a fetch result to enter synthesis.
    pub knowledge_confidence_threshold: f64,
    /// Response truncation length in characters (`R_max`).
    pub knowledge_max_response_size: usize,
    /// Maximum accepted response body in bytes (`B_max`).
    pub max_body_bytes: usize,
    /// Per-host token bucket size.
    pub rate_limit_requests_per_minute: u32,
    /// Per-host token bucket window in ms.
    pub rate_limit_window_ms: u64,
    /// Outbound User-Agent header.
    pub user_agent: String,
    /// Optional host allowlist layered on the SSRF guard.
    pub allowed_hosts: Option<Vec<String>>,
    /// Master switch for SSRF address-class checks.
    pub ssrf_protection: bool,
    /// Root directory for per-session graph persistence. `None` keeps
    /// graphs in memory (test environments).
    pub session_dir: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auto_connection_enabled: true,
            knowledge_max_concurrency: 2,
            knowledge_timeout_ms: 5_000,
            knowledge_confidence_threshold: 0.4,
            knowledge_max_response_size: 5_000,
            max_body_bytes: 2_097_152,
            rate_limit_requests_per_minute: 5,
            rate_limit_window_ms: 60_000,
            user_agent: "IronManus-Knowledge-Agent/1.0".to_string(),
            allowed_hosts: None,
            ssrf_protection: true,
            session_dir: Some("./iron-manus-sessions".to_string()),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(v) = env::var("AUTO_CONNECTION_ENABLED") {
            config.auto_connection_enabled = parse_bool("AUTO_CONNECTION_ENABLED", &v)?;
        }
        if let Ok(v) = env::var("KNOWLEDGE_MAX_CONCURRENCY") {
            config.knowledge_max_concurrency = parse_num("KNOWLEDGE_MAX_CONCURRENCY", &v)?;
        }
        if let Ok(v) = env::var("KNOWLEDGE_TIMEOUT_MS") {
            config.knowledge_timeout_ms = parse_num("KNOWLEDGE_TIMEOUT_MS", &v)?;
        }
        if let Ok(v) = env::var("KNOWLEDGE_CONFIDENCE_THRESHOLD") {
            config.knowledge_confidence_threshold =
                v.parse::<f64>().map_err(|e| ConfigError::InvalidValue {
                    key: "KNOWLEDGE_CONFIDENCE_THRESHOLD".to_string(),
                    reason: e.to_string(),
                })?;
        }
        if let Ok(v) = env::var("KNOWLEDGE_MAX_RESPONSE_SIZE") {
            config.knowledge_max_response_size = parse_num("KNOWLEDGE_MAX_RESPONSE_SIZE", &v)?;
        }
        // MAX_CONTENT_LENGTH is the historical alias for MAX_BODY_LENGTH.
        if let Ok(v) = env::var("MAX_BODY_LENGTH") {
            config.max_body_bytes = parse_num("MAX_BODY_LENGTH", &v)?;
        } else if let Ok(v) = env::var("MAX_CONTENT_LENGTH") {
            config.max_body_bytes = parse_num("MAX_CONTENT_LENGTH", &v)?;
        }
        if let Ok(v) = env::var("RATE_LIMIT_REQUESTS_PER_MINUTE") {
            config.rate_limit_requests_per_minute =
                parse_num("RATE_LIMIT_REQUESTS_PER_MINUTE", &v)?;
        }
        if let Ok(v) = env::var("RATE_LIMIT_WINDOW_MS") {
            config.rate_limit_window_ms = parse_num("RATE_LIMIT_WINDOW_MS", &v)?;
        }
        if let Ok(v) = env::var("USER_AGENT") {
            if !v.trim().is_empty() {
                config.user_agent = v;
            }
        }
        if let Ok(v) = env::var("ALLOWED_HOSTS") {
            let hosts: Vec<String> = v
                .split(',')
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect();
            config.allowed_hosts = if hosts.is_empty() { None } else { Some(hosts) };
        }
        if let Ok(v) = env::var("ENABLE_SSRF_PROTECTION") {
            config.ssrf_protection = parse_bool("ENABLE_SSRF_PROTECTION", &v)?;
        }
        if let Ok(v) = env::var("SESSION_DIR") {
            config.session_dir = if v.trim().is_empty() { None } else { Some(v) };
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would wedge the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.knowledge_max_concurrency == 0 || self.knowledge_max_concurrency > 5 {
            return Err(ConfigError::InvalidValue {
                key: "KNOWLEDGE_MAX_CONCURRENCY".to_string(),
                reason: "must be between 1 and 5".to_string(),
            });
        }
        if self.knowledge_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "KNOWLEDGE_TIMEOUT_MS".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.knowledge_confidence_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "KNOWLEDGE_CONFIDENCE_THRESHOLD".to_string(),
                reason: "must be within [0, 1]".to_string(),
            });
        }
        if self.rate_limit_window_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RATE_LIMIT_WINDOW_MS".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.rate_limit_requests_per_minute == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RATE_LIMIT_REQUESTS_PER_MINUTE".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.knowledge_timeout_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("expected boolean, got '{other}'"),
        }),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes env-mutating tests.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.auto_connection_enabled);
        assert_eq!(config.knowledge_max_concurrency, 2);
        assert_eq!(config.rate_limit_requests_per_minute, 5);
    }

    #[test]
    fn from_env_reads_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("AUTO_CONNECTION_ENABLED", "false");
        env::set_var("KNOWLEDGE_MAX_CONCURRENCY", "3");
        env::set_var("ALLOWED_HOSTS", "api.github.com, en.wikipedia.org");

        let config = Config::from_env().unwrap();
        assert!(!config.auto_connection_enabled);
        assert_eq!(config.knowledge_max_concurrency, 3);
        assert_eq!(
            config.allowed_hosts.as_deref(),
            Some(&["api.github.com".to_string(), "en.wikipedia.org".to_string()][..])
        );

        env::remove_var("AUTO_CONNECTION_ENABLED");
        env::remove_var("KNOWLEDGE_MAX_CONCURRENCY");
        env::remove_var("ALLOWED_HOSTS");
    }

    #[test]
    fn invalid_concurrency_is_rejected() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("KNOWLEDGE_MAX_CONCURRENCY", "0");
        assert!(Config::from_env().is_err());
        env::set_var("KNOWLEDGE_MAX_CONCURRENCY", "12");
        assert!(Config::from_env().is_err());
        env::remove_var("KNOWLEDGE_MAX_CONCURRENCY");
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let config = Config {
            knowledge_confidence_threshold: 1.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
