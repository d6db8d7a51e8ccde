//! Engine configuration
//!
//! Loaded once at startup from environment variables (a `.env` file is honoured
//! through `dotenvy` in `main`). Every value has a default so the engine boots
//! without any configuration.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Limits applied to candidate processes
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Wall-clock budget for a compiler invocation
    pub compile_timeout: Duration,
    /// Default wall-clock budget for one test case run
    pub run_timeout: Duration,
    /// Address-space cap applied to every candidate process
    pub memory_limit_mb: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            compile_timeout: Duration::from_millis(10_000),
            run_timeout: Duration::from_millis(5_000),
            memory_limit_mb: 512,
        }
    }
}

/// Thresholds for the hint state machine and the response cooldown
#[derive(Debug, Clone)]
pub struct HintConfig {
    /// Idle time since the last code change that triggers a hint
    pub idle_threshold: Duration,
    /// Syntax errors accumulated since the last hint that trigger a hint
    pub error_threshold: u32,
    /// Loop nesting depth considered a structural smell
    pub smell_loop_depth: u32,
    /// Minimum interval between automated responses
    pub cooldown: Duration,
}

impl Default for HintConfig {
    fn default() -> Self {
        Self {
            idle_threshold: Duration::from_secs(120),
            error_threshold: 3,
            smell_loop_depth: 3,
            cooldown: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub bind_addr: SocketAddr,
    pub execution: ExecutionConfig,
    pub hints: HintConfig,
    /// How often a connection checks for idle candidates
    pub idle_tick: Duration,
    /// Budget for the external feedback backend per analysis
    pub feedback_timeout: Duration,
    /// Optional override for the embedded languages.toml
    pub languages_path: Option<String>,
    /// Optional override for the embedded problems.json
    pub problems_path: Option<String>,
    /// Completion records go to Redis when set, to the log otherwise
    pub redis_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            execution: ExecutionConfig::default(),
            hints: HintConfig::default(),
            idle_tick: Duration::from_secs(15),
            feedback_timeout: Duration::from_millis(2_000),
            languages_path: None,
            problems_path: None,
            redis_url: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let bind_addr = match lookup("BIND_ADDR") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("Invalid BIND_ADDR: {}", raw))?,
            None => defaults.bind_addr,
        };

        let millis = |key: &str, default: Duration| -> Result<Duration> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .with_context(|| format!("Invalid {}: {}", key, raw)),
                None => Ok(default),
            }
        };
        let secs = |key: &str, default: Duration| -> Result<Duration> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .with_context(|| format!("Invalid {}: {}", key, raw)),
                None => Ok(default),
            }
        };
        let number = |key: &str, default: u32| -> Result<u32> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u32>()
                    .with_context(|| format!("Invalid {}: {}", key, raw)),
                None => Ok(default),
            }
        };

        let execution = ExecutionConfig {
            compile_timeout: millis("COMPILE_TIMEOUT_MS", defaults.execution.compile_timeout)?,
            run_timeout: millis("RUN_TIMEOUT_MS", defaults.execution.run_timeout)?,
            memory_limit_mb: number("MEMORY_LIMIT_MB", defaults.execution.memory_limit_mb)?,
        };

        let hints = HintConfig {
            idle_threshold: secs("HINT_IDLE_SECS", defaults.hints.idle_threshold)?,
            error_threshold: number("HINT_ERROR_THRESHOLD", defaults.hints.error_threshold)?,
            smell_loop_depth: number("HINT_SMELL_LOOP_DEPTH", defaults.hints.smell_loop_depth)?,
            cooldown: secs("HINT_COOLDOWN_SECS", defaults.hints.cooldown)?,
        };

        Ok(Self {
            bind_addr,
            execution,
            hints,
            idle_tick: secs("IDLE_TICK_SECS", defaults.idle_tick)?,
            feedback_timeout: millis("FEEDBACK_TIMEOUT_MS", defaults.feedback_timeout)?,
            languages_path: lookup("LANGUAGES_CONFIG"),
            problems_path: lookup("PROBLEMS_CONFIG"),
            redis_url: lookup("REDIS_URL").filter(|url| !url.trim().is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = EngineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.hints.cooldown, Duration::from_secs(120));
        assert_eq!(config.hints.idle_threshold, Duration::from_secs(120));
        assert_eq!(config.hints.error_threshold, 3);
        assert_eq!(config.execution.run_timeout, Duration::from_millis(5_000));
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_overrides_from_environment() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("RUN_TIMEOUT_MS", "1500"),
            ("HINT_COOLDOWN_SECS", "30"),
            ("REDIS_URL", "redis://cache:6379"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.execution.run_timeout, Duration::from_millis(1500));
        assert_eq!(config.hints.cooldown, Duration::from_secs(30));
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let result = EngineConfig::from_lookup(lookup_from(&[("HINT_ERROR_THRESHOLD", "many")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_blank_redis_url_is_ignored() {
        let config = EngineConfig::from_lookup(lookup_from(&[("REDIS_URL", "  ")])).unwrap();
        assert!(config.redis_url.is_none());
    }
}
