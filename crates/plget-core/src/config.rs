use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::breaker::CircuitBreaker;
use crate::retry::{ErrorKind, RetryPolicy};

/// Retry policy parameters (`[retry]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per job (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
    /// Multiplier applied per attempt: delay = base * growth^(attempt-1).
    pub growth_factor: f64,
    /// Perturb each delay by up to ±25%.
    pub jitter: bool,
    /// Error kinds that are worth another attempt.
    pub retryable_kinds: Vec<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 1.0,
            max_delay_secs: 60,
            growth_factor: 2.0,
            jitter: true,
            retryable_kinds: vec![
                ErrorKind::Network,
                ErrorKind::QuotaExceeded,
                ErrorKind::Unknown,
            ],
        }
    }
}

/// Circuit breaker parameters (`[breaker]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failed jobs (without an intervening recovery) before the breaker opens.
    pub failure_threshold: u32,
    /// Seconds the breaker stays open before allowing a trial call.
    pub open_timeout_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout_secs: 60,
        }
    }
}

/// Global configuration loaded from `~/.config/plget/config.toml`.
///
/// Built once and handed to the orchestrator; nothing mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlgetConfig {
    /// Directory downloaded items are written to.
    pub output_dir: PathBuf,
    /// Maximum video height passed to the fetcher (e.g. "1080").
    pub quality: String,
    /// Container/extension for downloaded items.
    pub format: String,
    /// Target name template: `%(playlist_index)03d`, `%(title)s`, `%(ext)s`.
    pub naming_template: String,
    /// Number of jobs fetched in parallel.
    pub concurrency: usize,
    /// Mark a job Skipped when its target file already exists on disk.
    pub skip_existing: bool,
    /// Terminal sessions older than this are garbage-collected.
    pub session_retention_days: u32,
    /// Upper bound on waiting for in-flight jobs after shutdown is requested.
    pub drain_timeout_secs: u64,
    /// Job database path; `None` = `~/.local/state/plget/plget.db`.
    pub database_path: Option<PathBuf>,
    pub retry: RetryConfig,
    pub breaker: BreakerConfig,
}

impl Default for PlgetConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./downloads"),
            quality: "2160".to_string(),
            format: "mp4".to_string(),
            naming_template: "%(playlist_index)03d - %(title)s.%(ext)s".to_string(),
            concurrency: 3,
            skip_existing: true,
            session_retention_days: 30,
            drain_timeout_secs: 300,
            database_path: None,
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

/// Upper bound for `retry.max_delay_secs`: one day.
pub const MAX_RETRY_DELAY_SECS: u64 = 86_400;

/// Rejected configuration value.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("retry.max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("retry.base_delay_secs must be a finite, non-negative number (got {0})")]
    InvalidBaseDelay(f64),
    #[error("retry.base_delay_secs ({base}) exceeds retry.max_delay_secs ({max})")]
    BaseAboveMax { base: f64, max: u64 },
    #[error("retry.max_delay_secs must be at most {MAX_RETRY_DELAY_SECS} (got {0})")]
    MaxDelayTooLarge(u64),
    #[error("retry.growth_factor must be >= 1.0 (got {0})")]
    InvalidGrowthFactor(f64),
    #[error("breaker.failure_threshold must be at least 1")]
    ZeroFailureThreshold,
    #[error("naming_template must not be empty")]
    EmptyNamingTemplate,
}

impl PlgetConfig {
    /// Check the values the engine relies on. The orchestrator refuses a config that fails this.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if !retry.base_delay_secs.is_finite() || retry.base_delay_secs < 0.0 {
            return Err(ConfigError::InvalidBaseDelay(retry.base_delay_secs));
        }
        if retry.max_delay_secs > MAX_RETRY_DELAY_SECS {
            return Err(ConfigError::MaxDelayTooLarge(retry.max_delay_secs));
        }
        if retry.base_delay_secs > retry.max_delay_secs as f64 {
            return Err(ConfigError::BaseAboveMax {
                base: retry.base_delay_secs,
                max: retry.max_delay_secs,
            });
        }
        if !retry.growth_factor.is_finite() || retry.growth_factor < 1.0 {
            return Err(ConfigError::InvalidGrowthFactor(retry.growth_factor));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        if self.naming_template.trim().is_empty() {
            return Err(ConfigError::EmptyNamingTemplate);
        }
        Ok(())
    }

    /// Retry policy built from the `[retry]` section. Call after `validate`.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.retry.max_attempts)
            .with_delays(
                Duration::from_secs_f64(self.retry.base_delay_secs),
                Duration::from_secs(self.retry.max_delay_secs),
            )
            .with_growth_factor(self.retry.growth_factor)
            .with_jitter(self.retry.jitter)
            .with_retryable(&self.retry.retryable_kinds)
    }

    /// Circuit breaker built from the `[breaker]` section.
    pub fn circuit_breaker(&self) -> CircuitBreaker {
        CircuitBreaker::new(
            self.breaker.failure_threshold,
            Duration::from_secs(self.breaker.open_timeout_secs),
        )
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    /// JSON copy of the settings, stored with each session.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Override file values with `PLGET_*` environment variables. Unparseable values are
    /// logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("PLGET_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("PLGET_CONCURRENCY") {
            match raw.trim().parse::<usize>() {
                Ok(n) => self.concurrency = n,
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid PLGET_CONCURRENCY"),
            }
        }
        if let Some(quality) = lookup("PLGET_QUALITY") {
            self.quality = quality;
        }
        if let Some(format) = lookup("PLGET_FORMAT") {
            self.format = format;
        }
        if let Some(db) = lookup("PLGET_DATABASE") {
            self.database_path = Some(PathBuf::from(db));
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("plget")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Write the default configuration to `config_path()` if no file exists yet.
/// Returns the path and whether a new file was written.
pub fn write_default() -> Result<(PathBuf, bool)> {
    let path = config_path()?;
    if path.exists() {
        return Ok((path, false));
    }
    let toml = toml::to_string_pretty(&PlgetConfig::default())?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, toml)?;
    tracing::info!("created default config at {}", path.display());
    Ok((path, true))
}

/// Load configuration from disk (creating a default file if none exists), then
/// apply environment overrides and validate.
pub fn load_or_init() -> Result<PlgetConfig> {
    let (path, created) = write_default()?;
    let mut cfg = if created {
        PlgetConfig::default()
    } else {
        let data = fs::read_to_string(&path)?;
        toml::from_str(&data)?
    };
    cfg.apply_env_overrides();
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_values() {
        let cfg = PlgetConfig::default();
        assert_eq!(cfg.concurrency, 3);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.breaker.failure_threshold, 5);
        assert_eq!(cfg.session_retention_days, 30);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = PlgetConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: PlgetConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let toml = r#"
            concurrency = 2
            output_dir = "/srv/media"

            [retry]
            max_attempts = 5
            retryable_kinds = ["network", "quota_exceeded"]

            [breaker]
            open_timeout_secs = 10
        "#;
        let cfg: PlgetConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.concurrency, 2);
        assert_eq!(cfg.output_dir, PathBuf::from("/srv/media"));
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(
            cfg.retry.retryable_kinds,
            vec![ErrorKind::Network, ErrorKind::QuotaExceeded]
        );
        assert!((cfg.retry.base_delay_secs - 1.0).abs() < 1e-9);
        assert_eq!(cfg.breaker.failure_threshold, 5);
        assert_eq!(cfg.breaker.open_timeout_secs, 10);
        assert_eq!(cfg.format, "mp4");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = PlgetConfig::default();
        cfg.concurrency = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroConcurrency));

        let mut cfg = PlgetConfig::default();
        cfg.retry.max_attempts = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroAttempts));

        let mut cfg = PlgetConfig::default();
        cfg.retry.base_delay_secs = 120.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::BaseAboveMax { .. })));

        let mut cfg = PlgetConfig::default();
        cfg.retry.base_delay_secs = -1.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidBaseDelay(_))));

        let mut cfg = PlgetConfig::default();
        cfg.retry.growth_factor = 0.5;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidGrowthFactor(_))
        ));

        let mut cfg = PlgetConfig::default();
        cfg.breaker.failure_threshold = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroFailureThreshold));
    }

    #[test]
    fn absurd_max_delay_is_rejected() {
        let mut cfg = PlgetConfig::default();
        cfg.retry.max_delay_secs = u64::MAX;
        cfg.retry.max_attempts = 200;
        assert_eq!(cfg.validate(), Err(ConfigError::MaxDelayTooLarge(u64::MAX)));

        cfg.retry.max_delay_secs = MAX_RETRY_DELAY_SECS;
        assert!(cfg.validate().is_ok());
        let delay = cfg.retry_policy().compute_delay(150);
        assert!(delay <= Duration::from_secs_f64(MAX_RETRY_DELAY_SECS as f64 * 1.25));
    }

    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        let env: HashMap<&str, &str> = [
            ("PLGET_OUTPUT_DIR", "/tmp/out"),
            ("PLGET_CONCURRENCY", "not-a-number"),
            ("PLGET_QUALITY", "720"),
            ("PLGET_DATABASE", "/tmp/plget.db"),
        ]
        .into_iter()
        .collect();
        let mut cfg = PlgetConfig::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(cfg.concurrency, 3);
        assert_eq!(cfg.quality, "720");
        assert_eq!(cfg.format, "mp4");
        assert_eq!(cfg.database_path, Some(PathBuf::from("/tmp/plget.db")));
    }

    #[test]
    fn retry_policy_reflects_config() {
        let mut cfg = PlgetConfig::default();
        cfg.retry.max_attempts = 4;
        cfg.retry.jitter = false;
        cfg.retry.retryable_kinds = vec![ErrorKind::Network];
        let policy = cfg.retry_policy();
        assert_eq!(policy.max_attempts(), 4);
        assert!(!policy.jitter());
        assert!(policy.is_retryable(ErrorKind::Network));
        assert!(!policy.is_retryable(ErrorKind::Unknown));
    }
}
