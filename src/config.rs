// Configuration schema for the numiqos scheduler.
// Numan Thabit 2026

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

/// Error returned while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when reading a configuration file from disk.
    #[error("failed to read config '{path}': {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Source IO error.
        #[source]
        source: io::Error,
    },
    /// Error when parsing the configuration contents.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// The configuration did not pass validation checks.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Tunable scheduler parameters.
///
/// The lifecycle ages drive the background aging pass: a client whose
/// last submission predates `idle_age_ms` is marked idle, and one that
/// predates `erase_age_ms` is evicted entirely. The pass itself runs
/// every `check_time_ms`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QosConfig {
    /// Age at which a quiet client is marked idle, in milliseconds.
    pub idle_age_ms: u64,
    /// Age at which a quiet client is evicted, in milliseconds.
    pub erase_age_ms: u64,
    /// Interval between aging passes, in milliseconds.
    pub check_time_ms: u64,
    /// Permit dispatch past the limit tag when nothing else is
    /// schedulable and capacity would otherwise sit unused.
    pub allow_limit_break: bool,
    /// Select the indexed-heap priority backing; `false` selects the
    /// linear-scan vector backing preferred for small client counts.
    pub use_heap: bool,
}

impl Default for QosConfig {
    fn default() -> Self {
        Self {
            idle_age_ms: 10 * 60 * 1000,
            erase_age_ms: 15 * 60 * 1000,
            check_time_ms: 6 * 60 * 1000,
            allow_limit_break: false,
            use_heap: true,
        }
    }
}

impl QosConfig {
    /// Loads configuration from `NUMIQOS_CONFIG` if set, otherwise
    /// returns defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match env::var("NUMIQOS_CONFIG") {
            Ok(path) => Self::from_path(path),
            Err(_missing) => {
                let cfg = Self::default();
                cfg.validate()?;
                Ok(cfg)
            }
        }
    }

    /// Loads a configuration file from the provided path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Loads configuration from a TOML string slice.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        <Self as FromStr>::from_str(input)
    }

    /// Validates the configuration, returning an error when constraints
    /// are violated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.erase_age_ms < self.idle_age_ms {
            return Err(ConfigError::Validation(
                "erase_age_ms must be >= idle_age_ms".into(),
            ));
        }
        if self.check_time_ms >= self.idle_age_ms {
            return Err(ConfigError::Validation(
                "check_time_ms must be < idle_age_ms".into(),
            ));
        }
        if self.check_time_ms == 0 {
            return Err(ConfigError::Validation(
                "check_time_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Idle horizon as a [`Duration`].
    pub fn idle_age(&self) -> Duration {
        Duration::from_millis(self.idle_age_ms)
    }

    /// Eviction horizon as a [`Duration`].
    pub fn erase_age(&self) -> Duration {
        Duration::from_millis(self.erase_age_ms)
    }

    /// Aging-pass interval as a [`Duration`].
    pub fn check_time(&self) -> Duration {
        Duration::from_millis(self.check_time_ms)
    }
}

impl FromStr for QosConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = QosConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.idle_age(), Duration::from_secs(600));
    }

    #[test]
    fn erase_before_idle_rejected() {
        let input = r#"
            idle_age_ms = 1000
            erase_age_ms = 500
            check_time_ms = 100
        "#;

        let err = QosConfig::from_toml_str(input).unwrap_err();
        match err {
            ConfigError::Validation(msg) => assert!(msg.contains("erase_age_ms")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn check_interval_must_undercut_idle_age() {
        let input = r#"
            idle_age_ms = 1000
            erase_age_ms = 2000
            check_time_ms = 1000
        "#;

        let err = QosConfig::from_toml_str(input).unwrap_err();
        match err {
            ConfigError::Validation(msg) => assert!(msg.contains("check_time_ms")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg = QosConfig::from_toml_str("allow_limit_break = true").expect("config");
        assert!(cfg.allow_limit_break);
        assert_eq!(cfg.erase_age_ms, QosConfig::default().erase_age_ms);
    }
}
