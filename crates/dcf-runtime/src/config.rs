#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! [`RuntimeConfig`] is a plain struct with builder-style setters. With the
//! `config-file` feature it can also be read from TOML:
//!
//! ```toml
//! root_container = 0
//! retry_failed_nodes = true
//! max_retry_attempts = 3
//! view_id_start = 1
//!
//! [backoff]
//! initial_delay_ms = 10
//! multiplier = 2.0
//! max_delay_ms = 1000
//! max_attempts = 8
//! ```
//!
//! Unknown keys are rejected. Environment overrides (`DCF_MAX_RETRY_ATTEMPTS`,
//! `DCF_RETRY_FAILED`) are applied on top by [`RuntimeConfig::with_env_overrides`].

use std::env;
use std::time::Duration;

use dcf_core::identity::ViewId;

use crate::error::ConfigError;

/// Environment variable overriding [`RuntimeConfig::max_retry_attempts`].
pub const ENV_MAX_RETRY_ATTEMPTS: &str = "DCF_MAX_RETRY_ATTEMPTS";
/// Environment variable overriding [`RuntimeConfig::retry_failed_nodes`].
pub const ENV_RETRY_FAILED: &str = "DCF_RETRY_FAILED";

/// Bounded exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            multiplier: 2.0,
            max_delay: Duration::from_secs(1),
            max_attempts: 8,
        }
    }
}

/// Configuration of a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Pre-existing native container receiving the root element's view.
    pub root_container: Option<ViewId>,
    /// Reschedule nodes whose operations failed.
    pub retry_failed_nodes: bool,
    /// Consecutive failures after which a node is left stale.
    pub max_retry_attempts: u32,
    /// First view id handed out.
    pub view_id_start: u32,
    /// Backoff used by view lookups during bootstrapping.
    pub backoff: BackoffConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            root_container: None,
            retry_failed_nodes: true,
            max_retry_attempts: 3,
            view_id_start: 1,
            backoff: BackoffConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Attach the root element's view to `container`.
    #[must_use]
    pub fn with_root_container(mut self, container: ViewId) -> Self {
        self.root_container = Some(container);
        self
    }

    /// Enable or disable automatic retries.
    #[must_use]
    pub fn with_retry_failed_nodes(mut self, enabled: bool) -> Self {
        self.retry_failed_nodes = enabled;
        self
    }

    /// Set the consecutive-failure limit.
    #[must_use]
    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    /// Set the first allocated view id.
    #[must_use]
    pub fn with_view_id_start(mut self, start: u32) -> Self {
        self.view_id_start = start;
        self
    }

    /// Set the bootstrapping backoff.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.view_id_start == 0 {
            return Err(ConfigError::Invalid {
                field: "view_id_start",
                reason: "0 is reserved for the native root container".into(),
            });
        }
        if let Some(container) = self.root_container {
            if container.raw() >= self.view_id_start {
                return Err(ConfigError::Invalid {
                    field: "root_container",
                    reason: format!(
                        "{container} overlaps allocated ids starting at {}",
                        self.view_id_start
                    ),
                });
            }
        }
        let b = &self.backoff;
        if !(b.multiplier.is_finite() && b.multiplier >= 1.0) {
            return Err(ConfigError::Invalid {
                field: "backoff.multiplier",
                reason: format!("must be a finite value >= 1.0, got {}", b.multiplier),
            });
        }
        if b.max_delay < b.initial_delay {
            return Err(ConfigError::Invalid {
                field: "backoff.max_delay",
                reason: "must not be smaller than initial_delay".into(),
            });
        }
        if b.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "backoff.max_attempts",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Apply `DCF_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unparsable values.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (testable form of
    /// [`with_env_overrides`](Self::with_env_overrides)).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unparsable values.
    pub fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(raw) = lookup(ENV_MAX_RETRY_ATTEMPTS) {
            self.max_retry_attempts =
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid {
                        field: "max_retry_attempts",
                        reason: format!("{ENV_MAX_RETRY_ATTEMPTS}={raw:?} is not a count"),
                    })?;
        }
        if let Some(raw) = lookup(ENV_RETRY_FAILED) {
            self.retry_failed_nodes = parse_flag(&raw).ok_or_else(|| ConfigError::Invalid {
                field: "retry_failed_nodes",
                reason: format!("{ENV_RETRY_FAILED}={raw:?} is not a boolean"),
            })?;
        }
        Ok(self)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// TOML loading
// ---------------------------------------------------------------------------

#[cfg(feature = "config-file")]
mod file {
    use std::path::Path;
    use std::time::Duration;

    use serde::Deserialize;

    use super::{BackoffConfig, RuntimeConfig};
    use crate::error::ConfigError;
    use dcf_core::identity::ViewId;

    #[derive(Debug, Default, Deserialize)]
    #[serde(default, deny_unknown_fields)]
    struct RawConfig {
        root_container: Option<u32>,
        retry_failed_nodes: Option<bool>,
        max_retry_attempts: Option<u32>,
        view_id_start: Option<u32>,
        backoff: Option<RawBackoff>,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default, deny_unknown_fields)]
    struct RawBackoff {
        initial_delay_ms: Option<u64>,
        multiplier: Option<f64>,
        max_delay_ms: Option<u64>,
        max_attempts: Option<u32>,
    }

    impl RuntimeConfig {
        /// Parse a TOML document. Missing keys keep their defaults.
        ///
        /// # Errors
        ///
        /// [`ConfigError::Parse`] for malformed TOML or unknown keys,
        /// [`ConfigError::Invalid`] for out-of-range values.
        pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
            let raw: RawConfig =
                toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
            let mut config = Self::default();
            if let Some(container) = raw.root_container {
                config.root_container = Some(ViewId::new(container));
            }
            if let Some(v) = raw.retry_failed_nodes {
                config.retry_failed_nodes = v;
            }
            if let Some(v) = raw.max_retry_attempts {
                config.max_retry_attempts = v;
            }
            if let Some(v) = raw.view_id_start {
                config.view_id_start = v;
            }
            if let Some(b) = raw.backoff {
                let d = BackoffConfig::default();
                config.backoff = BackoffConfig {
                    initial_delay: b.initial_delay_ms.map_or(d.initial_delay, Duration::from_millis),
                    multiplier: b.multiplier.unwrap_or(d.multiplier),
                    max_delay: b.max_delay_ms.map_or(d.max_delay, Duration::from_millis),
                    max_attempts: b.max_attempts.unwrap_or(d.max_attempts),
                };
            }
            config.validate()?;
            Ok(config)
        }

        /// Read and parse a TOML file.
        ///
        /// # Errors
        ///
        /// [`ConfigError::Io`] if the file cannot be read, otherwise as
        /// [`from_toml_str`](Self::from_toml_str).
        pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
            let path = path.as_ref();
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
            Self::from_toml_str(&text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_owned())
        }
    }

    #[test]
    fn defaults_validate() {
        let config = RuntimeConfig::default();
        assert!(config.retry_failed_nodes);
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.view_id_start, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_view_id_start_is_rejected() {
        let err = RuntimeConfig::default()
            .with_view_id_start(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "view_id_start", .. }));
    }

    #[test]
    fn root_container_must_precede_allocated_ids() {
        let ok = RuntimeConfig::default().with_root_container(ViewId::ROOT);
        assert!(ok.validate().is_ok());
        let bad = RuntimeConfig::default().with_root_container(ViewId::new(5));
        assert!(bad.validate().is_err());
    }

    #[test]
    fn backoff_ranges_are_checked() {
        let bad = RuntimeConfig::default().with_backoff(BackoffConfig {
            multiplier: 0.5,
            ..BackoffConfig::default()
        });
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::Invalid { field: "backoff.multiplier", .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let config = RuntimeConfig::default()
            .with_overrides_from(lookup(&[
                (ENV_MAX_RETRY_ATTEMPTS, " 7 "),
                (ENV_RETRY_FAILED, "off"),
            ]))
            .unwrap();
        assert_eq!(config.max_retry_attempts, 7);
        assert!(!config.retry_failed_nodes);
    }

    #[test]
    fn env_overrides_reject_garbage() {
        let err = RuntimeConfig::default()
            .with_overrides_from(lookup(&[(ENV_RETRY_FAILED, "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("DCF_RETRY_FAILED"));
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_round_trip() {
        let config = RuntimeConfig::from_toml_str(
            r"
            root_container = 0
            max_retry_attempts = 5

            [backoff]
            initial_delay_ms = 20
            max_attempts = 4
            ",
        )
        .unwrap();
        assert_eq!(config.root_container, Some(ViewId::ROOT));
        assert_eq!(config.max_retry_attempts, 5);
        assert_eq!(config.backoff.initial_delay, Duration::from_millis(20));
        assert_eq!(config.backoff.max_attempts, 4);
        assert_eq!(config.backoff.multiplier, 2.0);
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_rejects_unknown_keys() {
        let err = RuntimeConfig::from_toml_str("retry = true").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
