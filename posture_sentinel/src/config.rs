//! Tunable behaviour for every stage of the sentinel.
//!
//! All values are externally settable: the runner fills these from a TOML file,
//! environment variables and command-line flags.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the stream connector and the steady-state read policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Attempts per connect cycle before giving up.
    pub max_retries: u32,
    /// Backoff unit. The sleep after failed attempt `k` is `backoff_base * 2^k`.
    pub backoff_base_ms: u64,
    /// Consecutive read failures that trigger a full reconnect.
    pub max_consecutive_failures: u32,
    /// Pause before retrying a failed read on the same handle.
    pub read_retry_pause_ms: u64,
    /// Upper bound on a single read, including the connect probe.
    pub read_timeout_ms: u64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_base_ms: 1000,
            max_consecutive_failures: 10,
            read_retry_pause_ms: 100,
            read_timeout_ms: 5000,
        }
    }
}

impl ConnectorConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn read_retry_pause(&self) -> Duration {
        Duration::from_millis(self.read_retry_pause_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Sleep before the attempt following failed attempt `attempt` (0-indexed).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        // Saturate instead of overflowing for absurd retry counts.
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.backoff_base().saturating_mul(factor)
    }
}

/// Geometric thresholds for the posture verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Neck inclination must stay strictly below this for good posture.
    pub neck_threshold_deg: f64,
    /// Torso inclination must stay strictly below this for good posture.
    pub torso_threshold_deg: f64,
    /// Shoulder-to-shoulder distance under which the camera counts as side-on.
    pub alignment_threshold_px: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            neck_threshold_deg: 33.0,
            torso_threshold_deg: 10.0,
            alignment_threshold_px: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Continuous bad posture required before the first alert.
    pub warning_threshold_secs: f64,
    /// Minimum spacing between two alerts, measured from the previous alert.
    pub warning_cooldown_secs: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            warning_threshold_secs: 7.0,
            warning_cooldown_secs: 10.0,
        }
    }
}

impl MonitorConfig {
    pub fn warning_threshold(&self) -> Duration {
        saturating_secs(self.warning_threshold_secs)
    }

    pub fn warning_cooldown(&self) -> Duration {
        saturating_secs(self.warning_cooldown_secs)
    }
}

/// Oversized values mean "effectively never" and clamp to `Duration::MAX`, never to zero.
fn saturating_secs(secs: f64) -> Duration {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) => duration,
        Err(_) if secs > 0.0 => Duration::MAX,
        Err(_) => Duration::ZERO,
    }
}

/// Everything one monitored stream needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    /// Stream source identifier, e.g. `tcp://192.168.1.20:5000`.
    pub source: String,
    pub connector: ConnectorConfig,
    pub classifier: ClassifierConfig,
    pub monitor: MonitorConfig,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            source: "tcp://127.0.0.1:5000".to_string(),
            connector: ConnectorConfig::default(),
            classifier: ClassifierConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl SentinelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.trim().is_empty() {
            return Err(ConfigError::EmptySource);
        }
        if self.connector.max_retries == 0 {
            return Err(ConfigError::NotPositive { field: "connector.max_retries" });
        }
        if self.connector.max_consecutive_failures == 0 {
            return Err(ConfigError::NotPositive {
                field: "connector.max_consecutive_failures",
            });
        }
        if self.connector.read_timeout_ms == 0 {
            return Err(ConfigError::NotPositive { field: "connector.read_timeout_ms" });
        }

        let numbers = [
            ("classifier.neck_threshold_deg", self.classifier.neck_threshold_deg),
            ("classifier.torso_threshold_deg", self.classifier.torso_threshold_deg),
            ("classifier.alignment_threshold_px", self.classifier.alignment_threshold_px),
            ("monitor.warning_threshold_secs", self.monitor.warning_threshold_secs),
            ("monitor.warning_cooldown_secs", self.monitor.warning_cooldown_secs),
        ];
        for (field, value) in numbers {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidNumber { field, value });
            }
        }

        let durations = [
            ("monitor.warning_threshold_secs", self.monitor.warning_threshold_secs),
            ("monitor.warning_cooldown_secs", self.monitor.warning_cooldown_secs),
        ];
        for (field, value) in durations {
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(ConfigError::InvalidNumber { field, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(SentinelConfig::default().validate(), Ok(()));
    }

    #[test]
    fn backoff_doubles_from_the_base() {
        let config = ConnectorConfig::default();
        let delays: Vec<u64> = (0..4).map(|k| config.backoff_delay(k).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8]);
    }

    #[test]
    fn backoff_saturates() {
        let config = ConnectorConfig::default();
        assert!(config.backoff_delay(64) >= config.backoff_delay(31));
    }

    #[test]
    fn rejects_zero_retries() {
        let mut config = SentinelConfig::default();
        config.connector.max_retries = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotPositive { field: "connector.max_retries" })
        );
    }

    #[test]
    fn rejects_negative_cooldown() {
        let mut config = SentinelConfig::default();
        config.monitor.warning_cooldown_secs = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidNumber { field: "monitor.warning_cooldown_secs", .. })
        ));
    }

    #[test]
    fn rejects_cooldown_too_long_for_a_duration() {
        let mut config = SentinelConfig::default();
        config.monitor.warning_cooldown_secs = 1e20;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidNumber {
                field: "monitor.warning_cooldown_secs",
                value: 1e20,
            })
        );
    }

    #[test]
    fn oversized_durations_saturate_instead_of_vanishing() {
        let monitor = MonitorConfig {
            warning_threshold_secs: 1e30,
            warning_cooldown_secs: 1e20,
        };
        assert_eq!(monitor.warning_threshold(), Duration::MAX);
        assert_eq!(monitor.warning_cooldown(), Duration::MAX);
    }

    #[test]
    fn rejects_blank_source() {
        let mut config = SentinelConfig::default();
        config.source = "  ".into();
        assert_eq!(config.validate(), Err(ConfigError::EmptySource));
    }
}
