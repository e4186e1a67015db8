//! Configuration for the sync engine.
//!
//! All timing windows and size caps of the protocol are tunable here, with
//! defaults matching the deployed heuristics: a ~30 s retransmission period,
//! a ~200 ms suppression reply window, both jittered by ±10 %, and a 500-byte
//! advisory cap for partial vector encodings.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::sync::VectorPolicy;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the configuration file failed.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The file contents were not valid TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value or combination of values is unusable.
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Which vector encoding an instance sends in its sync packets.
///
/// Everything except [`Full`](Self::Full) transmits a subset of the vector,
/// which changes how absent remote entries are interpreted during merges
/// (see [`VectorPolicy`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncodingStrategy {
    /// The whole vector in one packet.
    #[default]
    Full,
    /// The whole vector split across multiple capped packets.
    Chunked,
    /// Only the most recently updated entries, up to the cap.
    MostRecent,
    /// Most recent entries plus a few uniformly sampled extras.
    MostRecentAndRandom {
        /// How many sampled entries to add after the most-recent fill.
        extra: usize,
    },
    /// A uniform sample of entries, up to the cap.
    Random,
}

impl EncodingStrategy {
    /// The merge policy implied by this strategy.
    ///
    /// Partial encodings must treat a missing remote entry as "unknown"
    /// rather than "remote is at zero".
    #[must_use]
    pub fn policy(self) -> VectorPolicy {
        match self {
            EncodingStrategy::Full => VectorPolicy::Complete,
            _ => VectorPolicy::Partial,
        }
    }
}

/// Tunables for one sync instance.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Vector encoding used for outbound sync packets.
    #[serde(default)]
    pub encoding: EncodingStrategy,
    /// Mean period between periodic sync retransmissions, in milliseconds.
    #[serde(default = "defaults::retx_period_ms")]
    pub retx_period_ms: u64,
    /// Mean delay before answering a sync that reported us as newer, in
    /// milliseconds.
    #[serde(default = "defaults::suppression_period_ms")]
    pub suppression_period_ms: u64,
    /// Jitter applied to both periods, as a percentage of the mean.
    #[serde(default = "defaults::timer_jitter_percent")]
    pub timer_jitter_percent: u64,
    /// Spacing between packets of a multi-packet sync round, in milliseconds
    /// (inclusive bounds).
    #[serde(default = "defaults::packet_spacing_ms")]
    pub packet_spacing_ms: (u64, u64),
    /// Advisory size cap for partial vector encodings, in bytes.
    #[serde(default = "defaults::max_chunk_bytes")]
    pub max_chunk_bytes: usize,
    /// Seed for the jitter and sampling RNG. Unset means seed from entropy;
    /// set it for reproducible simulations.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

mod defaults {
    pub(super) fn retx_period_ms() -> u64 {
        30_000
    }
    pub(super) fn suppression_period_ms() -> u64 {
        200
    }
    pub(super) fn timer_jitter_percent() -> u64 {
        10
    }
    pub(super) fn packet_spacing_ms() -> (u64, u64) {
        (10, 15)
    }
    pub(super) fn max_chunk_bytes() -> usize {
        500
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            encoding: EncodingStrategy::default(),
            retx_period_ms: defaults::retx_period_ms(),
            suppression_period_ms: defaults::suppression_period_ms(),
            timer_jitter_percent: defaults::timer_jitter_percent(),
            packet_spacing_ms: defaults::packet_spacing_ms(),
            max_chunk_bytes: defaults::max_chunk_bytes(),
            rng_seed: None,
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: SyncConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Fail-fast sanity checks, run at construction time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retx_period_ms == 0 {
            return Err(ConfigError::Invalid("retx_period_ms must be non-zero"));
        }
        if self.suppression_period_ms == 0 {
            return Err(ConfigError::Invalid(
                "suppression_period_ms must be non-zero",
            ));
        }
        if self.suppression_period_ms >= self.retx_period_ms {
            return Err(ConfigError::Invalid(
                "suppression_period_ms must be shorter than retx_period_ms",
            ));
        }
        if self.timer_jitter_percent >= 100 {
            return Err(ConfigError::Invalid(
                "timer_jitter_percent must be below 100",
            ));
        }
        if self.packet_spacing_ms.0 > self.packet_spacing_ms.1 {
            return Err(ConfigError::Invalid("packet_spacing_ms bounds inverted"));
        }
        if self.max_chunk_bytes == 0 {
            return Err(ConfigError::Invalid("max_chunk_bytes must be non-zero"));
        }
        Ok(())
    }

    /// Inclusive retransmission window: the mean period ± jitter.
    #[must_use]
    pub fn retx_window(&self) -> (Duration, Duration) {
        jittered_window(self.retx_period_ms, self.timer_jitter_percent)
    }

    /// Inclusive suppression reply window: the mean delay ± jitter.
    #[must_use]
    pub fn suppression_window(&self) -> (Duration, Duration) {
        jittered_window(self.suppression_period_ms, self.timer_jitter_percent)
    }

    /// Inclusive per-packet spacing window for multi-packet rounds.
    #[must_use]
    pub fn packet_spacing_window(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.packet_spacing_ms.0),
            Duration::from_millis(self.packet_spacing_ms.1),
        )
    }
}

fn jittered_window(mean_ms: u64, jitter_percent: u64) -> (Duration, Duration) {
    let spread = mean_ms * jitter_percent / 100;
    (
        Duration::from_millis(mean_ms - spread),
        Duration::from_millis(mean_ms + spread),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_windows() {
        let config = SyncConfig::default();
        assert_eq!(
            config.retx_window(),
            (Duration::from_millis(27_000), Duration::from_millis(33_000))
        );
        assert_eq!(
            config.suppression_window(),
            (Duration::from_millis(180), Duration::from_millis(220))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_strategy_policy() {
        assert_eq!(EncodingStrategy::Full.policy(), VectorPolicy::Complete);
        assert_eq!(EncodingStrategy::Chunked.policy(), VectorPolicy::Partial);
        assert_eq!(EncodingStrategy::MostRecent.policy(), VectorPolicy::Partial);
        assert_eq!(
            EncodingStrategy::MostRecentAndRandom { extra: 3 }.policy(),
            VectorPolicy::Partial
        );
        assert_eq!(EncodingStrategy::Random.policy(), VectorPolicy::Partial);
    }

    #[test]
    fn test_validate_rejects_inverted_windows() {
        let config = SyncConfig {
            suppression_period_ms: 40_000,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SyncConfig {
            packet_spacing_ms: (20, 10),
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let config: SyncConfig = toml::from_str(
            r#"
            encoding = "most-recent"
            retx_period_ms = 10000
            rng_seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.encoding, EncodingStrategy::MostRecent);
        assert_eq!(config.retx_period_ms, 10_000);
        assert_eq!(config.rng_seed, Some(7));
        assert_eq!(config.suppression_period_ms, 200);
    }

    #[test]
    fn test_parse_strategy_with_payload() {
        let config: SyncConfig = toml::from_str(
            r#"
            [encoding.most-recent-and-random]
            extra = 3
            "#,
        )
        .unwrap();
        assert_eq!(
            config.encoding,
            EncodingStrategy::MostRecentAndRandom { extra: 3 }
        );
    }
}
