//! Index configuration.
//!
//! Every tunable lives in one [`IndexConfig`] value that is handed to each
//! component's constructor. Reading the document from disk is left to the
//! host process.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{IndexError, Result};

/// How far below a scan root the scanner descends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDepth {
    /// Descend at most this many levels below the scan root.
    Limited(u32),
    /// Walk the whole subtree.
    Unbounded,
}

impl ScanDepth {
    /// Returns true when a directory at `depth` must not be enumerated.
    #[inline]
    pub fn reached(self, depth: u32) -> bool {
        match self {
            Self::Limited(limit) => depth >= limit,
            Self::Unbounded => false,
        }
    }
}

impl Default for ScanDepth {
    fn default() -> Self {
        Self::Limited(1)
    }
}

impl fmt::Display for ScanDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(limit) => write!(f, "{limit}"),
            Self::Unbounded => f.write_str("all"),
        }
    }
}

impl FromStr for ScanDepth {
    type Err = IndexError;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("all") {
            return Ok(Self::Unbounded);
        }
        value
            .parse::<u32>()
            .map(Self::Limited)
            .map_err(|_| IndexError::Config(format!("invalid scan depth: {value:?}")))
    }
}

impl Serialize for ScanDepth {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Limited(limit) => serializer.serialize_u32(*limit),
            Self::Unbounded => serializer.serialize_str("all"),
        }
    }
}

impl<'de> Deserialize<'de> for ScanDepth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(limit) => Ok(Self::Limited(limit)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Which directory entries the scanner admits into the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    /// Skip hidden and system entries.
    #[default]
    Normal,
    /// Skip system entries only.
    ShowHidden,
    /// No filtering.
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexConfig {
    pub scan_depth: ScanDepth,
    pub visibility: Visibility,
    /// Popularity removed from every node per decay tick.
    pub decay_amount: u32,
    pub decay_interval_ms: u64,
    /// Decay and pruning only run while the tree holds more nodes than this.
    pub prune_threshold: usize,
    /// Minimum spacing between two executed watch rebuilds.
    pub rebuild_debounce_ms: u64,
    /// Upper bound on how long a watch worker blocks before rechecking its stop flag.
    pub watch_poll_timeout_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            scan_depth: ScanDepth::default(),
            visibility: Visibility::default(),
            decay_amount: 1,
            decay_interval_ms: 60_000,
            prune_threshold: 1_000,
            rebuild_debounce_ms: 1_000,
            watch_poll_timeout_ms: 1_000,
        }
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<()> {
        if self.decay_interval_ms == 0 {
            return Err(IndexError::Config(
                "decayIntervalMs must be greater than zero".to_string(),
            ));
        }
        if self.decay_amount == 0 {
            return Err(IndexError::Config(
                "decayAmount must be greater than zero".to_string(),
            ));
        }
        if self.watch_poll_timeout_ms == 0 {
            return Err(IndexError::Config(
                "watchPollTimeoutMs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn decay_interval(&self) -> Duration {
        Duration::from_millis(self.decay_interval_ms)
    }

    pub fn rebuild_debounce(&self) -> Duration {
        Duration::from_millis(self.rebuild_debounce_ms)
    }

    pub fn watch_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.watch_poll_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_depth_parses_integers_and_all() {
        assert_eq!("3".parse::<ScanDepth>().unwrap(), ScanDepth::Limited(3));
        assert_eq!("ALL".parse::<ScanDepth>().unwrap(), ScanDepth::Unbounded);
        assert!("deep".parse::<ScanDepth>().is_err());
    }

    #[test]
    fn scan_depth_limit() {
        assert!(ScanDepth::Limited(0).reached(0));
        assert!(!ScanDepth::Limited(2).reached(1));
        assert!(ScanDepth::Limited(2).reached(2));
        assert!(!ScanDepth::Unbounded.reached(u32::MAX));
    }

    #[test]
    fn partial_document_uses_defaults() {
        let config: IndexConfig =
            serde_json::from_str(r#"{"scanDepth":"all","visibility":"SHOW_HIDDEN"}"#).unwrap();
        assert_eq!(config.scan_depth, ScanDepth::Unbounded);
        assert_eq!(config.visibility, Visibility::ShowHidden);
        assert_eq!(config.decay_amount, 1);
        assert_eq!(config.rebuild_debounce(), Duration::from_secs(1));
    }

    #[test]
    fn numeric_depth_round_trips() {
        let config = IndexConfig {
            scan_depth: ScanDepth::Limited(4),
            ..IndexConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""scanDepth":4"#));
    }

    #[test]
    fn zero_poll_timeout_is_rejected() {
        let config = IndexConfig {
            watch_poll_timeout_ms: 0,
            ..IndexConfig::default()
        };
        assert!(matches!(config.validate(), Err(IndexError::Config(_))));
    }

    #[test]
    fn zero_decay_amount_is_rejected() {
        let config = IndexConfig {
            decay_amount: 0,
            ..IndexConfig::default()
        };
        assert!(matches!(config.validate(), Err(IndexError::Config(_))));
    }
}
