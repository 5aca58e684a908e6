//! Parameters for breakpoint extraction and clustering.
//!
//! Values come from an optional JSON file; fields missing from the file fall
//! back to the defaults below, and the command line overrides both.

use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;

use crate::error::{Error, Result};

fn default_key_seq_size() -> usize { 8 }
fn default_min_major_clip_size() -> u32 { 8 }
fn default_max_minor_clip_size() -> u32 { 15 }
fn default_check_interval() -> u64 { 1_000_000 }

/// Thresholds shared by the `parse` and `cluster` stages.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ParseConfig {
    /// Number of junction bases used to fingerprint a breakpoint
    #[serde(default = "default_key_seq_size")]
    pub key_seq_size: usize,
    /// Minimum clip length for a side of a read to count as junction evidence
    #[serde(default = "default_min_major_clip_size")]
    pub min_major_clip_size: u32,
    /// Clip length above which reads clipped on both sides are dropped by
    /// downstream filtering; carried through but not applied here
    #[serde(default = "default_max_minor_clip_size")]
    pub max_minor_clip_size: u32,
    /// Position gap between consecutive junctions that flushes the cluster window
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            key_seq_size: default_key_seq_size(),
            min_major_clip_size: default_min_major_clip_size(),
            max_minor_clip_size: default_max_minor_clip_size(),
            check_interval: default_check_interval(),
        }
    }
}

impl ParseConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &str) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(e, path))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .map_err(|e| Error::Config(format!("could not parse {}: {}", path, e)))
    }

    /// Reject values that would make extraction or clustering meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.key_seq_size == 0 {
            return Err(Error::Config("key_seq_size must be at least 1".into()));
        }
        if self.min_major_clip_size == 0 {
            return Err(Error::Config("min_major_clip_size must be at least 1".into()));
        }
        if self.check_interval == 0 {
            return Err(Error::Config("check_interval must be at least 1".into()));
        }
        if self.key_seq_size > self.min_major_clip_size as usize {
            warn!(
                "key_seq_size ({}) exceeds min_major_clip_size ({}); junction sequences of short clips will be truncated",
                self.key_seq_size, self.min_major_clip_size
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ParseConfig::default();
        assert_eq!(config.key_seq_size, 8);
        assert_eq!(config.min_major_clip_size, 8);
        assert_eq!(config.max_minor_clip_size, 15);
        assert_eq!(config.check_interval, 1_000_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ParseConfig = serde_json::from_str(r#"{"check_interval": 5000}"#).unwrap();
        assert_eq!(config.check_interval, 5000);
        assert_eq!(config.key_seq_size, 8);
        assert_eq!(config.min_major_clip_size, 8);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, r#"{"key_seq_size": 6, "min_major_clip_size": 10}"#).unwrap();

        let config = ParseConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.key_seq_size, 6);
        assert_eq!(config.min_major_clip_size, 10);
        assert_eq!(config.check_interval, 1_000_000);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = ParseConfig { key_seq_size: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = ParseConfig { check_interval: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = ParseConfig { min_major_clip_size: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
