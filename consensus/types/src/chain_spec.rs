use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// Runtime network parameters that fork choice depends upon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainSpec {
    pub seconds_per_slot: u64,
    /// Percentage of a committee's weight granted to a timely block, `None` disables boosting.
    #[serde(default)]
    pub proposer_score_boost: Option<u64>,
}

impl ChainSpec {
    /// Mainnet parameters.
    pub fn mainnet() -> Self {
        Self {
            seconds_per_slot: 12,
            proposer_score_boost: Some(40),
        }
    }

    /// Ethereum Foundation minimal spec, as defined in the eth2.0-specs repo.
    pub fn minimal() -> Self {
        Self {
            seconds_per_slot: 6,
            ..ChainSpec::mainnet()
        }
    }

    /// Load a `ChainSpec` from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|e| format!("Unable to open {}: {:?}", path.display(), e))?;
        serde_yaml::from_reader(file)
            .map_err(|e| format!("Unable to parse {}: {:?}", path.display(), e))
    }
}

impl Default for ChainSpec {
    fn default() -> Self {
        Self::mainnet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn presets() {
        assert_eq!(ChainSpec::mainnet().seconds_per_slot, 12);
        assert_eq!(ChainSpec::minimal().seconds_per_slot, 6);
        assert_eq!(
            ChainSpec::minimal().proposer_score_boost,
            ChainSpec::mainnet().proposer_score_boost
        );
    }

    #[test]
    fn load_from_yaml() {
        let mut file = tempfile::NamedTempFile::new().expect("should create temp file");
        writeln!(file, "seconds_per_slot: 4").expect("should write");
        let spec = ChainSpec::from_file(file.path()).expect("should parse spec");
        assert_eq!(
            spec,
            ChainSpec {
                seconds_per_slot: 4,
                proposer_score_boost: None,
            },
            "missing boost should disable boosting"
        );
    }

    #[test]
    fn reject_unknown_fields() {
        let mut file = tempfile::NamedTempFile::new().expect("should create temp file");
        writeln!(file, "seconds_per_slot: 4\nslots_per_eon: 9").expect("should write");
        assert!(ChainSpec::from_file(file.path()).is_err());
    }
}
