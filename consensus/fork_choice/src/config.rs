use serde::{Deserialize, Serialize};

/// The default number of finalized blocks which must accumulate before the proto-array is pruned.
pub const DEFAULT_PRUNE_THRESHOLD: usize = 256;

/// Toggles for the behaviours of `ForkChoice` which deployments may want to disable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForkChoiceConfig {
    /// Apply the proposer score boost to timely blocks.
    pub proposer_boost_enabled: bool,
    /// Compute unrealized checkpoints for every imported block. When disabled, blocks use the
    /// checkpoints already present in their post-state.
    pub compute_unrealized: bool,
    pub prune_threshold: usize,
}

impl Default for ForkChoiceConfig {
    fn default() -> Self {
        Self {
            proposer_boost_enabled: true,
            compute_unrealized: true,
            prune_threshold: DEFAULT_PRUNE_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: ForkChoiceConfig =
            serde_json::from_str(r#"{"proposer_boost_enabled": false}"#).expect("should parse");
        assert_eq!(
            config,
            ForkChoiceConfig {
                proposer_boost_enabled: false,
                ..ForkChoiceConfig::default()
            }
        );
    }
}
