use crate::{ChainSpec, Epoch};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Compile-time preset values for a network.
pub trait EthSpec: 'static + Default + Sync + Send + Clone + Copy + Debug + PartialEq + Eq {
    const SLOTS_PER_EPOCH: u64;
    const SLOTS_PER_HISTORICAL_ROOT: usize;

    fn default_spec() -> ChainSpec;

    fn genesis_epoch() -> Epoch {
        Epoch::new(crate::consts::GENESIS_EPOCH)
    }

    /// Returns the `SLOTS_PER_EPOCH` constant for this preset.
    fn slots_per_epoch() -> u64 {
        Self::SLOTS_PER_EPOCH
    }

    /// Returns the `SLOTS_PER_HISTORICAL_ROOT` constant for this preset.
    fn slots_per_historical_root() -> usize {
        Self::SLOTS_PER_HISTORICAL_ROOT
    }
}

/// Mainnet preset.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct MainnetEthSpec;

impl EthSpec for MainnetEthSpec {
    const SLOTS_PER_EPOCH: u64 = 32;
    const SLOTS_PER_HISTORICAL_ROOT: usize = 8192;

    fn default_spec() -> ChainSpec {
        ChainSpec::mainnet()
    }
}

/// Ethereum Foundation minimal spec, as defined in the eth2.0-specs repo.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct MinimalEthSpec;

impl EthSpec for MinimalEthSpec {
    const SLOTS_PER_EPOCH: u64 = 8;
    const SLOTS_PER_HISTORICAL_ROOT: usize = 64;

    fn default_spec() -> ChainSpec {
        ChainSpec::minimal()
    }
}
