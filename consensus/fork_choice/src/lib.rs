pub mod balances_provider;
mod beacon_fork_choice_store;
mod config;
mod fork_choice;
mod fork_choice_store;
pub mod metrics;

pub use crate::balances_provider::{
    BalancesStateSource, BalancesStateTier, BlockStateBalancesProvider, InMemoryStateSource,
    JustifiedBalancesProvider, StateFallbackBalancesProvider,
};
pub use crate::beacon_fork_choice_store::{BeaconForkChoiceStore, Error as StoreError};
pub use crate::config::{DEFAULT_PRUNE_THRESHOLD, ForkChoiceConfig};
pub use crate::fork_choice::{
    AttestationFromBlock, EpochDifference, Error, ForkChoice, ForkChoiceMetrics,
    InvalidAttestation, InvalidBlock, PayloadVerificationStatus, QueuedAttestation,
    compute_slots_since_epoch_start,
};
pub use fork_choice_store::ForkChoiceStore;
pub use proto_array::{Block as ProtoBlock, ExecutionStatus, JustifiedBalances, LvhExecResponse};
