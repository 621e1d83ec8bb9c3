//! Ethereum 2.0 types used by fork choice.
//!
//! Only the containers and fields that fork choice reads are defined here; blocks and states are
//! reduced accordingly.

pub mod attestation;
pub mod beacon_block;
pub mod beacon_state;
pub mod chain_spec;
pub mod checkpoint;
pub mod consts;
pub mod eth_spec;
pub mod execution_block_hash;
pub mod fixed_bytes;
pub mod slot_epoch;

pub use crate::attestation::{AttestationData, AttesterSlashing, IndexedAttestation};
pub use crate::beacon_block::BeaconBlock;
pub use crate::beacon_state::{
    BeaconState, Error as BeaconStateError, FAR_FUTURE_EPOCH, ParticipationFlags, Validator,
};
pub use crate::chain_spec::ChainSpec;
pub use crate::checkpoint::Checkpoint;
pub use crate::eth_spec::{EthSpec, MainnetEthSpec, MinimalEthSpec};
pub use crate::execution_block_hash::ExecutionBlockHash;
pub use crate::fixed_bytes::{FixedBytesExtended, Hash256};
pub use crate::slot_epoch::{Epoch, Slot};
pub use safe_arith::ArithError;
