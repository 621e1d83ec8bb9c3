use crate::{ExecutionBlockHash, Hash256, Slot};
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};

/// The fields of a beacon block that fork choice consumes.
///
/// The body is reduced to the execution payload's block hash. It is `None` for blocks prior to
/// the merge fork.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Encode, Decode)]
pub struct BeaconBlock {
    pub slot: Slot,
    pub proposer_index: u64,
    pub parent_root: Hash256,
    pub state_root: Hash256,
    pub execution_block_hash: Option<ExecutionBlockHash>,
}

impl BeaconBlock {
    /// Returns an empty block at `slot` with no execution payload.
    pub fn empty(slot: Slot, parent_root: Hash256) -> Self {
        Self {
            slot,
            parent_root,
            ..Self::default()
        }
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn parent_root(&self) -> Hash256 {
        self.parent_root
    }

    pub fn state_root(&self) -> Hash256 {
        self.state_root
    }

    pub fn execution_block_hash(&self) -> Option<ExecutionBlockHash> {
        self.execution_block_hash
    }
}
