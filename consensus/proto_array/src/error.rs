use safe_arith::ArithError;
use serde::{Deserialize, Serialize};
use types::{Checkpoint, ExecutionBlockHash, Hash256, Slot};

#[derive(Clone, PartialEq, Debug)]
pub enum Error {
    FinalizedNodeUnknown(Hash256),
    JustifiedNodeUnknown(Hash256),
    NodeUnknown(Hash256),
    DuplicateBlock(Hash256),
    InvalidParent {
        block_root: Hash256,
        parent_root: Option<Hash256>,
    },
    InvalidNodeIndex(usize),
    InvalidParentIndex(usize),
    InvalidBestChildIndex(usize),
    InvalidJustifiedIndex(usize),
    InvalidBestDescendant(usize),
    InvalidParentDelta(usize),
    InvalidNodeDelta(usize),
    DeltaOverflow(usize),
    ProposerBoostOverflow(usize),
    IndexOverflow(&'static str),
    InvalidExecutionDeltaOverflow(usize),
    InvalidDeltaLen {
        deltas: usize,
        indices: usize,
    },
    InvalidBestNode(Box<InvalidBestNodeInfo>),
    InvalidJustifiedCheckpointExecutionStatus {
        justified_root: Hash256,
    },
    ParentExecutionStatusIsInvalid {
        block_root: Hash256,
        parent_root: Hash256,
    },
    InvalidLvhExecutionResponse(LvhExecError),
    Arith(ArithError),
}

impl From<ArithError> for Error {
    fn from(e: ArithError) -> Self {
        Error::Arith(e)
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct InvalidBestNodeInfo {
    pub current_slot: Slot,
    pub start_root: Hash256,
    pub justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub head_root: Hash256,
    pub head_justified_checkpoint: Checkpoint,
    pub head_finalized_checkpoint: Checkpoint,
}

/// The ways in which an execution layer's latest-valid-hash response can contradict what fork
/// choice already knows.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum LvhExecErrorCode {
    /// A block already marked valid would become invalid.
    ValidToInvalid,
    /// A block already marked invalid would become valid.
    InvalidToValid,
    /// The justified or finalized block would become invalid.
    InvalidJustifiedOrFinalized,
}

#[derive(Clone, PartialEq, Debug)]
pub struct LvhExecError {
    pub code: LvhExecErrorCode,
    pub block_root: Hash256,
    pub exec_hash: ExecutionBlockHash,
}

impl LvhExecError {
    pub fn new(code: LvhExecErrorCode, block_root: Hash256, exec_hash: ExecutionBlockHash) -> Self {
        Self {
            code,
            block_root,
            exec_hash,
        }
    }
}

impl From<LvhExecError> for Error {
    fn from(e: LvhExecError) -> Self {
        Error::InvalidLvhExecutionResponse(e)
    }
}
