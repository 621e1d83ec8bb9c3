use crate::{Checkpoint, Hash256, Slot};
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};

/// The data upon which an attestation is based.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Encode, Decode,
)]
pub struct AttestationData {
    pub slot: Slot,
    pub index: u64,
    // LMD GHOST vote
    pub beacon_block_root: Hash256,
    // FFG Vote
    pub source: Checkpoint,
    pub target: Checkpoint,
}

/// An attestation whose aggregation bits have been resolved to validator indices.
///
/// Signatures are verified before an attestation reaches fork choice, so none is carried here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Encode, Decode)]
pub struct IndexedAttestation {
    /// Lists validator registry indices, not committee indices.
    pub attesting_indices: Vec<u64>,
    pub data: AttestationData,
}

impl IndexedAttestation {
    pub fn attesting_indices_is_empty(&self) -> bool {
        self.attesting_indices.is_empty()
    }

    pub fn attesting_indices_iter(&self) -> impl Iterator<Item = &u64> {
        self.attesting_indices.iter()
    }
}

/// Two conflicting attestations signed by an overlapping set of validators.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Encode, Decode)]
pub struct AttesterSlashing {
    pub attestation_1: IndexedAttestation,
    pub attestation_2: IndexedAttestation,
}
