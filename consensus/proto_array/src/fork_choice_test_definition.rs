mod execution_status;
mod no_votes;
mod votes;

use crate::error::LvhExecErrorCode;
use crate::proto_array::LvhExecResponse;
use crate::{Block, Error, ExecutionStatus, JustifiedBalances, ProtoArrayForkChoice};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use types::{
    ChainSpec, Checkpoint, Epoch, EthSpec, ExecutionBlockHash, FixedBytesExtended, Hash256,
    MainnetEthSpec, Slot,
};

pub use execution_status::get_execution_status_test_definition;
pub use no_votes::get_no_votes_test_definition;
pub use votes::get_votes_test_definition;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    FindHead {
        justified_checkpoint: Checkpoint,
        finalized_checkpoint: Checkpoint,
        justified_state_balances: Vec<u64>,
        expected_head: Hash256,
    },
    ProposerBoostFindHead {
        justified_checkpoint: Checkpoint,
        finalized_checkpoint: Checkpoint,
        justified_state_balances: Vec<u64>,
        expected_head: Hash256,
        proposer_boost_root: Hash256,
    },
    InvalidFindHead {
        justified_checkpoint: Checkpoint,
        finalized_checkpoint: Checkpoint,
        justified_state_balances: Vec<u64>,
    },
    ProcessBlock {
        slot: Slot,
        root: Hash256,
        parent_root: Hash256,
        justified_checkpoint: Checkpoint,
        finalized_checkpoint: Checkpoint,
        /// A block with a payload hash is inserted as `Syncing`, otherwise as `PreMerge`.
        execution_block_hash: Option<ExecutionBlockHash>,
    },
    ProcessAttestation {
        validator_index: usize,
        block_root: Hash256,
        target_epoch: Epoch,
    },
    Prune {
        finalized_root: Hash256,
        prune_threshold: usize,
        expected_len: usize,
    },
    ValidateLatestHash {
        response: LvhExecResponse,
        expected_error: Option<LvhExecErrorCode>,
    },
    AssertWeight {
        block_root: Hash256,
        weight: u64,
    },
    AssertExecutionStatus {
        block_root: Hash256,
        execution_status: ExecutionStatus,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkChoiceTestDefinition {
    pub finalized_block_slot: Slot,
    pub justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub operations: Vec<Operation>,
}

impl ForkChoiceTestDefinition {
    /// Run every operation in order, panicking on the first unexpected outcome.
    ///
    /// The current slot follows the highest block slot seen so far.
    pub fn run(self) {
        let spec = ChainSpec::mainnet();
        let mut current_slot = self.finalized_block_slot;

        let mut fork_choice = ProtoArrayForkChoice::new::<MainnetEthSpec>(
            current_slot,
            self.finalized_block_slot,
            Hash256::zero(),
            self.justified_checkpoint,
            self.finalized_checkpoint,
            ExecutionStatus::PreMerge,
        )
        .expect("should create fork choice struct");
        let equivocating_indices = BTreeSet::new();

        for (op_index, op) in self.operations.into_iter().enumerate() {
            match op.clone() {
                Operation::FindHead {
                    justified_checkpoint,
                    finalized_checkpoint,
                    justified_state_balances,
                    expected_head,
                } => {
                    let justified_balances =
                        JustifiedBalances::from_effective_balances(justified_state_balances)
                            .unwrap();
                    let head = fork_choice
                        .find_head::<MainnetEthSpec>(
                            justified_checkpoint,
                            finalized_checkpoint,
                            &justified_balances,
                            Hash256::zero(),
                            &equivocating_indices,
                            current_slot,
                            &spec,
                        )
                        .unwrap_or_else(|e| {
                            panic!("find_head op at index {} returned error {:?}", op_index, e)
                        });

                    assert_eq!(
                        head, expected_head,
                        "Operation at index {} failed head check. Operation: {:?}",
                        op_index, op
                    );
                    check_yaml_round_trip(&fork_choice);
                }
                Operation::ProposerBoostFindHead {
                    justified_checkpoint,
                    finalized_checkpoint,
                    justified_state_balances,
                    expected_head,
                    proposer_boost_root,
                } => {
                    let justified_balances =
                        JustifiedBalances::from_effective_balances(justified_state_balances)
                            .unwrap();
                    let head = fork_choice
                        .find_head::<MainnetEthSpec>(
                            justified_checkpoint,
                            finalized_checkpoint,
                            &justified_balances,
                            proposer_boost_root,
                            &equivocating_indices,
                            current_slot,
                            &spec,
                        )
                        .unwrap_or_else(|e| {
                            panic!("find_head op at index {} returned error {:?}", op_index, e)
                        });

                    assert_eq!(
                        head, expected_head,
                        "Operation at index {} failed head check. Operation: {:?}",
                        op_index, op
                    );
                }
                Operation::InvalidFindHead {
                    justified_checkpoint,
                    finalized_checkpoint,
                    justified_state_balances,
                } => {
                    let justified_balances =
                        JustifiedBalances::from_effective_balances(justified_state_balances)
                            .unwrap();
                    let result = fork_choice.find_head::<MainnetEthSpec>(
                        justified_checkpoint,
                        finalized_checkpoint,
                        &justified_balances,
                        Hash256::zero(),
                        &equivocating_indices,
                        current_slot,
                        &spec,
                    );

                    assert!(
                        result.is_err(),
                        "Operation at index {} . Operation: {:?}",
                        op_index,
                        op
                    );
                }
                Operation::ProcessBlock {
                    slot,
                    root,
                    parent_root,
                    justified_checkpoint,
                    finalized_checkpoint,
                    execution_block_hash,
                } => {
                    current_slot = current_slot.max(slot);
                    let block = Block {
                        slot,
                        root,
                        parent_root: Some(parent_root),
                        state_root: Hash256::zero(),
                        target_root: Hash256::zero(),
                        justified_checkpoint,
                        finalized_checkpoint,
                        execution_status: execution_block_hash
                            .map_or(ExecutionStatus::PreMerge, ExecutionStatus::Syncing),
                        unrealized_justified_checkpoint: justified_checkpoint,
                        unrealized_finalized_checkpoint: finalized_checkpoint,
                    };
                    fork_choice
                        .process_block::<MainnetEthSpec>(block, current_slot)
                        .unwrap_or_else(|e| {
                            panic!(
                                "process_block op at index {} returned error: {:?}",
                                op_index, e
                            )
                        });
                    check_yaml_round_trip(&fork_choice);
                }
                Operation::ProcessAttestation {
                    validator_index,
                    block_root,
                    target_epoch,
                } => {
                    fork_choice
                        .process_attestation(validator_index, block_root, target_epoch)
                        .unwrap_or_else(|_| {
                            panic!(
                                "process_attestation op at index {} returned error",
                                op_index
                            )
                        });
                }
                Operation::Prune {
                    finalized_root,
                    prune_threshold,
                    expected_len,
                } => {
                    fork_choice.set_prune_threshold(prune_threshold);
                    fork_choice
                        .maybe_prune(finalized_root)
                        .unwrap_or_else(|e| {
                            panic!("prune op at index {} returned error: {:?}", op_index, e)
                        });

                    assert_eq!(
                        fork_choice.len(),
                        expected_len,
                        "Prune op at index {} failed with {} instead of {}",
                        op_index,
                        fork_choice.len(),
                        expected_len
                    );
                }
                Operation::ValidateLatestHash {
                    response,
                    expected_error,
                } => {
                    let result =
                        fork_choice.validate_latest_hash::<MainnetEthSpec>(response, current_slot);
                    match (result, expected_error) {
                        (Ok(()), None) => (),
                        (Err(Error::InvalidLvhExecutionResponse(e)), Some(code)) => assert_eq!(
                            e.code, code,
                            "Operation at index {} failed error check. Operation: {:?}",
                            op_index, op
                        ),
                        (result, expected) => panic!(
                            "validate_latest_hash op at index {} returned {:?}, expected {:?}",
                            op_index, result, expected
                        ),
                    }
                }
                Operation::AssertWeight { block_root, weight } => assert_eq!(
                    fork_choice.get_weight(&block_root).unwrap(),
                    weight,
                    "block weight"
                ),
                Operation::AssertExecutionStatus {
                    block_root,
                    execution_status,
                } => assert_eq!(
                    fork_choice.get_block_execution_status(&block_root),
                    Some(execution_status),
                    "Operation at index {} failed execution status check. Operation: {:?}",
                    op_index,
                    op
                ),
            }
        }
    }
}

/// Gives a root that is not the zero hash (unless i is `usize::MAX`).
fn get_root(i: u64) -> Hash256 {
    Hash256::from_low_u64_be(i + 1)
}

/// Gives a hash that is not the zero hash (unless i is `usize::MAX`).
fn get_hash(i: u64) -> ExecutionBlockHash {
    ExecutionBlockHash::from_root(get_root(i))
}

fn get_checkpoint(i: u64) -> Checkpoint {
    Checkpoint {
        epoch: Epoch::new(i),
        root: get_root(i),
    }
}

/// The genesis checkpoint shared by every scenario.
fn genesis_checkpoint() -> Checkpoint {
    Checkpoint {
        epoch: MainnetEthSpec::genesis_epoch(),
        root: get_root(0),
    }
}

/// Ensure the core array survives a trip through YAML unchanged.
fn check_yaml_round_trip(original: &ProtoArrayForkChoice) {
    let yaml = serde_yaml::to_string(original.core_proto_array())
        .expect("proto array should serialize");
    let decoded: crate::core::ProtoArray =
        serde_yaml::from_str(&yaml).expect("proto array should deserialize");
    assert_eq!(
        original.core_proto_array(),
        &decoded,
        "proto array should be equal after a yaml round trip"
    );
}

/// All scenarios, in the order the `proto_array` binary writes them.
pub fn all_test_definitions() -> Vec<(&'static str, ForkChoiceTestDefinition)> {
    vec![
        ("no_votes", get_no_votes_test_definition()),
        ("votes", get_votes_test_definition()),
        ("execution_status", get_execution_status_test_definition()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definitions_survive_yaml() {
        for (name, definition) in all_test_definitions() {
            let yaml = serde_yaml::to_string(&definition).expect("should serialize");
            let decoded: ForkChoiceTestDefinition =
                serde_yaml::from_str(&yaml).expect("should deserialize");
            assert_eq!(
                decoded.operations.len(),
                definition.operations.len(),
                "{} should keep every operation",
                name
            );
            decoded.run();
        }
    }
}
