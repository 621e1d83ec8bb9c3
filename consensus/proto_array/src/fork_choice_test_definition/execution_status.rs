use super::*;

pub fn get_execution_status_test_definition() -> ForkChoiceTestDefinition {
    let genesis = genesis_checkpoint();
    let balances = vec![1, 1];
    let mut ops = vec![];

    let block = |slot: u64, root: u64, parent: u64| Operation::ProcessBlock {
        slot: Slot::new(slot),
        root: get_root(root),
        parent_root: get_root(parent),
        justified_checkpoint: genesis,
        finalized_checkpoint: genesis,
        execution_block_hash: Some(get_hash(root)),
    };
    let find_head = |expected_head: u64| Operation::FindHead {
        justified_checkpoint: genesis,
        finalized_checkpoint: genesis,
        justified_state_balances: balances.clone(),
        expected_head: get_root(expected_head),
    };
    let status = |root: u64, execution_status: ExecutionStatus| {
        Operation::AssertExecutionStatus {
            block_root: get_root(root),
            execution_status,
        }
    };

    // The genesis block is pre-merge, every other block carries a payload.
    //
    //          0
    //          |
    //          1
    //         / \
    //        2   3
    ops.push(block(1, 1, 0));
    ops.push(block(2, 2, 1));
    ops.push(block(2, 3, 1));
    ops.push(status(0, ExecutionStatus::PreMerge));
    ops.push(status(2, ExecutionStatus::Syncing(get_hash(2))));

    // 3 wins the tie-break.
    ops.push(find_head(3));

    // Add a vote to 2.
    ops.push(Operation::ProcessAttestation {
        validator_index: 0,
        block_root: get_root(2),
        target_epoch: Epoch::new(1),
    });
    ops.push(find_head(2));
    ops.push(Operation::AssertWeight {
        block_root: get_root(1),
        weight: 1,
    });

    // Invalidate 2, keeping its parent.
    //
    //          0
    //          |
    //          1 <- latest valid hash
    //         / \
    //   -> x 2   3
    ops.push(Operation::ValidateLatestHash {
        response: LvhExecResponse::Invalid {
            latest_valid_exec_hash: Some(get_hash(1)),
            invalidate_from_block_hash: get_hash(2),
        },
        expected_error: None,
    });
    ops.push(status(2, ExecutionStatus::Invalid(get_hash(2))));
    ops.push(status(1, ExecutionStatus::Syncing(get_hash(1))));

    // The vote on 2 no longer counts.
    ops.push(find_head(3));
    ops.push(Operation::AssertWeight {
        block_root: get_root(2),
        weight: 0,
    });
    ops.push(Operation::AssertWeight {
        block_root: get_root(1),
        weight: 0,
    });

    // Validating 3 validates its ancestors.
    ops.push(Operation::ValidateLatestHash {
        response: LvhExecResponse::Valid {
            latest_valid_exec_hash: get_hash(3),
        },
        expected_error: None,
    });
    ops.push(status(3, ExecutionStatus::Valid(get_hash(3))));
    ops.push(status(1, ExecutionStatus::Valid(get_hash(1))));
    ops.push(status(0, ExecutionStatus::PreMerge));

    // A valid block cannot be invalidated, and the failed response changes nothing.
    ops.push(Operation::ValidateLatestHash {
        response: LvhExecResponse::Invalid {
            latest_valid_exec_hash: Some(ExecutionBlockHash::zero()),
            invalidate_from_block_hash: get_hash(3),
        },
        expected_error: Some(LvhExecErrorCode::ValidToInvalid),
    });
    ops.push(status(3, ExecutionStatus::Valid(get_hash(3))));

    // An invalid block cannot be validated.
    ops.push(Operation::ValidateLatestHash {
        response: LvhExecResponse::Valid {
            latest_valid_exec_hash: get_hash(2),
        },
        expected_error: Some(LvhExecErrorCode::InvalidToValid),
    });

    // Responses about unknown payloads are ignored.
    ops.push(Operation::ValidateLatestHash {
        response: LvhExecResponse::Valid {
            latest_valid_exec_hash: get_hash(42),
        },
        expected_error: None,
    });

    // Add 4 on top of 3 and invalidate it with an unknown latest valid hash.
    //
    //          0
    //          |
    //          1
    //         / \
    //      x 2   3
    //            |
    //            4 x <-
    ops.push(block(3, 4, 3));
    ops.push(find_head(4));
    ops.push(Operation::ValidateLatestHash {
        response: LvhExecResponse::Invalid {
            latest_valid_exec_hash: Some(get_hash(42)),
            invalidate_from_block_hash: get_hash(4),
        },
        expected_error: None,
    });
    ops.push(status(4, ExecutionStatus::Invalid(get_hash(4))));
    ops.push(status(3, ExecutionStatus::Valid(get_hash(3))));
    ops.push(find_head(3));

    ForkChoiceTestDefinition {
        finalized_block_slot: Slot::new(0),
        justified_checkpoint: genesis,
        finalized_checkpoint: genesis,
        operations: ops,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test() {
        let test = get_execution_status_test_definition();
        test.run();
    }
}
