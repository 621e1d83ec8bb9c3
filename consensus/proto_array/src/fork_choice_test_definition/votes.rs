use super::*;

pub fn get_votes_test_definition() -> ForkChoiceTestDefinition {
    let genesis = genesis_checkpoint();
    let mut ops = vec![];

    let block = |slot: u64, root: u64, parent: u64| Operation::ProcessBlock {
        slot: Slot::new(slot),
        root: get_root(root),
        parent_root: get_root(parent),
        justified_checkpoint: genesis,
        finalized_checkpoint: genesis,
        execution_block_hash: None,
    };
    let find_head = |balances: &[u64], expected_head: u64| Operation::FindHead {
        justified_checkpoint: genesis,
        finalized_checkpoint: genesis,
        justified_state_balances: balances.to_vec(),
        expected_head: get_root(expected_head),
    };
    let vote = |validator_index: usize, root: u64, epoch: u64| Operation::ProcessAttestation {
        validator_index,
        block_root: get_root(root),
        target_epoch: Epoch::new(epoch),
    };
    let weight = |root: u64, weight: u64| Operation::AssertWeight {
        block_root: get_root(root),
        weight,
    };

    // Ensure that the head starts at the finalized block.
    ops.push(find_head(&[1, 1], 0));

    // Add a block with a hash of 2.
    //
    //          0
    //         /
    //        2
    ops.push(block(1, 2, 0));
    ops.push(find_head(&[1, 1], 2));

    // Add a block with a hash of 1 that comes off the genesis block (this is a fork compared
    // to the previous block).
    //
    //          0
    //         / \
    //        2   1
    ops.push(block(1, 1, 0));

    // Ensure that the head is still 2, 2 wins the tie-break on root.
    ops.push(find_head(&[1, 1], 2));

    // Add a vote to block 1
    //
    //          0
    //         / \
    //        2   1 <- +vote
    ops.push(vote(0, 1, 2));
    ops.push(find_head(&[1, 1], 1));

    // Add a vote to block 2
    //
    //           0
    //          / \
    // +vote-> 2   1
    ops.push(vote(1, 2, 2));

    // Ensure that the head is 2 since 1 and 2 both have a vote and 2 wins the tie-break.
    ops.push(find_head(&[1, 1], 2));

    // Add block 3.
    //
    //          0
    //         / \
    //        2   1
    //            |
    //            3
    ops.push(block(2, 3, 1));

    // Ensure that the head is still 2
    ops.push(find_head(&[1, 1], 2));

    // Move validator #0 vote from 1 to 3
    //
    //          0
    //         / \
    //        2   1 <- -vote
    //            |
    //            3 <- +vote
    ops.push(vote(0, 3, 3));

    // Ensure that the head is still 2, the weight of 3 is counted in 1.
    ops.push(find_head(&[1, 1], 2));

    // Move validator #1 vote from 2 to 1 (this is an equivocation, but fork choice doesn't
    // care)
    //
    //           0
    //          / \
    // -vote-> 2   1 <- +vote
    //             |
    //             3
    ops.push(vote(1, 1, 3));

    // Ensure that the head is now 3
    ops.push(find_head(&[1, 1], 3));

    // Add block 4.
    //
    //          0
    //         / \
    //        2   1
    //            |
    //            3
    //            |
    //            4
    ops.push(block(3, 4, 3));
    ops.push(find_head(&[1, 1], 4));

    // Add blocks 5 and 6, both children of 4.
    //
    //          0
    //         / \
    //        2   1
    //            |
    //            3
    //            |
    //            4
    //           / \
    //          5   6
    ops.push(block(4, 5, 4));
    ops.push(block(4, 6, 4));
    ops.push(find_head(&[1, 1], 6));

    // Move validator #0 to 5.
    ops.push(vote(0, 5, 4));
    ops.push(find_head(&[1, 1], 5));

    // Move validator #1 to 6 and double its balance.
    ops.push(vote(1, 6, 4));
    ops.push(find_head(&[1, 2], 6));

    // Give block 5 a proposer boost. The committee weight of 66 active validators outweighs the
    // two votes on 6.
    let mut boosted_balances = vec![1, 2];
    boosted_balances.extend(vec![100; 64]);
    ops.push(Operation::ProposerBoostFindHead {
        justified_checkpoint: genesis,
        finalized_checkpoint: genesis,
        justified_state_balances: boosted_balances,
        expected_head: get_root(5),
        proposer_boost_root: get_root(5),
    });
    ops.push(weight(5, 78));

    // The boost is removed by the next run.
    ops.push(find_head(&[1, 2], 6));
    ops.push(weight(5, 1));

    // Raise the balance of validator #0 above validator #1.
    ops.push(find_head(&[3, 2], 5));

    // Validator #0 leaves the validator set.
    ops.push(find_head(&[0, 2], 6));
    ops.push(weight(0, 2));
    ops.push(weight(1, 2));
    ops.push(weight(2, 0));
    ops.push(weight(4, 2));
    ops.push(weight(5, 0));
    ops.push(weight(6, 2));

    // An old vote is ignored.
    ops.push(vote(1, 5, 3));
    ops.push(find_head(&[0, 2], 6));

    // Try to prune, but the threshold is too high.
    ops.push(Operation::Prune {
        finalized_root: get_root(3),
        prune_threshold: usize::MAX,
        expected_len: 7,
    });

    // Prune everything before 3.
    //
    //     3
    //     |
    //     4
    //    / \
    //   5   6
    ops.push(Operation::Prune {
        finalized_root: get_root(3),
        prune_threshold: 1,
        expected_len: 4,
    });

    let finalized = Checkpoint {
        epoch: Epoch::new(0),
        root: get_root(3),
    };
    ops.push(Operation::FindHead {
        justified_checkpoint: finalized,
        finalized_checkpoint: finalized,
        justified_state_balances: vec![0, 2],
        expected_head: get_root(6),
    });

    // Votes still follow their blocks after pruning.
    //
    //     3
    //     |
    //     4
    //    / \
    //   5   6
    //       |
    //       7 <- +vote
    ops.push(block(5, 7, 6));
    ops.push(vote(1, 7, 5));
    ops.push(Operation::FindHead {
        justified_checkpoint: finalized,
        finalized_checkpoint: finalized,
        justified_state_balances: vec![0, 2],
        expected_head: get_root(7),
    });
    ops.push(weight(7, 2));
    ops.push(weight(3, 2));

    ForkChoiceTestDefinition {
        finalized_block_slot: Slot::new(0),
        justified_checkpoint: genesis,
        finalized_checkpoint: genesis,
        operations: ops,
    }
}
