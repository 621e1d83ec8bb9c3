use crate::error::{InvalidBestNodeInfo, LvhExecError, LvhExecErrorCode};
use crate::{Block, ExecutionStatus, JustifiedBalances, error::Error};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use types::{ChainSpec, Checkpoint, EthSpec, ExecutionBlockHash, Hash256, Slot};

/// A response from an execution engine about the validity of one or more payloads.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum LvhExecResponse {
    /// The payload with `latest_valid_exec_hash` and all its ancestors are valid.
    Valid {
        latest_valid_exec_hash: ExecutionBlockHash,
    },
    /// The payload with `invalidate_from_block_hash` is invalid.
    ///
    /// If `latest_valid_exec_hash` is the zero hash then every post-merge ancestor is invalid too.
    /// If it names a known ancestor, every block after that ancestor is invalid. Otherwise only
    /// the block carrying `invalidate_from_block_hash` (and its descendants) are invalidated.
    Invalid {
        latest_valid_exec_hash: Option<ExecutionBlockHash>,
        invalidate_from_block_hash: ExecutionBlockHash,
    },
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct ProtoNode {
    /// The `slot` is not necessary for `ProtoArray`, it just exists so external components can
    /// easily query the block slot. This is useful for upstream fork choice logic.
    pub slot: Slot,
    /// The `state_root` is not necessary for `ProtoArray` either, it also just exists for upstream
    /// components (namely attestation verification).
    pub state_root: Hash256,
    /// The root that would be used for the `attestation.data.target.root` if a LMD vote was cast
    /// for this block.
    pub target_root: Hash256,
    pub root: Hash256,
    pub parent: Option<usize>,
    pub justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub weight: u64,
    pub best_child: Option<usize>,
    pub best_descendant: Option<usize>,
    /// Indicates if an execution node has marked this block as valid. Also contains the execution
    /// block hash.
    pub execution_status: ExecutionStatus,
    pub unrealized_justified_checkpoint: Checkpoint,
    pub unrealized_finalized_checkpoint: Checkpoint,
}

#[derive(PartialEq, Debug, Serialize, Deserialize, Copy, Clone, Default)]
pub struct ProposerBoost {
    pub root: Hash256,
    pub score: u64,
}

#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct ProtoArray {
    /// Do not attempt to prune the tree unless it has at least this many nodes. Small prunes
    /// simply waste time.
    pub prune_threshold: usize,
    pub justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub nodes: Vec<ProtoNode>,
    pub indices: HashMap<Hash256, usize>,
    pub previous_proposer_boost: ProposerBoost,
}

impl ProtoArray {
    /// Iterate backwards through the array, touching all nodes and their parents and potentially
    /// the best-child of each parent.
    ///
    /// The structure of the `self.nodes` array ensures that the child of each node is always
    /// touched before its parent.
    ///
    /// For each node, the following is done:
    ///
    /// - Update the node's weight with the corresponding delta.
    /// - Back-propagate each node's delta to its parents delta.
    /// - Compare the current node with the parents best-child, updating it if the current node
    ///   should become the best child.
    /// - If required, update the parents best-descendant with the current node or its
    ///   best-descendant.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_score_changes<E: EthSpec>(
        &mut self,
        mut deltas: Vec<i64>,
        justified_checkpoint: Checkpoint,
        finalized_checkpoint: Checkpoint,
        new_justified_balances: &JustifiedBalances,
        proposer_boost_root: Hash256,
        current_slot: Slot,
        spec: &ChainSpec,
    ) -> Result<(), Error> {
        if deltas.len() != self.indices.len() {
            return Err(Error::InvalidDeltaLen {
                deltas: deltas.len(),
                indices: self.indices.len(),
            });
        }

        self.justified_checkpoint = justified_checkpoint;
        self.finalized_checkpoint = finalized_checkpoint;

        // Default the proposer boost score to zero.
        let mut proposer_score = 0;

        // Iterate backwards through all indices in `self.nodes`.
        for node_index in (0..self.nodes.len()).rev() {
            let node = self
                .nodes
                .get_mut(node_index)
                .ok_or(Error::InvalidNodeIndex(node_index))?;

            let execution_status_is_invalid = node.execution_status.is_invalid();

            let mut node_delta = if execution_status_is_invalid {
                // If the node has an invalid execution payload, reduce its weight to zero.
                0_i64
                    .checked_sub(node.weight as i64)
                    .ok_or(Error::InvalidExecutionDeltaOverflow(node_index))?
            } else {
                deltas
                    .get(node_index)
                    .copied()
                    .ok_or(Error::InvalidNodeDelta(node_index))?
            };

            // If we find the node for which the proposer boost was previously applied, decrease
            // the delta by the previous score amount.
            if self.previous_proposer_boost.root != Hash256::ZERO
                && self.previous_proposer_boost.root == node.root
                // Invalid nodes will always have a weight of zero so there's no need to subtract
                // the proposer boost delta.
                && !execution_status_is_invalid
            {
                node_delta = node_delta
                    .checked_sub(self.previous_proposer_boost.score as i64)
                    .ok_or(Error::DeltaOverflow(node_index))?;
            }
            // If we find the node matching the current proposer boost root, increase
            // the delta by the new score amount (unless the block has an invalid execution status).
            if let Some(proposer_score_boost) = spec.proposer_score_boost
                && proposer_boost_root != Hash256::ZERO
                && proposer_boost_root == node.root
                // Invalid nodes (or their ancestors) should not receive a proposer boost.
                && !execution_status_is_invalid
            {
                proposer_score =
                    calculate_committee_fraction::<E>(new_justified_balances, proposer_score_boost)
                        .ok_or(Error::ProposerBoostOverflow(node_index))?;
                node_delta = node_delta
                    .checked_add(proposer_score as i64)
                    .ok_or(Error::DeltaOverflow(node_index))?;
            }

            // Apply the delta to the node.
            if execution_status_is_invalid {
                // Invalid nodes always have a weight of 0.
                node.weight = 0;
            } else if node_delta < 0 {
                node.weight = node
                    .weight
                    .checked_sub(node_delta.unsigned_abs())
                    .ok_or(Error::DeltaOverflow(node_index))?;
            } else {
                node.weight = node
                    .weight
                    .checked_add(node_delta as u64)
                    .ok_or(Error::DeltaOverflow(node_index))?;
            }

            // Update the parent delta (if any).
            if let Some(parent_index) = node.parent {
                let parent_delta = deltas
                    .get_mut(parent_index)
                    .ok_or(Error::InvalidParentDelta(parent_index))?;

                // Back-propagate the nodes delta to its parent.
                *parent_delta = parent_delta
                    .checked_add(node_delta)
                    .ok_or(Error::DeltaOverflow(parent_index))?;
            }
        }

        // After applying all deltas, update the `previous_proposer_boost`.
        self.previous_proposer_boost = ProposerBoost {
            root: proposer_boost_root,
            score: proposer_score,
        };

        // A second time, iterate backwards through all indices in `self.nodes`.
        //
        // We _must_ perform these functions separate from the weight-updating loop above to ensure
        // that we have a fully coherent set of weights before updating parent
        // best-child/descendant.
        self.refresh_best_child_and_descendant::<E>(current_slot)
    }

    /// Register a block with the fork choice.
    ///
    /// Only the first block may be supplied without a parent.
    pub fn on_block<E: EthSpec>(&mut self, block: Block, current_slot: Slot) -> Result<(), Error> {
        if self.indices.contains_key(&block.root) {
            return Err(Error::DuplicateBlock(block.root));
        }

        let parent = match block.parent_root {
            Some(parent_root) => Some(*self.indices.get(&parent_root).ok_or(
                Error::InvalidParent {
                    block_root: block.root,
                    parent_root: Some(parent_root),
                },
            )?),
            None if self.nodes.is_empty() => None,
            None => {
                return Err(Error::InvalidParent {
                    block_root: block.root,
                    parent_root: None,
                });
            }
        };

        // If the parent has an invalid execution status, return an error before adding the block
        // to `self`.
        let mut to_validate = vec![];
        if let Some(parent_index) = parent {
            let parent_node = self
                .nodes
                .get(parent_index)
                .ok_or(Error::InvalidNodeIndex(parent_index))?;
            if parent_node.execution_status.is_invalid() {
                return Err(Error::ParentExecutionStatusIsInvalid {
                    block_root: block.root,
                    parent_root: parent_node.root,
                });
            }

            if matches!(block.execution_status, ExecutionStatus::Valid(_)) {
                to_validate = self.collect_optimistic_ancestors(parent_index)?;
            }
        }

        let node_index = self.nodes.len();
        let node = ProtoNode {
            slot: block.slot,
            root: block.root,
            target_root: block.target_root,
            state_root: block.state_root,
            parent,
            justified_checkpoint: block.justified_checkpoint,
            finalized_checkpoint: block.finalized_checkpoint,
            weight: 0,
            best_child: None,
            best_descendant: None,
            execution_status: block.execution_status,
            unrealized_justified_checkpoint: block.unrealized_justified_checkpoint,
            unrealized_finalized_checkpoint: block.unrealized_finalized_checkpoint,
        };

        self.indices.insert(node.root, node_index);
        self.nodes.push(node);
        self.mark_valid(&to_validate);

        if let Some(parent_index) = parent {
            self.maybe_update_best_child_and_descendant::<E>(
                parent_index,
                node_index,
                current_slot,
            )?;
        }

        Ok(())
    }

    /// Apply a response from the execution engine to the execution status of the tree.
    ///
    /// The response is checked against the current tree before any node is modified, so an error
    /// leaves `self` untouched.
    pub fn validate_latest_hash<E: EthSpec>(
        &mut self,
        response: LvhExecResponse,
        current_slot: Slot,
    ) -> Result<(), Error> {
        match response {
            LvhExecResponse::Valid {
                latest_valid_exec_hash,
            } => {
                let Some(index) = self.execution_block_hash_to_index(&latest_valid_exec_hash)
                else {
                    debug!(
                        %latest_valid_exec_hash,
                        "Ignoring valid response for unknown payload"
                    );
                    return Ok(());
                };
                let to_validate = self.collect_optimistic_ancestors(index)?;
                self.mark_valid(&to_validate);
                Ok(())
            }
            LvhExecResponse::Invalid {
                latest_valid_exec_hash,
                invalidate_from_block_hash,
            } => self.propagate_execution_payload_invalidation::<E>(
                latest_valid_exec_hash,
                invalidate_from_block_hash,
                current_slot,
            ),
        }
    }

    /// Returns the indices of the node at `index` and its ancestors which are still `Syncing`,
    /// stopping at the first `Valid` or `PreMerge` node.
    ///
    /// Returns an error if an `Invalid` node is met, since an ancestor of a valid payload can
    /// never be invalid.
    fn collect_optimistic_ancestors(&self, index: usize) -> Result<Vec<usize>, Error> {
        let mut syncing = vec![];
        let mut next = Some(index);

        while let Some(index) = next {
            let node = self
                .nodes
                .get(index)
                .ok_or(Error::InvalidNodeIndex(index))?;
            match node.execution_status {
                // We have reached a node that we already know is valid. No need to iterate further
                // since we assume an ancestors have already been set to valid.
                ExecutionStatus::Valid(_) => break,
                // We have reached a pre-merge node, it's impossible for this block to have any
                // relevant ancestors.
                ExecutionStatus::PreMerge => break,
                ExecutionStatus::Syncing(_) => syncing.push(index),
                // An ancestor of the valid payload was invalid. This indicates a consensus failure
                // in the execution node.
                ExecutionStatus::Invalid(exec_hash) => {
                    return Err(LvhExecError::new(
                        LvhExecErrorCode::InvalidToValid,
                        node.root,
                        exec_hash,
                    )
                    .into());
                }
            }
            next = node.parent;
        }

        Ok(syncing)
    }

    fn mark_valid(&mut self, indices: &[usize]) {
        for index in indices {
            if let Some(node) = self.nodes.get_mut(*index)
                && let ExecutionStatus::Syncing(hash) = node.execution_status
            {
                node.execution_status = ExecutionStatus::Valid(hash);
            }
        }
    }

    /// Invalidate the block with `invalidate_from_block_hash`, the ancestors indicated by
    /// `latest_valid_exec_hash` and all descendants of those blocks.
    fn propagate_execution_payload_invalidation<E: EthSpec>(
        &mut self,
        latest_valid_exec_hash: Option<ExecutionBlockHash>,
        invalidate_from_block_hash: ExecutionBlockHash,
        current_slot: Slot,
    ) -> Result<(), Error> {
        let Some(start_index) = self.execution_block_hash_to_index(&invalidate_from_block_hash)
        else {
            debug!(
                %invalidate_from_block_hash,
                "Ignoring invalid response for unknown payload"
            );
            return Ok(());
        };

        /*
         * Step 1:
         *
         * Walk back from the starting node and collect the ancestors which are declared invalid
         * by the latest valid hash.
         */
        let mut invalidated = vec![start_index];
        if let Some(latest_valid_exec_hash) = latest_valid_exec_hash {
            // A zero hash declares the entire post-merge chain invalid.
            let mut latest_valid_is_ancestor = latest_valid_exec_hash.is_zero();
            let mut between = vec![];
            let mut next = self.nodes.get(start_index).and_then(|node| node.parent);

            while let Some(index) = next {
                let node = self
                    .nodes
                    .get(index)
                    .ok_or(Error::InvalidNodeIndex(index))?;
                // Pre-merge blocks, and therefore all their ancestors, have no payload.
                if !node.execution_status.is_execution_enabled() {
                    break;
                }
                if node.execution_status.block_hash() == Some(latest_valid_exec_hash) {
                    latest_valid_is_ancestor = true;
                    break;
                }
                between.push(index);
                next = node.parent;
            }

            // An unknown latest valid hash only invalidates the starting block.
            if latest_valid_is_ancestor {
                invalidated.extend(between);
            }
        }

        /*
         * Step 2:
         *
         * Iterate forwards from the earliest invalidated node and collect all descendants.
         */
        let mut is_invalidated = vec![false; self.nodes.len()];
        for index in &invalidated {
            if let Some(flag) = is_invalidated.get_mut(*index) {
                *flag = true;
            }
        }
        let first_index = invalidated.iter().copied().min().unwrap_or(start_index);
        for index in first_index.saturating_add(1)..self.nodes.len() {
            let node = self
                .nodes
                .get(index)
                .ok_or(Error::InvalidNodeIndex(index))?;
            let parent_is_invalidated = node
                .parent
                .and_then(|parent| is_invalidated.get(parent).copied())
                .unwrap_or(false);
            if parent_is_invalidated && !is_invalidated[index] {
                is_invalidated[index] = true;
                invalidated.push(index);
            }
        }

        /*
         * Step 3:
         *
         * Check the whole set before mutating anything.
         */
        for index in &invalidated {
            let node = self
                .nodes
                .get(*index)
                .ok_or(Error::InvalidNodeIndex(*index))?;
            let exec_hash = node
                .execution_status
                .block_hash()
                .unwrap_or_else(ExecutionBlockHash::zero);

            if let ExecutionStatus::Valid(_) = node.execution_status {
                return Err(LvhExecError::new(
                    LvhExecErrorCode::ValidToInvalid,
                    node.root,
                    exec_hash,
                )
                .into());
            }
            if node.root == self.justified_checkpoint.root
                || node.root == self.finalized_checkpoint.root
            {
                return Err(LvhExecError::new(
                    LvhExecErrorCode::InvalidJustifiedOrFinalized,
                    node.root,
                    exec_hash,
                )
                .into());
            }
        }

        /*
         * Step 4:
         *
         * Mark the nodes invalid and refresh the best-child/descendant links of the whole tree.
         */
        for index in &invalidated {
            let node = self
                .nodes
                .get_mut(*index)
                .ok_or(Error::InvalidNodeIndex(*index))?;
            if let Some(hash) = node.execution_status.block_hash() {
                node.execution_status = ExecutionStatus::Invalid(hash);
            }
            // It's impossible for an invalid block to lead to a "best" block.
            node.best_child = None;
            node.best_descendant = None;
        }

        debug!(
            %invalidate_from_block_hash,
            invalidated = invalidated.len(),
            "Invalidated execution payloads"
        );

        self.refresh_best_child_and_descendant::<E>(current_slot)
    }

    /// Follows the best-descendant links to find the best-block (i.e., head-block).
    ///
    /// ## Notes
    ///
    /// The result of this function is not guaranteed to be accurate if `Self::on_block` has
    /// been called without a subsequent `Self::apply_score_changes` call. This is because
    /// `on_block` does not attempt to walk backwards through the tree and update the
    /// best-child/best-descendant links.
    pub fn find_head<E: EthSpec>(
        &self,
        justified_root: &Hash256,
        current_slot: Slot,
    ) -> Result<Hash256, Error> {
        let justified_index = self
            .indices
            .get(justified_root)
            .copied()
            .ok_or(Error::JustifiedNodeUnknown(*justified_root))?;

        let justified_node = self
            .nodes
            .get(justified_index)
            .ok_or(Error::InvalidJustifiedIndex(justified_index))?;

        // Since there are no valid descendants of a justified block with an invalid execution
        // payload, there would be no head to choose from.
        if justified_node.execution_status.is_invalid() {
            return Err(Error::InvalidJustifiedCheckpointExecutionStatus {
                justified_root: *justified_root,
            });
        }

        let best_descendant_index = justified_node.best_descendant.unwrap_or(justified_index);

        let best_node = self
            .nodes
            .get(best_descendant_index)
            .ok_or(Error::InvalidBestDescendant(best_descendant_index))?;

        // Perform a sanity check that the node is indeed valid to be the head.
        if !self.node_is_viable_for_head::<E>(best_node, current_slot) {
            return Err(Error::InvalidBestNode(Box::new(InvalidBestNodeInfo {
                current_slot,
                start_root: *justified_root,
                justified_checkpoint: self.justified_checkpoint,
                finalized_checkpoint: self.finalized_checkpoint,
                head_root: best_node.root,
                head_justified_checkpoint: best_node.justified_checkpoint,
                head_finalized_checkpoint: best_node.finalized_checkpoint,
            })));
        }

        Ok(best_node.root)
    }

    /// Update the tree with new finalization information. The tree is only actually pruned if
    /// the finalized node has an index of at least `self.prune_threshold`.
    ///
    /// Returns the removed nodes, oldest first.
    ///
    /// # Errors
    ///
    /// Returns errors if:
    ///
    /// - The finalized root is unknown.
    /// - There is some internal error relating to invalid indices inside `self`.
    pub fn maybe_prune(&mut self, finalized_root: Hash256) -> Result<Vec<ProtoNode>, Error> {
        let finalized_index = *self
            .indices
            .get(&finalized_root)
            .ok_or(Error::FinalizedNodeUnknown(finalized_root))?;

        if finalized_index == 0 || finalized_index < self.prune_threshold {
            // Pruning at small numbers incurs more cost than benefit.
            return Ok(vec![]);
        }

        // Remove the `self.indices` key/values for all the to-be-deleted nodes.
        for node_index in 0..finalized_index {
            let root = &self
                .nodes
                .get(node_index)
                .ok_or(Error::InvalidNodeIndex(node_index))?
                .root;
            self.indices.remove(root);
        }

        // Drop all the nodes prior to finalization.
        let removed = self.nodes.drain(..finalized_index).collect::<Vec<_>>();

        // Adjust the indices map.
        for (_root, index) in self.indices.iter_mut() {
            *index = index
                .checked_sub(finalized_index)
                .ok_or(Error::IndexOverflow("indices"))?;
        }

        // Iterate through all the existing nodes and adjust their indices to match the new layout
        // of `self.nodes`.
        for node in self.nodes.iter_mut() {
            if let Some(parent) = node.parent {
                // If `node.parent` is less than `finalized_index`, set it to `None`.
                node.parent = parent.checked_sub(finalized_index);
            }
            if let Some(best_child) = node.best_child {
                node.best_child = Some(
                    best_child
                        .checked_sub(finalized_index)
                        .ok_or(Error::IndexOverflow("best_child"))?,
                );
            }
            if let Some(best_descendant) = node.best_descendant {
                node.best_descendant = Some(
                    best_descendant
                        .checked_sub(finalized_index)
                        .ok_or(Error::IndexOverflow("best_descendant"))?,
                );
            }
        }

        debug!(
            %finalized_root,
            pruned = removed.len(),
            remaining = self.nodes.len(),
            "Pruned proto-array"
        );

        Ok(removed)
    }

    /// Re-evaluate the best-child and best-descendant of every node, children first.
    fn refresh_best_child_and_descendant<E: EthSpec>(
        &mut self,
        current_slot: Slot,
    ) -> Result<(), Error> {
        for node_index in (0..self.nodes.len()).rev() {
            let node = self
                .nodes
                .get(node_index)
                .ok_or(Error::InvalidNodeIndex(node_index))?;

            // If the node has a parent, try to update its best-child and best-descendant.
            if let Some(parent_index) = node.parent {
                self.maybe_update_best_child_and_descendant::<E>(
                    parent_index,
                    node_index,
                    current_slot,
                )?;
            }
        }

        Ok(())
    }

    /// Observe the parent at `parent_index` with respect to the child at `child_index` and
    /// potentially modify the `parent.best_child` and `parent.best_descendant` values.
    ///
    /// ## Detail
    ///
    /// There are four outcomes:
    ///
    /// - The child is already the best child but it's now invalid due to a FFG change and should
    ///   be removed.
    /// - The child is already the best child and the parent is updated with the new
    ///   best-descendant.
    /// - The child is not the best child but becomes the best child.
    /// - The child is not the best child and does not become the best child.
    fn maybe_update_best_child_and_descendant<E: EthSpec>(
        &mut self,
        parent_index: usize,
        child_index: usize,
        current_slot: Slot,
    ) -> Result<(), Error> {
        let child = self
            .nodes
            .get(child_index)
            .ok_or(Error::InvalidNodeIndex(child_index))?;

        let parent = self
            .nodes
            .get(parent_index)
            .ok_or(Error::InvalidNodeIndex(parent_index))?;

        let child_leads_to_viable_head = self.node_leads_to_viable_head::<E>(child, current_slot)?;

        // These three variables are aliases to the three options that we may set the
        // `parent.best_child` and `parent.best_descendant` to.
        let change_to_none = (None, None);
        let change_to_child = (
            Some(child_index),
            child.best_descendant.or(Some(child_index)),
        );
        let no_change = (parent.best_child, parent.best_descendant);

        let (new_best_child, new_best_descendant) =
            if let Some(best_child_index) = parent.best_child {
                if best_child_index == child_index && !child_leads_to_viable_head {
                    // If the child is already the best-child of the parent but it's not viable for
                    // the head, remove it.
                    change_to_none
                } else if best_child_index == child_index {
                    // If the child is the best-child already, set it again to ensure that the
                    // best-descendant of the parent is updated.
                    change_to_child
                } else {
                    let best_child = self
                        .nodes
                        .get(best_child_index)
                        .ok_or(Error::InvalidBestDescendant(best_child_index))?;

                    let best_child_leads_to_viable_head =
                        self.node_leads_to_viable_head::<E>(best_child, current_slot)?;

                    if child_leads_to_viable_head && !best_child_leads_to_viable_head {
                        // The child leads to a viable head, but the current best-child doesn't.
                        change_to_child
                    } else if !child_leads_to_viable_head && best_child_leads_to_viable_head {
                        // The best child leads to a viable head, but the child doesn't.
                        no_change
                    } else if !child_leads_to_viable_head {
                        // Neither leads to a viable head, the parent should not point at either.
                        change_to_none
                    } else if child.weight == best_child.weight {
                        // Tie-breaker of equal weights by root.
                        if child.root >= best_child.root {
                            change_to_child
                        } else {
                            no_change
                        }
                    } else {
                        // Choose the winner by weight.
                        if child.weight >= best_child.weight {
                            change_to_child
                        } else {
                            no_change
                        }
                    }
                }
            } else if child_leads_to_viable_head {
                // There is no current best-child and the child is viable.
                change_to_child
            } else {
                // There is no current best-child but the child is not viable.
                no_change
            };

        let parent = self
            .nodes
            .get_mut(parent_index)
            .ok_or(Error::InvalidNodeIndex(parent_index))?;

        parent.best_child = new_best_child;
        parent.best_descendant = new_best_descendant;

        Ok(())
    }

    /// Indicates if the node itself is viable for the head, or if it's best descendant is viable
    /// for the head.
    fn node_leads_to_viable_head<E: EthSpec>(
        &self,
        node: &ProtoNode,
        current_slot: Slot,
    ) -> Result<bool, Error> {
        let best_descendant_is_viable_for_head =
            if let Some(best_descendant_index) = node.best_descendant {
                let best_descendant = self
                    .nodes
                    .get(best_descendant_index)
                    .ok_or(Error::InvalidBestDescendant(best_descendant_index))?;

                self.node_is_viable_for_head::<E>(best_descendant, current_slot)
            } else {
                false
            };

        Ok(best_descendant_is_viable_for_head
            || self.node_is_viable_for_head::<E>(node, current_slot))
    }

    /// This is the equivalent to the `filter_block_tree` function in the consensus specs.
    ///
    /// A node is viable when its execution payload is not invalid, it is not from the future,
    /// its voting source agrees with the store's justified checkpoint (or is recent enough) and it
    /// descends from the finalized checkpoint.
    pub fn node_is_viable_for_head<E: EthSpec>(&self, node: &ProtoNode, current_slot: Slot) -> bool {
        if node.execution_status.is_invalid() || node.slot > current_slot {
            return false;
        }

        let genesis_epoch = E::genesis_epoch();
        let current_epoch = current_slot.epoch(E::slots_per_epoch());
        let node_epoch = node.slot.epoch(E::slots_per_epoch());

        // Blocks from prior epochs have had their justification realized by now.
        let voting_source = if node_epoch < current_epoch {
            node.unrealized_justified_checkpoint
        } else {
            node.justified_checkpoint
        };

        // Root and epoch must both match. A voting source at the same epoch on another branch
        // only passes through the recency clause.
        let correct_justified = self.justified_checkpoint.epoch == genesis_epoch
            || voting_source == self.justified_checkpoint
            || voting_source.epoch + 2 >= current_epoch;

        let correct_finalized = self.finalized_checkpoint.epoch == genesis_epoch
            || self.is_finalized_checkpoint_or_descendant::<E>(node.root);

        correct_justified && correct_finalized
    }

    /// Return a reverse iterator over the nodes which comprise the chain ending at `block_root`.
    pub fn iter_nodes<'a>(&'a self, block_root: &Hash256) -> Iter<'a> {
        let next_node_index = self.indices.get(block_root).copied();
        Iter {
            next_node_index,
            proto_array: self,
        }
    }

    /// Return a reverse iterator over the block roots of the chain ending at `block_root`.
    ///
    /// Note that unlike many other iterators, this one WILL NOT yield anything at skipped slots.
    pub fn iter_block_roots<'a>(
        &'a self,
        block_root: &Hash256,
    ) -> impl Iterator<Item = (Hash256, Slot)> + 'a {
        self.iter_nodes(block_root)
            .map(|node| (node.root, node.slot))
    }

    /// Returns the node for `block_root`, if known.
    pub fn get_node(&self, block_root: &Hash256) -> Option<&ProtoNode> {
        self.indices
            .get(block_root)
            .and_then(|index| self.nodes.get(*index))
    }

    /// Returns the latest ancestor of `block_root` (or the block itself) with a slot at or before
    /// `slot`.
    pub fn get_ancestor(&self, block_root: &Hash256, slot: Slot) -> Option<&ProtoNode> {
        self.iter_nodes(block_root).find(|node| node.slot <= slot)
    }

    /// Returns `true` if the `descendant_root` has an ancestor with `ancestor_root`. Always
    /// returns `false` if either input root is unknown.
    ///
    /// ## Notes
    ///
    /// Still returns `true` if `ancestor_root` is known and `ancestor_root == descendant_root`.
    pub fn is_descendant(&self, ancestor_root: Hash256, descendant_root: Hash256) -> bool {
        self.get_node(&ancestor_root)
            .and_then(|ancestor| {
                self.iter_block_roots(&descendant_root)
                    .take_while(|(_root, slot)| *slot >= ancestor.slot)
                    .find(|(_root, slot)| *slot == ancestor.slot)
                    .map(|(root, _slot)| root == ancestor_root)
            })
            .unwrap_or(false)
    }

    /// Returns `true` if `root` is equal to or a descendant of `self.finalized_checkpoint`.
    ///
    /// Notably, this function is checking ancestory of the finalized *checkpoint* not the finalized
    /// *block*. If the finalized checkpoint is at a skipped slot, a block at that slot on a
    /// different chain is not a descendant.
    pub fn is_finalized_checkpoint_or_descendant<E: EthSpec>(&self, root: Hash256) -> bool {
        let finalized_root = self.finalized_checkpoint.root;
        let finalized_slot = self
            .finalized_checkpoint
            .epoch
            .start_slot(E::slots_per_epoch());

        let Some(mut node) = self.get_node(&root) else {
            // An unknown root is not a finalized descendant.
            return false;
        };

        loop {
            // If `node` carries the finalized checkpoint it must descend from it.
            if node.finalized_checkpoint == self.finalized_checkpoint
                || node.justified_checkpoint == self.finalized_checkpoint
                || node.unrealized_finalized_checkpoint == self.finalized_checkpoint
                || node.unrealized_justified_checkpoint == self.finalized_checkpoint
            {
                return true;
            }

            // If `node` is less than or equal to the finalized slot then `node` must be the
            // finalized block.
            if node.slot <= finalized_slot {
                return node.root == finalized_root;
            }

            // Since `node` is from a higher slot that the finalized checkpoint, replace `node`
            // with the parent of `node`.
            match node.parent.and_then(|index| self.nodes.get(index)) {
                Some(parent) => node = parent,
                // If `node` is not the finalized block and its parent does not exist in fork
                // choice, then the parent must have been pruned. Proto-array only prunes blocks
                // prior to the finalized block, so this means the parent conflicts with
                // finality.
                None => return false,
            }
        }
    }

    /// Returns the deepest node which is an ancestor of (or equal to) both `a` and `b`.
    pub fn get_common_ancestor(&self, a: &Hash256, b: &Hash256) -> Option<&ProtoNode> {
        let mut a_index = *self.indices.get(a)?;
        let mut b_index = *self.indices.get(b)?;

        // Parents always have a lower index than their children, so stepping back from the higher
        // index keeps both walks at comparable depths until they meet.
        while a_index != b_index {
            if a_index > b_index {
                a_index = self.nodes.get(a_index)?.parent?;
            } else {
                b_index = self.nodes.get(b_index)?.parent?;
            }
        }

        self.nodes.get(a_index)
    }

    /// All nodes at exactly `slot`.
    pub fn nodes_at_slot(&self, slot: Slot) -> impl Iterator<Item = &ProtoNode> + '_ {
        self.nodes.iter().filter(move |node| node.slot == slot)
    }

    /// Nodes without any children.
    pub fn heads(&self) -> Vec<&ProtoNode> {
        let mut has_child = vec![false; self.nodes.len()];
        for parent in self.nodes.iter().filter_map(|node| node.parent) {
            if let Some(flag) = has_child.get_mut(parent) {
                *flag = true;
            }
        }

        self.nodes
            .iter()
            .zip(has_child)
            .filter(|(_, has_child)| !has_child)
            .map(|(node, _)| node)
            .collect()
    }

    /// Nodes strictly between the indices `upper` and `lower`, newest first.
    pub fn nodes_between(&self, upper: usize, lower: usize) -> impl Iterator<Item = &ProtoNode> {
        let start = lower.saturating_add(1).min(self.nodes.len());
        let end = upper.min(self.nodes.len()).max(start);
        self.nodes[start..end].iter().rev()
    }

    /// Nodes inserted before `block_root` which are not its ancestors, newest first.
    ///
    /// Returns nothing if `block_root` is unknown.
    pub fn iterate_non_ancestor_nodes(&self, block_root: &Hash256) -> Vec<&ProtoNode> {
        let Some(mut index) = self.indices.get(block_root).copied() else {
            return vec![];
        };

        let mut result = vec![];
        while let Some(parent_index) = self.nodes.get(index).and_then(|node| node.parent) {
            result.extend(self.nodes_between(index, parent_index));
            index = parent_index;
        }
        // Anything older than the root of the chain is on another branch.
        result.extend(self.nodes.iter().take(index).rev());

        result
    }

    fn execution_block_hash_to_index(&self, block_hash: &ExecutionBlockHash) -> Option<usize> {
        self.nodes
            .iter()
            .rposition(|node| node.execution_status.block_hash() == Some(*block_hash))
    }

    /// Returns the first *beacon block root* which contains an execution payload with the given
    /// `block_hash`, if any.
    pub fn execution_block_hash_to_beacon_block_root(
        &self,
        block_hash: &ExecutionBlockHash,
    ) -> Option<Hash256> {
        self.execution_block_hash_to_index(block_hash)
            .and_then(|index| self.nodes.get(index))
            .map(|node| node.root)
    }
}

/// Proposer boost score: the committee weight of one slot, scaled by `proposer_score_boost`
/// percent. `None` on arithmetic overflow.
pub fn calculate_committee_fraction<E: EthSpec>(
    justified_balances: &JustifiedBalances,
    proposer_score_boost: u64,
) -> Option<u64> {
    let average_balance = justified_balances
        .total_effective_balance
        .checked_div(justified_balances.num_active_validators)?;
    let committee_size = justified_balances
        .num_active_validators
        .checked_div(E::slots_per_epoch())?;
    let committee_weight = committee_size.checked_mul(average_balance)?;
    committee_weight
        .checked_mul(proposer_score_boost)?
        .checked_div(100)
}

/// Reverse iterator over one path through a `ProtoArray`.
pub struct Iter<'a> {
    next_node_index: Option<usize>,
    proto_array: &'a ProtoArray,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a ProtoNode;

    fn next(&mut self) -> Option<Self::Item> {
        let next_node_index = self.next_node_index?;
        let node = self.proto_array.nodes.get(next_node_index)?;
        self.next_node_index = node.parent;
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{Epoch, FixedBytesExtended, MainnetEthSpec};

    type E = MainnetEthSpec;

    /// Block names in insertion order.
    ///
    /// ```text
    /// 0 <- 1A <- 2A <- 3A
    ///       ^
    ///       |--- 2B <- 3B
    /// 0 <- 2C <- 3C
    /// ```
    const NAMES: [&str; 8] = ["0", "1A", "2A", "3A", "2B", "3B", "2C", "3C"];

    fn root(name: &str) -> Hash256 {
        let position = NAMES
            .iter()
            .position(|n| *n == name)
            .expect("name should be known");
        Hash256::from_low_u64_be(position as u64 + 1)
    }

    fn hash(name: &str) -> ExecutionBlockHash {
        ExecutionBlockHash::from_root(root(name))
    }

    fn genesis() -> Checkpoint {
        Checkpoint {
            epoch: Epoch::new(0),
            root: root("0"),
        }
    }

    fn block(name: &str, parent: Option<&str>, execution_status: ExecutionStatus) -> Block {
        let slot = name[..1].parse::<u64>().expect("name starts with a slot");
        Block {
            slot: Slot::new(slot),
            root: root(name),
            parent_root: parent.map(root),
            state_root: Hash256::ZERO,
            target_root: root("0"),
            justified_checkpoint: genesis(),
            finalized_checkpoint: genesis(),
            execution_status,
            unrealized_justified_checkpoint: genesis(),
            unrealized_finalized_checkpoint: genesis(),
        }
    }

    fn current_slot() -> Slot {
        Slot::new(3)
    }

    fn setup() -> ProtoArray {
        let mut proto_array = ProtoArray {
            prune_threshold: 0,
            justified_checkpoint: genesis(),
            finalized_checkpoint: genesis(),
            nodes: vec![],
            indices: HashMap::new(),
            previous_proposer_boost: ProposerBoost::default(),
        };

        proto_array
            .on_block::<E>(block("0", None, ExecutionStatus::PreMerge), current_slot())
            .unwrap();
        for (name, parent) in [
            ("1A", "0"),
            ("2A", "1A"),
            ("3A", "2A"),
            ("2B", "1A"),
            ("3B", "2B"),
            ("2C", "0"),
            ("3C", "2C"),
        ] {
            proto_array
                .on_block::<E>(
                    block(name, Some(parent), ExecutionStatus::Syncing(hash(name))),
                    current_slot(),
                )
                .unwrap();
        }

        apply_zero_deltas(&mut proto_array);
        proto_array
    }

    fn apply_zero_deltas(proto_array: &mut ProtoArray) {
        proto_array
            .apply_score_changes::<E>(
                vec![0; proto_array.nodes.len()],
                genesis(),
                genesis(),
                &JustifiedBalances::default(),
                Hash256::ZERO,
                current_slot(),
                &ChainSpec::mainnet(),
            )
            .unwrap();
    }

    fn status(proto_array: &ProtoArray, name: &str) -> ExecutionStatus {
        proto_array.get_node(&root(name)).unwrap().execution_status
    }

    /// The roots of the best child and best descendant of `name`.
    fn pointers(proto_array: &ProtoArray, name: &str) -> (Option<Hash256>, Option<Hash256>) {
        let node = proto_array.get_node(&root(name)).unwrap();
        let to_root = |index: Option<usize>| index.map(|i| proto_array.nodes[i].root);
        (to_root(node.best_child), to_root(node.best_descendant))
    }

    fn names(nodes: &[&ProtoNode]) -> Vec<Hash256> {
        nodes.iter().map(|node| node.root).collect()
    }

    #[test]
    fn initial_pointers() {
        let proto_array = setup();

        assert_eq!(pointers(&proto_array, "0"), (Some(root("2C")), Some(root("3C"))));
        assert_eq!(pointers(&proto_array, "1A"), (Some(root("2B")), Some(root("3B"))));
        assert_eq!(pointers(&proto_array, "2A"), (Some(root("3A")), Some(root("3A"))));
        assert_eq!(pointers(&proto_array, "3A"), (None, None));
        assert_eq!(
            proto_array.find_head::<E>(&root("0"), current_slot()),
            Ok(root("3C"))
        );
    }

    #[test]
    fn execution_status_updates() {
        let mut proto_array = setup();
        let untouched = |proto_array: &ProtoArray, names: &[&str]| {
            for name in names {
                assert_eq!(
                    status(proto_array, name),
                    ExecutionStatus::Syncing(hash(name)),
                    "{name} should still be syncing"
                );
            }
        };

        // Invalidate 3C, the latest valid hash is its parent.
        proto_array
            .validate_latest_hash::<E>(
                LvhExecResponse::Invalid {
                    latest_valid_exec_hash: Some(hash("2C")),
                    invalidate_from_block_hash: hash("3C"),
                },
                current_slot(),
            )
            .unwrap();
        assert_eq!(status(&proto_array, "3C"), ExecutionStatus::Invalid(hash("3C")));
        assert_eq!(
            pointers(&proto_array, "2C"),
            (None, None),
            "2C should not point to an invalid block"
        );
        assert_eq!(pointers(&proto_array, "0"), (Some(root("2C")), Some(root("2C"))));
        assert_eq!(pointers(&proto_array, "1A"), (Some(root("2B")), Some(root("3B"))));
        untouched(&proto_array, &["1A", "2A", "3A", "2B", "3B", "2C"]);

        // Validate 3B and its ancestors.
        proto_array
            .validate_latest_hash::<E>(
                LvhExecResponse::Valid {
                    latest_valid_exec_hash: hash("3B"),
                },
                current_slot(),
            )
            .unwrap();
        for name in ["3B", "2B", "1A"] {
            assert_eq!(status(&proto_array, name), ExecutionStatus::Valid(hash(name)));
        }
        assert_eq!(status(&proto_array, "0"), ExecutionStatus::PreMerge);
        untouched(&proto_array, &["2A", "3A", "2C"]);

        // Invalidate 3A, everything after 1A is invalid.
        proto_array
            .validate_latest_hash::<E>(
                LvhExecResponse::Invalid {
                    latest_valid_exec_hash: Some(hash("1A")),
                    invalidate_from_block_hash: hash("3A"),
                },
                current_slot(),
            )
            .unwrap();
        assert_eq!(status(&proto_array, "2A"), ExecutionStatus::Invalid(hash("2A")));
        assert_eq!(status(&proto_array, "3A"), ExecutionStatus::Invalid(hash("3A")));
        assert_eq!(status(&proto_array, "1A"), ExecutionStatus::Valid(hash("1A")));
        assert_eq!(pointers(&proto_array, "2A"), (None, None));
        assert_eq!(pointers(&proto_array, "1A"), (Some(root("2B")), Some(root("3B"))));
    }

    #[test]
    fn invalidate_with_zero_latest_valid_hash() {
        let mut proto_array = setup();

        proto_array
            .validate_latest_hash::<E>(
                LvhExecResponse::Invalid {
                    latest_valid_exec_hash: Some(ExecutionBlockHash::zero()),
                    invalidate_from_block_hash: hash("3B"),
                },
                current_slot(),
            )
            .unwrap();

        for name in ["1A", "2A", "3A", "2B", "3B"] {
            assert_eq!(
                status(&proto_array, name),
                ExecutionStatus::Invalid(hash(name)),
                "{name} should be invalid"
            );
            assert_eq!(pointers(&proto_array, name), (None, None));
        }
        for name in ["2C", "3C"] {
            assert_eq!(status(&proto_array, name), ExecutionStatus::Syncing(hash(name)));
        }
        assert_eq!(status(&proto_array, "0"), ExecutionStatus::PreMerge);
        assert_eq!(pointers(&proto_array, "0"), (Some(root("2C")), Some(root("3C"))));

        apply_zero_deltas(&mut proto_array);
        assert_eq!(
            proto_array.find_head::<E>(&root("0"), current_slot()),
            Ok(root("3C"))
        );

        assert_eq!(
            proto_array.on_block::<E>(
                block("3A", Some("2A"), ExecutionStatus::Syncing(hash("3A"))),
                current_slot()
            ),
            Err(Error::DuplicateBlock(root("3A")))
        );
    }

    #[test]
    fn invalid_parent_is_rejected() {
        let mut proto_array = setup();
        proto_array
            .validate_latest_hash::<E>(
                LvhExecResponse::Invalid {
                    latest_valid_exec_hash: None,
                    invalidate_from_block_hash: hash("3C"),
                },
                current_slot(),
            )
            .unwrap();

        let mut child = block(
            "3C",
            Some("3C"),
            ExecutionStatus::Syncing(ExecutionBlockHash::repeat_byte(42)),
        );
        child.root = Hash256::repeat_byte(42);
        assert_eq!(
            proto_array.on_block::<E>(child, current_slot()),
            Err(Error::ParentExecutionStatusIsInvalid {
                block_root: Hash256::repeat_byte(42),
                parent_root: root("3C"),
            })
        );

        let mut orphan = block("3C", None, ExecutionStatus::PreMerge);
        orphan.root = Hash256::repeat_byte(43);
        assert_eq!(
            proto_array.on_block::<E>(orphan, current_slot()),
            Err(Error::InvalidParent {
                block_root: Hash256::repeat_byte(43),
                parent_root: None,
            })
        );
    }

    #[test]
    fn invalidating_a_valid_block_is_rejected() {
        let mut proto_array = setup();
        proto_array
            .validate_latest_hash::<E>(
                LvhExecResponse::Valid {
                    latest_valid_exec_hash: hash("3B"),
                },
                current_slot(),
            )
            .unwrap();
        let before = proto_array.clone();

        let result = proto_array.validate_latest_hash::<E>(
            LvhExecResponse::Invalid {
                latest_valid_exec_hash: Some(ExecutionBlockHash::zero()),
                invalidate_from_block_hash: hash("3A"),
            },
            current_slot(),
        );

        assert_eq!(
            result,
            Err(Error::InvalidLvhExecutionResponse(LvhExecError::new(
                LvhExecErrorCode::ValidToInvalid,
                root("1A"),
                hash("1A"),
            )))
        );
        assert_eq!(proto_array, before, "a failed response should not mutate");
    }

    #[test]
    fn validating_an_invalid_block_is_rejected() {
        let mut proto_array = setup();
        proto_array
            .validate_latest_hash::<E>(
                LvhExecResponse::Invalid {
                    latest_valid_exec_hash: Some(ExecutionBlockHash::zero()),
                    invalidate_from_block_hash: hash("3B"),
                },
                current_slot(),
            )
            .unwrap();

        let result = proto_array.validate_latest_hash::<E>(
            LvhExecResponse::Valid {
                latest_valid_exec_hash: hash("2A"),
            },
            current_slot(),
        );

        assert_eq!(
            result,
            Err(Error::InvalidLvhExecutionResponse(LvhExecError::new(
                LvhExecErrorCode::InvalidToValid,
                root("2A"),
                hash("2A"),
            )))
        );
    }

    #[test]
    fn invalidating_the_justified_block_is_rejected() {
        let mut proto_array = setup();
        proto_array.justified_checkpoint = Checkpoint {
            epoch: Epoch::new(0),
            root: root("1A"),
        };

        let result = proto_array.validate_latest_hash::<E>(
            LvhExecResponse::Invalid {
                latest_valid_exec_hash: Some(ExecutionBlockHash::zero()),
                invalidate_from_block_hash: hash("2A"),
            },
            current_slot(),
        );

        assert_eq!(
            result,
            Err(Error::InvalidLvhExecutionResponse(LvhExecError::new(
                LvhExecErrorCode::InvalidJustifiedOrFinalized,
                root("1A"),
                hash("1A"),
            )))
        );
        assert_eq!(status(&proto_array, "2A"), ExecutionStatus::Syncing(hash("2A")));
    }

    #[test]
    fn valid_block_validates_ancestors() {
        let mut proto_array = setup();
        let mut child = block(
            "3A",
            Some("3A"),
            ExecutionStatus::Valid(ExecutionBlockHash::repeat_byte(7)),
        );
        child.root = Hash256::repeat_byte(7);

        proto_array.on_block::<E>(child, current_slot()).unwrap();

        for name in ["1A", "2A", "3A"] {
            assert_eq!(status(&proto_array, name), ExecutionStatus::Valid(hash(name)));
        }
        assert_eq!(status(&proto_array, "2B"), ExecutionStatus::Syncing(hash("2B")));
    }

    #[test]
    fn ancestry_queries() {
        let proto_array = setup();

        assert_eq!(
            proto_array.get_ancestor(&root("3A"), Slot::new(1)).map(|n| n.root),
            Some(root("1A"))
        );
        assert_eq!(
            proto_array.get_ancestor(&root("3A"), Slot::new(3)).map(|n| n.root),
            Some(root("3A")),
            "a block is its own ancestor at its slot"
        );
        assert!(proto_array.get_ancestor(&Hash256::repeat_byte(1), Slot::new(0)).is_none());

        assert_eq!(
            proto_array
                .get_common_ancestor(&root("3A"), &root("3B"))
                .map(|n| n.root),
            Some(root("1A"))
        );
        assert_eq!(
            proto_array
                .get_common_ancestor(&root("3A"), &root("3C"))
                .map(|n| n.root),
            Some(root("0"))
        );
        assert_eq!(
            proto_array
                .get_common_ancestor(&root("2A"), &root("3A"))
                .map(|n| n.root),
            Some(root("2A"))
        );

        assert!(proto_array.is_descendant(root("1A"), root("3B")));
        assert!(!proto_array.is_descendant(root("2A"), root("3B")));

        let mut heads = proto_array
            .heads()
            .iter()
            .map(|n| n.root)
            .collect::<Vec<_>>();
        heads.sort();
        assert_eq!(heads, vec![root("3A"), root("3B"), root("3C")]);

        assert_eq!(
            proto_array
                .nodes_at_slot(Slot::new(2))
                .map(|n| n.root)
                .collect::<Vec<_>>(),
            vec![root("2A"), root("2B"), root("2C")]
        );

        assert_eq!(
            proto_array.nodes_between(5, 1).map(|n| n.root).collect::<Vec<_>>(),
            vec![root("2B"), root("3A"), root("2A")]
        );
        assert_eq!(
            names(&proto_array.iterate_non_ancestor_nodes(&root("3B"))),
            vec![root("3A"), root("2A")]
        );
        assert_eq!(
            names(&proto_array.iterate_non_ancestor_nodes(&root("3C"))),
            vec![root("3B"), root("2B"), root("3A"), root("2A"), root("1A")]
        );

        assert_eq!(
            proto_array.execution_block_hash_to_beacon_block_root(&hash("2B")),
            Some(root("2B"))
        );
        assert_eq!(
            proto_array.execution_block_hash_to_beacon_block_root(&ExecutionBlockHash::zero()),
            None
        );
    }

    #[test]
    fn prune_reindexes_nodes() {
        let mut proto_array = setup();

        let removed = proto_array.maybe_prune(root("1A")).unwrap();
        assert_eq!(names(&removed.iter().collect::<Vec<_>>()), vec![root("0")]);
        assert_eq!(proto_array.nodes.len(), 7);
        assert_eq!(proto_array.indices.get(&root("1A")), Some(&0));
        assert_eq!(proto_array.get_node(&root("2C")).unwrap().parent, None);
        assert_eq!(pointers(&proto_array, "1A"), (Some(root("2B")), Some(root("3B"))));
        assert_eq!(
            proto_array.maybe_prune(Hash256::repeat_byte(1)),
            Err(Error::FinalizedNodeUnknown(Hash256::repeat_byte(1)))
        );
        assert!(proto_array.maybe_prune(root("1A")).unwrap().is_empty());
    }

    #[test]
    fn committee_fraction() {
        let balances =
            JustifiedBalances::from_effective_balances(vec![32_000_000_000; 64]).unwrap();
        assert_eq!(
            calculate_committee_fraction::<E>(&balances, 40),
            Some(25_600_000_000)
        );
        assert_eq!(
            calculate_committee_fraction::<E>(&JustifiedBalances::default(), 40),
            None,
            "no active validators"
        );
    }

    #[test]
    fn viability_compares_the_whole_justified_checkpoint() {
        let mut proto_array = setup();
        proto_array.justified_checkpoint = Checkpoint {
            epoch: Epoch::new(1),
            root: root("1A"),
        };
        let current_slot = Epoch::new(5).start_slot(E::slots_per_epoch());
        let viable = |epoch: u64, name: &str| {
            let mut node = proto_array.get_node(&root("3A")).unwrap().clone();
            node.slot = current_slot;
            node.justified_checkpoint = Checkpoint {
                epoch: Epoch::new(epoch),
                root: root(name),
            };
            proto_array.node_is_viable_for_head::<E>(&node, current_slot)
        };

        assert!(viable(1, "1A"));
        assert!(!viable(1, "2C"), "same epoch on another branch is not the store checkpoint");
        assert!(viable(3, "2C"), "recent voting sources are always accepted");
    }
}
