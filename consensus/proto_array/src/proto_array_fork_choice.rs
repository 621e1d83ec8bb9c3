use crate::{
    JustifiedBalances,
    error::Error,
    proto_array::{LvhExecResponse, ProposerBoost, ProtoArray, ProtoNode},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashMap},
    fmt,
};
use types::{ChainSpec, Checkpoint, Epoch, EthSpec, ExecutionBlockHash, Hash256, Slot};

pub const DEFAULT_PRUNE_THRESHOLD: usize = 256;

/// The latest message of a single validator.
///
/// Votes refer to blocks by their index in the `ProtoArray`, so they must be shifted whenever the
/// array is pruned.
#[derive(Default, PartialEq, Clone, Debug)]
pub struct VoteTracker {
    current_index: Option<usize>,
    next_index: Option<usize>,
    next_epoch: Epoch,
}

/// What is known about a block's execution payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// No payload.
    PreMerge,
    /// Imported optimistically, awaiting a verdict.
    Syncing(ExecutionBlockHash),
    Valid(ExecutionBlockHash),
    Invalid(ExecutionBlockHash),
}

impl ExecutionStatus {
    pub fn is_execution_enabled(&self) -> bool {
        !matches!(self, ExecutionStatus::PreMerge)
    }

    pub fn block_hash(&self) -> Option<ExecutionBlockHash> {
        match self {
            ExecutionStatus::Valid(hash)
            | ExecutionStatus::Invalid(hash)
            | ExecutionStatus::Syncing(hash) => Some(*hash),
            ExecutionStatus::PreMerge => None,
        }
    }

    /// Fully valid: either the payload was verified or there is none.
    pub fn is_valid_or_pre_merge(&self) -> bool {
        matches!(self, ExecutionStatus::Valid(_) | ExecutionStatus::PreMerge)
    }

    pub fn is_strictly_optimistic(&self) -> bool {
        matches!(self, ExecutionStatus::Syncing(_))
    }

    /// Anything that is not known to be valid, excluding blocks without a payload.
    pub fn is_optimistic_or_invalid(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Syncing(_) | ExecutionStatus::Invalid(_)
        )
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ExecutionStatus::Invalid(_))
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Valid(_) => write!(f, "valid"),
            ExecutionStatus::Invalid(_) => write!(f, "invalid"),
            ExecutionStatus::Syncing(_) => write!(f, "syncing"),
            ExecutionStatus::PreMerge => write!(f, "pre_merge"),
        }
    }
}

/// The summary of a beacon block that fork choice stores and hands back to callers.
///
/// `parent_root` is `None` for the tree root and for blocks whose parent was pruned.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub slot: Slot,
    pub root: Hash256,
    pub parent_root: Option<Hash256>,
    pub state_root: Hash256,
    pub target_root: Hash256,
    pub justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub execution_status: ExecutionStatus,
    pub unrealized_justified_checkpoint: Checkpoint,
    pub unrealized_finalized_checkpoint: Checkpoint,
}

impl Block {
    fn from_node(node: &ProtoNode, parent_root: Option<Hash256>) -> Self {
        Self {
            slot: node.slot,
            root: node.root,
            parent_root,
            state_root: node.state_root,
            target_root: node.target_root,
            justified_checkpoint: node.justified_checkpoint,
            finalized_checkpoint: node.finalized_checkpoint,
            execution_status: node.execution_status,
            unrealized_justified_checkpoint: node.unrealized_justified_checkpoint,
            unrealized_finalized_checkpoint: node.unrealized_finalized_checkpoint,
        }
    }
}

/// A `Vec` indexed by validator index that pads itself with `T::default()` on out-of-range access.
#[derive(Default, Clone, Debug, PartialEq)]
pub struct ElasticList<T>(pub Vec<T>);

impl<T> ElasticList<T>
where
    T: Default,
{
    fn ensure(&mut self, i: usize) {
        if self.0.len() <= i {
            self.0.resize_with(i + 1, Default::default);
        }
    }

    pub fn get_mut(&mut self, i: usize) -> &mut T {
        self.ensure(i);
        &mut self.0[i]
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.0.iter_mut()
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct ProtoArrayForkChoice {
    pub(crate) proto_array: ProtoArray,
    pub(crate) votes: ElasticList<Option<VoteTracker>>,
    pub(crate) balances: JustifiedBalances,
}

impl ProtoArrayForkChoice {
    pub fn new<E: EthSpec>(
        current_slot: Slot,
        finalized_block_slot: Slot,
        finalized_block_state_root: Hash256,
        justified_checkpoint: Checkpoint,
        finalized_checkpoint: Checkpoint,
        execution_status: ExecutionStatus,
    ) -> Result<Self, Error> {
        let mut proto_array = ProtoArray {
            prune_threshold: DEFAULT_PRUNE_THRESHOLD,
            justified_checkpoint,
            finalized_checkpoint,
            nodes: Vec::with_capacity(1),
            indices: HashMap::with_capacity(1),
            previous_proposer_boost: ProposerBoost::default(),
        };

        let block = Block {
            slot: finalized_block_slot,
            root: finalized_checkpoint.root,
            parent_root: None,
            state_root: finalized_block_state_root,
            // The anchor sits on an epoch boundary, so it is its own target.
            target_root: finalized_checkpoint.root,
            justified_checkpoint,
            finalized_checkpoint,
            execution_status,
            unrealized_justified_checkpoint: justified_checkpoint,
            unrealized_finalized_checkpoint: finalized_checkpoint,
        };

        proto_array.on_block::<E>(block, current_slot)?;

        Ok(Self {
            proto_array,
            votes: ElasticList::default(),
            balances: JustifiedBalances::default(),
        })
    }

    /// See `ProtoArray::validate_latest_hash` for documentation.
    pub fn validate_latest_hash<E: EthSpec>(
        &mut self,
        response: LvhExecResponse,
        current_slot: Slot,
    ) -> Result<(), Error> {
        self.proto_array
            .validate_latest_hash::<E>(response, current_slot)
    }

    /// Record the latest message of `validator_index`.
    ///
    /// A vote only replaces an existing one when it has a strictly greater target epoch.
    pub fn process_attestation(
        &mut self,
        validator_index: usize,
        block_root: Hash256,
        target_epoch: Epoch,
    ) -> Result<(), Error> {
        let block_index = *self
            .proto_array
            .indices
            .get(&block_root)
            .ok_or(Error::NodeUnknown(block_root))?;

        let vote = self.votes.get_mut(validator_index);
        match vote {
            Some(vote) if target_epoch <= vote.next_epoch => (),
            Some(vote) => {
                vote.next_index = Some(block_index);
                vote.next_epoch = target_epoch;
            }
            None => {
                *vote = Some(VoteTracker {
                    current_index: None,
                    next_index: Some(block_index),
                    next_epoch: target_epoch,
                });
            }
        }

        Ok(())
    }

    pub fn process_block<E: EthSpec>(
        &mut self,
        block: Block,
        current_slot: Slot,
    ) -> Result<(), Error> {
        if block.parent_root.is_none() {
            return Err(Error::InvalidParent {
                block_root: block.root,
                parent_root: None,
            });
        }

        self.proto_array.on_block::<E>(block, current_slot)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn find_head<E: EthSpec>(
        &mut self,
        justified_checkpoint: Checkpoint,
        finalized_checkpoint: Checkpoint,
        justified_state_balances: &JustifiedBalances,
        proposer_boost_root: Hash256,
        equivocating_indices: &BTreeSet<u64>,
        current_slot: Slot,
        spec: &ChainSpec,
    ) -> Result<Hash256, Error> {
        let old_balances = &self.balances;
        let new_balances = justified_state_balances;

        let deltas = compute_deltas(
            self.proto_array.nodes.len(),
            &mut self.votes,
            &old_balances.effective_balances,
            &new_balances.effective_balances,
            equivocating_indices,
        )?;

        self.proto_array.apply_score_changes::<E>(
            deltas,
            justified_checkpoint,
            finalized_checkpoint,
            new_balances,
            proposer_boost_root,
            current_slot,
            spec,
        )?;

        self.balances = new_balances.clone();

        self.proto_array
            .find_head::<E>(&justified_checkpoint.root, current_slot)
    }

    /// Prune the array below `finalized_root` and shift every vote to the new indices.
    ///
    /// Votes for pruned blocks are forgotten, but the validator's latest target epoch is kept so
    /// that older attestations cannot replace it.
    ///
    /// Returns the removed blocks, oldest first.
    pub fn maybe_prune(&mut self, finalized_root: Hash256) -> Result<Vec<Block>, Error> {
        let removed = self.proto_array.maybe_prune(finalized_root)?;
        let removed_count = removed.len();

        if removed_count > 0 {
            for vote in self.votes.iter_mut().flatten() {
                vote.current_index = vote
                    .current_index
                    .and_then(|index| index.checked_sub(removed_count));
                vote.next_index = vote
                    .next_index
                    .and_then(|index| index.checked_sub(removed_count));
            }
        }

        Ok(removed
            .iter()
            .map(|node| {
                let parent_root = node
                    .parent
                    .and_then(|index| removed.get(index))
                    .map(|parent| parent.root);
                Block::from_node(node, parent_root)
            })
            .collect())
    }

    pub fn set_prune_threshold(&mut self, prune_threshold: usize) {
        self.proto_array.prune_threshold = prune_threshold;
    }

    pub fn len(&self) -> usize {
        self.proto_array.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proto_array.nodes.is_empty()
    }

    pub fn contains_block(&self, block_root: &Hash256) -> bool {
        self.proto_array.indices.contains_key(block_root)
    }

    fn node_to_block(&self, node: &ProtoNode) -> Block {
        let parent_root = node
            .parent
            .and_then(|i| self.proto_array.nodes.get(i))
            .map(|parent| parent.root);
        Block::from_node(node, parent_root)
    }

    pub fn get_block(&self, block_root: &Hash256) -> Option<Block> {
        let node = self.proto_array.get_node(block_root)?;
        Some(self.node_to_block(node))
    }

    pub fn get_block_execution_status(&self, block_root: &Hash256) -> Option<ExecutionStatus> {
        let block = self.proto_array.get_node(block_root)?;
        Some(block.execution_status)
    }

    pub fn get_weight(&self, block_root: &Hash256) -> Option<u64> {
        self.proto_array.get_node(block_root).map(|node| node.weight)
    }

    /// Returns the latest ancestor of `block_root` at or before `slot`.
    pub fn get_ancestor(&self, block_root: &Hash256, slot: Slot) -> Option<Block> {
        self.proto_array
            .get_ancestor(block_root, slot)
            .map(|node| self.node_to_block(node))
    }

    /// The newest block shared by the chains of `a` and `b`.
    pub fn get_common_ancestor(&self, a: &Hash256, b: &Hash256) -> Option<Block> {
        self.proto_array
            .get_common_ancestor(a, b)
            .map(|node| self.node_to_block(node))
    }

    /// A block counts as its own descendant. Unknown roots are never descendants.
    pub fn is_descendant(&self, ancestor_root: Hash256, descendant_root: Hash256) -> bool {
        self.proto_array
            .is_descendant(ancestor_root, descendant_root)
    }

    pub fn is_finalized_checkpoint_or_descendant<E: EthSpec>(
        &self,
        descendant_root: Hash256,
    ) -> bool {
        self.proto_array
            .is_finalized_checkpoint_or_descendant::<E>(descendant_root)
    }

    /// Returns the block root and target epoch of the latest vote of `validator_index`.
    ///
    /// Votes whose block has since been pruned are reported as absent.
    pub fn latest_message(&self, validator_index: usize) -> Option<(Hash256, Epoch)> {
        let vote = self.votes.0.get(validator_index)?.as_ref()?;
        let node = self.proto_array.nodes.get(vote.next_index?)?;
        Some((node.root, vote.next_epoch))
    }

    /// `(root, slot)` of `block_root` and its ancestors, newest first.
    pub fn iter_block_roots(
        &self,
        block_root: &Hash256,
    ) -> impl Iterator<Item = (Hash256, Slot)> + '_ {
        self.proto_array.iter_block_roots(block_root)
    }

    /// All blocks without children.
    pub fn heads(&self) -> Vec<Block> {
        self.proto_array
            .heads()
            .into_iter()
            .map(|node| self.node_to_block(node))
            .collect()
    }

    /// All blocks at exactly `slot`.
    pub fn blocks_at_slot(&self, slot: Slot) -> Vec<Block> {
        self.proto_array
            .nodes_at_slot(slot)
            .map(|node| self.node_to_block(node))
            .collect()
    }

    /// Blocks newer than the finalized block that are not on the chain of `block_root`.
    pub fn non_ancestor_blocks(&self, block_root: &Hash256) -> Vec<Block> {
        self.proto_array
            .iterate_non_ancestor_nodes(block_root)
            .into_iter()
            .map(|node| self.node_to_block(node))
            .collect()
    }

    /// `block_root` followed by each of its known ancestors, newest first.
    pub fn ancestor_blocks(&self, block_root: &Hash256) -> Vec<Block> {
        self.proto_array
            .iter_nodes(block_root)
            .map(|node| self.node_to_block(node))
            .collect()
    }

    /// All blocks whose parent is `parent_root`, in insertion order.
    pub fn blocks_by_parent_root(&self, parent_root: &Hash256) -> Vec<Block> {
        let Some(&parent_index) = self.proto_array.indices.get(parent_root) else {
            return vec![];
        };
        self.proto_array
            .nodes
            .iter()
            .skip(parent_index)
            .filter(|node| node.parent == Some(parent_index))
            .map(|node| self.node_to_block(node))
            .collect()
    }

    /// Number of validators with a slot in the vote list.
    pub fn votes_len(&self) -> usize {
        self.votes.0.len()
    }

    /// Number of balances used by the most recent `find_head`.
    pub fn balances_len(&self) -> usize {
        self.balances.effective_balances.len()
    }

    /// Direct access to the tree, for queries `Self` does not wrap.
    pub fn core_proto_array(&self) -> &ProtoArray {
        &self.proto_array
    }
}

/// Weight change per node index caused by votes moving and balances changing since the last call.
///
/// Moves every `current_index` up to its `next_index`. Errors when a vote points past
/// `num_nodes` or a delta overflows.
fn compute_deltas(
    num_nodes: usize,
    votes: &mut ElasticList<Option<VoteTracker>>,
    old_balances: &[u64],
    new_balances: &[u64],
    equivocating_indices: &BTreeSet<u64>,
) -> Result<Vec<i64>, Error> {
    let mut deltas = vec![0_i64; num_nodes];

    let apply = |deltas: &mut Vec<i64>, index: usize, change: i64| -> Result<(), Error> {
        let delta = deltas
            .get_mut(index)
            .ok_or(Error::InvalidNodeDelta(index))?;
        *delta = delta
            .checked_add(change)
            .ok_or(Error::DeltaOverflow(index))?;
        Ok(())
    };

    for (val_index, vote) in votes.iter_mut().enumerate() {
        let Some(vote) = vote else {
            continue;
        };
        if vote.current_index.is_none() && vote.next_index.is_none() {
            continue;
        }

        // An equivocator loses its applied weight once. Clearing `current_index` marks it done,
        // later votes only ever touch `next_index`.
        if equivocating_indices.contains(&(val_index as u64)) {
            if let Some(current_index) = vote.current_index.take() {
                let old_balance = old_balances.get(val_index).copied().unwrap_or(0);
                apply(&mut deltas, current_index, 0_i64.saturating_sub_unsigned(old_balance))?;
            }
            continue;
        }

        // Validators missing from either list (new deposits, or a justified state on a fork with
        // fewer validators) weigh zero there.
        let old_balance = old_balances.get(val_index).copied().unwrap_or(0);
        let new_balance = new_balances.get(val_index).copied().unwrap_or(0);

        if vote.current_index != vote.next_index || old_balance != new_balance {
            if let Some(current_index) = vote.current_index {
                apply(&mut deltas, current_index, 0_i64.saturating_sub_unsigned(old_balance))?;
            }
            if let Some(next_index) = vote.next_index {
                apply(&mut deltas, next_index, 0_i64.saturating_add_unsigned(new_balance))?;
            }

            vote.current_index = vote.next_index;
        }
    }

    Ok(deltas)
}
