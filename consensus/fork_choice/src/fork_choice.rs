use crate::metrics::{self, scrape_for_metrics};
use crate::{ForkChoiceConfig, ForkChoiceStore};
use logging::crit;
use proto_array::{
    Block as ProtoBlock, ExecutionStatus, JustifiedBalances, LvhExecResponse, ProtoArrayForkChoice,
};
use state_processing::{EpochProcessingError, process_justification_and_finalization};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, instrument};
use types::{
    AttesterSlashing, BeaconBlock, BeaconState, BeaconStateError, ChainSpec, Checkpoint, Epoch,
    EthSpec, FixedBytesExtended, Hash256, IndexedAttestation, Slot, consts::INTERVALS_PER_SLOT,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Error<T> {
    InvalidAttestation(InvalidAttestation),
    InvalidBlock(InvalidBlock),
    ProtoArrayError(proto_array::Error),
    MissingProtoArrayBlock(Hash256),
    UnknownAncestor {
        ancestor_slot: Slot,
        descendant_root: Hash256,
    },
    InconsistentOnTick {
        previous_slot: Slot,
        time: Slot,
    },
    BeaconStateError(BeaconStateError),
    EpochProcessingError(EpochProcessingError),
    ForkChoiceStoreError(T),
    InvalidAnchor {
        block_slot: Slot,
        state_slot: Slot,
    },
    InvalidPayloadStatus {
        block_slot: Slot,
        block_root: Hash256,
        payload_verification_status: PayloadVerificationStatus,
    },
    MissingJustifiedBlock {
        justified_checkpoint: Checkpoint,
    },
    MissingFinalizedBlock {
        finalized_checkpoint: Checkpoint,
    },
}

impl<T> From<InvalidAttestation> for Error<T> {
    fn from(e: InvalidAttestation) -> Self {
        Error::InvalidAttestation(e)
    }
}

impl<T> From<InvalidBlock> for Error<T> {
    fn from(e: InvalidBlock) -> Self {
        Error::InvalidBlock(e)
    }
}

impl<T> From<EpochProcessingError> for Error<T> {
    fn from(e: EpochProcessingError) -> Self {
        Error::EpochProcessingError(e)
    }
}

impl<T> From<BeaconStateError> for Error<T> {
    fn from(e: BeaconStateError) -> Self {
        Error::BeaconStateError(e)
    }
}

impl<T> From<proto_array::Error> for Error<T> {
    fn from(e: proto_array::Error) -> Self {
        Error::ProtoArrayError(e)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InvalidBlock {
    UnknownParent(Hash256),
    FutureSlot {
        current_slot: Slot,
        block_slot: Slot,
    },
    FinalizedSlot {
        finalized_slot: Slot,
        block_slot: Slot,
    },
    NotFinalizedDescendant {
        finalized_root: Hash256,
        block_ancestor: Option<Hash256>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum InvalidAttestation {
    /// No validator signed the attestation.
    EmptyAggregationBitfield,
    /// The voted block is not in fork choice.
    UnknownHeadBlock { beacon_block_root: Hash256 },
    /// `data.slot` lies outside `data.target.epoch`.
    BadTargetEpoch { target: Epoch, slot: Slot },
    /// The target block is not in fork choice.
    UnknownTargetRoot(Hash256),
    /// The target epoch is after the current epoch.
    FutureEpoch {
        attestation_epoch: Epoch,
        current_epoch: Epoch,
    },
    /// The target epoch is before the previous epoch.
    PastEpoch {
        attestation_epoch: Epoch,
        current_epoch: Epoch,
    },
    /// The target root disagrees with the target implied by the voted block.
    InvalidTarget {
        attestation: Hash256,
        local: Hash256,
    },
    /// The voted block is from a later slot than the attestation.
    AttestsToFutureBlock { block: Slot, attestation: Slot },
}

/// What the execution layer said about a block's payload at import time.
///
/// Blocks with invalid payloads are never imported, so there is no variant for them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadVerificationStatus {
    /// The payload was executed and found valid.
    Verified,
    /// The payload is not verified yet, the block is imported optimistically.
    Optimistic,
    /// The block carries no payload.
    Irrelevant,
}

impl PayloadVerificationStatus {
    pub fn is_optimistic(&self) -> bool {
        match self {
            PayloadVerificationStatus::Verified => false,
            PayloadVerificationStatus::Optimistic => true,
            PayloadVerificationStatus::Irrelevant => false,
        }
    }
}

/// Number of slots between the start of `slot`'s epoch and `slot`.
pub fn compute_slots_since_epoch_start<E: EthSpec>(slot: Slot) -> Slot {
    slot - slot
        .epoch(E::slots_per_epoch())
        .start_slot(E::slots_per_epoch())
}

fn compute_start_slot_at_epoch<E: EthSpec>(epoch: Epoch) -> Slot {
    epoch.start_slot(E::slots_per_epoch())
}

/// The parts of an attestation fork choice needs, held back until its slot has passed.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedAttestation {
    slot: Slot,
    attesting_indices: Vec<u64>,
    block_root: Hash256,
    target_epoch: Epoch,
}

impl QueuedAttestation {
    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn attesting_indices(&self) -> &[u64] {
        &self.attesting_indices
    }

    pub fn block_root(&self) -> Hash256 {
        self.block_root
    }

    pub fn target_epoch(&self) -> Epoch {
        self.target_epoch
    }
}

impl From<&IndexedAttestation> for QueuedAttestation {
    fn from(a: &IndexedAttestation) -> Self {
        Self {
            slot: a.data.slot,
            attesting_indices: a.attesting_indices.clone(),
            block_root: a.data.beacon_block_root,
            target_epoch: a.data.target.epoch,
        }
    }
}

/// Remove and return every queued attestation from a slot before `current_slot`.
///
/// The queue is in arrival order, not slot order, so all of it is scanned. Both halves keep
/// their relative order.
fn dequeue_attestations(
    current_slot: Slot,
    queued_attestations: &mut Vec<QueuedAttestation>,
) -> Vec<QueuedAttestation> {
    let (dequeued, remaining): (Vec<_>, Vec<_>) = std::mem::take(queued_attestations)
        .into_iter()
        .partition(|a| a.slot < current_slot);
    *queued_attestations = remaining;

    metrics::inc_counter_by(
        &metrics::FORK_CHOICE_DEQUEUED_ATTESTATIONS,
        dequeued.len() as u64,
    );

    dequeued
}

/// Whether an attestation was included in a block (`True`) or received over gossip (`False`).
///
/// Block attestations may be from any past epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttestationFromBlock {
    True,
    False,
}

/// How many epochs before the block's own epoch the shuffling of interest was decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpochDifference {
    /// The shuffling of the block's own epoch (proposers).
    Current = 0,
    /// The shuffling of the epoch before the block's (attesters of the next epoch).
    Previous = 1,
}

/// Counters describing the size of fork choice, read by `metrics::scrape_for_metrics`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ForkChoiceMetrics {
    pub votes: usize,
    pub queued_attestations: usize,
    pub validated_attestation_datas: usize,
    pub balances_length: usize,
    pub nodes: usize,
    pub indices: usize,
}

/// LMD-GHOST fork choice with Casper FFG checkpoints.
///
/// ## Detail
///
/// `ProtoArrayForkChoice` holds the block tree and the votes. On top of it this struct keeps:
///
/// - the clock, checkpoints, balances and proposer boost (in `T`);
/// - attestations from the current slot, applied once their slot is over;
/// - the head found by the last `Self::update_head`.
///
/// ## Irrecoverable errors
///
/// A failure of the proto-array on data that fork choice itself validated means the two have
/// diverged. Such errors are returned to the caller and also kept in `Self::irrecoverable_error`
/// (only the first one), which the caller must check before importing anything else.
pub struct ForkChoice<T: ForkChoiceStore<E>, E: EthSpec> {
    fc_store: T,
    proto_array: ProtoArrayForkChoice,
    /// In arrival order.
    queued_attestations: Vec<QueuedAttestation>,
    /// Roots of attestation data that passed validation during the current slot.
    validated_attestation_datas: HashSet<Hash256>,
    /// The most recent result of `Self::update_head`.
    head: ProtoBlock,
    config: ForkChoiceConfig,
    irrecoverable_error: Option<Error<T::Error>>,
    _phantom: PhantomData<E>,
}

impl<T, E> ForkChoice<T, E>
where
    T: ForkChoiceStore<E>,
    E: EthSpec,
{
    /// Start fork choice from a trusted anchor block, usually genesis or a finalized checkpoint.
    ///
    /// The store must have been initialized from the same anchor, so that its justified and
    /// finalized checkpoints point at `anchor_block_root`.
    pub fn from_anchor(
        fc_store: T,
        anchor_block_root: Hash256,
        anchor_block: &BeaconBlock,
        anchor_state: &BeaconState<E>,
        current_slot: Option<Slot>,
        spec: &ChainSpec,
        config: ForkChoiceConfig,
    ) -> Result<Self, Error<T::Error>> {
        if anchor_state.slot() % E::slots_per_epoch() != 0 {
            return Err(Error::InvalidAnchor {
                block_slot: anchor_block.slot(),
                state_slot: anchor_state.slot(),
            });
        }

        // The anchor is trusted, so its payload is assumed valid.
        let execution_status = match anchor_block.execution_block_hash() {
            Some(block_hash) if !block_hash.is_zero() => ExecutionStatus::Valid(block_hash),
            _ => ExecutionStatus::PreMerge,
        };

        // Default to the store's clock.
        let current_slot = current_slot.unwrap_or_else(|| fc_store.get_current_slot());

        let mut proto_array = ProtoArrayForkChoice::new::<E>(
            current_slot,
            anchor_block.slot(),
            anchor_block.state_root(),
            *fc_store.justified_checkpoint(),
            *fc_store.finalized_checkpoint(),
            execution_status,
        )?;
        proto_array.set_prune_threshold(config.prune_threshold);

        let head = proto_array
            .get_block(&anchor_block_root)
            .ok_or(Error::MissingProtoArrayBlock(anchor_block_root))?;

        let mut fork_choice = Self {
            fc_store,
            proto_array,
            queued_attestations: vec![],
            validated_attestation_datas: HashSet::new(),
            // This will be updated during the next call to `Self::update_head`.
            head,
            config,
            irrecoverable_error: None,
            _phantom: PhantomData,
        };

        fork_choice.update_head(current_slot, spec)?;

        Ok(fork_choice)
    }

    /// Root of the latest block at or before `ancestor_slot` on the chain of `block_root`.
    ///
    /// `Ok(None)` means the chain was cut by pruning before reaching `ancestor_slot`.
    pub fn get_ancestor(
        &self,
        block_root: Hash256,
        ancestor_slot: Slot,
    ) -> Result<Option<Hash256>, Error<T::Error>> {
        let block = self
            .proto_array
            .get_block(&block_root)
            .ok_or(Error::MissingProtoArrayBlock(block_root))?;

        match block.slot.cmp(&ancestor_slot) {
            Ordering::Greater => Ok(self
                .proto_array
                .iter_block_roots(&block_root)
                // Skipped slots resolve to the previous block.
                .find(|(_, slot)| *slot <= ancestor_slot)
                .map(|(root, _)| root)),
            Ordering::Less | Ordering::Equal => Ok(Some(block_root)),
        }
    }

    /// Recompute, cache and return the head.
    ///
    /// Any failure here is an internal inconsistency and is recorded as irrecoverable.
    #[instrument(skip_all, level = "debug")]
    pub fn update_head(
        &mut self,
        system_time_current_slot: Slot,
        spec: &ChainSpec,
    ) -> Result<ProtoBlock, Error<T::Error>> {
        let _timer = metrics::start_timer(&metrics::FORK_CHOICE_UPDATE_HEAD_TIMES);

        let current_slot = self.update_time(system_time_current_slot)?;

        let store = &self.fc_store;
        let proposer_boost_root = if self.config.proposer_boost_enabled {
            store.proposer_boost_root()
        } else {
            Hash256::zero()
        };

        let head = self
            .proto_array
            .find_head::<E>(
                *store.justified_checkpoint(),
                *store.finalized_checkpoint(),
                store.justified_balances(),
                proposer_boost_root,
                store.equivocating_indices(),
                current_slot,
                spec,
            )
            .map_err(Error::from)
            .and_then(|head_root| {
                self.proto_array
                    .get_block(&head_root)
                    .ok_or(Error::MissingProtoArrayBlock(head_root))
            });

        match head {
            Ok(head) => {
                if head.root != self.head.root {
                    debug!(
                        previous_head = ?self.head.root,
                        new_head = ?head.root,
                        slot = %head.slot,
                        "Fork choice head changed"
                    );
                }
                self.head = head.clone();
                Ok(head)
            }
            Err(e) => Err(self.irrecoverable(e)),
        }
    }

    /// Returns the head computed by the last call to `Self::update_head`.
    pub fn get_head(&self) -> ProtoBlock {
        self.head.clone()
    }

    pub fn head_root(&self) -> Hash256 {
        self.head.root
    }

    /// Import `block`, whose root is `block_root` and whose post-state is `state`.
    ///
    /// The state transition must already have been applied by the caller. `block_delay` is the
    /// time between the start of the block's slot and its arrival.
    ///
    /// Every rejection happens before fork choice or the store is modified.
    #[allow(clippy::too_many_arguments)]
    #[instrument(
        name = "fork_choice_on_block",
        skip_all,
        fields(
            fork_choice_block_delay = ?block_delay
        ))]
    pub fn on_block(
        &mut self,
        system_time_current_slot: Slot,
        block: &BeaconBlock,
        block_root: Hash256,
        block_delay: Duration,
        state: &BeaconState<E>,
        payload_verification_status: PayloadVerificationStatus,
        spec: &ChainSpec,
    ) -> Result<(), Error<T::Error>> {
        let _timer = metrics::start_timer(&metrics::FORK_CHOICE_ON_BLOCK_TIMES);

        // Re-importing must not touch the store (boost, checkpoints).
        if self.proto_array.contains_block(&block_root) {
            return Ok(());
        }

        let current_slot = self.update_time(system_time_current_slot)?;

        let parent_block = self
            .proto_array
            .get_block(&block.parent_root())
            .ok_or(InvalidBlock::UnknownParent(block.parent_root()))?;

        // Future blocks are dropped, not delayed.
        if block.slot() > current_slot {
            return Err(Error::InvalidBlock(InvalidBlock::FutureSlot {
                current_slot,
                block_slot: block.slot(),
            }));
        }

        let finalized_slot =
            compute_start_slot_at_epoch::<E>(self.fc_store.finalized_checkpoint().epoch);
        if block.slot() <= finalized_slot {
            return Err(Error::InvalidBlock(InvalidBlock::FinalizedSlot {
                finalized_slot,
                block_slot: block.slot(),
            }));
        }

        // The block is not in the proto-array yet, but since `block.slot > finalized_slot` the
        // parent's ancestor at the finalized slot is the block's.
        let block_ancestor = self.get_ancestor(block.parent_root(), finalized_slot)?;
        let finalized_root = self.fc_store.finalized_checkpoint().root;
        if block_ancestor != Some(finalized_root) {
            return Err(Error::InvalidBlock(InvalidBlock::NotFinalizedDescendant {
                finalized_root,
                block_ancestor,
            }));
        }

        let execution_status = match block.execution_block_hash() {
            Some(block_hash) if !block_hash.is_zero() => match payload_verification_status {
                PayloadVerificationStatus::Verified => ExecutionStatus::Valid(block_hash),
                PayloadVerificationStatus::Optimistic => ExecutionStatus::Syncing(block_hash),
                PayloadVerificationStatus::Irrelevant => {
                    return Err(Error::InvalidPayloadStatus {
                        block_slot: block.slot(),
                        block_root,
                        payload_verification_status,
                    });
                }
            },
            _ => ExecutionStatus::PreMerge,
        };

        let block_epoch = block.slot().epoch(E::slots_per_epoch());
        let target_slot = block_epoch.start_slot(E::slots_per_epoch());
        let target_root = if block.slot() == target_slot {
            block_root
        } else {
            *state.get_block_root(target_slot)?
        };

        // A block in epoch `N` can justify at most `N` and finalize at most `N - 1`, and never
        // goes below its parent. A parent already at those bounds fixes the child's values.
        let parent_checkpoints = Some((
            parent_block.unrealized_justified_checkpoint,
            parent_block.unrealized_finalized_checkpoint,
        ))
        .filter(|(parent_justified, parent_finalized)| {
            parent_justified.epoch == block_epoch && parent_finalized.epoch + 1 == block_epoch
        });

        let (unrealized_justified_checkpoint, unrealized_finalized_checkpoint) =
            if let Some((parent_justified, parent_finalized)) = parent_checkpoints {
                (parent_justified, parent_finalized)
            } else if self.config.compute_unrealized {
                let justification_and_finalization_state =
                    process_justification_and_finalization(state)?;
                (
                    justification_and_finalization_state.current_justified_checkpoint(),
                    justification_and_finalization_state.finalized_checkpoint(),
                )
            } else {
                (
                    state.current_justified_checkpoint(),
                    state.finalized_checkpoint(),
                )
            };

        self.fc_store
            .on_verified_block(block, block_root, state)
            .map_err(Error::ForkChoiceStoreError)?;

        // Boost the first timely block of the current slot.
        let is_before_attesting_interval =
            block_delay < Duration::from_secs(spec.seconds_per_slot / INTERVALS_PER_SLOT);
        let is_first_block = self.fc_store.proposer_boost_root().is_zero();
        if self.config.proposer_boost_enabled
            && current_slot == block.slot()
            && is_before_attesting_interval
            && is_first_block
        {
            self.fc_store.set_proposer_boost_root(block_root);
        }

        let justified_checkpoint = state.current_justified_checkpoint();
        self.update_checkpoints(
            justified_checkpoint,
            state.finalized_checkpoint(),
            |store| {
                store
                    .compute_justified_balances(&justified_checkpoint, state)
                    .map_err(Error::ForkChoiceStoreError)
            },
        )?;

        if unrealized_justified_checkpoint.epoch
            > self.fc_store.unrealized_justified_checkpoint().epoch
        {
            let balances = self
                .fc_store
                .compute_justified_balances(&unrealized_justified_checkpoint, state)
                .map_err(Error::ForkChoiceStoreError)?;
            self.fc_store
                .set_unrealized_justified_checkpoint(unrealized_justified_checkpoint, balances);
        }
        if unrealized_finalized_checkpoint.epoch
            > self.fc_store.unrealized_finalized_checkpoint().epoch
        {
            self.fc_store
                .set_unrealized_finalized_checkpoint(unrealized_finalized_checkpoint);
        }

        // The epoch boundary that would have pulled these up has already passed.
        if block_epoch < current_slot.epoch(E::slots_per_epoch()) {
            self.update_checkpoints(
                unrealized_justified_checkpoint,
                unrealized_finalized_checkpoint,
                |store| {
                    store
                        .compute_justified_balances(&unrealized_justified_checkpoint, state)
                        .map_err(Error::ForkChoiceStoreError)
                },
            )?;
        }

        let result = self.proto_array.process_block::<E>(
            ProtoBlock {
                slot: block.slot(),
                root: block_root,
                parent_root: Some(block.parent_root()),
                state_root: block.state_root(),
                target_root,
                justified_checkpoint: state.current_justified_checkpoint(),
                finalized_checkpoint: state.finalized_checkpoint(),
                execution_status,
                unrealized_justified_checkpoint,
                unrealized_finalized_checkpoint,
            },
            current_slot,
        );

        // The block passed every check above, so the proto-array refusing it means the two have
        // diverged.
        result.map_err(|e| self.irrecoverable(e.into()))
    }

    /// Replace the store's checkpoints with any of strictly greater epoch.
    ///
    /// Balances are only produced when the justified checkpoint actually changes.
    fn update_checkpoints(
        &mut self,
        justified_checkpoint: Checkpoint,
        finalized_checkpoint: Checkpoint,
        justified_balances_producer: impl FnOnce(&T) -> Result<JustifiedBalances, Error<T::Error>>,
    ) -> Result<(), Error<T::Error>> {
        if justified_checkpoint.epoch > self.fc_store.justified_checkpoint().epoch {
            let justified_balances = justified_balances_producer(&self.fc_store)?;
            debug!(
                epoch = %justified_checkpoint.epoch,
                root = ?justified_checkpoint.root,
                "Updating justified checkpoint"
            );
            self.fc_store
                .set_justified_checkpoint(justified_checkpoint, justified_balances);
        }

        if finalized_checkpoint.epoch > self.fc_store.finalized_checkpoint().epoch {
            debug!(
                epoch = %finalized_checkpoint.epoch,
                root = ?finalized_checkpoint.root,
                "Updating finalized checkpoint"
            );
            self.fc_store.set_finalized_checkpoint(finalized_checkpoint);
        }

        Ok(())
    }

    /// Gossip attestations must target the current or the previous epoch.
    fn validate_target_epoch_against_current_time(
        &self,
        attestation_epoch: Epoch,
    ) -> Result<(), InvalidAttestation> {
        let current_epoch = self
            .fc_store
            .get_current_slot()
            .epoch(E::slots_per_epoch());

        if attestation_epoch > current_epoch {
            Err(InvalidAttestation::FutureEpoch {
                attestation_epoch,
                current_epoch,
            })
        } else if attestation_epoch + 1 < current_epoch {
            Err(InvalidAttestation::PastEpoch {
                attestation_epoch,
                current_epoch,
            })
        } else {
            Ok(())
        }
    }

    /// Check `indexed_attestation` before it is applied or queued.
    ///
    /// The checks on `indexed_attestation.data` are skipped when `att_data_root` has already
    /// passed them (as a gossip attestation) during the current slot.
    fn validate_on_attestation(
        &mut self,
        indexed_attestation: &IndexedAttestation,
        att_data_root: Hash256,
        is_from_block: AttestationFromBlock,
    ) -> Result<(), InvalidAttestation> {
        if indexed_attestation.attesting_indices_is_empty() {
            return Err(InvalidAttestation::EmptyAggregationBitfield);
        }

        if self.validated_attestation_datas.contains(&att_data_root) {
            return Ok(());
        }

        let data = &indexed_attestation.data;
        let target = data.target;

        if matches!(is_from_block, AttestationFromBlock::False) {
            self.validate_target_epoch_against_current_time(target.epoch)?;
        }

        if target.epoch != data.slot.epoch(E::slots_per_epoch()) {
            return Err(InvalidAttestation::BadTargetEpoch {
                target: target.epoch,
                slot: data.slot,
            });
        }

        // Attestations to unknown blocks are dropped, never delayed.
        if !self.proto_array.contains_block(&target.root) {
            return Err(InvalidAttestation::UnknownTargetRoot(target.root));
        }

        let block = self
            .proto_array
            .get_block(&data.beacon_block_root)
            .ok_or(InvalidAttestation::UnknownHeadBlock {
                beacon_block_root: data.beacon_block_root,
            })?;

        // A vote for a block from an earlier epoch implies the target epoch started with skipped
        // slots, so the voted block is the target.
        let expected_target = if target.epoch > block.slot.epoch(E::slots_per_epoch()) {
            data.beacon_block_root
        } else {
            block.target_root
        };

        if expected_target != target.root {
            return Err(InvalidAttestation::InvalidTarget {
                attestation: target.root,
                local: expected_target,
            });
        }

        if block.slot > data.slot {
            return Err(InvalidAttestation::AttestsToFutureBlock {
                block: block.slot,
                attestation: data.slot,
            });
        }

        // Only remember data that passed the epoch check as well.
        if matches!(is_from_block, AttestationFromBlock::False) {
            self.validated_attestation_datas.insert(att_data_root);
        }

        Ok(())
    }

    /// Record the votes in `attestation`. Votes from the current slot wait in the queue.
    ///
    /// `att_data_root` is the hash tree root of `attestation.data`, used to skip re-validating
    /// data that was already seen this slot. Signatures must already have been checked.
    pub fn on_attestation(
        &mut self,
        system_time_current_slot: Slot,
        attestation: &IndexedAttestation,
        att_data_root: Hash256,
        is_from_block: AttestationFromBlock,
    ) -> Result<(), Error<T::Error>> {
        let _timer = metrics::start_timer(&metrics::FORK_CHOICE_ON_ATTESTATION_TIMES);

        self.update_time(system_time_current_slot)?;

        // The zero root stands for genesis. Such votes carry no information.
        if attestation.data.beacon_block_root == Hash256::zero() {
            return Ok(());
        }

        self.validate_on_attestation(attestation, att_data_root, is_from_block)?;

        if attestation.data.slot < self.fc_store.get_current_slot() {
            self.apply_votes(
                attestation.attesting_indices_iter().copied(),
                attestation.data.beacon_block_root,
                attestation.data.target.epoch,
            )?;
        } else {
            self.queued_attestations
                .push(QueuedAttestation::from(attestation));
        }

        Ok(())
    }

    /// Move the latest message of every non-equivocating validator in `indices`.
    fn apply_votes(
        &mut self,
        indices: impl IntoIterator<Item = u64>,
        block_root: Hash256,
        target_epoch: Epoch,
    ) -> Result<(), Error<T::Error>> {
        for validator_index in indices {
            if !self.fc_store.equivocating_indices().contains(&validator_index) {
                self.proto_array.process_attestation(
                    validator_index as usize,
                    block_root,
                    target_epoch,
                )?;
            }
        }
        Ok(())
    }

    /// Mark the validators caught by a verified attester slashing as equivocating.
    ///
    /// Their votes are ignored from the next `Self::update_head` on.
    pub fn on_attester_slashing(&mut self, slashing: &AttesterSlashing) {
        let _timer = metrics::start_timer(&metrics::FORK_CHOICE_ON_ATTESTER_SLASHING_TIMES);

        let attesting_indices_set = |att: &IndexedAttestation| {
            att.attesting_indices_iter()
                .copied()
                .collect::<BTreeSet<_>>()
        };
        let att1_indices = attesting_indices_set(&slashing.attestation_1);
        let att2_indices = attesting_indices_set(&slashing.attestation_2);
        self.fc_store
            .extend_equivocating_indices(att1_indices.intersection(&att2_indices).copied());
    }

    /// Tick once for every slot up to `current_slot`, then apply any queued attestations that
    /// have become eligible. Returns the store's current slot, which never decreases.
    pub fn update_time(&mut self, current_slot: Slot) -> Result<Slot, Error<T::Error>> {
        let start_slot = self.fc_store.get_current_slot();
        while self.fc_store.get_current_slot() < current_slot {
            let previous_slot = self.fc_store.get_current_slot();
            self.on_tick(previous_slot + 1)?
        }

        self.process_attestation_queue()?;

        // Validated data is only trusted within the slot it was seen in.
        if self.fc_store.get_current_slot() > start_slot {
            self.validated_attestation_datas.clear();
        }

        Ok(self.fc_store.get_current_slot())
    }

    /// Advance the clock by one slot. A new slot drops the proposer boost and the first slot of an
    /// epoch pulls the unrealized checkpoints up into the store.
    fn on_tick(&mut self, time: Slot) -> Result<(), Error<T::Error>> {
        let previous_slot = self.fc_store.get_current_slot();
        if time > previous_slot + 1 {
            return Err(Error::InconsistentOnTick {
                previous_slot,
                time,
            });
        }
        if time <= previous_slot {
            return Ok(());
        }

        self.fc_store.set_current_slot(time);
        self.fc_store.set_proposer_boost_root(Hash256::zero());

        if compute_slots_since_epoch_start::<E>(time) != 0 {
            return Ok(());
        }

        let justified = *self.fc_store.unrealized_justified_checkpoint();
        let finalized = *self.fc_store.unrealized_finalized_checkpoint();
        self.update_checkpoints(justified, finalized, |store| {
            Ok(store.unrealized_justified_balances().clone())
        })
    }

    /// Apply the queued attestations from past slots.
    ///
    /// Attestations whose block has been pruned since they were queued are dropped.
    fn process_attestation_queue(&mut self) -> Result<(), Error<T::Error>> {
        for attestation in dequeue_attestations(
            self.fc_store.get_current_slot(),
            &mut self.queued_attestations,
        ) {
            if !self.proto_array.contains_block(&attestation.block_root) {
                debug!(
                    block_root = ?attestation.block_root,
                    slot = %attestation.slot,
                    "Dropping queued attestation for pruned block"
                );
                continue;
            }

            self.apply_votes(
                attestation.attesting_indices,
                attestation.block_root,
                attestation.target_epoch,
            )?;
        }

        Ok(())
    }

    /// Forward a latest-valid-hash verdict from the execution layer to the proto-array.
    ///
    /// Any failure means the execution layer contradicts what fork choice already holds as valid
    /// or finalized, and is recorded as irrecoverable.
    #[instrument(skip_all, level = "debug")]
    pub fn validate_latest_hash(
        &mut self,
        response: LvhExecResponse,
        current_slot: Slot,
    ) -> Result<(), Error<T::Error>> {
        self.proto_array
            .validate_latest_hash::<E>(response, current_slot)
            .map_err(|e| self.irrecoverable(e.into()))
    }

    /// Find the root of the block whose post-state decided the shuffling `epoch_difference`
    /// epochs before the epoch of `block`.
    ///
    /// That is the last block before the first slot of `block_epoch - epoch_difference`. The walk
    /// alternates between target roots and parents so that it skips whole epochs at a time.
    /// Shufflings decided before genesis resolve to the genesis block.
    pub fn get_dependent_root(
        &self,
        block: &ProtoBlock,
        epoch_difference: EpochDifference,
    ) -> Result<Hash256, Error<T::Error>> {
        let slots_per_epoch = E::slots_per_epoch();
        let before_slot = block
            .slot
            .epoch(slots_per_epoch)
            .start_slot(slots_per_epoch)
            .saturating_sub(epoch_difference as u64 * slots_per_epoch);

        let unknown_ancestor = || Error::<T::Error>::UnknownAncestor {
            ancestor_slot: before_slot,
            descendant_root: block.root,
        };

        if before_slot == 0 {
            return self
                .proto_array
                .core_proto_array()
                .nodes
                .first()
                .filter(|genesis| genesis.slot == 0)
                .map(|genesis| genesis.root)
                .ok_or_else(unknown_ancestor);
        }

        let mut node = block.clone();
        loop {
            if node.slot < before_slot {
                return Ok(node.root);
            }

            // The target block is the latest block at or before the first slot of `node`'s epoch.
            node = self
                .proto_array
                .get_block(&node.target_root)
                .ok_or_else(unknown_ancestor)?;
            if node.slot < before_slot {
                return Ok(node.root);
            }

            let parent_root = node.parent_root.ok_or_else(unknown_ancestor)?;
            node = self
                .proto_array
                .get_block(&parent_root)
                .ok_or_else(unknown_ancestor)?;
        }
    }

    /// Record `error` as irrecoverable (keeping only the first one) and hand it back.
    fn irrecoverable(&mut self, error: Error<T::Error>) -> Error<T::Error> {
        crit!(error = ?error, "Fork choice invariant violated");
        metrics::inc_counter(&metrics::FORK_CHOICE_IRRECOVERABLE_ERRORS);
        if self.irrecoverable_error.is_none() {
            self.irrecoverable_error = Some(error.clone());
        }
        error
    }

    /// Returns the first internal invariant violation, if any has occurred.
    ///
    /// Once set, fork choice should be rebuilt from an anchor rather than used further.
    pub fn irrecoverable_error(&self) -> Option<&Error<T::Error>> {
        self.irrecoverable_error.as_ref()
    }

    /// `true` for known blocks that descend from the finalized checkpoint.
    pub fn contains_block(&self, block_root: &Hash256) -> bool {
        self.proto_array.contains_block(block_root)
            && self.is_finalized_checkpoint_or_descendant(*block_root)
    }

    /// Returns `true` if the block is known to the proto-array, whether or not it descends from
    /// the finalized checkpoint.
    pub fn has_block(&self, block_root: &Hash256) -> bool {
        self.proto_array.contains_block(block_root)
    }

    pub fn get_block(&self, block_root: &Hash256) -> Option<ProtoBlock> {
        if self.is_finalized_checkpoint_or_descendant(*block_root) {
            self.proto_array.get_block(block_root)
        } else {
            None
        }
    }

    pub fn get_block_execution_status(&self, block_root: &Hash256) -> Option<ExecutionStatus> {
        if self.is_finalized_checkpoint_or_descendant(*block_root) {
            self.proto_array.get_block_execution_status(block_root)
        } else {
            None
        }
    }

    pub fn get_block_weight(&self, block_root: &Hash256) -> Option<u64> {
        self.proto_array.get_weight(block_root)
    }

    pub fn get_justified_block(&self) -> Result<ProtoBlock, Error<T::Error>> {
        let justified_checkpoint = self.justified_checkpoint();
        self.get_block(&justified_checkpoint.root)
            .ok_or(Error::MissingJustifiedBlock {
                justified_checkpoint,
            })
    }

    pub fn get_finalized_block(&self) -> Result<ProtoBlock, Error<T::Error>> {
        let finalized_checkpoint = self.finalized_checkpoint();
        self.get_block(&finalized_checkpoint.root)
            .ok_or(Error::MissingFinalizedBlock {
                finalized_checkpoint,
            })
    }

    /// A block at a skipped finalized slot on another chain is not a descendant.
    pub fn is_finalized_checkpoint_or_descendant(&self, block_root: Hash256) -> bool {
        self.proto_array
            .is_finalized_checkpoint_or_descendant::<E>(block_root)
    }

    pub fn is_descendant(&self, ancestor_root: Hash256, descendant_root: Hash256) -> bool {
        self.proto_array
            .is_descendant(ancestor_root, descendant_root)
    }

    /// Returns the deepest block that is an ancestor of (or equal to) both `a` and `b`.
    pub fn get_common_ancestor(&self, a: &Hash256, b: &Hash256) -> Option<ProtoBlock> {
        self.proto_array.get_common_ancestor(a, b)
    }

    /// Returns `block_root` and all of its known ancestors, newest first.
    pub fn get_all_ancestor_blocks(&self, block_root: &Hash256) -> Vec<ProtoBlock> {
        self.proto_array.ancestor_blocks(block_root)
    }

    /// Returns every block which is neither `block_root` nor one of its ancestors.
    pub fn get_all_non_ancestor_blocks(&self, block_root: &Hash256) -> Vec<ProtoBlock> {
        self.proto_array.non_ancestor_blocks(block_root)
    }

    /// Returns every block without children.
    pub fn get_heads(&self) -> Vec<ProtoBlock> {
        self.proto_array.heads()
    }

    /// Returns the block at `slot` on the chain of the cached head, if that slot is not skipped.
    pub fn get_canonical_block_at_slot(&self, slot: Slot) -> Option<ProtoBlock> {
        if slot > self.head.slot {
            return None;
        }
        self.proto_array
            .get_ancestor(&self.head.root, slot)
            .filter(|block| block.slot == slot)
    }

    pub fn get_block_summaries_by_parent_root(&self, parent_root: &Hash256) -> Vec<ProtoBlock> {
        self.proto_array.blocks_by_parent_root(parent_root)
    }

    pub fn get_block_summaries_at_slot(&self, slot: Slot) -> Vec<ProtoBlock> {
        self.proto_array.blocks_at_slot(slot)
    }

    pub fn finalized_checkpoint(&self) -> Checkpoint {
        *self.fc_store.finalized_checkpoint()
    }

    pub fn justified_checkpoint(&self) -> Checkpoint {
        *self.fc_store.justified_checkpoint()
    }

    pub fn unrealized_justified_checkpoint(&self) -> Checkpoint {
        *self.fc_store.unrealized_justified_checkpoint()
    }

    pub fn unrealized_finalized_checkpoint(&self) -> Checkpoint {
        *self.fc_store.unrealized_finalized_checkpoint()
    }

    /// The `(block_root, target_epoch)` of the validator's latest applied vote.
    ///
    /// Queued votes are not visible until `Self::update_time` applies them.
    pub fn latest_message(&self, validator_index: usize) -> Option<(Hash256, Epoch)> {
        self.proto_array.latest_message(validator_index)
    }

    pub fn proto_array(&self) -> &ProtoArrayForkChoice {
        &self.proto_array
    }

    pub fn fc_store(&self) -> &T {
        &self.fc_store
    }

    pub fn config(&self) -> &ForkChoiceConfig {
        &self.config
    }

    pub fn queued_attestations(&self) -> &[QueuedAttestation] {
        &self.queued_attestations
    }

    /// Zero when no block is boosted.
    pub fn proposer_boost_root(&self) -> Hash256 {
        self.fc_store.proposer_boost_root()
    }

    /// Prunes the underlying fork choice DAG below `finalized_root`, returning the removed blocks.
    ///
    /// Nothing is removed until the number of prunable blocks reaches the prune threshold. Once
    /// blocks are removed the validated attestation-data cache is emptied, since its entries may
    /// refer to them, and the store is told to drop its own data from before the finalized block.
    #[instrument(skip_all, level = "debug")]
    pub fn prune(&mut self, finalized_root: Hash256) -> Result<Vec<ProtoBlock>, Error<T::Error>> {
        let finalized_slot = self
            .proto_array
            .get_block(&finalized_root)
            .map(|block| block.slot);
        let removed = self.proto_array.maybe_prune(finalized_root)?;
        if !removed.is_empty() {
            self.validated_attestation_datas.clear();
            if let Some(slot) = finalized_slot {
                self.fc_store.prune(slot);
            }
            debug!(
                removed = removed.len(),
                remaining = self.proto_array.len(),
                ?finalized_slot,
                "Pruned fork choice"
            );
        }
        Ok(removed)
    }

    /// Counts describing the current size of fork choice.
    pub fn metrics_snapshot(&self) -> ForkChoiceMetrics {
        let core = self.proto_array.core_proto_array();
        ForkChoiceMetrics {
            votes: self.proto_array.votes_len(),
            queued_attestations: self.queued_attestations.len(),
            validated_attestation_datas: self.validated_attestation_datas.len(),
            balances_length: self.proto_array.balances_len(),
            nodes: core.nodes.len(),
            indices: core.indices.len(),
        }
    }

    /// Copy `Self::metrics_snapshot` into the prometheus gauges.
    pub fn scrape_for_metrics(&self) {
        scrape_for_metrics(self);
    }
}

#[cfg(test)]
mod tests {
    use types::MainnetEthSpec;

    use super::*;

    type E = MainnetEthSpec;

    #[test]
    fn epoch_slot_arithmetic() {
        let spe = E::slots_per_epoch();
        for slot in 0..3 * spe {
            let slot = Slot::new(slot);
            let epoch = slot.epoch(spe);
            let start = compute_start_slot_at_epoch::<E>(epoch);
            assert_eq!(start + compute_slots_since_epoch_start::<E>(slot), slot);
            assert_eq!(start.as_u64() % spe, 0);
        }
    }

    #[test]
    fn queue_releases_attestations_from_past_slots() {
        let queue_at = |slots: &[u64]| -> Vec<QueuedAttestation> {
            slots
                .iter()
                .map(|&slot| QueuedAttestation {
                    slot: Slot::new(slot),
                    attesting_indices: vec![slot],
                    block_root: Hash256::zero(),
                    target_epoch: Epoch::new(0),
                })
                .collect()
        };
        let slots = |queue: &[QueuedAttestation]| -> Vec<u64> {
            queue.iter().map(|a| a.slot.as_u64()).collect()
        };

        let cases: [(u64, Vec<u64>, Vec<u64>); 4] = [
            (1, vec![], vec![1, 2, 2, 5]),
            (2, vec![1], vec![2, 2, 5]),
            (5, vec![1, 2, 2], vec![5]),
            (9, vec![1, 2, 2, 5], vec![]),
        ];
        for (now, released, kept) in cases {
            let mut queue = queue_at(&[1, 2, 2, 5]);
            let dequeued = dequeue_attestations(Slot::new(now), &mut queue);
            assert_eq!(slots(&dequeued), released, "released at slot {now}");
            assert_eq!(slots(&queue), kept, "kept at slot {now}");
        }

        // A late-arriving attestation for an earlier slot sits behind a later one.
        let mut queue = queue_at(&[5, 1, 3, 4]);
        let dequeued = dequeue_attestations(Slot::new(4), &mut queue);
        assert_eq!(slots(&dequeued), vec![1, 3]);
        assert_eq!(slots(&queue), vec![5, 4]);
    }

    #[test]
    fn queued_attestation_from_indexed() {
        let attestation = IndexedAttestation {
            attesting_indices: vec![4, 2],
            data: types::AttestationData {
                slot: Slot::new(9),
                index: 0,
                beacon_block_root: Hash256::repeat_byte(3),
                source: Checkpoint::default(),
                target: Checkpoint {
                    epoch: Epoch::new(0),
                    root: Hash256::repeat_byte(1),
                },
            },
        };

        let queued = QueuedAttestation::from(&attestation);
        assert_eq!(queued.slot(), Slot::new(9));
        assert_eq!(queued.attesting_indices(), &[4, 2]);
        assert_eq!(queued.block_root(), Hash256::repeat_byte(3));
        assert_eq!(queued.target_epoch(), Epoch::new(0));
    }

    #[test]
    fn payload_status_optimism() {
        assert!(PayloadVerificationStatus::Optimistic.is_optimistic());
        assert!(!PayloadVerificationStatus::Verified.is_optimistic());
        assert!(!PayloadVerificationStatus::Irrelevant.is_optimistic());
    }
}
