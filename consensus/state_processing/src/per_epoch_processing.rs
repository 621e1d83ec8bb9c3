use errors::EpochProcessingError as Error;
use safe_arith::SafeArith;
use std::marker::PhantomData;
use types::consts::JUSTIFICATION_BITS_LENGTH;
use types::{BeaconState, BeaconStateError, Checkpoint, Epoch, EthSpec, Hash256};

pub mod errors;

/// A snapshot of the fields of a `BeaconState` which justification and finalization read and
/// write.
///
/// Working on a copy allows the unrealized checkpoints of a block to be computed without
/// mutating (or cloning) the post-state of that block.
#[must_use = "this value must be applied to a state or explicitly dropped"]
#[derive(Debug, Clone, PartialEq)]
pub struct JustificationAndFinalizationState<E: EthSpec> {
    previous_epoch_target_root: Result<Hash256, BeaconStateError>,
    current_epoch_target_root: Result<Hash256, BeaconStateError>,
    previous_epoch: Epoch,
    current_epoch: Epoch,
    previous_justified_checkpoint: Checkpoint,
    current_justified_checkpoint: Checkpoint,
    finalized_checkpoint: Checkpoint,
    justification_bits: [bool; JUSTIFICATION_BITS_LENGTH],
    _phantom: PhantomData<E>,
}

impl<E: EthSpec> JustificationAndFinalizationState<E> {
    pub fn new(state: &BeaconState<E>) -> Self {
        let previous_epoch = state.previous_epoch();
        let current_epoch = state.current_epoch();
        Self {
            previous_epoch_target_root: state.get_block_root_at_epoch(previous_epoch).copied(),
            current_epoch_target_root: state.get_block_root_at_epoch(current_epoch).copied(),
            previous_epoch,
            current_epoch,
            previous_justified_checkpoint: state.previous_justified_checkpoint(),
            current_justified_checkpoint: state.current_justified_checkpoint(),
            finalized_checkpoint: state.finalized_checkpoint(),
            justification_bits: state.justification_bits,
            _phantom: PhantomData,
        }
    }

    pub fn apply_changes_to_state(self, state: &mut BeaconState<E>) {
        state.previous_justified_checkpoint = self.previous_justified_checkpoint;
        state.current_justified_checkpoint = self.current_justified_checkpoint;
        state.finalized_checkpoint = self.finalized_checkpoint;
        state.justification_bits = self.justification_bits;
    }

    pub fn previous_justified_checkpoint(&self) -> Checkpoint {
        self.previous_justified_checkpoint
    }

    pub fn current_justified_checkpoint(&self) -> Checkpoint {
        self.current_justified_checkpoint
    }

    pub fn finalized_checkpoint(&self) -> Checkpoint {
        self.finalized_checkpoint
    }

    pub fn justification_bits(&self) -> [bool; JUSTIFICATION_BITS_LENGTH] {
        self.justification_bits
    }

    fn shift_justification_bits(&mut self) {
        self.justification_bits.rotate_right(1);
        self.justification_bits[0] = false;
    }

    fn bits_set(&self, range: std::ops::Range<usize>) -> bool {
        self.justification_bits
            .get(range)
            .is_some_and(|bits| bits.iter().all(|bit| *bit))
    }
}

/// Update the justified and finalized checkpoints for matching target attestations.
///
/// Skipped during the first two epochs, while the genesis checkpoints still carry a zero root.
pub fn process_justification_and_finalization<E: EthSpec>(
    state: &BeaconState<E>,
) -> Result<JustificationAndFinalizationState<E>, Error> {
    let justification_and_finalization_state = JustificationAndFinalizationState::new(state);
    if state.current_epoch() <= E::genesis_epoch().safe_add(1_u64)? {
        return Ok(justification_and_finalization_state);
    }

    let previous_target_balance = state.previous_epoch_target_attesting_balance()?;
    let current_target_balance = state.current_epoch_target_attesting_balance()?;
    let total_active_balance = state.get_total_active_balance()?;

    weigh_justification_and_finalization(
        justification_and_finalization_state,
        total_active_balance,
        previous_target_balance,
        current_target_balance,
    )
}

/// Justify the previous and current epochs when a two-thirds majority attested to their targets,
/// then finalize according to the four Casper FFG finality rules.
pub fn weigh_justification_and_finalization<E: EthSpec>(
    mut state: JustificationAndFinalizationState<E>,
    total_active_balance: u64,
    previous_target_balance: u64,
    current_target_balance: u64,
) -> Result<JustificationAndFinalizationState<E>, Error> {
    let previous_epoch = state.previous_epoch;
    let current_epoch = state.current_epoch;

    let old_previous_justified_checkpoint = state.previous_justified_checkpoint;
    let old_current_justified_checkpoint = state.current_justified_checkpoint;

    // Process justifications
    state.previous_justified_checkpoint = state.current_justified_checkpoint;
    state.shift_justification_bits();

    let supermajority = total_active_balance.safe_mul(2)?;

    if previous_target_balance.safe_mul(3)? >= supermajority {
        state.current_justified_checkpoint = Checkpoint {
            epoch: previous_epoch,
            root: state.previous_epoch_target_root.clone()?,
        };
        state.justification_bits[1] = true;
    }
    if current_target_balance.safe_mul(3)? >= supermajority {
        state.current_justified_checkpoint = Checkpoint {
            epoch: current_epoch,
            root: state.current_epoch_target_root.clone()?,
        };
        state.justification_bits[0] = true;
    }

    // Process finalizations
    // The 2nd/3rd/4th most recent epochs are justified, the 2nd using the 4th as source.
    if state.bits_set(1..4) && old_previous_justified_checkpoint.epoch.safe_add(3_u64)? == current_epoch
    {
        state.finalized_checkpoint = old_previous_justified_checkpoint;
    }
    // The 2nd/3rd most recent epochs are justified, the 2nd using the 3rd as source.
    if state.bits_set(1..3) && old_previous_justified_checkpoint.epoch.safe_add(2_u64)? == current_epoch
    {
        state.finalized_checkpoint = old_previous_justified_checkpoint;
    }
    // The 1st/2nd/3rd most recent epochs are justified, the 1st using the 3rd as source.
    if state.bits_set(0..3) && old_current_justified_checkpoint.epoch.safe_add(2_u64)? == current_epoch
    {
        state.finalized_checkpoint = old_current_justified_checkpoint;
    }
    // The 1st/2nd most recent epochs are justified, the 1st using the 2nd as source.
    if state.bits_set(0..2) && old_current_justified_checkpoint.epoch.safe_add(1_u64)? == current_epoch
    {
        state.finalized_checkpoint = old_current_justified_checkpoint;
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::per_slot_processing::per_slot_processing;
    use types::{FixedBytesExtended, MinimalEthSpec, Slot, Validator};

    type E = MinimalEthSpec;

    fn root(slot: u64) -> Hash256 {
        Hash256::from_low_u64_be(slot + 1)
    }

    /// Advance `state` to `target_slot`, with `attesters` voting for the correct target in every
    /// slot and a block at every slot.
    fn advance(state: &mut BeaconState<E>, target_slot: u64, attesters: &[usize]) {
        while state.slot() < target_slot {
            state.latest_block_root = root(state.slot().as_u64());
            for i in attesters {
                state
                    .mark_current_epoch_target_attester(*i)
                    .expect("validator should exist");
            }
            per_slot_processing(state).expect("should process slot");
        }
    }

    fn genesis() -> BeaconState<E> {
        BeaconState::genesis(vec![Validator::active_from_genesis(32); 4])
    }

    #[test]
    fn no_justification_in_first_two_epochs() {
        let mut state = genesis();
        advance(&mut state, 16, &[0, 1, 2, 3]);

        assert_eq!(
            state.current_justified_checkpoint(),
            Checkpoint::default(),
            "genesis epochs are skipped"
        );
    }

    #[test]
    fn full_participation_justifies_then_finalizes() {
        let mut state = genesis();
        advance(&mut state, 24, &[0, 1, 2, 3]);

        assert_eq!(
            state.current_justified_checkpoint(),
            Checkpoint {
                epoch: Epoch::new(2),
                root: root(16)
            },
            "epoch 2 should be justified"
        );
        assert_eq!(state.finalized_checkpoint(), Checkpoint::default());

        advance(&mut state, 32, &[0, 1, 2, 3]);

        assert_eq!(
            state.current_justified_checkpoint(),
            Checkpoint {
                epoch: Epoch::new(3),
                root: root(24)
            },
            "epoch 3 should be justified"
        );
        assert_eq!(
            state.finalized_checkpoint(),
            Checkpoint {
                epoch: Epoch::new(2),
                root: root(16)
            },
            "epoch 2 should be finalized by the 1st/2nd rule"
        );
    }

    #[test]
    fn minority_does_not_justify() {
        let mut state = genesis();
        advance(&mut state, 32, &[0, 1]);

        assert_eq!(state.current_justified_checkpoint(), Checkpoint::default());
        assert_eq!(state.finalized_checkpoint(), Checkpoint::default());
    }

    #[test]
    fn unrealized_checkpoints_do_not_mutate_state() {
        let mut state = genesis();
        advance(&mut state, 20, &[0, 1, 2, 3]);
        for i in 0..4 {
            state
                .mark_current_epoch_target_attester(i)
                .expect("validator should exist");
        }
        state.latest_block_root = root(20);
        state.slot = Slot::new(21);
        state
            .set_block_root(Slot::new(20), root(20))
            .expect("should set root");

        let before = state.clone();
        let unrealized =
            process_justification_and_finalization(&state).expect("should weigh justification");

        assert_eq!(state, before, "state is left untouched");
        assert_eq!(
            unrealized.current_justified_checkpoint(),
            Checkpoint {
                epoch: Epoch::new(2),
                root: root(16)
            },
            "mid-epoch participation already justifies the current epoch"
        );
    }
}
