use crate::per_epoch_processing::{
    errors::EpochProcessingError, process_justification_and_finalization,
};
use safe_arith::{ArithError, SafeArith};
use tracing::instrument;
use types::{BeaconState, BeaconStateError, EthSpec, ParticipationFlags, Slot};

#[derive(Debug, PartialEq, Clone)]
pub enum Error {
    BeaconStateError(BeaconStateError),
    EpochProcessingError(EpochProcessingError),
    ArithError(ArithError),
    /// The state is already past the slot it was asked to advance to.
    StateSlotTooHigh { state_slot: Slot, target_slot: Slot },
}

impl From<ArithError> for Error {
    fn from(e: ArithError) -> Self {
        Self::ArithError(e)
    }
}

impl From<BeaconStateError> for Error {
    fn from(e: BeaconStateError) -> Error {
        Error::BeaconStateError(e)
    }
}

impl From<EpochProcessingError> for Error {
    fn from(e: EpochProcessingError) -> Error {
        Error::EpochProcessingError(e)
    }
}

/// Advances a state forward by one slot, performing per-epoch processing if required.
///
/// The root of the latest block is cached in `block_roots` before the slot is incremented, so a
/// state at slot `n` knows the block roots of every slot before `n`.
pub fn per_slot_processing<E: EthSpec>(state: &mut BeaconState<E>) -> Result<(), Error> {
    let previous_slot = state.slot();
    let latest_block_root = state.latest_block_root;
    state.set_block_root(previous_slot, latest_block_root)?;

    if previous_slot.safe_add(1_u64)?.safe_rem(E::slots_per_epoch())? == 0 {
        process_epoch(state)?;
    }

    state.slot = previous_slot.safe_add(1_u64)?;

    Ok(())
}

/// Advances `state` through empty slots until it reaches `target_slot`.
#[instrument(level = "debug", skip_all, fields(target_slot = %target_slot))]
pub fn process_slots<E: EthSpec>(
    state: &mut BeaconState<E>,
    target_slot: Slot,
) -> Result<(), Error> {
    if state.slot() > target_slot {
        return Err(Error::StateSlotTooHigh {
            state_slot: state.slot(),
            target_slot,
        });
    }

    while state.slot() < target_slot {
        per_slot_processing(state)?;
    }

    Ok(())
}

fn process_epoch<E: EthSpec>(state: &mut BeaconState<E>) -> Result<(), Error> {
    process_justification_and_finalization(state)?.apply_changes_to_state(state);

    // Rotate participation.
    let validator_count = state.validators().len();
    state.previous_epoch_participation = std::mem::replace(
        &mut state.current_epoch_participation,
        vec![ParticipationFlags::default(); validator_count],
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{FixedBytesExtended, Hash256, MinimalEthSpec, Validator};

    type E = MinimalEthSpec;

    #[test]
    fn caches_block_roots() {
        let mut state = BeaconState::<E>::genesis(vec![Validator::active_from_genesis(32)]);
        state.latest_block_root = Hash256::from_low_u64_be(42);

        process_slots(&mut state, Slot::new(3)).expect("should advance");

        assert_eq!(state.slot(), Slot::new(3));
        for slot in 0..3 {
            assert_eq!(
                state.get_block_root(Slot::new(slot)),
                Ok(&Hash256::from_low_u64_be(42)),
                "skipped slots repeat the latest block root"
            );
        }
    }

    #[test]
    fn rotates_participation_at_epoch_end() {
        let mut state = BeaconState::<E>::genesis(vec![Validator::active_from_genesis(32); 2]);
        state
            .mark_current_epoch_target_attester(1)
            .expect("validator should exist");

        process_slots(&mut state, Slot::new(8)).expect("should advance");

        assert_eq!(
            state.previous_epoch_participation[1],
            ParticipationFlags::timely_target()
        );
        assert_eq!(
            state.current_epoch_participation[1],
            ParticipationFlags::default()
        );
    }

    #[test]
    fn refuses_to_rewind() {
        let mut state = BeaconState::<E>::genesis(vec![]);
        process_slots(&mut state, Slot::new(2)).expect("should advance");

        assert_eq!(
            process_slots(&mut state, Slot::new(1)),
            Err(Error::StateSlotTooHigh {
                state_slot: Slot::new(2),
                target_slot: Slot::new(1),
            })
        );
    }
}
