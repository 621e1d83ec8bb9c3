use crate::consts::{JUSTIFICATION_BITS_LENGTH, TIMELY_TARGET_FLAG_INDEX};
use crate::{Checkpoint, Epoch, EthSpec, FixedBytesExtended, Hash256, Slot};
use safe_arith::{ArithError, SafeArith};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

pub const FAR_FUTURE_EPOCH: Epoch = Epoch::max_value();

#[derive(Debug, PartialEq, Clone)]
pub enum Error {
    SlotOutOfBounds,
    EpochOutOfBounds,
    UnknownValidator(usize),
    ParticipationOutOfBounds(usize),
    ArithError(ArithError),
}

impl From<ArithError> for Error {
    fn from(e: ArithError) -> Self {
        Error::ArithError(e)
    }
}

/// Information about a validator that is relevant to fork choice weighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub effective_balance: u64,
    pub slashed: bool,
    pub activation_epoch: Epoch,
    pub exit_epoch: Epoch,
}

impl Validator {
    /// A validator that is active from genesis and never exits.
    pub fn active_from_genesis(effective_balance: u64) -> Self {
        Self {
            effective_balance,
            slashed: false,
            activation_epoch: Epoch::new(0),
            exit_epoch: FAR_FUTURE_EPOCH,
        }
    }

    /// Returns `true` if the validator is considered active at some epoch.
    pub fn is_active_at(&self, epoch: Epoch) -> bool {
        self.activation_epoch <= epoch && epoch < self.exit_epoch
    }
}

/// A bitfield of the duties a validator performed correctly during an epoch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipationFlags(u8);

impl ParticipationFlags {
    pub fn add_flag(&mut self, flag_index: usize) -> Result<(), ArithError> {
        let mask = 1u8.checked_shl(flag_index as u32).ok_or(ArithError::Overflow)?;
        self.0 |= mask;
        Ok(())
    }

    pub fn has_flag(&self, flag_index: usize) -> Result<bool, ArithError> {
        let mask = 1u8.checked_shl(flag_index as u32).ok_or(ArithError::Overflow)?;
        Ok(self.0 & mask == mask)
    }

    pub fn timely_target() -> Self {
        Self(1 << TIMELY_TARGET_FLAG_INDEX)
    }
}

/// The subset of the beacon state which fork choice reads.
///
/// `block_roots` is a circular buffer of `E::slots_per_historical_root()` entries, indexed by
/// `slot % len`, exactly as the full state stores it.
#[derive(Debug, Clone, PartialEq)]
pub struct BeaconState<E: EthSpec> {
    pub slot: Slot,
    /// Root of the most recent block applied to this state.
    pub latest_block_root: Hash256,
    pub block_roots: Vec<Hash256>,
    pub validators: Vec<Validator>,
    pub previous_epoch_participation: Vec<ParticipationFlags>,
    pub current_epoch_participation: Vec<ParticipationFlags>,
    pub justification_bits: [bool; JUSTIFICATION_BITS_LENGTH],
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    _phantom: PhantomData<E>,
}

impl<E: EthSpec> BeaconState<E> {
    /// A state at genesis with the given validator set and all roots zeroed.
    pub fn genesis(validators: Vec<Validator>) -> Self {
        let validator_count = validators.len();
        Self {
            slot: Slot::new(0),
            latest_block_root: Hash256::zero(),
            block_roots: vec![Hash256::zero(); E::slots_per_historical_root()],
            validators,
            previous_epoch_participation: vec![ParticipationFlags::default(); validator_count],
            current_epoch_participation: vec![ParticipationFlags::default(); validator_count],
            justification_bits: [false; JUSTIFICATION_BITS_LENGTH],
            previous_justified_checkpoint: Checkpoint::default(),
            current_justified_checkpoint: Checkpoint::default(),
            finalized_checkpoint: Checkpoint::default(),
            _phantom: PhantomData,
        }
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn current_epoch(&self) -> Epoch {
        self.slot.epoch(E::slots_per_epoch())
    }

    /// The epoch prior to `self.current_epoch()`, or genesis if the current epoch is genesis.
    pub fn previous_epoch(&self) -> Epoch {
        let current_epoch = self.current_epoch();
        if current_epoch > E::genesis_epoch() {
            current_epoch - 1
        } else {
            current_epoch
        }
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    pub fn current_justified_checkpoint(&self) -> Checkpoint {
        self.current_justified_checkpoint
    }

    pub fn previous_justified_checkpoint(&self) -> Checkpoint {
        self.previous_justified_checkpoint
    }

    pub fn finalized_checkpoint(&self) -> Checkpoint {
        self.finalized_checkpoint
    }

    fn get_latest_block_roots_index(&self, slot: Slot) -> Result<usize, Error> {
        let len = self.block_roots.len();
        if slot < self.slot && self.slot <= slot.safe_add(len as u64)? {
            Ok(slot.as_usize().safe_rem(len)?)
        } else {
            Err(Error::SlotOutOfBounds)
        }
    }

    /// Return the block root at a recent `slot`.
    ///
    /// The slot must be strictly before the state's slot and within the historical root window.
    pub fn get_block_root(&self, slot: Slot) -> Result<&Hash256, Error> {
        let index = self.get_latest_block_roots_index(slot)?;
        self.block_roots.get(index).ok_or(Error::SlotOutOfBounds)
    }

    /// Return the block root at the start of a recent `epoch`.
    pub fn get_block_root_at_epoch(&self, epoch: Epoch) -> Result<&Hash256, Error> {
        self.get_block_root(epoch.start_slot(E::slots_per_epoch()))
            .map_err(|_| Error::EpochOutOfBounds)
    }

    /// Sets the block root for some given slot.
    pub fn set_block_root(&mut self, slot: Slot, block_root: Hash256) -> Result<(), Error> {
        let len = self.block_roots.len();
        let index = slot.as_usize().safe_rem(len)?;
        *self.block_roots.get_mut(index).ok_or(Error::SlotOutOfBounds)? = block_root;
        Ok(())
    }

    /// Total effective balance of all validators active at `epoch`, with a floor of one
    /// increment so that it may always be used as a divisor.
    pub fn get_total_active_balance_at_epoch(&self, epoch: Epoch) -> Result<u64, Error> {
        let mut total = 0u64;
        for validator in self.validators.iter().filter(|v| v.is_active_at(epoch)) {
            total.safe_add_assign(validator.effective_balance)?;
        }
        Ok(total.max(1))
    }

    pub fn get_total_active_balance(&self) -> Result<u64, Error> {
        self.get_total_active_balance_at_epoch(self.current_epoch())
    }

    /// Sum of effective balances of unslashed validators, active at `epoch`, whose participation
    /// flags in `participation` include the timely-target flag.
    pub fn get_target_attesting_balance(
        &self,
        epoch: Epoch,
        participation: &[ParticipationFlags],
    ) -> Result<u64, Error> {
        let mut total = 0u64;
        for (index, validator) in self.validators.iter().enumerate() {
            if validator.slashed || !validator.is_active_at(epoch) {
                continue;
            }
            let flags = participation
                .get(index)
                .ok_or(Error::ParticipationOutOfBounds(index))?;
            if flags.has_flag(TIMELY_TARGET_FLAG_INDEX)? {
                total.safe_add_assign(validator.effective_balance)?;
            }
        }
        Ok(total.max(1))
    }

    pub fn previous_epoch_target_attesting_balance(&self) -> Result<u64, Error> {
        self.get_target_attesting_balance(self.previous_epoch(), &self.previous_epoch_participation)
    }

    pub fn current_epoch_target_attesting_balance(&self) -> Result<u64, Error> {
        self.get_target_attesting_balance(self.current_epoch(), &self.current_epoch_participation)
    }

    /// Mark the validator at `validator_index` as having attested to the correct target in the
    /// current epoch.
    pub fn mark_current_epoch_target_attester(&mut self, validator_index: usize) -> Result<(), Error> {
        self.current_epoch_participation
            .get_mut(validator_index)
            .ok_or(Error::UnknownValidator(validator_index))?
            .add_flag(TIMELY_TARGET_FLAG_INDEX)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MinimalEthSpec;

    type E = MinimalEthSpec;

    fn state_at(slot: u64) -> BeaconState<E> {
        let mut state = BeaconState::<E>::genesis(vec![Validator::active_from_genesis(32); 4]);
        for s in 0..slot {
            state
                .set_block_root(Slot::new(s), Hash256::from_low_u64_be(s + 1))
                .expect("should set root");
        }
        state.slot = Slot::new(slot);
        state
    }

    #[test]
    fn block_root_bounds() {
        let state = state_at(10);

        assert_eq!(
            state.get_block_root(Slot::new(10)),
            Err(Error::SlotOutOfBounds),
            "current slot is not yet known"
        );
        assert_eq!(
            state.get_block_root(Slot::new(9)),
            Ok(&Hash256::from_low_u64_be(10))
        );
        assert_eq!(
            state.get_block_root_at_epoch(Epoch::new(1)),
            Ok(&Hash256::from_low_u64_be(9))
        );

        let late = state_at(E::slots_per_historical_root() as u64 + 5);
        assert_eq!(late.get_block_root(Slot::new(4)), Err(Error::SlotOutOfBounds));
        assert!(late.get_block_root(Slot::new(5)).is_ok());
    }

    #[test]
    fn target_attesting_balance() {
        let mut state = state_at(3);
        state.validators[2].slashed = true;
        for i in 0..3 {
            state
                .mark_current_epoch_target_attester(i)
                .expect("validator is known");
        }

        assert_eq!(
            state.current_epoch_target_attesting_balance(),
            Ok(64),
            "slashed validators should not count"
        );
        assert_eq!(
            state.previous_epoch_target_attesting_balance(),
            Ok(1),
            "empty participation floors at one"
        );
        assert_eq!(state.get_total_active_balance(), Ok(128));
        assert_eq!(
            state.mark_current_epoch_target_attester(4),
            Err(Error::UnknownValidator(4))
        );
    }

    #[test]
    fn activity() {
        let validator = Validator {
            effective_balance: 1,
            slashed: false,
            activation_epoch: Epoch::new(2),
            exit_epoch: Epoch::new(4),
        };
        assert!(!validator.is_active_at(Epoch::new(1)));
        assert!(validator.is_active_at(Epoch::new(2)));
        assert!(validator.is_active_at(Epoch::new(3)));
        assert!(!validator.is_active_at(Epoch::new(4)));
    }
}
