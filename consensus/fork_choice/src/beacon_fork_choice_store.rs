//! Defines the `BeaconForkChoiceStore`, an in-memory implementation of `ForkChoiceStore`.
//!
//! Balances for new justified checkpoints are delegated to a `JustifiedBalancesProvider`.

use crate::ForkChoiceStore;
use crate::balances_provider::JustifiedBalancesProvider;
use proto_array::JustifiedBalances;
use std::collections::BTreeSet;
use std::marker::PhantomData;
use types::{
    ArithError, BeaconBlock, BeaconState, Checkpoint, EthSpec, FixedBytesExtended, Hash256, Slot,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    UnableToComputeAnchorBalances(ArithError),
    AnchorStateMismatch {
        block_slot: Slot,
        state_slot: Slot,
    },
}

/// Holds the fork choice checkpoints, balances and clock in memory.
#[derive(Debug, Clone)]
pub struct BeaconForkChoiceStore<E: EthSpec, P> {
    balances_provider: P,
    time: Slot,
    finalized_checkpoint: Checkpoint,
    justified_checkpoint: Checkpoint,
    justified_balances: JustifiedBalances,
    unrealized_justified_checkpoint: Checkpoint,
    unrealized_justified_balances: JustifiedBalances,
    unrealized_finalized_checkpoint: Checkpoint,
    proposer_boost_root: Hash256,
    equivocating_indices: BTreeSet<u64>,
    _phantom: PhantomData<E>,
}

impl<E, P> BeaconForkChoiceStore<E, P>
where
    E: EthSpec,
    P: JustifiedBalancesProvider<E>,
{
    /// Build a store whose checkpoints all point at the anchor.
    ///
    /// It is assumed that `anchor_block_root` is the root of `anchor_block` and that
    /// `anchor_state` is its post-state, advanced to the first slot of its epoch.
    pub fn get_forkchoice_store(
        anchor_block_root: Hash256,
        anchor_block: &BeaconBlock,
        anchor_state: &BeaconState<E>,
        mut balances_provider: P,
    ) -> Result<Self, Error> {
        if anchor_block.slot() > anchor_state.slot() {
            return Err(Error::AnchorStateMismatch {
                block_slot: anchor_block.slot(),
                state_slot: anchor_state.slot(),
            });
        }

        let anchor_epoch = anchor_state.current_epoch();
        let justified_checkpoint = Checkpoint {
            epoch: anchor_epoch,
            root: anchor_block_root,
        };
        let finalized_checkpoint = justified_checkpoint;
        let justified_balances = JustifiedBalances::from_justified_state(anchor_state)
            .map_err(Error::UnableToComputeAnchorBalances)?;

        balances_provider.on_verified_block(
            anchor_block_root,
            anchor_block.parent_root(),
            anchor_state,
        );

        Ok(Self {
            balances_provider,
            time: anchor_state.slot(),
            finalized_checkpoint,
            justified_checkpoint,
            justified_balances: justified_balances.clone(),
            unrealized_justified_checkpoint: justified_checkpoint,
            unrealized_justified_balances: justified_balances,
            unrealized_finalized_checkpoint: finalized_checkpoint,
            proposer_boost_root: Hash256::zero(),
            equivocating_indices: BTreeSet::new(),
            _phantom: PhantomData,
        })
    }

    pub fn balances_provider(&self) -> &P {
        &self.balances_provider
    }

    pub fn balances_provider_mut(&mut self) -> &mut P {
        &mut self.balances_provider
    }
}

impl<E, P> ForkChoiceStore<E> for BeaconForkChoiceStore<E, P>
where
    E: EthSpec,
    P: JustifiedBalancesProvider<E>,
{
    type Error = Error;

    fn get_current_slot(&self) -> Slot {
        self.time
    }

    fn set_current_slot(&mut self, slot: Slot) {
        self.time = slot
    }

    fn on_verified_block(
        &mut self,
        block: &BeaconBlock,
        block_root: Hash256,
        state: &BeaconState<E>,
    ) -> Result<(), Self::Error> {
        self.balances_provider
            .on_verified_block(block_root, block.parent_root(), state);
        Ok(())
    }

    fn justified_checkpoint(&self) -> &Checkpoint {
        &self.justified_checkpoint
    }

    fn justified_balances(&self) -> &JustifiedBalances {
        &self.justified_balances
    }

    fn finalized_checkpoint(&self) -> &Checkpoint {
        &self.finalized_checkpoint
    }

    fn unrealized_justified_checkpoint(&self) -> &Checkpoint {
        &self.unrealized_justified_checkpoint
    }

    fn unrealized_justified_balances(&self) -> &JustifiedBalances {
        &self.unrealized_justified_balances
    }

    fn unrealized_finalized_checkpoint(&self) -> &Checkpoint {
        &self.unrealized_finalized_checkpoint
    }

    fn proposer_boost_root(&self) -> Hash256 {
        self.proposer_boost_root
    }

    fn set_finalized_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.finalized_checkpoint = checkpoint
    }

    fn set_justified_checkpoint(&mut self, checkpoint: Checkpoint, balances: JustifiedBalances) {
        self.justified_checkpoint = checkpoint;
        self.justified_balances = balances;
    }

    fn set_unrealized_justified_checkpoint(
        &mut self,
        checkpoint: Checkpoint,
        balances: JustifiedBalances,
    ) {
        self.unrealized_justified_checkpoint = checkpoint;
        self.unrealized_justified_balances = balances;
    }

    fn set_unrealized_finalized_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.unrealized_finalized_checkpoint = checkpoint;
    }

    fn set_proposer_boost_root(&mut self, proposer_boost_root: Hash256) {
        self.proposer_boost_root = proposer_boost_root;
    }

    fn compute_justified_balances(
        &self,
        checkpoint: &Checkpoint,
        state: &BeaconState<E>,
    ) -> Result<JustifiedBalances, Self::Error> {
        Ok(self.balances_provider.justified_balances(checkpoint, state))
    }

    fn equivocating_indices(&self) -> &BTreeSet<u64> {
        &self.equivocating_indices
    }

    fn extend_equivocating_indices(&mut self, indices: impl IntoIterator<Item = u64>) {
        self.equivocating_indices.extend(indices);
    }

    fn prune(&mut self, finalized_slot: Slot) {
        self.balances_provider.prune(finalized_slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balances_provider::BlockStateBalancesProvider;
    use types::{MinimalEthSpec, Validator};

    type E = MinimalEthSpec;

    fn anchor_state(slot: u64) -> BeaconState<E> {
        let mut state = BeaconState::genesis(vec![Validator::active_from_genesis(32); 3]);
        state.slot = Slot::new(slot);
        state
    }

    #[test]
    fn anchor_checkpoints() {
        let anchor_root = Hash256::repeat_byte(7);
        let block = BeaconBlock::empty(Slot::new(16), Hash256::repeat_byte(6));
        let store = BeaconForkChoiceStore::get_forkchoice_store(
            anchor_root,
            &block,
            &anchor_state(16),
            BlockStateBalancesProvider,
        )
        .expect("should build store");

        let expected = Checkpoint {
            epoch: types::Epoch::new(2),
            root: anchor_root,
        };
        assert_eq!(store.justified_checkpoint(), &expected);
        assert_eq!(store.finalized_checkpoint(), &expected);
        assert_eq!(store.unrealized_justified_checkpoint(), &expected);
        assert_eq!(store.unrealized_finalized_checkpoint(), &expected);
        assert_eq!(store.get_current_slot(), Slot::new(16));
        assert_eq!(store.justified_balances().total_effective_balance, 96);
        assert!(store.proposer_boost_root().is_zero());
    }

    #[test]
    fn anchor_block_after_state_is_rejected() {
        let block = BeaconBlock::empty(Slot::new(17), Hash256::zero());
        let result = BeaconForkChoiceStore::get_forkchoice_store(
            Hash256::repeat_byte(1),
            &block,
            &anchor_state(16),
            BlockStateBalancesProvider,
        );
        assert_eq!(
            result.map(|_| ()),
            Err(Error::AnchorStateMismatch {
                block_slot: Slot::new(17),
                state_slot: Slot::new(16),
            })
        );
    }

    #[test]
    fn equivocating_indices_accumulate() {
        let block = BeaconBlock::empty(Slot::new(0), Hash256::zero());
        let mut store = BeaconForkChoiceStore::get_forkchoice_store(
            Hash256::repeat_byte(1),
            &block,
            &anchor_state(0),
            BlockStateBalancesProvider,
        )
        .expect("should build store");

        store.extend_equivocating_indices([3, 1]);
        store.extend_equivocating_indices([1, 2]);
        assert_eq!(
            store.equivocating_indices().iter().copied().collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }
}
