use proto_array::JustifiedBalances;
use std::collections::BTreeSet;
use std::fmt::Debug;
use types::{BeaconBlock, BeaconState, Checkpoint, EthSpec, Hash256, Slot};

/// The clock, checkpoints and proposer boost that `ForkChoice` reads and writes.
///
/// Blocks and votes live in `ProtoArrayForkChoice`, not here. Time is counted in slots.
///
/// ## Balances
///
/// Every justified checkpoint held by the store carries the `JustifiedBalances` it was set with.
/// The store never reads a database; whenever fork choice needs balances for a new checkpoint it
/// asks `Self::compute_justified_balances`, which must always produce *some* balances.
pub trait ForkChoiceStore<E: EthSpec>: Sized {
    type Error: Debug + Clone + PartialEq;

    /// Returns the last value passed to `Self::set_current_slot`.
    fn get_current_slot(&self) -> Slot;

    /// Set the value to be returned by `Self::get_current_slot`.
    ///
    /// ## Notes
    ///
    /// This should only ever be called from within `ForkChoice::on_tick`.
    fn set_current_slot(&mut self, slot: Slot);

    /// Called whenever `ForkChoice::on_block` has verified a block, but not yet added it to fork
    /// choice. Allows the implementer to perform caching or other housekeeping duties.
    fn on_verified_block(
        &mut self,
        block: &BeaconBlock,
        block_root: Hash256,
        state: &BeaconState<E>,
    ) -> Result<(), Self::Error>;

    /// Returns the `justified_checkpoint`.
    fn justified_checkpoint(&self) -> &Checkpoint;

    /// Returns balances from the `state` identified by `justified_checkpoint.root`.
    fn justified_balances(&self) -> &JustifiedBalances;

    /// Returns the `finalized_checkpoint`.
    fn finalized_checkpoint(&self) -> &Checkpoint;

    /// Returns the `unrealized_justified_checkpoint`.
    fn unrealized_justified_checkpoint(&self) -> &Checkpoint;

    /// Returns the balances that accompany `unrealized_justified_checkpoint`.
    fn unrealized_justified_balances(&self) -> &JustifiedBalances;

    /// Returns the `unrealized_finalized_checkpoint`.
    fn unrealized_finalized_checkpoint(&self) -> &Checkpoint;

    /// Returns the `proposer_boost_root`.
    fn proposer_boost_root(&self) -> Hash256;

    /// Sets `finalized_checkpoint`.
    fn set_finalized_checkpoint(&mut self, checkpoint: Checkpoint);

    /// Sets the `justified_checkpoint` along with its balances.
    fn set_justified_checkpoint(&mut self, checkpoint: Checkpoint, balances: JustifiedBalances);

    /// Sets the `unrealized_justified_checkpoint` along with its balances.
    fn set_unrealized_justified_checkpoint(
        &mut self,
        checkpoint: Checkpoint,
        balances: JustifiedBalances,
    );

    /// Sets the `unrealized_finalized_checkpoint`.
    fn set_unrealized_finalized_checkpoint(&mut self, checkpoint: Checkpoint);

    /// Sets the proposer boost root.
    fn set_proposer_boost_root(&mut self, proposer_boost_root: Hash256);

    /// Returns the balances of the state justified by `checkpoint`, using `state` (the post-state
    /// of the block which declared `checkpoint`) when nothing closer is available.
    fn compute_justified_balances(
        &self,
        checkpoint: &Checkpoint,
        state: &BeaconState<E>,
    ) -> Result<JustifiedBalances, Self::Error>;

    /// Gets the equivocating indices.
    fn equivocating_indices(&self) -> &BTreeSet<u64>;

    /// Adds to the set of equivocating indices.
    fn extend_equivocating_indices(&mut self, indices: impl IntoIterator<Item = u64>);

    /// Called after fork choice pruned every block before the finalized block at
    /// `finalized_slot`. Stores that cache per-block data drop it here.
    fn prune(&mut self, _finalized_slot: Slot) {}
}
