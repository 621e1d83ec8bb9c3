//! Providers of the effective balances that weigh votes for a justified checkpoint.
//!
//! Fork choice never reads a database itself. When the justified checkpoint changes it asks a
//! `JustifiedBalancesProvider` for the balances of the checkpoint state, and that request must
//! never fail: when the exact state is unavailable the provider answers from the closest state on
//! the checkpoint's branch.

use crate::metrics;
use proto_array::JustifiedBalances;
use std::collections::HashMap;
use tracing::{error, warn};
use types::{BeaconState, Checkpoint, Epoch, EthSpec, Hash256, Slot};

/// Supplies the balances of the state justified by some checkpoint.
pub trait JustifiedBalancesProvider<E: EthSpec> {
    /// Returns the balances of the state justified by `checkpoint`.
    ///
    /// `block_state` is the post-state of the block which declared `checkpoint` and is the last
    /// resort when no closer state is known.
    fn justified_balances(
        &self,
        checkpoint: &Checkpoint,
        block_state: &BeaconState<E>,
    ) -> JustifiedBalances;

    /// Called for every block that fork choice is about to import.
    fn on_verified_block(
        &mut self,
        _block_root: Hash256,
        _parent_root: Hash256,
        _state: &BeaconState<E>,
    ) {
    }

    /// Called once fork choice has pruned every block before the finalized block at
    /// `finalized_slot`.
    fn prune(&mut self, _finalized_slot: Slot) {}
}

/// Always reads balances from the state of the block that declared the checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockStateBalancesProvider;

impl<E: EthSpec> JustifiedBalancesProvider<E> for BlockStateBalancesProvider {
    fn justified_balances(
        &self,
        checkpoint: &Checkpoint,
        block_state: &BeaconState<E>,
    ) -> JustifiedBalances {
        balances_from_state(checkpoint, block_state)
    }
}

/// The state used to answer a balances request, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BalancesStateTier {
    /// The state at the first slot of the checkpoint epoch, on the checkpoint's branch.
    CheckpointState,
    /// The block state is itself in the checkpoint epoch.
    BlockStateSameEpoch,
    /// A state of a descendant of the checkpoint block, in the checkpoint epoch.
    DescendantStateSameEpoch,
    /// The block state is in the epoch after the checkpoint epoch.
    BlockStateNextEpoch,
    /// A state of a descendant of the checkpoint block, in any later epoch.
    DescendantStateLatterEpoch,
    /// The block state, whatever its epoch.
    BlockStateAnyEpoch,
}

impl BalancesStateTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalancesStateTier::CheckpointState => "checkpoint_state",
            BalancesStateTier::BlockStateSameEpoch => "block_state_same_epoch",
            BalancesStateTier::DescendantStateSameEpoch => "descendant_state_same_epoch",
            BalancesStateTier::BlockStateNextEpoch => "block_state_next_epoch",
            BalancesStateTier::DescendantStateLatterEpoch => "descendant_state_latter_epoch",
            BalancesStateTier::BlockStateAnyEpoch => "block_state_any_epoch",
        }
    }
}

/// Some cache of recent states that a `StateFallbackBalancesProvider` can search.
pub trait BalancesStateSource<E: EthSpec> {
    /// The state advanced to the first slot of `checkpoint.epoch`, if cached.
    fn checkpoint_state(&self, checkpoint: &Checkpoint) -> Option<&BeaconState<E>>;

    /// Cached post-states of the strict descendants of `block_root`, ordered by slot.
    fn descendant_states(&self, block_root: &Hash256) -> Vec<&BeaconState<E>>;

    /// Record the post-state of a block that is about to be imported.
    fn on_verified_block(
        &mut self,
        block_root: Hash256,
        parent_root: Hash256,
        state: &BeaconState<E>,
    );

    /// Drop every block state before `finalized_slot` and every checkpoint state before
    /// `finalized_epoch`.
    fn prune(&mut self, finalized_slot: Slot, finalized_epoch: Epoch);
}

/// Answers balances requests from the closest available state to the checkpoint.
///
/// The tiers are tried in the order of `BalancesStateTier`. Every request that misses the
/// checkpoint state is logged and counted per tier.
#[derive(Debug, Clone, Default)]
pub struct StateFallbackBalancesProvider<S> {
    source: S,
}

impl<S> StateFallbackBalancesProvider<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Select the state closest to `checkpoint`, along with the tier it was found in.
    pub fn closest_state<'a, E>(
        &'a self,
        checkpoint: &Checkpoint,
        block_state: &'a BeaconState<E>,
    ) -> (&'a BeaconState<E>, BalancesStateTier)
    where
        E: EthSpec,
        S: BalancesStateSource<E>,
    {
        if let Some(state) = self.source.checkpoint_state(checkpoint) {
            return (state, BalancesStateTier::CheckpointState);
        }

        let block_state_epoch = block_state.current_epoch();
        if block_state_epoch == checkpoint.epoch {
            return (block_state, BalancesStateTier::BlockStateSameEpoch);
        }

        let descendants = self.source.descendant_states(&checkpoint.root);
        if let Some(state) = descendants
            .iter()
            .copied()
            .find(|state| state.current_epoch() == checkpoint.epoch)
        {
            return (state, BalancesStateTier::DescendantStateSameEpoch);
        }

        if block_state_epoch == checkpoint.epoch + 1 {
            return (block_state, BalancesStateTier::BlockStateNextEpoch);
        }

        if let Some(state) = descendants
            .iter()
            .copied()
            .find(|state| state.current_epoch() > checkpoint.epoch)
        {
            return (state, BalancesStateTier::DescendantStateLatterEpoch);
        }

        (block_state, BalancesStateTier::BlockStateAnyEpoch)
    }
}

impl<E, S> JustifiedBalancesProvider<E> for StateFallbackBalancesProvider<S>
where
    E: EthSpec,
    S: BalancesStateSource<E>,
{
    fn justified_balances(
        &self,
        checkpoint: &Checkpoint,
        block_state: &BeaconState<E>,
    ) -> JustifiedBalances {
        let (state, tier) = self.closest_state(checkpoint, block_state);

        if tier != BalancesStateTier::CheckpointState {
            metrics::inc_counter_vec(
                &metrics::FORK_CHOICE_BALANCES_CACHE_MISSES,
                &[tier.as_str()],
            );
            warn!(
                checkpoint_epoch = %checkpoint.epoch,
                checkpoint_root = ?checkpoint.root,
                tier = tier.as_str(),
                state_slot = %state.slot(),
                "Using closest state for justified balances"
            );
        }

        balances_from_state(checkpoint, state)
    }

    fn on_verified_block(
        &mut self,
        block_root: Hash256,
        parent_root: Hash256,
        state: &BeaconState<E>,
    ) {
        self.source.on_verified_block(block_root, parent_root, state)
    }

    fn prune(&mut self, finalized_slot: Slot) {
        self.source
            .prune(finalized_slot, finalized_slot.epoch(E::slots_per_epoch()))
    }
}

fn balances_from_state<E: EthSpec>(
    checkpoint: &Checkpoint,
    state: &BeaconState<E>,
) -> JustifiedBalances {
    JustifiedBalances::from_justified_state(state).unwrap_or_else(|e| {
        error!(
            error = ?e,
            epoch = %checkpoint.epoch,
            root = ?checkpoint.root,
            "Unable to sum justified balances"
        );
        JustifiedBalances::default()
    })
}

/// Keeps the post-state of every imported block in memory, plus the state of each block that
/// sits on an epoch boundary as the checkpoint state for that epoch.
///
/// Nothing is evicted until `BalancesStateSource::prune` is called.
#[derive(Debug, Clone)]
pub struct InMemoryStateSource<E: EthSpec> {
    block_states: HashMap<Hash256, BeaconState<E>>,
    children: HashMap<Hash256, Vec<Hash256>>,
    checkpoint_states: HashMap<Checkpoint, BeaconState<E>>,
}

impl<E: EthSpec> Default for InMemoryStateSource<E> {
    fn default() -> Self {
        Self {
            block_states: HashMap::new(),
            children: HashMap::new(),
            checkpoint_states: HashMap::new(),
        }
    }
}

impl<E: EthSpec> InMemoryStateSource<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache `state` as the checkpoint state of `checkpoint`.
    pub fn insert_checkpoint_state(&mut self, checkpoint: Checkpoint, state: BeaconState<E>) {
        self.checkpoint_states.insert(checkpoint, state);
    }

    pub fn block_state(&self, block_root: &Hash256) -> Option<&BeaconState<E>> {
        self.block_states.get(block_root)
    }

    pub fn num_block_states(&self) -> usize {
        self.block_states.len()
    }

    pub fn num_checkpoint_states(&self) -> usize {
        self.checkpoint_states.len()
    }
}

impl<E: EthSpec> BalancesStateSource<E> for InMemoryStateSource<E> {
    fn checkpoint_state(&self, checkpoint: &Checkpoint) -> Option<&BeaconState<E>> {
        self.checkpoint_states.get(checkpoint)
    }

    fn descendant_states(&self, block_root: &Hash256) -> Vec<&BeaconState<E>> {
        let mut states = vec![];
        let mut stack = self.children.get(block_root).cloned().unwrap_or_default();

        while let Some(root) = stack.pop() {
            if let Some(state) = self.block_states.get(&root) {
                states.push(state);
            }
            if let Some(children) = self.children.get(&root) {
                stack.extend(children.iter().copied());
            }
        }

        states.sort_by_key(|state| state.slot());
        states
    }

    fn on_verified_block(
        &mut self,
        block_root: Hash256,
        parent_root: Hash256,
        state: &BeaconState<E>,
    ) {
        if state.slot() % E::slots_per_epoch() == 0 {
            let checkpoint = Checkpoint {
                epoch: state.current_epoch(),
                root: block_root,
            };
            self.checkpoint_states.insert(checkpoint, state.clone());
        }

        if self.block_states.insert(block_root, state.clone()).is_none() {
            self.children.entry(parent_root).or_default().push(block_root);
        }
    }

    fn prune(&mut self, finalized_slot: Slot, finalized_epoch: Epoch) {
        self.block_states
            .retain(|_, state| state.slot() >= finalized_slot);
        self.checkpoint_states
            .retain(|checkpoint, _| checkpoint.epoch >= finalized_epoch);

        let block_states = &self.block_states;
        self.children
            .retain(|parent_root, _| block_states.contains_key(parent_root));
        for children in self.children.values_mut() {
            children.retain(|child| block_states.contains_key(child));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use types::{FixedBytesExtended, MinimalEthSpec, Validator};

    type E = MinimalEthSpec;

    fn root(i: u64) -> Hash256 {
        Hash256::from_low_u64_be(i)
    }

    /// A state at `slot` whose validator set size identifies it.
    fn state(slot: u64, validator_count: usize) -> BeaconState<E> {
        let validators = vec![Validator::active_from_genesis(32); validator_count];
        let mut state = BeaconState::genesis(validators);
        state.slot = Slot::new(slot);
        state
    }

    fn checkpoint(epoch: u64, root_index: u64) -> Checkpoint {
        Checkpoint {
            epoch: Epoch::new(epoch),
            root: root(root_index),
        }
    }

    /// Records the level and `tier` field of every event.
    #[derive(Clone, Default)]
    struct EventLog(Arc<Mutex<Vec<(Level, Option<String>)>>>);

    impl<S: Subscriber> Layer<S> for EventLog {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut visitor = TierVisitor::default();
            event.record(&mut visitor);
            self.0.lock().push((*event.metadata().level(), visitor.0));
        }
    }

    #[derive(Default)]
    struct TierVisitor(Option<String>);

    impl Visit for TierVisitor {
        fn record_str(&mut self, field: &Field, value: &str) {
            if field.name() == "tier" {
                self.0 = Some(value.to_string());
            }
        }

        fn record_debug(&mut self, _field: &Field, _value: &dyn std::fmt::Debug) {}
    }

    #[test]
    fn tier_names() {
        assert_eq!(
            BalancesStateTier::DescendantStateLatterEpoch.as_str(),
            "descendant_state_latter_epoch"
        );
        assert_eq!(BalancesStateTier::CheckpointState.as_str(), "checkpoint_state");
    }

    #[test]
    fn checkpoint_state_is_preferred() {
        let mut source = InMemoryStateSource::<E>::new();
        source.on_verified_block(root(1), root(0), &state(8, 2));
        let provider = StateFallbackBalancesProvider::new(source);

        let block_state = state(9, 5);
        let (selected, tier) = provider.closest_state(&checkpoint(1, 1), &block_state);
        assert_eq!(tier, BalancesStateTier::CheckpointState);
        assert_eq!(selected.validators().len(), 2);

        let balances = provider.justified_balances(&checkpoint(1, 1), &block_state);
        assert_eq!(balances.total_effective_balance, 64);
    }

    #[test]
    fn checkpoint_state_miss_is_logged_once_with_its_tier() {
        let mut source = InMemoryStateSource::<E>::new();
        source.on_verified_block(root(1), root(0), &state(8, 2));
        let provider = StateFallbackBalancesProvider::new(source);
        let log = EventLog::default();

        tracing::subscriber::with_default(tracing_subscriber::registry().with(log.clone()), || {
            provider.justified_balances(&checkpoint(1, 1), &state(9, 5));
            provider.justified_balances(&checkpoint(1, 2), &state(10, 3));
        });

        assert_eq!(
            *log.0.lock(),
            vec![(Level::WARN, Some("block_state_same_epoch".to_string()))],
            "a hit is silent and a miss is a single event"
        );
    }

    #[test]
    fn block_state_in_same_epoch() {
        let provider = StateFallbackBalancesProvider::new(InMemoryStateSource::<E>::new());
        let block_state = state(10, 3);

        let (_, tier) = provider.closest_state(&checkpoint(1, 1), &block_state);
        assert_eq!(tier, BalancesStateTier::BlockStateSameEpoch);
    }

    #[test]
    fn descendant_states_are_searched_before_later_block_states() {
        let mut source = InMemoryStateSource::<E>::new();
        // 1 (slot 7) <- 2 (slot 9) <- 3 (slot 17)
        source.on_verified_block(root(1), root(0), &state(7, 1));
        source.on_verified_block(root(2), root(1), &state(9, 2));
        source.on_verified_block(root(3), root(2), &state(17, 3));
        let provider = StateFallbackBalancesProvider::new(source);

        let block_state = state(30, 4);
        let (selected, tier) = provider.closest_state(&checkpoint(1, 1), &block_state);
        assert_eq!(tier, BalancesStateTier::DescendantStateSameEpoch);
        assert_eq!(selected.validators().len(), 2, "the epoch 1 descendant is used");

        let (selected, tier) = provider.closest_state(&checkpoint(1, 2), &block_state);
        assert_eq!(tier, BalancesStateTier::DescendantStateLatterEpoch);
        assert_eq!(selected.validators().len(), 3);
    }

    #[test]
    fn next_epoch_block_state_precedes_latter_descendants() {
        let mut source = InMemoryStateSource::<E>::new();
        source.on_verified_block(root(1), root(0), &state(7, 1));
        source.on_verified_block(root(2), root(1), &state(25, 2));
        let provider = StateFallbackBalancesProvider::new(source);

        let block_state = state(17, 4);
        let (selected, tier) = provider.closest_state(&checkpoint(1, 1), &block_state);
        assert_eq!(tier, BalancesStateTier::BlockStateNextEpoch);
        assert_eq!(selected.validators().len(), 4);
    }

    #[test]
    fn falls_back_to_block_state() {
        let provider = StateFallbackBalancesProvider::new(InMemoryStateSource::<E>::new());
        let block_state = state(40, 4);

        let (selected, tier) = provider.closest_state(&checkpoint(1, 1), &block_state);
        assert_eq!(tier, BalancesStateTier::BlockStateAnyEpoch);
        assert_eq!(selected, &block_state);
        assert_eq!(
            provider
                .justified_balances(&checkpoint(1, 1), &block_state)
                .num_active_validators,
            4
        );
    }

    #[test]
    fn prune_drops_old_states() {
        let mut source = InMemoryStateSource::<E>::new();
        source.on_verified_block(root(1), root(0), &state(8, 1));
        source.on_verified_block(root(2), root(1), &state(12, 1));
        source.on_verified_block(root(3), root(2), &state(16, 1));
        assert_eq!(source.num_block_states(), 3);
        assert_eq!(source.num_checkpoint_states(), 2);

        source.prune(Slot::new(12), Epoch::new(2));

        assert_eq!(source.num_block_states(), 2);
        assert_eq!(source.num_checkpoint_states(), 1);
        assert!(source.block_state(&root(1)).is_none());
        assert_eq!(source.descendant_states(&root(2)).len(), 1);
    }

    #[test]
    fn provider_prunes_states_before_the_finalized_block() {
        let mut source = InMemoryStateSource::<E>::new();
        source.on_verified_block(root(1), root(0), &state(8, 1));
        source.on_verified_block(root(2), root(1), &state(16, 1));
        source.on_verified_block(root(3), root(2), &state(20, 1));
        let mut provider = StateFallbackBalancesProvider::new(source);

        JustifiedBalancesProvider::<E>::prune(&mut provider, Slot::new(16));

        assert_eq!(provider.source().num_block_states(), 2);
        assert_eq!(provider.source().num_checkpoint_states(), 1);
        assert!(provider.source().block_state(&root(1)).is_none());
        assert_eq!(
            provider.closest_state(&checkpoint(2, 2), &state(20, 4)).1,
            BalancesStateTier::CheckpointState
        );
    }

    #[test]
    fn block_state_provider_reads_block_state() {
        let provider = BlockStateBalancesProvider;
        let balances = JustifiedBalancesProvider::<E>::justified_balances(
            &provider,
            &checkpoint(0, 1),
            &state(3, 2),
        );
        assert_eq!(balances.effective_balances, vec![32, 32]);
    }
}
