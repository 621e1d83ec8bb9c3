//! The subset of the state transition that fork choice needs: advancing a state through empty
//! slots and weighing justification and finalization at epoch boundaries.

pub mod per_epoch_processing;
pub mod per_slot_processing;

pub use per_epoch_processing::{
    JustificationAndFinalizationState, errors::EpochProcessingError,
    process_justification_and_finalization, weigh_justification_and_finalization,
};
pub use per_slot_processing::{Error as SlotProcessingError, per_slot_processing, process_slots};
