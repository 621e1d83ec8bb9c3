use types::{ArithError, BeaconStateError};

#[derive(Debug, PartialEq, Clone)]
pub enum EpochProcessingError {
    BeaconStateError(BeaconStateError),
    ArithError(ArithError),
}

impl From<BeaconStateError> for EpochProcessingError {
    fn from(e: BeaconStateError) -> EpochProcessingError {
        EpochProcessingError::BeaconStateError(e)
    }
}

impl From<ArithError> for EpochProcessingError {
    fn from(e: ArithError) -> EpochProcessingError {
        EpochProcessingError::ArithError(e)
    }
}
