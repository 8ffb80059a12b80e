use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ObservationError {
    #[error("hand observation needs {expected} keypoints, got {got}")]
    WrongKeypointCount { got: usize, expected: usize },
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("palm region {width}x{height} is empty after clamping to the frame")]
    EmptyRegion { width: i32, height: i32 },
    #[error("classifier returned no logits")]
    NoLogits,
    #[error("classifier model not configured, pass --classifier-model")]
    MissingModel,
}
