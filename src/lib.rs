//! Counts raised fingers in webcam frames.
//!
//! Each frame goes through a [`pipeline::KeypointProvider`] that finds the 21
//! hand landmarks, a [`strategy::CountStrategy`] that turns the hand into a
//! count, and a [`stabilizer::TemporalStabilizer`] that only lets a count
//! through once it has held for several frames.

pub mod announce;
pub mod classifier;
pub mod config;
pub mod error;
pub mod fingers;
pub mod model_download;
pub mod palm_box;
pub mod pipeline;
pub mod session;
pub mod stabilizer;
pub mod strategy;
pub mod types;

pub use config::{CounterConfig, StrategyKind};
pub use fingers::{FingerEvaluation, FingerExtension, evaluate};
pub use palm_box::extract;
pub use session::{CountingSession, run_session};
pub use stabilizer::TemporalStabilizer;
pub use types::{
    ConfirmedCount, CountSample, Frame, FrameOutcome, HandObservation, Keypoint, PalmBoundingBox,
};
