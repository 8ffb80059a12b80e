mod common;
mod ort;
mod palm;

use crate::types::{Frame, HandObservation};

pub use self::common::{paste_on_canvas, resize_rgba};
pub use self::ort::OrtKeypointProvider;
pub use self::palm::PalmDetectorConfig;

/// Landmarks below this combined palm and handpose confidence are dropped.
pub const MIN_HAND_CONFIDENCE: f32 = 0.2;

/// Finds the primary hand in a frame.
///
/// Implementations return either all 21 keypoints in frame pixels or `None`;
/// partial hands are never reported.
pub trait KeypointProvider: Send + 'static {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Option<HandObservation>>;
}

impl<P: KeypointProvider + ?Sized> KeypointProvider for Box<P> {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Option<HandObservation>> {
        (**self).detect(frame)
    }
}
