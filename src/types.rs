use std::{fmt, time::Instant};

use crate::error::ObservationError;

pub const NUM_KEYPOINTS: usize = 21;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

/// A single hand landmark in frame pixels, using the MediaPipe hand topology
/// (0 is the wrist, then four joints per finger from thumb to little finger).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Keypoint {
    pub id: u8,
    pub x: i32,
    pub y: i32,
}

/// All 21 keypoints of one hand in one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandObservation {
    points: [Keypoint; NUM_KEYPOINTS],
}

impl HandObservation {
    /// Builds an observation from pixel positions ordered by landmark id.
    pub fn from_pixels(points: &[(i32, i32)]) -> Result<Self, ObservationError> {
        if points.len() != NUM_KEYPOINTS {
            return Err(ObservationError::WrongKeypointCount {
                got: points.len(),
                expected: NUM_KEYPOINTS,
            });
        }

        let points = std::array::from_fn(|id| Keypoint {
            id: id as u8,
            x: points[id].0,
            y: points[id].1,
        });
        Ok(Self { points })
    }

    /// Converts sub-pixel landmarks (already in frame space) by truncation.
    pub fn from_projected(points: &[(f32, f32)]) -> Result<Self, ObservationError> {
        let pixels: Vec<(i32, i32)> = points.iter().map(|&(x, y)| (x as i32, y as i32)).collect();
        Self::from_pixels(&pixels)
    }

    /// Converts normalized `[0, 1]` landmarks into pixels of a `width`×`height` frame.
    pub fn from_normalized(
        points: &[(f32, f32)],
        width: u32,
        height: u32,
    ) -> Result<Self, ObservationError> {
        let (w, h) = (width as f32, height as f32);
        let pixels: Vec<(i32, i32)> = points
            .iter()
            .map(|&(x, y)| ((x * w) as i32, (y * h) as i32))
            .collect();
        Self::from_pixels(&pixels)
    }

    pub fn keypoint(&self, id: usize) -> Keypoint {
        self.points[id]
    }

    pub fn keypoints(&self) -> &[Keypoint; NUM_KEYPOINTS] {
        &self.points
    }
}

/// Per-frame count derived from one observation, or the absence of a hand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountSample {
    NoHand,
    Fingers(u8),
}

impl CountSample {
    /// Integer form where `-1` stands for "no hand observed".
    pub fn as_i8(self) -> i8 {
        match self {
            CountSample::NoHand => -1,
            CountSample::Fingers(n) => n as i8,
        }
    }

    pub fn fingers(self) -> Option<u8> {
        match self {
            CountSample::NoHand => None,
            CountSample::Fingers(n) => Some(n),
        }
    }
}

impl fmt::Display for CountSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i8())
    }
}

/// A count that survived temporal stabilisation and should be announced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfirmedCount(pub u8);

impl fmt::Display for ConfirmedCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Padded pixel rectangle around a hand. Coordinates may fall outside the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PalmBoundingBox {
    pub xmin: i32,
    pub ymin: i32,
    pub xmax: i32,
    pub ymax: i32,
}

#[derive(Clone, Debug)]
pub struct FrameOutcome {
    pub sample: CountSample,
    pub confirmed: Option<ConfirmedCount>,
    pub palm_box: Option<PalmBoundingBox>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_partial_observation() {
        let points = vec![(0, 0); 20];
        assert_eq!(
            HandObservation::from_pixels(&points),
            Err(ObservationError::WrongKeypointCount {
                got: 20,
                expected: 21
            })
        );
    }

    #[test]
    fn normalized_points_truncate_towards_zero() {
        let mut points = vec![(0.5, 0.5); NUM_KEYPOINTS];
        points[4] = (0.9999, 0.0015);
        let hand = HandObservation::from_normalized(&points, 640, 480).unwrap();
        assert_eq!(hand.keypoint(0), Keypoint { id: 0, x: 320, y: 240 });
        assert_eq!(hand.keypoint(4), Keypoint { id: 4, x: 639, y: 0 });
    }

    #[test]
    fn keypoint_ids_follow_input_order() {
        let points: Vec<(i32, i32)> = (0..21).map(|i| (i, i * 2)).collect();
        let hand = HandObservation::from_pixels(&points).unwrap();
        for (id, kp) in hand.keypoints().iter().enumerate() {
            assert_eq!(kp.id as usize, id);
            assert_eq!((kp.x, kp.y), (id as i32, id as i32 * 2));
        }
    }

    #[test]
    fn no_hand_sample_uses_sentinel() {
        assert_eq!(CountSample::NoHand.as_i8(), -1);
        assert_eq!(CountSample::Fingers(3).as_i8(), 3);
        assert_eq!(CountSample::NoHand.to_string(), "-1");
        assert_eq!(CountSample::Fingers(5).fingers(), Some(5));
    }
}
