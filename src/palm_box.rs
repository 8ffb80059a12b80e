use crate::types::{HandObservation, PalmBoundingBox};

pub const DEFAULT_PALM_PADDING: i32 = 50;

/// Padded box around every keypoint of `hand`.
///
/// The far corner is built as `min + extent + padding` rather than
/// `max + padding`. Nothing is clamped, so the box can extend past any frame
/// edge.
pub fn extract(hand: &HandObservation, padding: i32) -> PalmBoundingBox {
    let (xmin, xmax, ymin, ymax) = hand.keypoints().iter().fold(
        (i32::MAX, i32::MIN, i32::MAX, i32::MIN),
        |acc, kp| {
            (
                acc.0.min(kp.x),
                acc.1.max(kp.x),
                acc.2.min(kp.y),
                acc.3.max(kp.y),
            )
        },
    );

    let box_w = xmax - xmin;
    let box_h = ymax - ymin;
    PalmBoundingBox {
        xmin: xmin - padding,
        ymin: ymin - padding,
        xmax: xmin + box_w + padding,
        ymax: ymin + box_h + padding,
    }
}

impl PalmBoundingBox {
    pub fn width(&self) -> i32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> i32 {
        self.ymax - self.ymin
    }

    /// Intersects the box with a `width`×`height` frame. Returns `None` when
    /// nothing of the box lies inside the frame.
    pub fn clamp_to_frame(&self, width: u32, height: u32) -> Option<PalmBoundingBox> {
        let clamped = PalmBoundingBox {
            xmin: self.xmin.max(0),
            ymin: self.ymin.max(0),
            xmax: self.xmax.min(width as i32),
            ymax: self.ymax.min(height as i32),
        };
        if clamped.width() <= 0 || clamped.height() <= 0 {
            return None;
        }
        Some(clamped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NUM_KEYPOINTS;

    fn spread_hand(x: (i32, i32), y: (i32, i32)) -> HandObservation {
        let mut points = vec![((x.0 + x.1) / 2, (y.0 + y.1) / 2); NUM_KEYPOINTS];
        points[0] = (x.0, y.1);
        points[4] = (x.1, y.0 + 10);
        points[12] = (x.0 + 20, y.0);
        HandObservation::from_pixels(&points).unwrap()
    }

    #[test]
    fn pads_every_side() {
        let hand = spread_hand((100, 200), (50, 150));
        assert_eq!(
            extract(&hand, 50),
            PalmBoundingBox {
                xmin: 50,
                ymin: 0,
                xmax: 250,
                ymax: 200
            }
        );
    }

    #[test]
    fn does_not_clamp_near_origin() {
        let hand = spread_hand((3, 40), (0, 25));
        let bbox = extract(&hand, DEFAULT_PALM_PADDING);
        assert_eq!(bbox.xmin, -47);
        assert_eq!(bbox.ymin, -50);
        assert_eq!(bbox.xmax, 90);
        assert_eq!(bbox.ymax, 75);
    }

    #[test]
    fn single_point_hand_is_twice_the_padding() {
        let hand = HandObservation::from_pixels(&[(10, 10); NUM_KEYPOINTS]).unwrap();
        let bbox = extract(&hand, 5);
        assert_eq!((bbox.width(), bbox.height()), (10, 10));
    }

    #[test]
    fn clamp_cuts_to_frame() {
        let bbox = PalmBoundingBox {
            xmin: -20,
            ymin: 10,
            xmax: 700,
            ymax: 300,
        };
        assert_eq!(
            bbox.clamp_to_frame(640, 480),
            Some(PalmBoundingBox {
                xmin: 0,
                ymin: 10,
                xmax: 640,
                ymax: 300
            })
        );
    }

    #[test]
    fn clamp_outside_frame_is_none() {
        let bbox = PalmBoundingBox {
            xmin: 700,
            ymin: 10,
            xmax: 800,
            ymax: 300,
        };
        assert_eq!(bbox.clamp_to_frame(640, 480), None);
    }
}
