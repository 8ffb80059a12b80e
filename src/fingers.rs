use crate::types::HandObservation;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Little,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Little,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Finger::Thumb => "thumb",
            Finger::Index => "index",
            Finger::Middle => "middle",
            Finger::Ring => "ring",
            Finger::Little => "little",
        }
    }
}

/// Which image axis decides extension for a finger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    /// Tip to the right of the reference joint (mirrored feed, thumb only).
    RightOf,
    /// Tip above the reference joint (smaller y).
    Above,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FingerRule {
    pub finger: Finger,
    pub tip: usize,
    pub reference: usize,
    pub axis: Axis,
}

/// Tip/reference landmark pairs. The thumb compares against the joint one step
/// proximal; the other fingers compare against the joint two steps proximal.
pub const FINGER_RULES: [FingerRule; 5] = [
    FingerRule {
        finger: Finger::Thumb,
        tip: 4,
        reference: 3,
        axis: Axis::RightOf,
    },
    FingerRule {
        finger: Finger::Index,
        tip: 8,
        reference: 6,
        axis: Axis::Above,
    },
    FingerRule {
        finger: Finger::Middle,
        tip: 12,
        reference: 10,
        axis: Axis::Above,
    },
    FingerRule {
        finger: Finger::Ring,
        tip: 16,
        reference: 14,
        axis: Axis::Above,
    },
    FingerRule {
        finger: Finger::Little,
        tip: 20,
        reference: 18,
        axis: Axis::Above,
    },
];

impl FingerRule {
    pub fn is_extended(&self, hand: &HandObservation) -> bool {
        let tip = hand.keypoint(self.tip);
        let reference = hand.keypoint(self.reference);
        match self.axis {
            Axis::RightOf => tip.x > reference.x,
            Axis::Above => tip.y < reference.y,
        }
    }
}

/// Extended flags in thumb, index, middle, ring, little order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FingerExtension(pub [bool; 5]);

impl FingerExtension {
    pub fn count(&self) -> u8 {
        self.0.iter().filter(|extended| **extended).count() as u8
    }

    pub fn is_extended(&self, finger: Finger) -> bool {
        self.0[finger as usize]
    }

    pub fn summary(&self) -> String {
        Finger::ALL
            .iter()
            .map(|finger| {
                let state = if self.is_extended(*finger) { "up" } else { "down" };
                format!("{}:{state}", finger.label())
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FingerEvaluation {
    pub extension: FingerExtension,
    pub count: u8,
}

pub fn evaluate(hand: &HandObservation) -> FingerEvaluation {
    let extension = FingerExtension(FINGER_RULES.map(|rule| rule.is_extended(hand)));
    FingerEvaluation {
        extension,
        count: extension.count(),
    }
}
