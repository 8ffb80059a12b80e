use anyhow::Result;

use crate::{
    classifier::{DigitClassifier, MAX_DIGIT, prepare_palm_crop},
    error::ClassifierError,
    fingers,
    types::{CountSample, Frame, HandObservation, PalmBoundingBox},
};

/// Everything known about the hand in the current frame.
#[derive(Clone, Copy, Debug)]
pub struct HandInput<'a> {
    pub frame: &'a Frame,
    pub hand: &'a HandObservation,
    pub palm_box: PalmBoundingBox,
}

/// Turns one detected hand into a finger count.
pub trait CountStrategy: Send {
    fn name(&self) -> &'static str;

    fn count(&mut self, input: HandInput<'_>) -> Result<CountSample>;

    /// Counts from the whole frame when no hand was located. Strategies that
    /// need landmarks return `None`.
    fn count_without_hand(&mut self, _frame: &Frame) -> Result<Option<CountSample>> {
        Ok(None)
    }
}

impl<S: CountStrategy + ?Sized> CountStrategy for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn count(&mut self, input: HandInput<'_>) -> Result<CountSample> {
        (**self).count(input)
    }

    fn count_without_hand(&mut self, frame: &Frame) -> Result<Option<CountSample>> {
        (**self).count_without_hand(frame)
    }
}

/// Counts fingers from landmark geometry alone.
#[derive(Clone, Copy, Debug, Default)]
pub struct GeometricStrategy;

impl CountStrategy for GeometricStrategy {
    fn name(&self) -> &'static str {
        "geometric"
    }

    fn count(&mut self, input: HandInput<'_>) -> Result<CountSample> {
        let evaluation = fingers::evaluate(input.hand);
        log::trace!("finger states: {}", evaluation.extension.summary());
        Ok(CountSample::Fingers(evaluation.count))
    }
}

/// Runs the digit classifier on the palm crop.
pub struct ClassifierStrategy {
    classifier: DigitClassifier,
}

impl ClassifierStrategy {
    pub fn new(classifier: DigitClassifier) -> Self {
        Self { classifier }
    }

    fn count_region(&mut self, frame: &Frame, region: &PalmBoundingBox) -> Result<CountSample> {
        let tensor = match prepare_palm_crop(frame, region) {
            Ok(tensor) => tensor,
            Err(err) if err.is::<ClassifierError>() => {
                log::debug!("skipping palm crop: {err}");
                return Ok(CountSample::NoHand);
            }
            Err(err) => return Err(err),
        };

        let class = self.classifier.classify(tensor)?;
        Ok(sample_from_class(class))
    }
}

impl CountStrategy for ClassifierStrategy {
    fn name(&self) -> &'static str {
        "classifier"
    }

    fn count(&mut self, input: HandInput<'_>) -> Result<CountSample> {
        self.count_region(input.frame, &input.palm_box)
    }

    fn count_without_hand(&mut self, frame: &Frame) -> Result<Option<CountSample>> {
        let whole = PalmBoundingBox {
            xmin: 0,
            ymin: 0,
            xmax: frame.width as i32,
            ymax: frame.height as i32,
        };
        self.count_region(frame, &whole).map(Some)
    }
}

/// Maps a classifier class index to a count. Classes past `MAX_DIGIT` carry
/// no finger count and are reported as no hand.
pub fn sample_from_class(class: usize) -> CountSample {
    match u8::try_from(class) {
        Ok(digit) if digit <= MAX_DIGIT => CountSample::Fingers(digit),
        _ => {
            log::warn!("classifier predicted class {class}, outside 0..={MAX_DIGIT}");
            CountSample::NoHand
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::palm_box;

    #[test]
    fn geometric_strategy_counts_fingers() {
        let mut points = vec![(100, 100); 21];
        points[4] = (120, 100);
        points[8] = (100, 40);
        let hand = HandObservation::from_pixels(&points).unwrap();
        let frame = Frame {
            rgba: Vec::new(),
            width: 0,
            height: 0,
            timestamp: Instant::now(),
        };
        let input = HandInput {
            frame: &frame,
            hand: &hand,
            palm_box: palm_box::extract(&hand, 50),
        };

        let mut strategy: Box<dyn CountStrategy> = Box::new(GeometricStrategy);
        assert_eq!(strategy.name(), "geometric");
        assert_eq!(strategy.count(input).unwrap(), CountSample::Fingers(2));
        assert_eq!(strategy.count_without_hand(&frame).unwrap(), None);
    }

    #[test]
    fn classifier_classes_map_to_counts() {
        assert_eq!(sample_from_class(0), CountSample::Fingers(0));
        assert_eq!(sample_from_class(5), CountSample::Fingers(5));
        assert_eq!(sample_from_class(6), CountSample::NoHand);
        assert_eq!(sample_from_class(usize::MAX), CountSample::NoHand);
    }
}
