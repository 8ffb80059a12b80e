//! Debounces per-frame counts into sparse confirmations.
//!
//! A value is confirmed once it has been seen on `threshold` consecutive
//! frames, and the same value is never confirmed twice in a row. Frames without
//! a hand break a streak but never clear the last confirmation, so a hand that
//! reappears showing the same count stays silent.

use crate::types::{ConfirmedCount, CountSample};

pub const DEFAULT_STABILITY_THRESHOLD: usize = 4;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StabilizationState {
    pub last_confirmed: Option<u8>,
    pub streak_value: Option<CountSample>,
    pub streak_length: usize,
}

#[derive(Clone, Debug)]
pub struct TemporalStabilizer {
    state: StabilizationState,
    threshold: usize,
}

impl TemporalStabilizer {
    pub fn new(threshold: usize) -> Self {
        Self {
            state: StabilizationState::default(),
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn state(&self) -> &StabilizationState {
        &self.state
    }

    /// Feeds one frame's sample. Must be called once per frame, in order.
    pub fn observe(&mut self, sample: CountSample) -> Option<ConfirmedCount> {
        let state = &mut self.state;
        if state.streak_value == Some(sample) {
            state.streak_length += 1;
        } else {
            state.streak_value = Some(sample);
            state.streak_length = 1;
        }

        let count = sample.fingers()?;
        if state.last_confirmed == Some(count) || state.streak_length < self.threshold {
            return None;
        }

        state.last_confirmed = Some(count);
        Some(ConfirmedCount(count))
    }

    /// Starts a new capture session.
    pub fn reset(&mut self) {
        self.state = StabilizationState::default();
    }
}

impl Default for TemporalStabilizer {
    fn default() -> Self {
        Self::new(DEFAULT_STABILITY_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(values: &[i8]) -> Vec<CountSample> {
        values
            .iter()
            .map(|&v| {
                if v < 0 {
                    CountSample::NoHand
                } else {
                    CountSample::Fingers(v as u8)
                }
            })
            .collect()
    }

    /// Returns `(frame index, value)` for every confirmation.
    fn run(stabilizer: &mut TemporalStabilizer, values: &[i8]) -> Vec<(usize, u8)> {
        samples(values)
            .into_iter()
            .enumerate()
            .filter_map(|(idx, s)| stabilizer.observe(s).map(|c| (idx, c.0)))
            .collect()
    }

    #[test]
    fn confirms_on_fourth_matching_frame() {
        let mut stabilizer = TemporalStabilizer::default();
        assert_eq!(run(&mut stabilizer, &[3, 3, 3, 3]), vec![(3, 3)]);
        assert_eq!(stabilizer.state().last_confirmed, Some(3));
    }

    #[test]
    fn three_frames_are_not_enough() {
        let mut stabilizer = TemporalStabilizer::default();
        assert!(run(&mut stabilizer, &[2, 2, 2]).is_empty());
    }

    #[test]
    fn missing_hand_restarts_the_streak() {
        let mut stabilizer = TemporalStabilizer::default();
        assert_eq!(
            run(&mut stabilizer, &[3, 3, 3, -1, 3, 3, 3, 3]),
            vec![(7, 3)]
        );
    }

    #[test]
    fn missing_hand_never_confirms() {
        let mut stabilizer = TemporalStabilizer::default();
        assert!(run(&mut stabilizer, &[-1; 20]).is_empty());
        assert_eq!(stabilizer.state().last_confirmed, None);
    }

    #[test]
    fn same_count_after_hand_loss_is_not_repeated() {
        let mut stabilizer = TemporalStabilizer::default();
        let confirmed = run(&mut stabilizer, &[2, 2, 2, 2, -1, -1, -1, -1, -1, 2, 2, 2, 2, 2]);
        assert_eq!(confirmed, vec![(3, 2)]);
        assert_eq!(stabilizer.state().last_confirmed, Some(2));
    }

    #[test]
    fn long_streak_confirms_once() {
        let mut stabilizer = TemporalStabilizer::default();
        assert_eq!(run(&mut stabilizer, &[5; 30]), vec![(3, 5)]);
    }

    #[test]
    fn flicker_does_not_confirm() {
        let mut stabilizer = TemporalStabilizer::default();
        assert!(run(&mut stabilizer, &[1, 1, 1, 2, 1, 1, 1, 2, 1, 1, 1]).is_empty());
    }

    #[test]
    fn changes_need_a_full_streak() {
        let mut stabilizer = TemporalStabilizer::default();
        let confirmed = run(&mut stabilizer, &[1, 1, 1, 1, 4, 4, 4, 4, 1, 1, 1, 1]);
        assert_eq!(confirmed, vec![(3, 1), (7, 4), (11, 1)]);
    }

    #[test]
    fn zero_is_a_real_count() {
        let mut stabilizer = TemporalStabilizer::default();
        assert_eq!(run(&mut stabilizer, &[0, 0, 0, 0]), vec![(3, 0)]);
    }

    #[test]
    fn never_repeats_consecutive_confirmations() {
        let mut stabilizer = TemporalStabilizer::new(2);
        let values: Vec<i8> = (0..200).map(|i| ((i * 7 + i / 3) % 7) as i8 - 1).collect();
        let confirmed = run(&mut stabilizer, &values);
        for pair in confirmed.windows(2) {
            assert_ne!(pair[0].1, pair[1].1);
        }
    }

    #[test]
    fn reset_forgets_the_last_confirmation() {
        let mut stabilizer = TemporalStabilizer::default();
        run(&mut stabilizer, &[3, 3, 3, 3]);
        stabilizer.reset();
        assert_eq!(stabilizer.state(), &StabilizationState::default());
        assert_eq!(run(&mut stabilizer, &[3, 3, 3, 3]), vec![(3, 3)]);
    }

    #[test]
    fn custom_threshold() {
        let mut stabilizer = TemporalStabilizer::new(2);
        assert_eq!(run(&mut stabilizer, &[4, 4]), vec![(1, 4)]);

        let mut stabilizer = TemporalStabilizer::new(0);
        assert_eq!(stabilizer.threshold(), 1);
        assert_eq!(run(&mut stabilizer, &[4]), vec![(0, 4)]);
    }
}
