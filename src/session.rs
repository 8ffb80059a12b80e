use crossbeam_channel::{Receiver, Sender};

use crate::{
    config::CounterConfig,
    palm_box,
    pipeline::KeypointProvider,
    stabilizer::TemporalStabilizer,
    strategy::{CountStrategy, HandInput},
    types::{ConfirmedCount, CountSample, Frame, FrameOutcome, HandObservation, PalmBoundingBox},
};

/// Unstabilised result for a single frame.
#[derive(Clone, Debug)]
pub struct Measurement {
    pub hand: Option<HandObservation>,
    pub sample: CountSample,
    pub palm_box: Option<PalmBoundingBox>,
}

/// One capture session: keypoints, counting strategy and stabiliser, driven
/// one frame at a time from a single thread.
pub struct CountingSession<P> {
    provider: P,
    strategy: Box<dyn CountStrategy>,
    stabilizer: TemporalStabilizer,
    palm_padding: i32,
    frames: u64,
}

impl<P: KeypointProvider> CountingSession<P> {
    pub fn new(provider: P, strategy: Box<dyn CountStrategy>, cfg: &CounterConfig) -> Self {
        Self {
            provider,
            strategy,
            stabilizer: TemporalStabilizer::new(cfg.stability_threshold),
            palm_padding: cfg.palm_padding,
            frames: 0,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    /// Detects and counts without touching the stabiliser.
    ///
    /// Provider and strategy failures are logged and reported as "no hand".
    pub fn measure(&mut self, frame: &Frame) -> Measurement {
        let hand = match self.provider.detect(frame) {
            Ok(hand) => hand,
            Err(err) => {
                log::warn!("keypoint detection failed: {err:?}");
                None
            }
        };

        let Some(hand) = hand else {
            return Measurement {
                hand: None,
                sample: CountSample::NoHand,
                palm_box: None,
            };
        };

        let palm_box = palm_box::extract(&hand, self.palm_padding);
        let input = HandInput {
            frame,
            hand: &hand,
            palm_box,
        };
        let sample = match self.strategy.count(input) {
            Ok(sample) => sample,
            Err(err) => {
                log::warn!("{} strategy failed: {err:?}", self.strategy.name());
                CountSample::NoHand
            }
        };

        Measurement {
            hand: Some(hand),
            sample,
            palm_box: Some(palm_box),
        }
    }

    /// Like [`measure`](Self::measure), but when no hand is found the
    /// strategy may still count from the whole frame. Used for still images.
    pub fn measure_still(&mut self, frame: &Frame) -> Measurement {
        let measurement = self.measure(frame);
        if measurement.hand.is_some() {
            return measurement;
        }

        match self.strategy.count_without_hand(frame) {
            Ok(Some(sample)) => {
                log::debug!("no hand found, {} counted the whole frame", self.strategy.name());
                Measurement {
                    sample,
                    ..measurement
                }
            }
            Ok(None) => measurement,
            Err(err) => {
                log::warn!(
                    "{} strategy failed on the whole frame: {err:?}",
                    self.strategy.name()
                );
                measurement
            }
        }
    }

    pub fn process(&mut self, frame: &Frame) -> FrameOutcome {
        let measurement = self.measure(frame);
        self.frames += 1;

        let confirmed = self.stabilizer.observe(measurement.sample);
        log::debug!(
            "frame {}: sample {} streak {}",
            self.frames,
            measurement.sample,
            self.stabilizer.state().streak_length
        );
        if let Some(count) = confirmed {
            log::info!("confirmed count {count} at frame {}", self.frames);
        }

        FrameOutcome {
            sample: measurement.sample,
            confirmed,
            palm_box: measurement.palm_box,
        }
    }

    /// Starts a new capture session with fresh stabiliser state.
    pub fn reset(&mut self) {
        self.stabilizer.reset();
        self.frames = 0;
    }
}

/// Processes frames until the channel closes or `max_frames` is reached,
/// forwarding confirmed counts. Stale frames are skipped.
pub fn run_session<P: KeypointProvider>(
    session: &mut CountingSession<P>,
    frame_rx: &Receiver<Frame>,
    confirmed_tx: &Sender<ConfirmedCount>,
    max_frames: Option<u64>,
) {
    session.reset();
    log::info!("counting session started ({})", session.strategy_name());

    while let Some(frame) = recv_latest_frame(frame_rx) {
        let outcome = session.process(&frame);
        if let Some(count) = outcome.confirmed {
            if confirmed_tx.send(count).is_err() {
                log::warn!("announcement channel closed, ending session");
                break;
            }
        }
        if max_frames.is_some_and(|max| session.frames_processed() >= max) {
            break;
        }
    }

    log::info!(
        "counting session ended after {} frames",
        session.frames_processed()
    );
}

fn recv_latest_frame(frame_rx: &Receiver<Frame>) -> Option<Frame> {
    let mut frame = frame_rx.recv().ok()?;
    while let Ok(newer) = frame_rx.try_recv() {
        frame = newer;
    }
    Some(frame)
}
