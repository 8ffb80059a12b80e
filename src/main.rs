use std::{path::PathBuf, time::Instant};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use finger_counter::{
    CountSample, CounterConfig, CountingSession, Frame, StrategyKind, fingers,
    palm_box::DEFAULT_PALM_PADDING,
    pipeline::{OrtKeypointProvider, PalmDetectorConfig},
    session::Measurement,
    stabilizer::DEFAULT_STABILITY_THRESHOLD,
};

#[derive(Parser, Debug)]
#[command(version, about = "Counts raised fingers seen by a webcam")]
struct Args {
    /// How a detected hand is turned into a count.
    #[clap(long, value_enum, default_value_t = StrategyKind::Geometric)]
    strategy: StrategyKind,

    /// Camera index to capture from.
    #[clap(long, default_value_t = 0)]
    camera: u32,

    /// Print the available cameras and exit.
    #[clap(long)]
    list_cameras: bool,

    /// Consecutive matching frames needed before a count is announced.
    #[clap(long, default_value_t = DEFAULT_STABILITY_THRESHOLD)]
    threshold: usize,

    /// Pixels added around the hand when cropping the palm.
    #[clap(long, default_value_t = DEFAULT_PALM_PADDING, allow_negative_numbers = true)]
    padding: i32,

    #[clap(long)]
    handpose_model: Option<PathBuf>,

    #[clap(long)]
    palm_model: Option<PathBuf>,

    /// ONNX digit classifier, required by `--strategy classifier`.
    #[clap(long)]
    classifier_model: Option<PathBuf>,

    /// Stop after this many processed frames.
    #[clap(long)]
    max_frames: Option<u64>,

    /// Count fingers in a still image instead of the camera feed.
    #[clap(long)]
    image: Option<PathBuf>,
}

impl Args {
    fn counter_config(&self) -> CounterConfig {
        let defaults = CounterConfig::default();
        CounterConfig {
            strategy: self.strategy,
            stability_threshold: self.threshold,
            palm_padding: self.padding,
            handpose_model_path: self
                .handpose_model
                .clone()
                .unwrap_or(defaults.handpose_model_path),
            palm_model_path: self.palm_model.clone().unwrap_or(defaults.palm_model_path),
            classifier_model_path: self.classifier_model.clone(),
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.list_cameras {
        return list_cameras();
    }

    let cfg = args.counter_config();
    let provider = OrtKeypointProvider::new(
        &cfg.handpose_model_path,
        &cfg.palm_model_path,
        PalmDetectorConfig::default(),
    )?;
    let strategy = cfg.build_strategy()?;
    let mut session = CountingSession::new(provider, strategy, &cfg);

    match &args.image {
        Some(path) => count_image(&mut session, args.strategy, path),
        None => count_camera(&mut session, args.camera, args.max_frames),
    }
}

fn count_image(
    session: &mut CountingSession<OrtKeypointProvider>,
    strategy: StrategyKind,
    path: &PathBuf,
) -> Result<()> {
    let img = image::open(path)
        .with_context(|| format!("failed to open image {}", path.display()))?
        .to_rgba8();
    let (width, height) = img.dimensions();
    let frame = Frame {
        rgba: img.into_raw(),
        width,
        height,
        timestamp: Instant::now(),
    };

    let measurement = session.measure_still(&frame);
    println!("{} ({})", path.display(), session.strategy_name());
    for line in describe_measurement(&measurement, strategy) {
        println!("  {line}");
    }
    Ok(())
}

/// Report lines for one still image. The per-finger breakdown only comes
/// with the geometric strategy, since the classifier never looks at fingers.
fn describe_measurement(measurement: &Measurement, strategy: StrategyKind) -> Vec<String> {
    let mut lines = Vec::new();
    match (&measurement.hand, measurement.sample) {
        (None, CountSample::NoHand) => {
            lines.push("no hand detected".to_string());
            return lines;
        }
        (None, sample) => {
            lines.push(format!("count: {sample}"));
            lines.push("no hand landmarks, classified the whole image".to_string());
        }
        (Some(hand), sample) => {
            lines.push(format!("count: {sample}"));
            if strategy == StrategyKind::Geometric {
                lines.push(format!(
                    "fingers: {}",
                    fingers::evaluate(hand).extension.summary()
                ));
            }
        }
    }

    if let Some(palm_box) = measurement.palm_box {
        lines.push(format!(
            "palm box: ({}, {}) - ({}, {})",
            palm_box.xmin, palm_box.ymin, palm_box.xmax, palm_box.ymax
        ));
    }
    lines
}

#[cfg(feature = "camera-nokhwa")]
fn list_cameras() -> Result<()> {
    let cameras = finger_counter::pipeline::available_cameras()?;
    if cameras.is_empty() {
        println!("no cameras found");
    }
    for camera in cameras {
        println!("{:?}: {}", camera.index, camera.label);
    }
    Ok(())
}

#[cfg(feature = "camera-nokhwa")]
fn count_camera(
    session: &mut CountingSession<OrtKeypointProvider>,
    camera: u32,
    max_frames: Option<u64>,
) -> Result<()> {
    use crossbeam_channel::{bounded, unbounded};
    use finger_counter::{
        announce::{TerminalDisplay, start_announcer},
        pipeline::start_camera_stream,
        run_session,
    };
    use nokhwa::utils::CameraIndex;

    let (frame_tx, frame_rx) = bounded(1);
    let (confirmed_tx, confirmed_rx) = unbounded();

    let announcer = start_announcer(TerminalDisplay::stdout(), confirmed_rx);
    let stream = start_camera_stream(CameraIndex::Index(camera), frame_tx)?;

    run_session(session, &frame_rx, &confirmed_tx, max_frames);

    // Hanging up the frame channel ends capture even if the camera is stalled.
    drop(frame_rx);
    stream.stop();
    drop(confirmed_tx);
    announcer
        .join()
        .map_err(|_| anyhow!("announcement thread panicked"))?;
    Ok(())
}

#[cfg(not(feature = "camera-nokhwa"))]
fn list_cameras() -> Result<()> {
    Err(anyhow!("built without camera support"))
}

#[cfg(not(feature = "camera-nokhwa"))]
fn count_camera(
    _session: &mut CountingSession<OrtKeypointProvider>,
    _camera: u32,
    _max_frames: Option<u64>,
) -> Result<()> {
    Err(anyhow!("built without camera support, use --image"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_config_defaults() {
        let args = Args::try_parse_from(["finger-counter"]).unwrap();
        let cfg = args.counter_config();
        let defaults = CounterConfig::default();
        assert_eq!(cfg.strategy, defaults.strategy);
        assert_eq!(cfg.stability_threshold, defaults.stability_threshold);
        assert_eq!(cfg.palm_padding, defaults.palm_padding);
        assert_eq!(cfg.handpose_model_path, defaults.handpose_model_path);
    }

    #[test]
    fn cli_parses_classifier_options() {
        let args = Args::try_parse_from([
            "finger-counter",
            "--strategy",
            "classifier",
            "--classifier-model",
            "digits.onnx",
            "--threshold",
            "6",
            "--padding",
            "-5",
        ])
        .unwrap();
        let cfg = args.counter_config();
        assert_eq!(cfg.strategy, StrategyKind::Classifier);
        assert_eq!(cfg.stability_threshold, 6);
        assert_eq!(cfg.palm_padding, -5);
        assert_eq!(cfg.classifier_model_path, Some(PathBuf::from("digits.onnx")));
    }

    fn measured_hand(sample: CountSample) -> Measurement {
        let mut points = vec![(100, 100); 21];
        points[8] = (100, 40);
        let hand = finger_counter::HandObservation::from_pixels(&points).unwrap();
        Measurement {
            palm_box: Some(finger_counter::extract(&hand, 50)),
            hand: Some(hand),
            sample,
        }
    }

    #[test]
    fn geometric_report_lists_fingers() {
        let measurement = measured_hand(CountSample::Fingers(1));
        let lines = describe_measurement(&measurement, StrategyKind::Geometric);
        assert_eq!(lines[0], "count: 1");
        assert_eq!(
            lines[1],
            "fingers: thumb:down index:up middle:down ring:down little:down"
        );
        assert!(lines[2].starts_with("palm box:"));
    }

    #[test]
    fn classifier_report_has_no_finger_breakdown() {
        let measurement = measured_hand(CountSample::Fingers(4));
        let lines = describe_measurement(&measurement, StrategyKind::Classifier);
        assert_eq!(lines[0], "count: 4");
        assert!(lines.iter().all(|line| !line.starts_with("fingers:")));
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn whole_image_report() {
        let none = Measurement {
            hand: None,
            sample: CountSample::NoHand,
            palm_box: None,
        };
        assert_eq!(
            describe_measurement(&none, StrategyKind::Geometric),
            vec!["no hand detected"]
        );

        let whole = Measurement {
            sample: CountSample::Fingers(2),
            ..none
        };
        let lines = describe_measurement(&whole, StrategyKind::Classifier);
        assert_eq!(lines[0], "count: 2");
        assert_eq!(lines.len(), 2);
    }
}
