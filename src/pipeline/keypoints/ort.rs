use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    KeypointProvider, MIN_HAND_CONFIDENCE,
    common::{self, HANDPOSE_INPUT_SIZE},
    palm::{PalmDetector, PalmDetectorConfig, crop_from_palm, pick_primary_region},
};
use crate::{
    model_download::{ModelKind, ensure_model_ready},
    types::{Frame, HandObservation},
};

/// MediaPipe palm detector followed by the handpose estimator, both on ONNX
/// Runtime.
pub struct OrtKeypointProvider {
    handpose: Session,
    palm_detector: PalmDetector,
}

impl OrtKeypointProvider {
    /// Loads both models, downloading them first when missing.
    pub fn new(
        handpose_model_path: &Path,
        palm_model_path: &Path,
        palm_cfg: PalmDetectorConfig,
    ) -> Result<Self> {
        ensure_model_ready(ModelKind::HandposeEstimator, handpose_model_path)?;
        ensure_model_ready(ModelKind::PalmDetector, palm_model_path)?;

        let handpose = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(handpose_model_path)
            .with_context(|| {
                format!(
                    "failed to load handpose model from {}",
                    handpose_model_path.display()
                )
            })?;
        let palm_detector = PalmDetector::new(palm_model_path, palm_cfg)?;

        log::info!(
            "keypoint provider ready using {} and palm detector {}",
            handpose_model_path.display(),
            palm_model_path.display()
        );

        Ok(Self {
            handpose,
            palm_detector,
        })
    }
}

impl KeypointProvider for OrtKeypointProvider {
    fn detect(&mut self, frame: &Frame) -> Result<Option<HandObservation>> {
        let palm_regions = self.palm_detector.detect(frame)?;
        let Some(palm) = pick_primary_region(&palm_regions) else {
            return Ok(None);
        };

        let crop = crop_from_palm(palm);
        let (input, transform) = common::prepare_rotated_crop(
            frame,
            crop.center,
            crop.side,
            crop.angle,
            HANDPOSE_INPUT_SIZE,
        )?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .handpose
            .run(ort::inputs![tensor])
            .context("failed to run handpose session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("handpose model returned no outputs"));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let landmarks = common::decode_landmarks(&flattened)?;
        let handpose_score = if outputs.len() > 1 {
            outputs[1]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .unwrap_or(0.0)
        } else {
            0.0
        };
        let confidence = (handpose_score * palm.score).clamp(0.0, 1.0);

        if confidence < MIN_HAND_CONFIDENCE {
            log::debug!("hand confidence {confidence:.2} below threshold");
            return Ok(None);
        }

        let projected = transform.project_all(&landmarks);
        Ok(Some(HandObservation::from_projected(&projected)?))
    }
}
