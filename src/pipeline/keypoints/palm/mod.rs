mod anchors;

use std::{cmp::Ordering, f32::consts::PI, path::Path};

use anchors::{ANCHORS, NUM_ANCHORS};
use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use crate::types::Frame;

use super::common::{LetterboxInfo, PALM_INPUT_SIZE, letterbox_frame};

const PALM_LANDMARKS: usize = 7;
const BOX_FEATURES: usize = 4 + PALM_LANDMARKS * 2;
const MIN_CROP_SIDE: f32 = 80.0;
const CROP_EXPANSION: f32 = 2.4;

#[derive(Clone, Debug)]
pub struct PalmDetectorConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
}

impl Default for PalmDetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            nms_threshold: 0.3,
            top_k: 32,
        }
    }
}

/// A detected palm in frame pixels: `[x1, y1, x2, y2]` plus seven palm
/// keypoints (wrist, finger bases, thumb joints).
#[derive(Clone, Debug)]
pub struct PalmRegion {
    pub bbox: [f32; 4],
    pub landmarks: Vec<(f32, f32)>,
    pub score: f32,
}

/// Square, rotated region around a palm that the handpose estimator sees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HandCrop {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
}

pub struct PalmDetector {
    session: Session,
    cfg: PalmDetectorConfig,
}

impl PalmDetector {
    pub fn new(model_path: &Path, cfg: PalmDetectorConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load palm detector from {}", model_path.display())
            })?;

        Ok(Self { session, cfg })
    }

    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<PalmRegion>> {
        let (input, letterbox) = letterbox_frame(frame, PALM_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run palm detector session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "palm detector returned {} outputs, expected at least 2",
                outputs.len()
            ));
        }

        let boxes = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let layout = OutputLayout::from_shapes(boxes.shape(), scores.shape())?;

        decode_palm_outputs(
            boxes
                .as_slice()
                .ok_or_else(|| anyhow!("palm boxes not contiguous"))?,
            scores
                .as_slice()
                .ok_or_else(|| anyhow!("palm scores not contiguous"))?,
            &layout,
            &letterbox,
            &self.cfg,
        )
    }
}

/// Per-anchor strides of the two detector outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct OutputLayout {
    anchors: usize,
    box_stride: usize,
    score_stride: usize,
}

impl OutputLayout {
    fn from_shapes(box_shape: &[usize], score_shape: &[usize]) -> Result<Self> {
        let [.., box_anchors, box_stride] = box_shape else {
            return Err(anyhow!(
                "unexpected palm box shape {box_shape:?}, need [batch, anchors, features]"
            ));
        };
        let [.., score_anchors, score_stride] = score_shape else {
            return Err(anyhow!(
                "unexpected palm score shape {score_shape:?}, need [batch, anchors, 1]"
            ));
        };
        if box_shape.len() < 3 || score_shape.len() < 3 {
            return Err(anyhow!(
                "palm outputs need a batch dimension, got {box_shape:?} and {score_shape:?}"
            ));
        }
        if *box_stride < BOX_FEATURES {
            return Err(anyhow!("palm box feature dimension too small: {box_stride}"));
        }
        if box_anchors != score_anchors {
            return Err(anyhow!(
                "anchor dimension mismatch between boxes ({box_anchors}) and scores ({score_anchors})"
            ));
        }

        Ok(Self {
            anchors: NUM_ANCHORS.min(*box_anchors),
            box_stride: *box_stride,
            score_stride: *score_stride,
        })
    }
}

fn decode_palm_outputs(
    boxes: &[f32],
    scores: &[f32],
    layout: &OutputLayout,
    letterbox: &LetterboxInfo,
    cfg: &PalmDetectorConfig,
) -> Result<Vec<PalmRegion>> {
    let pad_bias_x = letterbox.pad_x / letterbox.scale;
    let pad_bias_y = letterbox.pad_y / letterbox.scale;
    let scale = letterbox.orig_w.max(letterbox.orig_h) as f32;
    let input = PALM_INPUT_SIZE as f32;
    let to_frame = |v: f32, anchor: f32, bias: f32| (v / input + anchor) * scale - bias;

    let mut candidates = Vec::new();
    for (anchor_idx, anchor) in ANCHORS.iter().take(layout.anchors).enumerate() {
        let raw_score = *scores
            .get(anchor_idx * layout.score_stride)
            .ok_or_else(|| anyhow!("missing score for palm anchor {anchor_idx}"))?;
        let score = sigmoid(raw_score);
        if score < cfg.score_threshold {
            continue;
        }

        let offset = anchor_idx * layout.box_stride;
        let features = boxes
            .get(offset..offset + BOX_FEATURES)
            .ok_or_else(|| anyhow!("missing box features for palm anchor {anchor_idx}"))?;

        let cx = to_frame(features[0], anchor[0], pad_bias_x);
        let cy = to_frame(features[1], anchor[1], pad_bias_y);
        let hw = features[2] / input * scale / 2.0;
        let hh = features[3] / input * scale / 2.0;
        if hw <= 0.0 || hh <= 0.0 {
            continue;
        }

        let bbox = clamp_box(
            [cx - hw, cy - hh, cx + hw, cy + hh],
            letterbox.orig_w,
            letterbox.orig_h,
        );

        let landmarks = features[4..]
            .chunks_exact(2)
            .map(|pt| {
                (
                    to_frame(pt[0], anchor[0], pad_bias_x),
                    to_frame(pt[1], anchor[1], pad_bias_y),
                )
            })
            .collect();

        candidates.push(PalmRegion {
            bbox,
            landmarks,
            score,
        });
    }

    let kept = nms(&candidates, cfg.nms_threshold, cfg.top_k);
    Ok(kept
        .into_iter()
        .map(|idx| candidates[idx].clone())
        .collect())
}

pub fn pick_primary_region(regions: &[PalmRegion]) -> Option<&PalmRegion> {
    regions
        .iter()
        .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal))
}

pub fn crop_from_palm(region: &PalmRegion) -> HandCrop {
    let center = if region.landmarks.is_empty() {
        (
            (region.bbox[0] + region.bbox[2]) * 0.5,
            (region.bbox[1] + region.bbox[3]) * 0.5,
        )
    } else {
        mean(&region.landmarks)
    };

    let base_w = (region.bbox[2] - region.bbox[0]).abs();
    let base_h = (region.bbox[3] - region.bbox[1]).abs();
    let landmark_span = if region.landmarks.is_empty() {
        0.0
    } else {
        let (min_x, max_x, min_y, max_y) = region
            .landmarks
            .iter()
            .fold((f32::MAX, f32::MIN, f32::MAX, f32::MIN), |acc, (x, y)| {
                (acc.0.min(*x), acc.1.max(*x), acc.2.min(*y), acc.3.max(*y))
            });
        (max_x - min_x).max(max_y - min_y)
    };
    // The palm box leaves the fingers out; the crop has to cover them.
    let side = base_w.max(base_h).max(landmark_span).max(MIN_CROP_SIDE) * CROP_EXPANSION;

    HandCrop {
        center,
        side,
        angle: estimate_orientation(&region.landmarks),
    }
}

/// Principal axis of the palm keypoints, rotated so fingers point up.
fn estimate_orientation(points: &[(f32, f32)]) -> f32 {
    if points.len() < 2 {
        return 0.0;
    }

    let (mx, my) = mean(points);
    let n = points.len() as f32;
    let (cov_xx, cov_xy, cov_yy) = points.iter().fold((0.0, 0.0, 0.0), |acc, (x, y)| {
        let (dx, dy) = (x - mx, y - my);
        (acc.0 + dx * dx / n, acc.1 + dx * dy / n, acc.2 + dy * dy / n)
    });

    let trace = cov_xx + cov_yy;
    let det = cov_xx * cov_yy - cov_xy * cov_xy;
    let lambda1 = (trace * 0.5 + ((trace * 0.5).powi(2) - det).max(0.0).sqrt()).max(1e-6);
    let (vx, vy) = if cov_xy.abs() > 1e-6 {
        (lambda1 - cov_yy, cov_xy)
    } else if cov_xx >= cov_yy {
        (1.0, 0.0)
    } else {
        (0.0, 1.0)
    };

    vy.atan2(vx) - PI * 0.5
}

fn mean(points: &[(f32, f32)]) -> (f32, f32) {
    let (sx, sy) = points
        .iter()
        .fold((0.0_f32, 0.0_f32), |acc, p| (acc.0 + p.0, acc.1 + p.1));
    let n = points.len().max(1) as f32;
    (sx / n, sy / n)
}

fn nms(candidates: &[PalmRegion], threshold: f32, top_k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|a, b| {
        candidates[*b]
            .score
            .partial_cmp(&candidates[*a].score)
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<usize> = Vec::new();
    for idx in order {
        if keep.len() >= top_k {
            break;
        }
        let suppressed = keep
            .iter()
            .any(|&k| iou(&candidates[idx].bbox, &candidates[k].bbox) >= threshold);
        if !suppressed {
            keep.push(idx);
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }

    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn clamp_box(bbox: [f32; 4], w: u32, h: u32) -> [f32; 4] {
    let max_w = (w.saturating_sub(1)) as f32;
    let max_h = (h.saturating_sub(1)) as f32;
    [
        bbox[0].clamp(0.0, max_w),
        bbox[1].clamp(0.0, max_h),
        bbox[2].clamp(0.0, max_w),
        bbox[3].clamp(0.0, max_h),
    ]
}
