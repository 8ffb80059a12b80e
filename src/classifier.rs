//! Digit classifier fed with a square crop of the palm.
//!
//! The crop is the palm box clamped to the frame, scaled so its longer side
//! is 64 pixels and centred on a black 64x64 canvas. Odd leftover padding
//! goes to the bottom and right edges.

use std::{cmp::Ordering, path::Path};

use anyhow::{Context, Result, anyhow};
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use rayon::prelude::*;

use crate::{
    error::ClassifierError,
    pipeline::keypoints::{paste_on_canvas, resize_rgba},
    types::{Frame, PalmBoundingBox},
};

pub const CLASSIFIER_INPUT_SIZE: u32 = 64;
pub const MAX_DIGIT: u8 = 5;

/// Where a `width`×`height` region lands on the square canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanvasLayout {
    pub new_w: u32,
    pub new_h: u32,
    pub left: u32,
    pub top: u32,
}

pub fn canvas_layout(width: u32, height: u32, size: u32) -> CanvasLayout {
    let ratio = size as f64 / width.max(height).max(1) as f64;
    let new_w = ((ratio * width as f64) as u32).clamp(1, size);
    let new_h = ((ratio * height as f64) as u32).clamp(1, size);
    CanvasLayout {
        new_w,
        new_h,
        left: (size - new_w) / 2,
        top: (size - new_h) / 2,
    }
}

/// Cuts the palm out of `frame` and returns the classifier input as an
/// NCHW RGB tensor in `[0, 1]`.
pub fn prepare_palm_crop(frame: &Frame, palm_box: &PalmBoundingBox) -> Result<Array4<f32>> {
    let region = palm_box
        .clamp_to_frame(frame.width, frame.height)
        .ok_or(ClassifierError::EmptyRegion {
            width: palm_box.width(),
            height: palm_box.height(),
        })?;

    let (w, h) = (region.width() as u32, region.height() as u32);
    let row_bytes = w as usize * 4;
    let mut pixels = Vec::with_capacity(row_bytes * h as usize);
    for y in region.ymin..region.ymax {
        let start = (y as usize * frame.width as usize + region.xmin as usize) * 4;
        let row = frame
            .rgba
            .get(start..start + row_bytes)
            .ok_or_else(|| anyhow!("frame buffer too small for row {y}"))?;
        pixels.extend_from_slice(row);
    }

    let size = CLASSIFIER_INPUT_SIZE;
    let layout = canvas_layout(w, h, size);
    let resized = resize_rgba(&pixels, w, h, layout.new_w, layout.new_h)?;
    let canvas = paste_on_canvas(
        &resized,
        layout.new_w,
        layout.new_h,
        size,
        layout.left as usize,
        layout.top as usize,
    );

    let planes: Vec<f32> = (0..3usize)
        .into_par_iter()
        .flat_map_iter(|c| canvas.chunks_exact(4).map(move |px| px[c] as f32 / 255.0))
        .collect();
    Array4::<f32>::from_shape_vec((1, 3, size as usize, size as usize), planes)
        .map_err(|err| anyhow!("failed to build classifier tensor: {err}"))
}

pub struct DigitClassifier {
    session: Session,
}

impl DigitClassifier {
    pub fn new(model_path: &Path) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!(
                    "failed to load digit classifier from {}",
                    model_path.display()
                )
            })?;
        log::info!("digit classifier ready using {}", model_path.display());
        Ok(Self { session })
    }

    /// Returns the index of the highest logit.
    pub fn classify(&mut self, input: Array4<f32>) -> Result<usize> {
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run digit classifier")?;
        if outputs.len() < 1 {
            return Err(ClassifierError::NoLogits.into());
        }
        let logits = outputs[0].try_extract_array::<f32>()?;
        argmax(logits.iter().copied()).ok_or_else(|| ClassifierError::NoLogits.into())
    }
}

pub fn argmax(values: impl IntoIterator<Item = f32>) -> Option<usize> {
    values
        .into_iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal))
        .map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn gradient_frame(width: u32, height: u32) -> Frame {
        let rgba = (0..height)
            .flat_map(|y| (0..width).flat_map(move |x| [x as u8, y as u8, 128, 255]))
            .collect();
        Frame {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn wide_region_is_centred_vertically() {
        let layout = canvas_layout(200, 100, 64);
        assert_eq!(
            layout,
            CanvasLayout {
                new_w: 64,
                new_h: 32,
                left: 0,
                top: 16
            }
        );
    }

    #[test]
    fn odd_padding_favours_bottom_right() {
        let layout = canvas_layout(100, 150, 64);
        // 64 / 150 * 100 = 42.67, truncated
        assert_eq!(layout.new_w, 42);
        assert_eq!(layout.new_h, 64);
        assert_eq!(layout.left, 11);
        assert_eq!(64 - layout.left - layout.new_w, 11);

        let layout = canvas_layout(3, 200, 64);
        assert_eq!(layout.new_w, 1);
        assert_eq!(layout.left, 31);
        assert_eq!(64 - layout.left - layout.new_w, 32);
    }

    #[test]
    fn crop_is_clamped_and_normalised() {
        let frame = gradient_frame(120, 80);
        let palm_box = PalmBoundingBox {
            xmin: -50,
            ymin: -50,
            xmax: 60,
            ymax: 200,
        };
        let tensor = prepare_palm_crop(&frame, &palm_box).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
        // Clamped region is 60x80, so the canvas has black side bars.
        assert_eq!(tensor[[0, 2, 32, 0]], 0.0);
        assert!((tensor[[0, 2, 32, 32]] - 128.0 / 255.0).abs() < 1e-2);
    }

    #[test]
    fn crop_outside_frame_is_rejected() {
        let frame = gradient_frame(40, 40);
        let palm_box = PalmBoundingBox {
            xmin: 50,
            ymin: 0,
            xmax: 90,
            ymax: 30,
        };
        let err = prepare_palm_crop(&frame, &palm_box).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ClassifierError>(),
            Some(ClassifierError::EmptyRegion { .. })
        ));
    }

    #[test]
    fn argmax_picks_largest_logit() {
        assert_eq!(argmax([0.1, 2.0, -1.0, 1.9]), Some(1));
        assert_eq!(argmax(std::iter::empty()), None);
    }
}
