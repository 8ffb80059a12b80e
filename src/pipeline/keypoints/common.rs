use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{Frame, NUM_KEYPOINTS};

pub const HANDPOSE_INPUT_SIZE: u32 = 224;
pub const PALM_INPUT_SIZE: u32 = 192;

/// Maps model-space coordinates of a letterboxed input back to the frame.
#[derive(Clone, Debug)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

/// Maps model-space coordinates of a rotated square crop back to the frame.
#[derive(Clone, Debug)]
pub struct CropTransform {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
    pub output_size: u32,
    pub orig_w: u32,
    pub orig_h: u32,
}

pub fn check_frame(frame: &Frame) -> Result<()> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }
    Ok(())
}

/// Resizes `frame` to fit a `target_size` square, pads the rest black and
/// returns an NHWC tensor in `[0, 1]`.
pub fn letterbox_frame(frame: &Frame, target_size: u32) -> Result<(Array4<f32>, LetterboxInfo)> {
    check_frame(frame)?;

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = (frame.width as f32 * scale).round().max(1.0) as u32;
    let new_h = (frame.height as f32 * scale).round().max(1.0) as u32;
    let resized = resize_rgba(&frame.rgba, frame.width, frame.height, new_w, new_h)?;

    let pad_x = ((target_size as i64 - new_w as i64) / 2).max(0) as usize;
    let pad_y = ((target_size as i64 - new_h as i64) / 2).max(0) as usize;
    let canvas = paste_on_canvas(&resized, new_w, new_h, target_size, pad_x, pad_y);

    let normalized: Vec<f32> = canvas
        .par_chunks_exact(4)
        .flat_map_iter(|px| {
            [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ]
        })
        .collect();
    let input = Array4::<f32>::from_shape_vec(
        (1, target_size as usize, target_size as usize, 3),
        normalized,
    )
    .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    let letterbox = LetterboxInfo {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    Ok((input, letterbox))
}

pub fn resize_rgba(rgba: &[u8], width: u32, height: u32, new_w: u32, new_h: u32) -> Result<Vec<u8>> {
    let src_image =
        fir::images::Image::from_vec_u8(width, height, rgba.to_vec(), fir::PixelType::U8x4)?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    Ok(dst_image.into_vec())
}

/// Copies an RGBA image onto an opaque black `size`×`size` canvas at the
/// given offset. The image must fit.
pub fn paste_on_canvas(
    rgba: &[u8],
    width: u32,
    height: u32,
    size: u32,
    offset_x: usize,
    offset_y: usize,
) -> Vec<u8> {
    let mut canvas = vec![0u8; (size as usize) * (size as usize) * 4];
    for px in canvas.chunks_mut(4) {
        px[3] = 255;
    }
    let dst_stride = size as usize * 4;
    let src_stride = width as usize * 4;
    for row in 0..(height as usize) {
        let dst_offset = (offset_y + row) * dst_stride + offset_x * 4;
        let src_offset = row * src_stride;
        canvas[dst_offset..dst_offset + src_stride]
            .copy_from_slice(&rgba[src_offset..src_offset + src_stride]);
    }
    canvas
}

pub fn decode_landmarks(flat: &[f32]) -> Result<Vec<[f32; 3]>> {
    if flat.len() < NUM_KEYPOINTS * 3 {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            NUM_KEYPOINTS * 3
        ));
    }

    Ok(flat
        .chunks_exact(3)
        .take(NUM_KEYPOINTS)
        .map(|chunk| [chunk[0], chunk[1], chunk[2]])
        .collect())
}

/// Samples a square of side `side` centred on `center`, rotated by `angle`,
/// into an `output_size` NHWC tensor with bilinear filtering.
pub fn prepare_rotated_crop(
    frame: &Frame,
    center: (f32, f32),
    side: f32,
    angle: f32,
    output_size: u32,
) -> Result<(Array4<f32>, CropTransform)> {
    check_frame(frame)?;

    let half = output_size as f32 / 2.0;
    let scale = side / output_size as f32;
    let (sin, cos) = angle.sin_cos();

    let data: Vec<f32> = (0..output_size)
        .into_par_iter()
        .flat_map_iter(|y| {
            let dy = (y as f32 + 0.5 - half) * scale;
            (0..output_size).flat_map(move |x| {
                let dx = (x as f32 + 0.5 - half) * scale;
                let src_x = center.0 + dx * cos - dy * sin;
                let src_y = center.1 + dx * sin + dy * cos;
                sample_rgb(frame, src_x, src_y)
            })
        })
        .collect();

    let array =
        Array4::<f32>::from_shape_vec((1, output_size as usize, output_size as usize, 3), data)
            .map_err(|err| anyhow!("failed to build rotated crop tensor: {err}"))?;

    let transform = CropTransform {
        center,
        side,
        angle,
        output_size,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    Ok((array, transform))
}

impl CropTransform {
    pub fn project(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let scale = self.side / self.output_size as f32;
        let dx = (x - half) * scale;
        let dy = (y - half) * scale;
        let (sin, cos) = self.angle.sin_cos();
        let ox = self.center.0 + dx * cos - dy * sin;
        let oy = self.center.1 + dx * sin + dy * cos;
        (
            ox.clamp(0.0, (self.orig_w.saturating_sub(1)) as f32),
            oy.clamp(0.0, (self.orig_h.saturating_sub(1)) as f32),
        )
    }

    pub fn project_all(&self, landmarks: &[[f32; 3]]) -> Vec<(f32, f32)> {
        landmarks
            .iter()
            .map(|[x, y, _z]| self.project(*x, *y))
            .collect()
    }
}

fn sample_rgb(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if x.is_nan() || y.is_nan() {
        return [0.0; 3];
    }
    let x0 = x.floor();
    let y0 = y.floor();

    let (w, h) = (frame.width as i32, frame.height as i32);
    let fetch = |cx: f32, cy: f32| -> [f32; 3] {
        let (ix, iy) = (cx as i32, cy as i32);
        if ix < 0 || iy < 0 || ix >= w || iy >= h {
            return [0.0; 3];
        }
        let idx = ((iy as u32 * frame.width + ix as u32) as usize) * 4;
        match frame.rgba.get(idx..idx + 3) {
            Some(px) => [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ],
            None => [0.0; 3],
        }
    };

    let fx = x - x0;
    let fy = y - y0;
    let c00 = fetch(x0, y0);
    let c10 = fetch(x0 + 1.0, y0);
    let c01 = fetch(x0, y0 + 1.0);
    let c11 = fetch(x0 + 1.0, y0 + 1.0);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    std::array::from_fn(|c| lerp(lerp(c00[c], c10[c], fx), lerp(c01[c], c11[c], fx), fy))
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let rgba = (0..width * height)
            .flat_map(|_| [rgb[0], rgb[1], rgb[2], 255])
            .collect();
        Frame {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn rejects_short_buffer() {
        let mut frame = solid_frame(4, 4, [0, 0, 0]);
        frame.rgba.pop();
        assert!(letterbox_frame(&frame, 8).is_err());
    }

    #[test]
    fn decode_needs_all_landmarks() {
        assert!(decode_landmarks(&[0.0; 62]).is_err());
        let flat: Vec<f32> = (0..63).map(|v| v as f32).collect();
        let landmarks = decode_landmarks(&flat).unwrap();
        assert_eq!(landmarks.len(), 21);
        assert_eq!(landmarks[20], [60.0, 61.0, 62.0]);
    }

    #[test]
    fn canvas_places_image_at_offset() {
        let rgba = vec![200u8; 2 * 2 * 4];
        let canvas = paste_on_canvas(&rgba, 2, 2, 4, 1, 2);
        let at = |x: usize, y: usize| &canvas[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(at(0, 0), &[0, 0, 0, 255]);
        assert_eq!(at(1, 2), &[200, 200, 200, 200]);
        assert_eq!(at(2, 3), &[200, 200, 200, 200]);
        assert_eq!(at(3, 3), &[0, 0, 0, 255]);
    }

    #[test]
    fn crop_centre_maps_back_to_centre() {
        let transform = CropTransform {
            center: (320.0, 240.0),
            side: 200.0,
            angle: 0.0,
            output_size: 224,
            orig_w: 640,
            orig_h: 480,
        };
        let (x, y) = transform.project(112.0, 112.0);
        assert!((x - 320.0).abs() < 1e-3);
        assert!((y - 240.0).abs() < 1e-3);

        let (x, _) = transform.project(224.0, 112.0);
        assert!((x - 420.0).abs() < 1e-3);
    }

    #[test]
    fn rotated_crop_of_solid_frame_is_solid() {
        let frame = solid_frame(32, 32, [255, 0, 0]);
        let (tensor, _) = prepare_rotated_crop(&frame, (16.0, 16.0), 8.0, 0.3, 4).unwrap();
        assert_eq!(tensor.shape(), &[1, 4, 4, 3]);
        for v in tensor.slice(ndarray::s![0, .., .., 0]).iter() {
            assert!((v - 1.0).abs() < 1e-5);
        }
    }
}
