//! Image preprocessing for OCR models
//!
//! Handles image resizing, normalization, and tensor conversion for PaddleOCR models.

use image::RgbImage;
use ndarray::{Array3, Array4};

/// Preprocessing configuration
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Longest side fed to the detection model; larger pages are scaled down
    pub det_limit_side: u32,
    /// Mean values for detection normalization [R, G, B]
    pub det_mean: [f32; 3],
    /// Std values for detection normalization [R, G, B]
    pub det_std: [f32; 3],
    /// Target height for recognition model (typically 32 or 48)
    pub rec_target_height: u32,
    /// Maximum width for recognition
    pub rec_max_width: u32,
    /// Mean values for recognition normalization [R, G, B]
    pub rec_mean: [f32; 3],
    /// Std values for recognition normalization [R, G, B]
    pub rec_std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            det_limit_side: 960,
            // DBNet was trained with ImageNet statistics
            det_mean: [0.485, 0.456, 0.406],
            det_std: [0.229, 0.224, 0.225],
            rec_target_height: 48,
            rec_max_width: 1280,
            // Recognition maps [0, 255] -> [-1, 1]
            rec_mean: [0.5, 0.5, 0.5],
            rec_std: [0.5, 0.5, 0.5],
        }
    }
}

/// Convert an RGB image to an HWC f32 array in 0-1
pub fn rgb_to_f32(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut rgb = Array3::<f32>::zeros((height as usize, width as usize, 3));

    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            rgb[[y as usize, x as usize, c]] = pixel.0[c] as f32 / 255.0;
        }
    }

    rgb
}

/// Normalize image with mean and std
pub fn normalize(image: &Array3<f32>, mean: &[f32; 3], std: &[f32; 3]) -> Array3<f32> {
    let (h, w, _) = image.dim();
    let mut normalized = Array3::<f32>::zeros((h, w, 3));

    for y in 0..h {
        for x in 0..w {
            for c in 0..3 {
                normalized[[y, x, c]] = (image[[y, x, c]] - mean[c]) / std[c];
            }
        }
    }

    normalized
}

/// Convert HWC image to NCHW tensor (batch size 1)
pub fn hwc_to_nchw(image: &Array3<f32>) -> Array4<f32> {
    let (h, w, c) = image.dim();
    let mut tensor = Array4::<f32>::zeros((1, c, h, w));

    for y in 0..h {
        for x in 0..w {
            for ch in 0..c {
                tensor[[0, ch, y, x]] = image[[y, x, ch]];
            }
        }
    }

    tensor
}

/// Bilinear resize of `image` into the top-left `new_h` x `new_w` corner of a
/// zeroed `out_h` x `out_w` canvas
fn bilinear_into(
    image: &Array3<f32>,
    new_h: usize,
    new_w: usize,
    out_h: usize,
    out_w: usize,
) -> Array3<f32> {
    let (h, w, c) = image.dim();
    let mut resized = Array3::<f32>::zeros((out_h, out_w, c));
    if h == 0 || w == 0 {
        return resized;
    }

    let scale_y = new_h as f32 / h as f32;
    let scale_x = new_w as f32 / w as f32;

    for y in 0..new_h.min(out_h) {
        for x in 0..new_w.min(out_w) {
            let src_y = (y as f32 / scale_y).min(h as f32 - 1.0);
            let src_x = (x as f32 / scale_x).min(w as f32 - 1.0);

            let y0 = src_y.floor() as usize;
            let y1 = (y0 + 1).min(h - 1);
            let x0 = src_x.floor() as usize;
            let x1 = (x0 + 1).min(w - 1);

            let fy = src_y - y0 as f32;
            let fx = src_x - x0 as f32;

            for ch in 0..c {
                let v00 = image[[y0, x0, ch]];
                let v01 = image[[y0, x1, ch]];
                let v10 = image[[y1, x0, ch]];
                let v11 = image[[y1, x1, ch]];

                let v0 = v00 * (1.0 - fx) + v01 * fx;
                let v1 = v10 * (1.0 - fx) + v11 * fx;
                resized[[y, x, ch]] = v0 * (1.0 - fy) + v1 * fy;
            }
        }
    }

    resized
}

/// Resize for the detection model.
///
/// Only scales down, then pads each side to a multiple of 32 as the model
/// requires. Returns (resized_image, scale_factor).
pub fn resize_for_detection(image: &Array3<f32>, limit_side: u32) -> (Array3<f32>, f32) {
    let (h, w, _) = image.dim();
    let longest = h.max(w).max(1) as f32;

    let scale = (limit_side as f32 / longest).min(1.0);
    let new_h = ((h as f32 * scale) as usize).max(1);
    let new_w = ((w as f32 * scale) as usize).max(1);

    let padded_h = new_h.div_ceil(32) * 32;
    let padded_w = new_w.div_ceil(32) * 32;

    (bilinear_into(image, new_h, new_w, padded_h, padded_w), scale)
}

/// Resize image for recognition model (fixed height, variable width)
pub fn resize_for_recognition(
    image: &Array3<f32>,
    target_height: u32,
    max_width: u32,
) -> Array3<f32> {
    let (h, w, _) = image.dim();
    let scale = target_height as f32 / h.max(1) as f32;
    let new_w = ((w as f32 * scale).ceil() as u32).clamp(1, max_width) as usize;
    let new_h = target_height as usize;

    bilinear_into(image, new_h, new_w, new_h, new_w)
}

/// Crop the axis-aligned envelope of a quadrilateral
pub fn crop_quad(image: &Array3<f32>, quad: &[(f32, f32); 4]) -> Array3<f32> {
    let min_x = quad.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
    let min_y = quad.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
    let max_x = quad.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
    let max_y = quad.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);

    let (img_h, img_w, c) = image.dim();
    if img_h == 0 || img_w == 0 {
        return Array3::<f32>::zeros((1, 1, c));
    }

    let x1 = (min_x.max(0.0) as usize).min(img_w - 1);
    let y1 = (min_y.max(0.0) as usize).min(img_h - 1);
    let x2 = (max_x.max(0.0).ceil() as usize).min(img_w);
    let y2 = (max_y.max(0.0).ceil() as usize).min(img_h);

    if x2 <= x1 || y2 <= y1 {
        return Array3::<f32>::zeros((1, 1, c));
    }

    image
        .slice(ndarray::s![y1..y2, x1..x2, ..])
        .to_owned()
}

/// Full preprocessing pipeline for detection
pub fn preprocess_for_detection(image: &RgbImage, config: &PreprocessConfig) -> (Array4<f32>, f32) {
    let rgb = rgb_to_f32(image);
    let (resized, scale) = resize_for_detection(&rgb, config.det_limit_side);
    let normalized = normalize(&resized, &config.det_mean, &config.det_std);
    (hwc_to_nchw(&normalized), scale)
}

/// Full preprocessing pipeline for recognition
pub fn preprocess_for_recognition(crop: &Array3<f32>, config: &PreprocessConfig) -> Array4<f32> {
    let resized = resize_for_recognition(crop, config.rec_target_height, config.rec_max_width);
    let normalized = normalize(&resized, &config.rec_mean, &config.rec_std);
    hwc_to_nchw(&normalized)
}
