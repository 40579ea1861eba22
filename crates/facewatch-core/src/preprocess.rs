//! Face region preprocessing for the identity classifier.
//!
//! Crops a detected face out of an RGB frame, converts it to BT.601
//! luma, resizes it to the classifier's 200×200 input with bilinear
//! interpolation and scales samples into [0, 1].

use crate::types::BoundingBox;
use image::{GrayImage, Luma, RgbImage};
use ndarray::Array4;
use thiserror::Error;

/// Side length of the square classifier input.
pub const FACE_INPUT_SIZE: usize = 200;
const MAX_SAMPLE: f32 = 255.0;

// BT.601 luma weights (same as the training-time grayscale conversion).
const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("face region {0:?} lies outside the {1}x{2} frame")]
    EmptyRegion(BoundingBox, u32, u32),
}

/// Normalized classifier input, shaped (1, 200, 200, 1).
#[derive(Debug, Clone, PartialEq)]
pub struct FaceTensor(Array4<f32>);

impl FaceTensor {
    /// All-zero tensor, used to discover a model's output width.
    pub fn zeros() -> Self {
        Self(Array4::zeros((1, FACE_INPUT_SIZE, FACE_INPUT_SIZE, 1)))
    }

    pub fn as_array(&self) -> &Array4<f32> {
        &self.0
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }
}

/// Converts face regions into [`FaceTensor`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct FramePreprocessor;

impl FramePreprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Produce the classifier input for `bbox` within `frame`.
    pub fn preprocess(
        &self,
        frame: &RgbImage,
        bbox: &BoundingBox,
    ) -> Result<FaceTensor, PreprocessError> {
        let (w, h) = frame.dimensions();
        let region = bbox
            .clamp_to(w, h)
            .ok_or(PreprocessError::EmptyRegion(*bbox, w, h))?;

        let crop = image::imageops::crop_imm(frame, region.x, region.y, region.width, region.height)
            .to_image();
        let gray = to_gray(&crop);
        let resized = resize_bilinear(&gray, FACE_INPUT_SIZE as u32, FACE_INPUT_SIZE as u32);

        let mut tensor = Array4::<f32>::zeros((1, FACE_INPUT_SIZE, FACE_INPUT_SIZE, 1));
        for (x, y, pixel) in resized.enumerate_pixels() {
            tensor[[0, y as usize, x as usize, 0]] = pixel.0[0] as f32 / MAX_SAMPLE;
        }

        Ok(FaceTensor(tensor))
    }
}

/// Convert an RGB frame to single-channel intensity using BT.601 weights.
pub fn to_gray(frame: &RgbImage) -> GrayImage {
    let (w, h) = frame.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let [r, g, b] = frame.get_pixel(x, y).0;
        let luma = LUMA_R * r as f32 + LUMA_G * g as f32 + LUMA_B * b as f32;
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// Resize a grayscale image with bilinear interpolation on pixel centers.
///
/// Output samples are rounded back to 8 bits.
pub fn resize_bilinear(src: &GrayImage, new_w: u32, new_h: u32) -> GrayImage {
    let (width, height) = (src.width() as usize, src.height() as usize);
    let (new_w, new_h) = (new_w as usize, new_h as usize);
    if width == 0 || height == 0 || new_w == 0 || new_h == 0 {
        return GrayImage::new(new_w as u32, new_h as u32);
    }

    let data = src.as_raw();
    let inv_scale_x = width as f32 / new_w as f32;
    let inv_scale_y = height as f32 / new_h as f32;
    let mut resized = vec![0u8; new_w * new_h];

    for y in 0..new_h {
        let src_y = (y as f32 + 0.5) * inv_scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);
        let fy = if src_y < 0.0 { 0.0 } else { fy };

        for x in 0..new_w {
            let src_x = (x as f32 + 0.5) * inv_scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);
            let fx = if src_x < 0.0 { 0.0 } else { fx };

            let tl = data[y0 * width + x0] as f32;
            let tr = data[y0 * width + x1] as f32;
            let bl = data[y1 * width + x0] as f32;
            let br = data[y1 * width + x1] as f32;

            let val = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;

            resized[y * new_w + x] = val.round().clamp(0.0, 255.0) as u8;
        }
    }

    GrayImage::from_raw(new_w as u32, new_h as u32, resized)
        .unwrap_or_else(|| GrayImage::new(new_w as u32, new_h as u32))
}
