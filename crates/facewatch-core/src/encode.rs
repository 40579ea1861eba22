//! Frame encoding for delivery: JPEG, multipart stream parts, data URIs.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use thiserror::Error;

/// Boundary token of the `multipart/x-mixed-replace` stream.
pub const STREAM_BOUNDARY: &str = "frame";
/// Content type of the continuous stream response.
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("JPEG encoding failed: {0}")]
    Jpeg(#[source] image::ImageError),
    #[error("image could not be decoded: {0}")]
    Decode(#[source] image::ImageError),
}

/// Encode an RGB frame as baseline JPEG.
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(frame)
        .map_err(EncodeError::Jpeg)?;
    Ok(buf)
}

/// Wrap one JPEG in a `--frame` multipart part.
pub fn multipart_part(jpeg: &[u8]) -> Vec<u8> {
    let head = format!("--{STREAM_BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
    let mut part = Vec::with_capacity(head.len() + jpeg.len() + 2);
    part.extend_from_slice(head.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

/// `data:image/jpeg;base64,...` URI for embedding in JSON responses.
pub fn data_uri(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg))
}

/// Decode any supported image format into an RGB frame.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, EncodeError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(EncodeError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::FrameAnnotator;
    use crate::types::{BoundingBox, Prediction, Recognition};
    use image::Rgb;

    fn test_frame() -> RgbImage {
        RgbImage::from_fn(160, 120, |x, y| Rgb([(x * 255 / 160) as u8, (y * 255 / 120) as u8, 96]))
    }

    fn mean_abs_diff(a: &RgbImage, b: &RgbImage) -> f64 {
        let total: u64 = a
            .as_raw()
            .iter()
            .zip(b.as_raw())
            .map(|(&p, &q)| (p as i32 - q as i32).unsigned_abs() as u64)
            .sum();
        total as f64 / a.as_raw().len() as f64
    }

    #[test]
    fn test_jpeg_round_trip_is_visually_equivalent() {
        let annotated = FrameAnnotator::new().annotate(
            &test_frame(),
            &[Recognition {
                bbox: BoundingBox::new(40, 40, 60, 60),
                prediction: Prediction::new("alice", 0.9),
            }],
        );
        let jpeg = encode_jpeg(&annotated, 90).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = decode_image(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), annotated.dimensions());
        let mad = mean_abs_diff(&annotated, &decoded);
        assert!(mad < 8.0, "mean abs diff too large: {mad}");
    }

    #[test]
    fn test_multipart_part_layout() {
        let part = multipart_part(b"JPEGDATA");
        assert_eq!(part, b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEGDATA\r\n".to_vec());
    }

    #[test]
    fn test_data_uri_prefix() {
        let uri = data_uri(&[0xFF, 0xD8, 0xFF]);
        assert_eq!(uri, "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(decode_image(b"not an image"), Err(EncodeError::Decode(_))));
    }

    #[test]
    fn test_quality_is_clamped() {
        assert!(encode_jpeg(&test_frame(), 0).is_ok());
        assert!(encode_jpeg(&test_frame(), 255).is_ok());
    }
}
