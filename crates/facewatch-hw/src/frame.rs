//! Raw capture buffer conversions: YUYV, MJPG, GREY and Y16 to RGB.

use image::{GrayImage, ImageFormat, RgbImage};

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid {format} buffer length: expected {expected}, got {actual}")]
    InvalidLength {
        format: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("MJPG decode failed: {0}")]
    Mjpg(#[source] image::ImageError),
    #[error("decoded frame is {actual_w}x{actual_h}, negotiated {width}x{height}")]
    SizeMismatch {
        width: u32,
        height: u32,
        actual_w: u32,
        actual_h: u32,
    },
}

fn check_len(format: &'static str, buf: &[u8], expected: usize) -> Result<(), FrameError> {
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            format,
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// Convert packed YUYV (4:2:2) to RGB with full-range BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share
/// the chroma pair.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let pixels = (width * height) as usize;
    check_len("YUYV", yuyv, pixels * 2)?;

    let mut rgb = Vec::with_capacity(pixels * 3);
    for chunk in yuyv[..pixels * 2].chunks_exact(4) {
        let (u, v) = (chunk[1], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(chunk[0], u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(chunk[2], u, v));
    }
    // Odd widths leave a trailing half pair.
    if pixels % 2 == 1 {
        let tail = &yuyv[(pixels - 1) * 2..pixels * 2];
        rgb.extend_from_slice(&ycbcr_to_rgb(tail[0], tail[1], 128));
    }
    to_image(width, height, rgb)
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let cb = u as f32 - 128.0;
    let cr = v as f32 - 128.0;
    let r = y + 1.402 * cr;
    let g = y - 0.344_136 * cb - 0.714_136 * cr;
    let b = y + 1.772 * cb;
    [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Decode one motion-JPEG buffer.
pub fn mjpg_to_rgb(buf: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let rgb = image::load_from_memory_with_format(buf, ImageFormat::Jpeg)
        .map_err(FrameError::Mjpg)?
        .to_rgb8();
    if rgb.dimensions() != (width, height) {
        return Err(FrameError::SizeMismatch {
            width,
            height,
            actual_w: rgb.width(),
            actual_h: rgb.height(),
        });
    }
    Ok(rgb)
}

/// 8-bit grayscale replicated into three channels.
pub fn grey_to_rgb(buf: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let pixels = (width * height) as usize;
    check_len("GREY", buf, pixels)?;
    let gray = GrayImage::from_raw(width, height, buf[..pixels].to_vec()).ok_or(
        FrameError::InvalidLength {
            format: "GREY",
            expected: pixels,
            actual: buf.len(),
        },
    )?;
    Ok(image::DynamicImage::ImageLuma8(gray).to_rgb8())
}

/// 16-bit little-endian grayscale, reduced to its high byte and replicated.
pub fn y16_to_rgb(buf: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let pixels = (width * height) as usize;
    check_len("Y16", buf, pixels * 2)?;
    let mut rgb = Vec::with_capacity(pixels * 3);
    for px in buf[..pixels * 2].chunks_exact(2) {
        let value = u16::from_le_bytes([px[0], px[1]]);
        let v = (value >> 8) as u8;
        rgb.extend_from_slice(&[v, v, v]);
    }
    to_image(width, height, rgb)
}

fn to_image(width: u32, height: u32, rgb: Vec<u8>) -> Result<RgbImage, FrameError> {
    let actual = rgb.len();
    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        format: "RGB",
        expected: (width * height * 3) as usize,
        actual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_yuyv_neutral_chroma_is_gray() {
        // 2x1 image: [Y0=100, U=128, Y1=200, V=128]
        let rgb = yuyv_to_rgb(&[100, 128, 200, 128], 2, 1).unwrap();
        assert_eq!(*rgb.get_pixel(0, 0), Rgb([100, 100, 100]));
        assert_eq!(*rgb.get_pixel(1, 0), Rgb([200, 200, 200]));
    }

    #[test]
    fn test_yuyv_red_dominant() {
        // Y=76, Cb=85, Cr=255 is pure red in full-range BT.601.
        let rgb = yuyv_to_rgb(&[76, 85, 76, 255], 2, 1).unwrap();
        let Rgb([r, g, b]) = *rgb.get_pixel(0, 0);
        assert!(r >= 250, "r = {r}");
        assert!(g <= 5, "g = {g}");
        assert!(b <= 5, "b = {b}");
    }

    #[test]
    fn test_yuyv_4x2_dimensions() {
        let yuyv: Vec<u8> = (0..16).map(|i| if i % 2 == 0 { i * 10 } else { 128 }).collect();
        let rgb = yuyv_to_rgb(&yuyv, 4, 2).unwrap();
        assert_eq!(rgb.dimensions(), (4, 2));
        assert_eq!(*rgb.get_pixel(1, 1), Rgb([100, 100, 100]));
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(matches!(
            yuyv_to_rgb(&[100, 128], 2, 1),
            Err(FrameError::InvalidLength { format: "YUYV", .. })
        ));
    }

    #[test]
    fn test_grey_replicated() {
        let rgb = grey_to_rgb(&[0, 64, 128, 255], 2, 2).unwrap();
        assert_eq!(*rgb.get_pixel(1, 0), Rgb([64, 64, 64]));
        assert_eq!(*rgb.get_pixel(1, 1), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_grey_too_short() {
        assert!(grey_to_rgb(&[0, 1, 2], 2, 2).is_err());
    }

    #[test]
    fn test_y16_takes_high_byte() {
        // 0x1234 little-endian → [0x34, 0x12]
        let rgb = y16_to_rgb(&[0x34, 0x12, 0xFF, 0xFF], 2, 1).unwrap();
        assert_eq!(*rgb.get_pixel(0, 0), Rgb([0x12, 0x12, 0x12]));
        assert_eq!(*rgb.get_pixel(1, 0), Rgb([0xFF, 0xFF, 0xFF]));
    }

    #[test]
    fn test_mjpg_decode() {
        let src = RgbImage::from_pixel(16, 8, Rgb([90, 90, 90]));
        let mut jpeg = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, 90)
            .encode_image(&src)
            .unwrap();

        let rgb = mjpg_to_rgb(&jpeg, 16, 8).unwrap();
        assert_eq!(rgb.dimensions(), (16, 8));
        assert!(matches!(
            mjpg_to_rgb(&jpeg, 32, 8),
            Err(FrameError::SizeMismatch { actual_w: 16, .. })
        ));
        assert!(matches!(mjpg_to_rgb(b"garbage", 16, 8), Err(FrameError::Mjpg(_))));
    }
}
