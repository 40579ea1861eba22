//! Draws detection boxes and identity labels onto frames.

use crate::glyphs::{self, GLYPH_HEIGHT};
use crate::types::{BoundingBox, Prediction, Recognition};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

const HIGH_CONFIDENCE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LOW_CONFIDENCE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const BOX_THICKNESS: u32 = 2;
const LABEL_SCALE: u32 = 2;
/// Gap between the label baseline and the top of the box.
const LABEL_OFFSET: i32 = 10;

/// Renders recognitions onto a copy of the frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameAnnotator;

impl FrameAnnotator {
    pub fn new() -> Self {
        Self
    }

    /// Return an annotated copy of `frame`; the input is left untouched.
    pub fn annotate(&self, frame: &RgbImage, recognitions: &[Recognition]) -> RgbImage {
        let mut annotated = frame.clone();
        for recognition in recognitions {
            self.draw(&mut annotated, &recognition.bbox, &recognition.prediction);
        }
        annotated
    }

    fn draw(&self, img: &mut RgbImage, bbox: &BoundingBox, prediction: &Prediction) {
        let (img_w, img_h) = img.dimensions();
        let Some(bbox) = bbox.clamp_to(img_w, img_h) else {
            return;
        };
        let color = tier_color(prediction);

        for inset in 0..BOX_THICKNESS {
            let w = bbox.width.saturating_sub(2 * inset);
            let h = bbox.height.saturating_sub(2 * inset);
            if w == 0 || h == 0 {
                break;
            }
            let rect = Rect::at((bbox.x + inset) as i32, (bbox.y + inset) as i32).of_size(w, h);
            draw_hollow_rect_mut(img, rect, color);
        }

        let text = label(prediction);
        let text_h = (GLYPH_HEIGHT * LABEL_SCALE) as i32;
        let text_y = (bbox.y as i32 - LABEL_OFFSET - text_h).max(0);
        glyphs::draw_text(img, bbox.x as i32, text_y, &text, LABEL_SCALE, color);
    }
}

/// `"<identity> (<confidence>%)"` with one decimal.
pub fn label(prediction: &Prediction) -> String {
    format!("{} ({:.1}%)", prediction.identity, prediction.confidence * 100.0)
}

fn tier_color(prediction: &Prediction) -> Rgb<u8> {
    if prediction.is_high_confidence() {
        HIGH_CONFIDENCE_COLOR
    } else {
        LOW_CONFIDENCE_COLOR
    }
}
