use serde::{Deserialize, Serialize};

/// Confidence boundary (as a fraction) shared by history acceptance and
/// the annotation color tier.
pub const HIGH_CONFIDENCE: f32 = 0.75;

/// Integer rectangle for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Clip the box to a `frame_width` × `frame_height` frame.
    ///
    /// Returns `None` when nothing of the box lies inside the frame.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<BoundingBox> {
        if self.x >= frame_width || self.y >= frame_height {
            return None;
        }
        let width = self.width.min(frame_width - self.x);
        let height = self.height.min(frame_height - self.y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(BoundingBox::new(self.x, self.y, width, height))
    }
}

/// Classifier output for a single face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub identity: String,
    /// Maximum class probability, in [0, 1].
    pub confidence: f32,
}

impl Prediction {
    pub fn new(identity: impl Into<String>, confidence: f32) -> Self {
        Self {
            identity: identity.into(),
            confidence,
        }
    }

    /// Confidence as a percentage rounded to two decimals.
    pub fn confidence_pct(&self) -> f32 {
        ((self.confidence as f64 * 100.0 * 100.0).round() / 100.0) as f32
    }

    pub fn is_high_confidence(&self) -> bool {
        self.confidence > HIGH_CONFIDENCE
    }
}

/// A detected face together with its classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub bbox: BoundingBox,
    pub prediction: Prediction,
}

/// An accepted recognition event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub identity: String,
    /// Percentage, 0–100.
    pub confidence: f32,
    /// Local wall-clock time, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
}
