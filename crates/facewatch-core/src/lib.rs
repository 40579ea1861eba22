//! facewatch-core: Face detection and identity recognition engine.
//!
//! Faces are found with a pure-Rust Haar cascade evaluator and identified
//! by an ONNX classification model running on ONNX Runtime. Annotated
//! frames are encoded for streaming, and confident identities are kept
//! in an in-memory recognition history.

pub mod annotate;
pub mod classifier;
pub mod detector;
pub mod encode;
pub mod glyphs;
pub mod history;
pub mod labels;
pub mod pipeline;
pub mod preprocess;
pub mod source;
pub mod types;

pub use classifier::{IdentityClassifier, OnnxModel, ScoreModel};
pub use detector::{CascadeDetector, Detector, DetectorParams, HaarCascade};
pub use history::RecognitionHistory;
pub use labels::LabelSet;
pub use pipeline::{Analysis, OneShotPipeline, Recognizer, SharedRecognizer, StreamConfig, StreamPipeline};
pub use source::{FrameSource, SourceError};
pub use types::{BoundingBox, HistoryEntry, Prediction, Recognition};
