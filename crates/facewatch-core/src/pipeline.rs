//! Detect → preprocess → classify → annotate orchestration.
//!
//! [`StreamPipeline`] turns a [`FrameSource`] into an endless iterator of
//! multipart JPEG parts and feeds the shared [`RecognitionHistory`] on a
//! fixed cadence. [`OneShotPipeline`] runs the same chain on one image
//! without touching history.

use crate::annotate::FrameAnnotator;
use crate::classifier::IdentityClassifier;
use crate::detector::Detector;
use crate::encode::{self, DEFAULT_JPEG_QUALITY};
use crate::history::RecognitionHistory;
use crate::preprocess::{self, FramePreprocessor};
use crate::source::FrameSource;
use crate::types::{Prediction, Recognition};
use image::RgbImage;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_PROCESS_EVERY_N_FRAMES: u64 = 5;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Face detector and identity classifier bundled for per-frame use.
pub struct Recognizer {
    detector: Box<dyn Detector>,
    preprocessor: FramePreprocessor,
    classifier: IdentityClassifier,
}

/// Recognizer shared between the stream loop and one-shot requests.
/// Inference needs `&mut`, so access is serialized.
pub type SharedRecognizer = Arc<Mutex<Recognizer>>;

impl Recognizer {
    pub fn new(detector: Box<dyn Detector>, classifier: IdentityClassifier) -> Self {
        Self {
            detector,
            preprocessor: FramePreprocessor::new(),
            classifier,
        }
    }

    pub fn into_shared(self) -> SharedRecognizer {
        Arc::new(Mutex::new(self))
    }

    pub fn classifier(&self) -> &IdentityClassifier {
        &self.classifier
    }

    /// Detect and classify every face in `frame`.
    ///
    /// A face that fails preprocessing or classification is logged and
    /// skipped; the remaining faces are still returned.
    pub fn recognize(&mut self, frame: &RgbImage) -> Vec<Recognition> {
        let gray = preprocess::to_gray(frame);
        let boxes = self.detector.detect(&gray);

        let mut recognitions = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let tensor = match self.preprocessor.preprocess(frame, &bbox) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(error = %e, ?bbox, "skipping face: preprocessing failed");
                    continue;
                }
            };
            match self.classifier.classify(&tensor) {
                Ok(prediction) => recognitions.push(Recognition { bbox, prediction }),
                Err(e) => tracing::warn!(error = %e, ?bbox, "skipping face: classification failed"),
            }
        }
        recognitions
    }
}

/// Result of a one-shot analysis.
pub struct Analysis {
    pub annotated: RgbImage,
    pub predictions: Vec<Prediction>,
}

/// Single-image detect/classify/annotate. Never writes history.
#[derive(Clone)]
pub struct OneShotPipeline {
    recognizer: SharedRecognizer,
    annotator: FrameAnnotator,
}

impl OneShotPipeline {
    pub fn new(recognizer: SharedRecognizer) -> Self {
        Self {
            recognizer,
            annotator: FrameAnnotator::new(),
        }
    }

    pub fn analyze(&self, frame: &RgbImage) -> Analysis {
        let recognitions = self.recognizer.lock().recognize(frame);
        let annotated = self.annotator.annotate(frame, &recognitions);
        tracing::debug!(faces = recognitions.len(), "one-shot analysis complete");
        Analysis {
            annotated,
            predictions: recognitions.into_iter().map(|r| r.prediction).collect(),
        }
    }
}

/// Tunables for [`StreamPipeline`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamConfig {
    /// History is updated on every Nth successfully read frame.
    pub process_every_n_frames: u64,
    /// Pause after a failed frame read before retrying.
    pub retry_backoff: Duration,
    pub jpeg_quality: u8,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            process_every_n_frames: DEFAULT_PROCESS_EVERY_N_FRAMES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Lazy, endless sequence of annotated multipart JPEG parts.
///
/// Each `next()` reads exactly as many frames as it needs to produce one
/// part; nothing is buffered ahead of the consumer. The sequence ends
/// when the source reports exhaustion or the cancel check fires.
pub struct StreamPipeline<S> {
    source: S,
    recognizer: SharedRecognizer,
    history: Arc<RecognitionHistory>,
    annotator: FrameAnnotator,
    config: StreamConfig,
    frame_count: u64,
    cancel: Option<Box<dyn Fn() -> bool + Send>>,
}

impl<S: FrameSource> StreamPipeline<S> {
    pub fn new(
        source: S,
        recognizer: SharedRecognizer,
        history: Arc<RecognitionHistory>,
        config: StreamConfig,
    ) -> Self {
        Self {
            source,
            recognizer,
            history,
            annotator: FrameAnnotator::new(),
            config: StreamConfig {
                process_every_n_frames: config.process_every_n_frames.max(1),
                ..config
            },
            frame_count: 0,
            cancel: None,
        }
    }

    /// End the sequence while reads are failing once `cancelled` returns true.
    pub fn with_cancel(mut self, cancelled: impl Fn() -> bool + Send + 'static) -> Self {
        self.cancel = Some(Box::new(cancelled));
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|check| check())
    }

    /// Number of frames successfully read so far.
    pub fn frames_read(&self) -> u64 {
        self.frame_count
    }

    fn next_frame(&mut self) -> Option<RgbImage> {
        loop {
            match self.source.next_frame() {
                Ok(Some(frame)) => return Some(frame),
                Ok(None) => {
                    tracing::info!(frames = self.frame_count, "frame source exhausted");
                    return None;
                }
                Err(e) => {
                    if self.cancelled() {
                        tracing::info!(error = %e, "frame read failed after consumer left; stopping");
                        return None;
                    }
                    tracing::warn!(error = %e, "frame read failed; retrying");
                    std::thread::sleep(self.config.retry_backoff);
                }
            }
        }
    }
}

impl<S: FrameSource> Iterator for StreamPipeline<S> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        loop {
            let frame = self.next_frame()?;
            self.frame_count += 1;

            // One detection pass per frame serves both display and history.
            let recognitions = self.recognizer.lock().recognize(&frame);
            if self.frame_count % self.config.process_every_n_frames == 0 {
                for recognition in &recognitions {
                    self.history.record(&recognition.prediction);
                }
            }

            let annotated = self.annotator.annotate(&frame, &recognitions);
            match encode::encode_jpeg(&annotated, self.config.jpeg_quality) {
                Ok(jpeg) => return Some(encode::multipart_part(&jpeg)),
                Err(e) => {
                    tracing::warn!(error = %e, frame = self.frame_count, "dropping frame: encoding failed");
                }
            }
        }
    }
}
