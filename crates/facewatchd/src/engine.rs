use crate::config::Config;
use crate::error::StartupError;
use bytes::Bytes;
use facewatch_core::classifier::{IdentityClassifier, OnnxModel};
use facewatch_core::detector::CascadeDetector;
use facewatch_core::history::RecognitionHistory;
use facewatch_core::labels::LabelSet;
use facewatch_core::pipeline::{Recognizer, SharedRecognizer, StreamConfig, StreamPipeline};
use facewatch_core::source::{FrameSource, SourceError};
use image::RgbImage;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("video stream already in use")]
    Busy,
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("failed to spawn stream thread: {0}")]
    Spawn(#[source] std::io::Error),
}

pub type BoxedSource = Box<dyn FrameSource + Send>;
pub type Opener = Box<dyn Fn() -> Result<BoxedSource, SourceError> + Send + Sync>;

/// Load the cascade, labels and classifier from the model directory.
///
/// Fails fast if any of them is missing or if the model's output width
/// does not match the label count.
pub fn load_recognizer(config: &Config) -> Result<Recognizer, StartupError> {
    let cascade_path = config.cascade_path();
    let detector = CascadeDetector::load(&cascade_path, config.detector_params())?;
    tracing::info!(path = %cascade_path, "face cascade loaded");

    let labels_path = config.labels_path();
    let labels = LabelSet::load(&labels_path)?;
    tracing::info!(path = %labels_path, count = labels.len(), "labels loaded");

    let model = OnnxModel::load(&config.model_path(), config.intra_threads)?;
    let classifier = IdentityClassifier::new(Box::new(model), labels)?;

    Ok(Recognizer::new(Box::new(detector), classifier))
}

/// Holder of the single frame source. At most one stream can lease it
/// at a time; the lease puts the source back when dropped.
pub struct SourceSlot {
    source: Mutex<Option<BoxedSource>>,
    leased: AtomicBool,
    opener: Opener,
}

impl SourceSlot {
    /// `initial` is the source opened at startup, if any. `opener` is
    /// called on lease whenever the slot is empty.
    pub fn new(initial: Option<BoxedSource>, opener: Opener) -> Self {
        Self {
            source: Mutex::new(initial),
            leased: AtomicBool::new(false),
            opener,
        }
    }

    pub fn is_active(&self) -> bool {
        self.leased.load(Ordering::SeqCst)
    }

    pub fn lease(self: &Arc<Self>) -> Result<StreamLease, EngineError> {
        if self.leased.swap(true, Ordering::SeqCst) {
            return Err(EngineError::Busy);
        }

        let existing = self.source.lock().take();
        let source = match existing {
            Some(source) => source,
            None => match (self.opener)() {
                Ok(source) => {
                    tracing::info!("frame source reopened");
                    source
                }
                Err(e) => {
                    self.leased.store(false, Ordering::SeqCst);
                    return Err(EngineError::Unavailable(e.to_string()));
                }
            },
        };

        Ok(StreamLease {
            slot: Arc::clone(self),
            source: Some(source),
        })
    }
}

/// Exclusive hold on the slot's source.
pub struct StreamLease {
    slot: Arc<SourceSlot>,
    source: Option<BoxedSource>,
}

impl FrameSource for StreamLease {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
        match self.source.as_mut() {
            Some(source) => source.next_frame(),
            None => Ok(None),
        }
    }
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        *self.slot.source.lock() = self.source.take();
        self.slot.leased.store(false, Ordering::SeqCst);
        tracing::debug!("frame source returned to slot");
    }
}

/// Run a [`StreamPipeline`] over `lease` on a dedicated OS thread.
///
/// Parts are handed over through a channel of capacity 1, so the camera
/// is only read as fast as the client consumes. The thread exits once
/// the receiver is dropped or the source is exhausted, releasing the
/// lease.
pub fn spawn_stream(
    lease: StreamLease,
    recognizer: SharedRecognizer,
    history: Arc<RecognitionHistory>,
    config: StreamConfig,
) -> Result<mpsc::Receiver<Bytes>, EngineError> {
    let (tx, rx) = mpsc::channel::<Bytes>(1);
    let watch = tx.clone();

    std::thread::Builder::new()
        .name("facewatch-stream".into())
        .spawn(move || {
            tracing::info!(cadence = config.process_every_n_frames, "stream thread started");
            let mut pipeline = StreamPipeline::new(lease, recognizer, history, config)
                .with_cancel(move || watch.is_closed());
            for part in pipeline.by_ref() {
                if tx.blocking_send(Bytes::from(part)).is_err() {
                    tracing::info!("stream client disconnected");
                    break;
                }
            }
            tracing::info!(frames = pipeline.frames_read(), "stream thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(rx)
}
