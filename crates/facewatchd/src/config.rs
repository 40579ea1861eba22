use facewatch_core::detector::DetectorParams;
use facewatch_core::pipeline::StreamConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const CASCADE_FILE: &str = "haarcascade_frontalface_default.xml";
const MODEL_FILE: &str = "model_faces.onnx";
const LABELS_FILE: &str = "labels.toml";

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    pub camera_width: u32,
    pub camera_height: u32,
    /// Directory holding the cascade XML, the ONNX model and the label file.
    pub model_dir: PathBuf,
    /// Directory listed by `/test-images` and served under `/static/test_images`.
    pub test_images_dir: PathBuf,
    /// HTTP listen address.
    pub bind: String,
    /// History is updated on every Nth streamed frame (≥ 1).
    pub process_every_n_frames: u64,
    pub retry_backoff_ms: u64,
    /// Stream JPEG quality (1–100).
    pub jpeg_quality: u8,
    pub scale_factor: f64,
    pub min_neighbors: usize,
    pub min_face_size: u32,
    /// ONNX Runtime intra-op threads for the classifier.
    pub intra_threads: usize,
}

impl Config {
    /// Load configuration from `FACEWATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        Self {
            camera_device: text("FACEWATCH_CAMERA_DEVICE", "/dev/video0"),
            camera_width: parse_or(&var, "FACEWATCH_CAMERA_WIDTH", 640),
            camera_height: parse_or(&var, "FACEWATCH_CAMERA_HEIGHT", 480),
            model_dir: PathBuf::from(text("FACEWATCH_MODEL_DIR", "./models")),
            test_images_dir: PathBuf::from(text("FACEWATCH_TEST_IMAGES_DIR", "static/test_images")),
            bind: text("FACEWATCH_BIND", "127.0.0.1:5000"),
            process_every_n_frames: parse_or(&var, "FACEWATCH_PROCESS_EVERY_N_FRAMES", 5u64).max(1),
            retry_backoff_ms: parse_or(&var, "FACEWATCH_RETRY_BACKOFF_MS", 100),
            jpeg_quality: parse_or(&var, "FACEWATCH_JPEG_QUALITY", 80u64).clamp(1, 100) as u8,
            scale_factor: parse_or(&var, "FACEWATCH_SCALE_FACTOR", 1.3),
            min_neighbors: parse_or(&var, "FACEWATCH_MIN_NEIGHBORS", 5),
            min_face_size: parse_or(&var, "FACEWATCH_MIN_FACE_SIZE", 50),
            intra_threads: parse_or(&var, "FACEWATCH_INTRA_THREADS", 2usize).max(1),
        }
    }

    pub fn cascade_path(&self) -> String {
        self.model_dir.join(CASCADE_FILE).to_string_lossy().into_owned()
    }

    pub fn model_path(&self) -> String {
        self.model_dir.join(MODEL_FILE).to_string_lossy().into_owned()
    }

    pub fn labels_path(&self) -> String {
        self.model_dir.join(LABELS_FILE).to_string_lossy().into_owned()
    }

    pub fn detector_params(&self) -> DetectorParams {
        DetectorParams {
            scale_factor: self.scale_factor,
            min_neighbors: self.min_neighbors,
            min_size: self.min_face_size,
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            process_every_n_frames: self.process_every_n_frames,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            jpeg_quality: self.jpeg_quality,
        }
    }
}

/// Parse `key` as `T`; missing or unparseable values (including ones out of
/// range for `T`) yield `default`.
fn parse_or<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    var(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
