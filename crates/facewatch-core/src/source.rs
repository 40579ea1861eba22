use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("frame read failed: {0}")]
    Read(String),
    #[error("frame source unavailable: {0}")]
    Unavailable(String),
}

/// Pull-based provider of frames (a camera, a file replay, a test script).
pub trait FrameSource {
    /// Next frame; `Ok(None)` once the source is permanently exhausted.
    /// Errors are treated as transient by the stream pipeline.
    fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
        (**self).next_frame()
    }
}
