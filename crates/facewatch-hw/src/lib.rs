//! facewatch-hw: Hardware abstraction for camera capture.
//!
//! Provides a V4L2-based camera that delivers RGB frames through the
//! core `FrameSource` trait.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::FrameError;
