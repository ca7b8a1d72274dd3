//! rollcall-hw — camera capture for the attendance loop.
//!
//! V4L2 access via the `v4l` crate: bounded-retry device open, format
//! negotiation, and a persistent capture stream of grayscale frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, FrameStream, PixelFormat};
pub use frame::Frame;
