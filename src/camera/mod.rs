pub mod v4l2;

pub use v4l2::{Camera, CameraInfo};

use crate::common::Result;
use image::DynamicImage;

/// A source of video frames with an explicit open/closed lifecycle.
pub trait FrameSource {
    fn open(&mut self) -> Result<()>;

    /// Releases the device. Closing a closed source is a no-op.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Returns `Ok(None)` when no frame is ready; never waits longer than the
    /// source's poll timeout.
    fn read_frame(&mut self) -> Result<Option<DynamicImage>>;
}
