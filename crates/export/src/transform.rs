//! Per-frame transform seam.

use phosphor_common::error::PhosphorResult;

use crate::frame::Frame;

/// Per-frame effect applied between decode and encode.
///
/// The pipeline hands each frame to the transform by value and takes
/// the result by value; at most one frame is inside a transform at a
/// time. Implementations may mutate the buffer in place and return it,
/// but must not change the dimensions.
pub trait FrameTransform: Send {
    fn apply(&mut self, frame: Frame) -> PhosphorResult<Frame>;

    /// Transform name, used in logs.
    fn name(&self) -> &str;
}

/// Pass-through transform.
pub struct Identity;

impl FrameTransform for Identity {
    fn apply(&mut self, frame: Frame) -> PhosphorResult<Frame> {
        Ok(frame)
    }

    fn name(&self) -> &str {
        "identity"
    }
}
