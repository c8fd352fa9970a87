//! Phosphor Capture
//!
//! Live capture session that samples a frame source on a fixed
//! wall-clock period into an in-memory clip, post-capture trim and
//! resample, and a paced archive sequence exporter.

pub mod estimate;
pub mod sequence;
pub mod session;

pub use estimate::estimate_export_bytes;
pub use sequence::{export_sequence, export_still, PlaybackControl, SequenceSource};
pub use session::{CaptureClip, CaptureSession, LiveSource, SessionConfig, SessionState};
