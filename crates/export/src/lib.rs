//! Phosphor Export Engine
//!
//! Streaming frame pipelines that move frames from a source (decoded
//! media or a capture buffer) through a per-frame transform to a sink
//! (video container or streamed archive of stills), under strict
//! ordering, bounded memory, and backpressure.
//!
//! # Whole-media path
//!
//! ```text
//! input.mp4 ──► decode subprocess ──► raw RGBA stream
//!                                         │  (accumulate W*H*4)
//!                                         ▼
//!                                  FrameTransform
//!                                         │  (single in-flight)
//!                                         ▼
//!                              encode subprocess ──► output.mp4
//! ```
//!
//! # Offload path
//!
//! ```text
//! SeekSource ──► FrameTransform ──► encode worker thread
//!      ▲                                  │ (≤ threshold+1 in flight)
//!      │ seek index/fps                   ▼
//!      └──────────────────────── reorder buffer ──► EncodedSink
//! ```

pub mod ffmpeg;
pub mod frame;
pub mod offload;
pub mod pipeline;
pub mod progress;
pub mod sink;
pub mod transform;

pub use ffmpeg::ContainerFormat;
pub use frame::{sanitize_even, Frame};
pub use offload::{
    OffloadCoordinator, OffloadJob, OffloadReport, PngStillEncoder, SeekSource, StillEncoder,
};
pub use pipeline::{PipelineCoordinator, RenderJob, SessionStatus};
pub use progress::{ExportEvent, ExportProgress};
pub use sink::{ArchiveSink, ContainerSink, EncodedSink};
pub use transform::{FrameTransform, Identity};
