//! Whole-media render pipeline: decode subprocess, per-frame
//! transform, encode subprocess.

use std::io::Read;
use std::path::PathBuf;
use std::time::Instant;

use phosphor_common::error::{PhosphorError, PhosphorResult, Stage};
use phosphor_common::timing::RollingWindow;

use crate::ffmpeg::{self, ContainerFormat};
use crate::frame::{sanitize_even, Frame, RawFrameReader};
use crate::progress::{emit, EventSender, ExportEvent, ExportProgress};
use crate::sink::ContainerSink;
use crate::transform::FrameTransform;

/// Window length for the throughput estimate.
const METRICS_WINDOW: usize = 30;

/// One whole-media render request.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub format: ContainerFormat,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// Quality in [0, 1]; mapped per format.
    pub quality: f64,
    pub duration_secs: f64,
}

impl RenderJob {
    /// Sanitized dimensions and the frame count implied by duration
    /// and rate. Rejects degenerate geometry before any subprocess is
    /// spawned.
    fn plan(&self) -> PhosphorResult<(u32, u32, u64)> {
        if !self.input_path.exists() {
            return Err(PhosphorError::FileNotFound {
                path: self.input_path.clone(),
            });
        }
        let width = sanitize_even(self.width);
        let height = sanitize_even(self.height);
        if width == 0 || height == 0 {
            return Err(PhosphorError::validation(format!(
                "dimensions {}x{} collapse to {width}x{height} after even rounding",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(PhosphorError::validation("fps must be positive"));
        }
        if !(self.duration_secs.is_finite() && self.duration_secs > 0.0) {
            return Err(PhosphorError::validation("duration must be positive"));
        }
        let total_frames = (self.duration_secs * self.fps as f64).floor() as u64;
        if total_frames == 0 {
            return Err(PhosphorError::validation(
                "duration too short for one frame at this rate",
            ));
        }
        Ok((width, height, total_frames))
    }
}

/// Lifecycle of a render session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Initializing,
    Streaming,
    Finalizing,
    Done,
    Failed,
}

impl SessionStatus {
    fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Initializing | Self::Streaming | Self::Finalizing
        )
    }
}

/// Runs one whole-media render at a time.
///
/// Decode and encode run as subprocesses; frames flow through the
/// coordinator one at a time, so memory stays bounded at roughly one
/// raw frame regardless of media length.
pub struct PipelineCoordinator {
    status: SessionStatus,
    events: Option<EventSender>,
}

impl PipelineCoordinator {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Idle,
            events: None,
        }
    }

    /// Attach a per-session event channel.
    pub fn with_events(events: EventSender) -> Self {
        Self {
            status: SessionStatus::Idle,
            events: Some(events),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Execute the job to completion. Exactly one `Completed` event is
    /// emitted, on every exit path.
    pub fn run(
        &mut self,
        job: &RenderJob,
        transform: &mut dyn FrameTransform,
    ) -> PhosphorResult<PathBuf> {
        if self.status.is_active() {
            return Err(PhosphorError::validation(
                "a render session is already in progress",
            ));
        }
        self.status = SessionStatus::Initializing;

        let result = self.run_inner(job, transform);
        match &result {
            Ok(path) => {
                self.status = SessionStatus::Done;
                tracing::info!(output = %path.display(), "Render complete");
                emit(
                    self.events.as_ref(),
                    ExportEvent::Completed {
                        success: true,
                        error: None,
                    },
                );
            }
            Err(err) => {
                self.status = SessionStatus::Failed;
                tracing::error!(error = %err, "Render failed");
                emit(
                    self.events.as_ref(),
                    ExportEvent::Completed {
                        success: false,
                        error: Some(err.to_string()),
                    },
                );
            }
        }
        result
    }

    fn run_inner(
        &mut self,
        job: &RenderJob,
        transform: &mut dyn FrameTransform,
    ) -> PhosphorResult<PathBuf> {
        let (width, height, total_frames) = job.plan()?;
        tracing::info!(
            input = %job.input_path.display(),
            output = %job.output_path.display(),
            width,
            height,
            fps = job.fps,
            total_frames,
            transform = transform.name(),
            "Starting render"
        );

        if let Some(parent) = job.output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let decoder_args = ffmpeg::decoder_args(&job.input_path, job.fps, width, height);
        let mut decoder = ffmpeg::spawn_ffmpeg(Stage::Decode, &decoder_args)?;
        let decoder_stderr = ffmpeg::drain_stderr(&mut decoder);
        let stdout = decoder.stdout.take().ok_or_else(|| {
            PhosphorError::subprocess(Stage::Decode, "failed to capture decoder stdout")
        })?;

        let mut encoder = match ContainerSink::spawn(
            job.format,
            width,
            height,
            job.fps,
            job.quality,
            job.output_path.clone(),
        ) {
            Ok(sink) => sink,
            Err(err) => {
                let _ = decoder.kill();
                let _ = decoder.wait();
                return Err(err);
            }
        };

        self.status = SessionStatus::Streaming;
        let events = self.events.clone();
        let mut window = RollingWindow::new(METRICS_WINDOW);
        let mut frame_started = Instant::now();

        let reader = RawFrameReader::new(stdout, width, height);
        let streamed = stream_frames(
            reader,
            transform,
            width,
            height,
            total_frames,
            |pixels| encoder.write_frame(pixels),
            |index| {
                window.push(frame_started.elapsed());
                frame_started = Instant::now();
                let mut progress = ExportProgress::new(index, total_frames);
                progress.fps = window.fps();
                progress.eta_secs = window
                    .eta(total_frames.saturating_sub(index + 1))
                    .map(|d| d.as_secs_f64());
                emit(events.as_ref(), ExportEvent::Progress(progress));
            },
        );

        if let Err(err) = streamed {
            let _ = decoder.kill();
            let _ = decoder.wait();
            encoder.kill();
            if let Some(task) = decoder_stderr {
                let _ = task.join();
            }
            return Err(err);
        }

        // The decoder may still hold buffered frames past the target
        // count; kill it rather than draining to end of stream.
        self.status = SessionStatus::Finalizing;
        let _ = decoder.kill();
        let _ = decoder.wait();
        if let Some(task) = decoder_stderr {
            let _ = task.join();
        }

        encoder.wait()
    }
}

impl Default for PipelineCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Core streaming loop, factored over plain readers and writers.
///
/// Pulls exactly `total_frames` whole frames, passes each through the
/// transform, delivers the result downstream, and reports each
/// delivered index. A stream that ends before the target count is a
/// decode-stage error.
pub fn stream_frames<R, W, P>(
    mut reader: RawFrameReader<R>,
    transform: &mut dyn FrameTransform,
    width: u32,
    height: u32,
    total_frames: u64,
    mut write_frame: W,
    mut on_frame: P,
) -> PhosphorResult<()>
where
    R: Read,
    W: FnMut(&[u8]) -> PhosphorResult<()>,
    P: FnMut(u64),
{
    let expected_len = Frame::byte_len(width, height);
    for index in 0..total_frames {
        let pixels = reader.next_frame()?.ok_or_else(|| {
            PhosphorError::subprocess(
                Stage::Decode,
                format!("decoder ended after {index} of {total_frames} frames"),
            )
        })?;
        let frame = Frame::new(index, width, height, pixels)?;
        let transformed = transform.apply(frame)?;
        if transformed.pixels.len() != expected_len {
            return Err(PhosphorError::validation(format!(
                "transform changed frame {index} length to {}",
                transformed.pixels.len()
            )));
        }
        write_frame(&transformed.pixels)?;
        on_frame(index);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Identity;
    use std::io::Cursor;

    const W: u32 = 2;
    const H: u32 = 2;
    const FRAME_LEN: usize = 16;

    fn raw_stream(frames: usize) -> Vec<u8> {
        (0..frames)
            .flat_map(|i| std::iter::repeat(i as u8).take(FRAME_LEN))
            .collect()
    }

    #[test]
    fn test_streams_exact_frame_count_in_order() {
        let stream = raw_stream(10);
        let reader = RawFrameReader::new(Cursor::new(stream), W, H);

        let mut written: Vec<u8> = Vec::new();
        let mut reported: Vec<u64> = Vec::new();
        stream_frames(
            reader,
            &mut Identity,
            W,
            H,
            10,
            |pixels| {
                written.push(pixels[0]);
                Ok(())
            },
            |index| reported.push(index),
        )
        .unwrap();

        assert_eq!(written, (0..10).map(|i| i as u8).collect::<Vec<_>>());
        assert_eq!(reported, (0..10).collect::<Vec<u64>>());
    }

    #[test]
    fn test_leftover_buffered_frames_are_not_delivered() {
        // 10 frames in the stream but only 6 requested.
        let stream = raw_stream(10);
        let reader = RawFrameReader::new(Cursor::new(stream), W, H);

        let mut delivered = 0usize;
        stream_frames(
            reader,
            &mut Identity,
            W,
            H,
            6,
            |_| {
                delivered += 1;
                Ok(())
            },
            |_| {},
        )
        .unwrap();
        assert_eq!(delivered, 6);
    }

    #[test]
    fn test_early_stream_end_is_a_decode_error() {
        let stream = raw_stream(3);
        let reader = RawFrameReader::new(Cursor::new(stream), W, H);

        let err = stream_frames(reader, &mut Identity, W, H, 5, |_| Ok(()), |_| {}).unwrap_err();
        assert!(err.to_string().contains("ended after 3 of 5"));
    }

    struct FailingTransform;

    impl FrameTransform for FailingTransform {
        fn apply(&mut self, frame: Frame) -> PhosphorResult<Frame> {
            if frame.index == 2 {
                Err(PhosphorError::validation("shader compile failed"))
            } else {
                Ok(frame)
            }
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_transform_error_stops_the_stream() {
        let stream = raw_stream(5);
        let reader = RawFrameReader::new(Cursor::new(stream), W, H);

        let mut delivered = 0usize;
        let err = stream_frames(
            reader,
            &mut FailingTransform,
            W,
            H,
            5,
            |_| {
                delivered += 1;
                Ok(())
            },
            |_| {},
        )
        .unwrap_err();

        assert!(err.to_string().contains("shader compile failed"));
        assert_eq!(delivered, 2);
    }

    struct ShrinkingTransform;

    impl FrameTransform for ShrinkingTransform {
        fn apply(&mut self, mut frame: Frame) -> PhosphorResult<Frame> {
            frame.pixels.truncate(4);
            Ok(frame)
        }

        fn name(&self) -> &str {
            "shrinking"
        }
    }

    #[test]
    fn test_transform_must_preserve_frame_length() {
        let stream = raw_stream(1);
        let reader = RawFrameReader::new(Cursor::new(stream), W, H);
        let err =
            stream_frames(reader, &mut ShrinkingTransform, W, H, 1, |_| Ok(()), |_| {})
                .unwrap_err();
        assert!(err.to_string().contains("changed frame 0 length"));
    }

    #[test]
    fn test_job_plan_sanitizes_and_validates() {
        let tmp = std::env::temp_dir().join("phosphor_plan_test_input.bin");
        std::fs::write(&tmp, b"stub").unwrap();

        let mut job = RenderJob {
            input_path: tmp.clone(),
            output_path: std::env::temp_dir().join("out.mp4"),
            format: ContainerFormat::Mp4,
            fps: 30,
            width: 1921,
            height: 1081,
            quality: 0.9,
            duration_secs: 2.5,
        };
        let (w, h, total) = job.plan().unwrap();
        assert_eq!((w, h), (1920, 1080));
        assert_eq!(total, 75);

        job.width = 1;
        assert!(job.plan().is_err());
        job.width = 100;
        job.duration_secs = 0.0;
        assert!(job.plan().is_err());

        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn test_missing_input_is_file_not_found() {
        let job = RenderJob {
            input_path: PathBuf::from("/nonexistent/input.mp4"),
            output_path: PathBuf::from("/tmp/out.mp4"),
            format: ContainerFormat::Mp4,
            fps: 30,
            width: 100,
            height: 100,
            quality: 0.9,
            duration_secs: 1.0,
        };
        assert!(matches!(
            job.plan().unwrap_err(),
            PhosphorError::FileNotFound { .. }
        ));
    }

    #[test]
    fn test_coordinator_rejects_concurrent_sessions() {
        let mut coordinator = PipelineCoordinator::new();
        coordinator.status = SessionStatus::Streaming;
        let job = RenderJob {
            input_path: PathBuf::from("/tmp/in.mp4"),
            output_path: PathBuf::from("/tmp/out.mp4"),
            format: ContainerFormat::Mp4,
            fps: 30,
            width: 100,
            height: 100,
            quality: 0.9,
            duration_secs: 1.0,
        };
        let err = coordinator.run(&job, &mut Identity).unwrap_err();
        assert!(err.to_string().contains("already in progress"));
    }
}
