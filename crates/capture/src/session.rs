//! Live capture session management.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use phosphor_common::error::{PhosphorError, PhosphorResult};
use phosphor_common::timing::RateController;

use phosphor_export::frame::Frame;

/// Frame provider for live capture: the current contents of whatever
/// surface is being recorded, top-down RGBA.
pub trait LiveSource: Send {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Read back the surface as it looks right now.
    fn capture_frame(&mut self) -> PhosphorResult<Vec<u8>>;
}

/// Configuration for a capture session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sampling rate in Hz.
    pub rate: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { rate: 30 }
    }
}

/// State of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session created but not started.
    Idle,
    /// Sampling in progress.
    Recording,
    /// Sampling ended, clip finalized.
    Stopped,
}

/// Samples a live source at a fixed wall-clock period into an
/// in-memory clip.
///
/// Sampling is always-accept: every frame the period calls for is
/// stored, unbounded for the session's duration. Trim and resample
/// happen after the fact on the finished clip.
pub struct CaptureSession {
    config: SessionConfig,
    state: SessionState,
    controller: RateController,
    stop_flag: Arc<AtomicBool>,
    frames: Vec<Vec<u8>>,
    width: u32,
    height: u32,
    started_at: Option<Instant>,
}

impl CaptureSession {
    pub fn new(config: SessionConfig) -> Self {
        let controller = RateController::new(config.rate);
        Self {
            config,
            state: SessionState::Idle,
            controller,
            stop_flag: Arc::new(AtomicBool::new(false)),
            frames: Vec::new(),
            width: 0,
            height: 0,
            started_at: None,
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Frames stored so far.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Get a clone of the stop flag for use by other tasks.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    /// Begin sampling.
    pub fn start(&mut self, source: &dyn LiveSource) -> PhosphorResult<()> {
        if self.state != SessionState::Idle {
            return Err(PhosphorError::capture("Session already started"));
        }
        self.width = source.width();
        self.height = source.height();
        if self.width == 0 || self.height == 0 {
            return Err(PhosphorError::capture("Source has no surface"));
        }
        self.stop_flag.store(false, Ordering::SeqCst);
        self.started_at = Some(Instant::now());
        self.state = SessionState::Recording;
        tracing::info!(
            rate = self.config.rate,
            width = self.width,
            height = self.height,
            "Capture session started"
        );
        Ok(())
    }

    /// Offer the session a chance to sample at the given clock
    /// reading. Samples only when a full period has elapsed; returns
    /// whether a frame was stored.
    pub fn tick(&mut self, source: &mut dyn LiveSource, now_ns: u64) -> PhosphorResult<bool> {
        if self.state != SessionState::Recording {
            return Err(PhosphorError::capture("Session not recording"));
        }
        if !self.controller.should_tick(now_ns) {
            return Ok(false);
        }
        let pixels = source.capture_frame()?;
        let expected = Frame::byte_len(self.width, self.height);
        if pixels.len() != expected {
            return Err(PhosphorError::capture(format!(
                "source returned {} bytes, expected {expected}",
                pixels.len()
            )));
        }
        self.frames.push(pixels);
        Ok(true)
    }

    /// Sample on the configured period until the stop flag is raised.
    pub async fn run(&mut self, source: &mut dyn LiveSource) -> PhosphorResult<()> {
        let epoch = Instant::now();
        let interval = self.controller.interval();
        while !self.stop_flag.load(Ordering::SeqCst) {
            self.tick(source, epoch.elapsed().as_nanos() as u64)?;
            tokio::time::sleep(interval).await;
        }
        Ok(())
    }

    /// End sampling and hand back the recorded clip.
    pub fn stop(&mut self) -> PhosphorResult<CaptureClip> {
        if self.state != SessionState::Recording {
            return Err(PhosphorError::capture("Session not recording"));
        }
        self.stop_flag.store(true, Ordering::SeqCst);
        self.state = SessionState::Stopped;

        let elapsed = self
            .started_at
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let frames = std::mem::take(&mut self.frames);
        tracing::info!(
            frames = frames.len(),
            duration_secs = elapsed,
            "Capture session stopped"
        );

        Ok(CaptureClip {
            width: self.width,
            height: self.height,
            rate: self.config.rate,
            frames,
        })
    }
}

/// A finished recording: every sampled frame at the capture rate.
#[derive(Debug)]
pub struct CaptureClip {
    pub width: u32,
    pub height: u32,
    /// Rate the clip was sampled at, in Hz.
    pub rate: u32,
    frames: Vec<Vec<u8>>,
}

impl CaptureClip {
    pub fn from_frames(width: u32, height: u32, rate: u32, frames: Vec<Vec<u8>>) -> Self {
        Self {
            width,
            height,
            rate,
            frames,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames.len() as f64 / self.rate.max(1) as f64
    }

    pub fn frame(&self, index: usize) -> Option<&[u8]> {
        self.frames.get(index).map(|f| f.as_slice())
    }

    /// Resample stride for a target rate: keep every stride-th frame,
    /// never interpolate. A target at or above the capture rate keeps
    /// everything.
    pub fn stride_for(&self, target_fps: u32) -> usize {
        ((self.rate as f64 / target_fps.max(1) as f64).round() as usize).max(1)
    }

    /// Frame indices selected by a `[start, end)` trim followed by a
    /// stride resample to the target rate.
    pub fn select_frames(
        &self,
        start_secs: f64,
        end_secs: f64,
        target_fps: u32,
    ) -> PhosphorResult<Vec<usize>> {
        if !(start_secs >= 0.0 && end_secs > start_secs) {
            return Err(PhosphorError::validation(format!(
                "invalid trim range [{start_secs}, {end_secs})"
            )));
        }
        let first = (start_secs * self.rate as f64).floor() as usize;
        let past_end = ((end_secs * self.rate as f64).floor() as usize).min(self.frames.len());
        if first >= past_end {
            return Err(PhosphorError::validation(
                "trim range selects no frames",
            ));
        }

        let stride = self.stride_for(target_fps);
        let trimmed = past_end - first;
        let kept = trimmed / stride;
        if kept == 0 {
            return Err(PhosphorError::validation(
                "resample stride leaves no frames",
            ));
        }
        Ok((0..kept).map(|i| first + i * stride).collect())
    }

    /// Trimmed, resampled frames ready for an export sink.
    pub fn export_frames(
        &self,
        start_secs: f64,
        end_secs: f64,
        target_fps: u32,
    ) -> PhosphorResult<Vec<&[u8]>> {
        let selected = self.select_frames(start_secs, end_secs, target_fps)?;
        Ok(selected
            .into_iter()
            .map(|i| self.frames[i].as_slice())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SolidSource {
        value: u8,
    }

    impl LiveSource for SolidSource {
        fn width(&self) -> u32 {
            2
        }

        fn height(&self) -> u32 {
            2
        }

        fn capture_frame(&mut self) -> PhosphorResult<Vec<u8>> {
            let frame = vec![self.value; 16];
            self.value = self.value.wrapping_add(1);
            Ok(frame)
        }
    }

    fn clip_of(n: usize, rate: u32) -> CaptureClip {
        let frames = (0..n).map(|i| vec![i as u8; 16]).collect();
        CaptureClip::from_frames(2, 2, rate, frames)
    }

    #[test]
    fn test_session_misuse_is_rejected() {
        let mut session = CaptureSession::new(SessionConfig { rate: 30 });
        let mut source = SolidSource { value: 0 };

        assert!(session.tick(&mut source, 0).is_err());
        assert!(session.stop().is_err());

        session.start(&source).unwrap();
        assert!(session.start(&source).is_err());

        session.stop().unwrap();
        assert!(session.stop().is_err());
    }

    #[test]
    fn test_sampling_follows_the_wall_clock_period() {
        let mut session = CaptureSession::new(SessionConfig { rate: 10 }); // 100ms period
        let mut source = SolidSource { value: 0 };
        session.start(&source).unwrap();

        assert!(session.tick(&mut source, 0).unwrap()); // first tick fires
        assert!(!session.tick(&mut source, 50_000_000).unwrap()); // 50ms, too soon
        assert!(session.tick(&mut source, 100_000_000).unwrap());
        assert_eq!(session.frame_count(), 2);
    }

    #[test]
    fn test_stop_hands_over_all_sampled_frames() {
        let mut session = CaptureSession::new(SessionConfig { rate: 1000 });
        let mut source = SolidSource { value: 7 };
        session.start(&source).unwrap();
        for i in 0..5u64 {
            session.tick(&mut source, i * 1_000_000).unwrap();
        }
        let clip = session.stop().unwrap();
        assert_eq!(clip.frame_count(), 5);
        assert_eq!(clip.frame(0).unwrap()[0], 7);
    }

    #[test]
    fn test_stride_downsample_keeps_every_third_frame() {
        // 30 Hz capture, 10 fps target: stride 3.
        let clip = clip_of(30, 30);
        assert_eq!(clip.stride_for(10), 3);
        let selected = clip.select_frames(0.0, 1.0, 10).unwrap();
        assert_eq!(selected.len(), 10);
        assert_eq!(selected[..4], [0, 3, 6, 9]);
    }

    #[test]
    fn test_stride_count_is_floor_of_quotient() {
        let clip = clip_of(31, 30);
        let selected = clip.select_frames(0.0, 2.0, 10).unwrap();
        assert_eq!(selected.len(), 31 / 3);
    }

    #[test]
    fn test_target_at_or_above_capture_rate_keeps_everything() {
        let clip = clip_of(12, 30);
        assert_eq!(clip.stride_for(30), 1);
        assert_eq!(clip.stride_for(60), 1);
        let selected = clip.select_frames(0.0, 1.0, 60).unwrap();
        assert_eq!(selected.len(), 12);
    }

    #[test]
    fn test_trim_window_is_half_open() {
        let clip = clip_of(30, 30);
        // [0.5, 1.0) at 30 Hz: frames 15..29, frame 30 excluded anyway.
        let selected = clip.select_frames(0.5, 1.0, 30).unwrap();
        assert_eq!(selected.first(), Some(&15));
        assert_eq!(selected.last(), Some(&29));
    }

    #[test]
    fn test_degenerate_trim_is_rejected() {
        let clip = clip_of(30, 30);
        assert!(clip.select_frames(1.0, 0.5, 30).is_err());
        assert!(clip.select_frames(5.0, 6.0, 30).is_err()); // beyond clip end
    }
}
