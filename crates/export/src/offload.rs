//! Offloaded still-frame export: a seekable source feeds a dedicated
//! encode worker thread under bounded in-flight backpressure, and
//! results are re-sequenced before reaching the sink.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use phosphor_common::error::{PhosphorError, PhosphorResult};
use phosphor_common::timing::RollingWindow;
use tokio::sync::mpsc;

use crate::frame::{flip_rows, Frame};
use crate::progress::{emit, EventSender, ExportEvent, ExportProgress};
use crate::sink::EncodedSink;
use crate::transform::FrameTransform;

/// Submissions pause once this many frames are unacknowledged.
pub const IN_FLIGHT_THRESHOLD: usize = 5;

/// How long to wait before re-checking the in-flight count.
const BACKPRESSURE_DELAY: Duration = Duration::from_millis(16);

/// Window length for the throughput estimate.
const METRICS_WINDOW: usize = 30;

/// Frame provider that can materialize any timestamp on demand.
///
/// Rows come back bottom-up, as read from a framebuffer; the worker
/// flips them before encoding.
pub trait SeekSource: Send {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Render and read back the frame at the given time.
    fn frame_at(&mut self, time_secs: f64) -> PhosphorResult<Vec<u8>>;
}

/// Still-image codec run on the worker thread.
pub trait StillEncoder: Send + 'static {
    fn encode(&self, width: u32, height: u32, pixels: &[u8]) -> PhosphorResult<Vec<u8>>;

    /// File extension for encoded entries.
    fn extension(&self) -> &'static str;
}

/// PNG encoder backed by the `image` crate.
pub struct PngStillEncoder;

impl StillEncoder for PngStillEncoder {
    fn encode(&self, width: u32, height: u32, pixels: &[u8]) -> PhosphorResult<Vec<u8>> {
        use image::codecs::png::PngEncoder;
        use image::{ExtendedColorType, ImageEncoder};

        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(pixels, width, height, ExtendedColorType::Rgba8)
            .map_err(anyhow::Error::new)?;
        Ok(out)
    }

    fn extension(&self) -> &'static str {
        "png"
    }
}

/// One offload export request.
#[derive(Debug, Clone)]
pub struct OffloadJob {
    pub total_frames: u64,
    pub fps: u32,
}

/// Outcome of a completed offload run.
#[derive(Debug, Clone)]
pub struct OffloadReport {
    pub frames: u64,
    /// Peak unacknowledged submissions observed during the run.
    pub max_in_flight: usize,
}

struct EncodeRequest {
    frame_index: u64,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

struct EncodeResponse {
    frame_index: u64,
    result: Result<Vec<u8>, String>,
}

/// Re-sequences worker responses, which may arrive out of order, into
/// strict frame-index order for the sink.
struct ReorderBuffer {
    next: u64,
    pending: BTreeMap<u64, Vec<u8>>,
}

impl ReorderBuffer {
    fn new() -> Self {
        Self {
            next: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Insert one encoded frame and drain everything now contiguous.
    fn push(&mut self, frame_index: u64, bytes: Vec<u8>) -> Vec<(u64, Vec<u8>)> {
        self.pending.insert(frame_index, bytes);
        let mut ready = Vec::new();
        while let Some(bytes) = self.pending.remove(&self.next) {
            ready.push((self.next, bytes));
            self.next += 1;
        }
        ready
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Drives source, transform, worker, and sink for one offload export.
///
/// One worker thread, at most `threshold + 1` frames in flight, and
/// in-order delivery to the sink regardless of encode completion
/// order.
pub struct OffloadCoordinator {
    threshold: usize,
    events: Option<EventSender>,
}

impl OffloadCoordinator {
    pub fn new() -> Self {
        Self {
            threshold: IN_FLIGHT_THRESHOLD,
            events: None,
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Run the export to completion. The sink is finalized only after
    /// every in-flight frame has been acknowledged and delivered.
    pub async fn run<E: StillEncoder>(
        &mut self,
        job: &OffloadJob,
        source: &mut dyn SeekSource,
        transform: &mut dyn FrameTransform,
        encoder: E,
        sink: &mut dyn EncodedSink,
    ) -> PhosphorResult<OffloadReport> {
        if job.total_frames == 0 {
            return Err(PhosphorError::validation("no frames to export"));
        }
        if job.fps == 0 {
            return Err(PhosphorError::validation("fps must be positive"));
        }

        let (req_tx, req_rx) = mpsc::unbounded_channel::<EncodeRequest>();
        let (resp_tx, resp_rx) = mpsc::unbounded_channel::<EncodeResponse>();
        let worker = spawn_worker(encoder, req_rx, resp_tx);

        let result = self
            .drive(job, source, transform, sink, req_tx, resp_rx)
            .await;

        // req_tx has been dropped by drive() on all paths; the worker
        // sees a closed channel and exits.
        let _ = worker.join();

        match &result {
            Ok(report) => {
                tracing::info!(
                    frames = report.frames,
                    max_in_flight = report.max_in_flight,
                    "Offload export complete"
                );
                emit(
                    self.events.as_ref(),
                    ExportEvent::Completed {
                        success: true,
                        error: None,
                    },
                );
            }
            Err(err) => {
                tracing::error!(error = %err, "Offload export failed");
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

    async fn drive(
        &mut self,
        job: &OffloadJob,
        source: &mut dyn SeekSource,
        transform: &mut dyn FrameTransform,
        sink: &mut dyn EncodedSink,
        req_tx: mpsc::UnboundedSender<EncodeRequest>,
        mut resp_rx: mpsc::UnboundedReceiver<EncodeResponse>,
    ) -> PhosphorResult<OffloadReport> {
        let width = source.width();
        let height = source.height();
        let total = job.total_frames;
        tracing::info!(
            total_frames = total,
            fps = job.fps,
            width,
            height,
            threshold = self.threshold,
            "Starting offload export"
        );

        let mut reorder = ReorderBuffer::new();
        let mut in_flight = 0usize;
        let mut max_in_flight = 0usize;
        let mut window = RollingWindow::new(METRICS_WINDOW);
        let mut last_delivery = Instant::now();

        for index in 0..total {
            // Backpressure: pause submissions while too many frames
            // are unacknowledged, draining as responses arrive.
            while in_flight > self.threshold {
                match resp_rx.try_recv() {
                    Ok(resp) => {
                        in_flight -= 1;
                        self.deliver(resp, &mut reorder, sink, total, &mut window, &mut last_delivery)?;
                    }
                    Err(mpsc::error::TryRecvError::Empty) => {
                        tokio::time::sleep(BACKPRESSURE_DELAY).await;
                    }
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        return Err(PhosphorError::worker(index, "encode worker exited"));
                    }
                }
            }

            let time_secs = index as f64 / job.fps as f64;
            let pixels = source.frame_at(time_secs)?;
            let frame = Frame::new(index, width, height, pixels)?;
            let transformed = transform.apply(frame)?;

            req_tx
                .send(EncodeRequest {
                    frame_index: index,
                    width,
                    height,
                    pixels: transformed.pixels,
                })
                .map_err(|_| PhosphorError::worker(index, "encode worker exited"))?;
            in_flight += 1;
            max_in_flight = max_in_flight.max(in_flight);

            // Opportunistic drain keeps the reorder buffer small.
            while let Ok(resp) = resp_rx.try_recv() {
                in_flight -= 1;
                self.deliver(resp, &mut reorder, sink, total, &mut window, &mut last_delivery)?;
            }
        }

        // No more submissions; wait for every outstanding frame.
        drop(req_tx);
        while in_flight > 0 {
            let resp = resp_rx.recv().await.ok_or_else(|| {
                PhosphorError::worker(total, "encode worker exited with frames outstanding")
            })?;
            in_flight -= 1;
            self.deliver(resp, &mut reorder, sink, total, &mut window, &mut last_delivery)?;
        }

        debug_assert!(reorder.is_empty());
        sink.finalize()?;

        Ok(OffloadReport {
            frames: total,
            max_in_flight,
        })
    }

    fn deliver(
        &self,
        resp: EncodeResponse,
        reorder: &mut ReorderBuffer,
        sink: &mut dyn EncodedSink,
        total: u64,
        window: &mut RollingWindow,
        last_delivery: &mut Instant,
    ) -> PhosphorResult<()> {
        let bytes = resp
            .result
            .map_err(|msg| PhosphorError::worker(resp.frame_index, msg))?;

        for (index, bytes) in reorder.push(resp.frame_index, bytes) {
            sink.accept(index, bytes)?;
            window.push(last_delivery.elapsed());
            *last_delivery = Instant::now();

            let mut progress = ExportProgress::new(index, total);
            progress.fps = window.fps();
            progress.eta_secs = window
                .eta(total.saturating_sub(index + 1))
                .map(|d| d.as_secs_f64());
            emit(self.events.as_ref(), ExportEvent::Progress(progress));
        }
        Ok(())
    }
}

impl Default for OffloadCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode worker: flip rows to top-down order, encode, acknowledge.
/// Exits when the request channel closes.
fn spawn_worker<E: StillEncoder>(
    encoder: E,
    mut requests: mpsc::UnboundedReceiver<EncodeRequest>,
    responses: mpsc::UnboundedSender<EncodeResponse>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        while let Some(req) = requests.blocking_recv() {
            let flipped = flip_rows(&req.pixels, req.width, req.height);
            let result = encoder
                .encode(req.width, req.height, &flipped)
                .map_err(|e| e.to_string());
            if responses
                .send(EncodeResponse {
                    frame_index: req.frame_index,
                    result,
                })
                .is_err()
            {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::BYTES_PER_PIXEL;
    use crate::transform::Identity;

    const W: u32 = 2;
    const H: u32 = 3;

    /// Source whose frames are filled with the frame's index byte,
    /// except the bottom row which is marked 0xFF.
    struct PatternSource {
        fps: u32,
    }

    impl SeekSource for PatternSource {
        fn width(&self) -> u32 {
            W
        }

        fn height(&self) -> u32 {
            H
        }

        fn frame_at(&mut self, time_secs: f64) -> PhosphorResult<Vec<u8>> {
            let index = (time_secs * self.fps as f64).round() as u8;
            let row_len = W as usize * BYTES_PER_PIXEL;
            let mut pixels = vec![index; Frame::byte_len(W, H)];
            // first row handed over is the bottom of the image
            pixels[..row_len].fill(0xFF);
            Ok(pixels)
        }
    }

    /// Encoder that returns the input verbatim, optionally sleeping
    /// longer on even frames to scramble completion order. The first
    /// byte it sees is the top row's marker, i.e. the frame index.
    struct PassthroughEncoder {
        stagger: bool,
    }

    impl StillEncoder for PassthroughEncoder {
        fn encode(&self, _w: u32, _h: u32, pixels: &[u8]) -> PhosphorResult<Vec<u8>> {
            if self.stagger && pixels.first().map(|b| b % 2 == 0).unwrap_or(false) {
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(pixels.to_vec())
        }

        fn extension(&self) -> &'static str {
            "raw"
        }
    }

    /// Encoder that fails on one specific frame marker byte.
    struct FailingEncoder {
        fail_on: u8,
    }

    impl StillEncoder for FailingEncoder {
        fn encode(&self, _w: u32, _h: u32, pixels: &[u8]) -> PhosphorResult<Vec<u8>> {
            if pixels.first() == Some(&self.fail_on) {
                Err(PhosphorError::validation("simulated codec failure"))
            } else {
                Ok(pixels.to_vec())
            }
        }

        fn extension(&self) -> &'static str {
            "raw"
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        accepted: Vec<(u64, Vec<u8>)>,
        finalized: bool,
    }

    impl EncodedSink for RecordingSink {
        fn accept(&mut self, frame_index: u64, bytes: Vec<u8>) -> PhosphorResult<()> {
            assert!(!self.finalized, "accept after finalize");
            self.accepted.push((frame_index, bytes));
            Ok(())
        }

        fn finalize(&mut self) -> PhosphorResult<()> {
            self.finalized = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sink_receives_frames_in_order_despite_staggered_encodes() {
        let job = OffloadJob {
            total_frames: 12,
            fps: 30,
        };
        let mut source = PatternSource { fps: 30 };
        let mut sink = RecordingSink::default();

        let report = OffloadCoordinator::new()
            .run(
                &job,
                &mut source,
                &mut Identity,
                PassthroughEncoder { stagger: true },
                &mut sink,
            )
            .await
            .unwrap();

        assert_eq!(report.frames, 12);
        assert!(sink.finalized);
        let indices: Vec<u64> = sink.accepted.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, (0..12).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_threshold_plus_one() {
        let job = OffloadJob {
            total_frames: 20,
            fps: 30,
        };
        let mut source = PatternSource { fps: 30 };
        let mut sink = RecordingSink::default();

        let report = OffloadCoordinator::new()
            .with_threshold(2)
            .run(
                &job,
                &mut source,
                &mut Identity,
                PassthroughEncoder { stagger: true },
                &mut sink,
            )
            .await
            .unwrap();

        assert!(report.max_in_flight <= 3, "peak was {}", report.max_in_flight);
    }

    #[tokio::test]
    async fn test_worker_failure_carries_frame_index() {
        let job = OffloadJob {
            total_frames: 10,
            fps: 30,
        };
        let mut source = PatternSource { fps: 30 };
        let mut sink = RecordingSink::default();

        let err = OffloadCoordinator::new()
            .run(
                &job,
                &mut source,
                &mut Identity,
                FailingEncoder { fail_on: 5 },
                &mut sink,
            )
            .await
            .unwrap_err();

        match err {
            PhosphorError::WorkerEncode { frame_index, .. } => assert_eq!(frame_index, 5),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!sink.finalized);
    }

    #[tokio::test]
    async fn test_rows_are_flipped_before_encode() {
        let job = OffloadJob {
            total_frames: 1,
            fps: 30,
        };
        let mut source = PatternSource { fps: 30 };
        let mut sink = RecordingSink::default();

        OffloadCoordinator::new()
            .run(
                &job,
                &mut source,
                &mut Identity,
                PassthroughEncoder { stagger: false },
                &mut sink,
            )
            .await
            .unwrap();

        // The 0xFF bottom row must land last after the flip.
        let (_, bytes) = &sink.accepted[0];
        let row_len = W as usize * BYTES_PER_PIXEL;
        assert!(bytes[bytes.len() - row_len..].iter().all(|&b| b == 0xFF));
        assert!(bytes[..row_len].iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn test_progress_events_are_strictly_increasing() {
        let (tx, mut rx) = crate::progress::channel();
        let job = OffloadJob {
            total_frames: 8,
            fps: 30,
        };
        let mut source = PatternSource { fps: 30 };
        let mut sink = RecordingSink::default();

        OffloadCoordinator::new()
            .with_events(tx)
            .run(
                &job,
                &mut source,
                &mut Identity,
                PassthroughEncoder { stagger: true },
                &mut sink,
            )
            .await
            .unwrap();

        let mut indices = Vec::new();
        let mut completed = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                ExportEvent::Progress(p) => indices.push(p.frame_index),
                ExportEvent::Completed { success, .. } => completed = Some(success),
            }
        }
        assert_eq!(indices, (0..8).collect::<Vec<u64>>());
        assert_eq!(completed, Some(true));
    }

    #[tokio::test]
    async fn test_zero_frames_is_rejected() {
        let job = OffloadJob {
            total_frames: 0,
            fps: 30,
        };
        let mut source = PatternSource { fps: 30 };
        let mut sink = RecordingSink::default();

        let err = OffloadCoordinator::new()
            .run(
                &job,
                &mut source,
                &mut Identity,
                PassthroughEncoder { stagger: false },
                &mut sink,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no frames"));
    }
}
