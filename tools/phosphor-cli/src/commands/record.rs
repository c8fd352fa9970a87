//! Record a synthetic test pattern through the capture session and
//! export the clip.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use phosphor_archive::StreamingArchive;
use phosphor_capture::{estimate_export_bytes, CaptureSession, LiveSource, SessionConfig};
use phosphor_common::error::PhosphorResult;
use phosphor_export::frame::{sanitize_even, Frame};
use phosphor_export::sink::{ArchiveSink, ContainerSink, EncodedSink};
use phosphor_export::{ContainerFormat, PngStillEncoder, StillEncoder};

/// Scrolling-gradient frame source. Stands in for a real surface so
/// the capture path can be exercised without a compositor attached.
struct TestPatternSource {
    width: u32,
    height: u32,
    frame: u64,
}

impl TestPatternSource {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame: 0,
        }
    }
}

impl LiveSource for TestPatternSource {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn capture_frame(&mut self) -> PhosphorResult<Vec<u8>> {
        let mut pixels = Vec::with_capacity(Frame::byte_len(self.width, self.height));
        for y in 0..self.height {
            let g = (y * 255 / self.height.max(1)) as u8;
            for x in 0..self.width {
                let r = (((x + self.frame as u32) % self.width) * 255 / self.width) as u8;
                pixels.extend_from_slice(&[r, g, 128, 255]);
            }
        }
        self.frame += 1;
        Ok(pixels)
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn run(
    output: Option<PathBuf>,
    format: String,
    rate: u32,
    fps: u32,
    duration_secs: f64,
    width: u32,
    height: u32,
    quality: f64,
) -> anyhow::Result<()> {
    let width = sanitize_even(width);
    let height = sanitize_even(height);
    if width == 0 || height == 0 {
        return Err(anyhow::anyhow!("width and height must be at least 2"));
    }

    let container = if format == "tar" {
        None
    } else {
        Some(ContainerFormat::from_name(&format)?)
    };
    let extension = container.map(|f| f.extension()).unwrap_or("tar");
    let output_path = output.unwrap_or_else(|| PathBuf::from(format!("recording.{extension}")));

    println!("Recording test pattern: {width}x{height} @ {rate} Hz for {duration_secs:.1}s");

    let mut source = TestPatternSource::new(width, height);
    let mut session = CaptureSession::new(SessionConfig { rate });
    session.start(&source)?;

    let stop = session.stop_flag();
    let timer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs_f64(duration_secs)).await;
        stop.store(true, Ordering::SeqCst);
    });
    session.run(&mut source).await?;
    let _ = timer.await;
    let clip = session.stop()?;
    println!("  Captured {} frames", clip.frame_count());

    let frames = clip.export_frames(0.0, clip.duration_secs(), fps)?;
    println!("  Exporting {} frames to: {}", frames.len(), output_path.display());

    match container {
        Some(container) => {
            let estimate = estimate_export_bytes(
                container,
                frames.len() as u64,
                quality,
                frames.len() as f64 / fps.max(1) as f64,
            );
            println!("  Estimated size: ~{} KiB", estimate / 1024);

            let mut sink =
                ContainerSink::spawn(container, width, height, fps, quality, output_path.clone())?;
            for pixels in &frames {
                sink.write_frame(pixels)?;
            }
            sink.wait()?;
        }
        None => {
            let file = std::fs::File::create(&output_path)?;
            let mut sink = ArchiveSink::new(StreamingArchive::new(file), "png");
            for (i, pixels) in frames.iter().enumerate() {
                let encoded = PngStillEncoder.encode(width, height, pixels)?;
                sink.accept(i as u64, encoded)?;
            }
            sink.finalize()?;
        }
    }

    println!("Export complete: {}", output_path.display());
    Ok(())
}
