//! Export frames as a tar archive of PNG stills.

use std::path::{Path, PathBuf};
use std::process::Command;

use phosphor_archive::StreamingArchive;
use phosphor_capture::export_still;
use phosphor_common::error::{PhosphorError, PhosphorResult, Stage};
use phosphor_export::ffmpeg::{probe_dimensions, probe_duration};
use phosphor_export::frame::{flip_rows, Frame};
use phosphor_export::progress::{self, ExportEvent};
use phosphor_export::sink::ArchiveSink;
use phosphor_export::transform::Identity;
use phosphor_export::{OffloadCoordinator, OffloadJob, PngStillEncoder, SeekSource, StillEncoder};

/// Seekable frame source backed by one ffmpeg invocation per frame.
///
/// The readback contract hands rows over bottom-up, so the decode
/// includes a vertical flip; the encode worker flips back to top-down
/// before writing stills.
struct FfmpegSeekSource {
    input: PathBuf,
    width: u32,
    height: u32,
}

impl SeekSource for FfmpegSeekSource {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn frame_at(&mut self, time_secs: f64) -> PhosphorResult<Vec<u8>> {
        let output = Command::new("ffmpeg")
            .arg("-ss")
            .arg(format!("{time_secs:.6}"))
            .arg("-i")
            .arg(&self.input)
            .args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgba"])
            .arg("-vf")
            .arg(format!("scale={}:{},vflip", self.width, self.height))
            .arg("-")
            .output()
            .map_err(|e| {
                PhosphorError::subprocess(Stage::Decode, format!("failed to start ffmpeg: {e}"))
            })?;

        if !output.status.success() {
            return Err(PhosphorError::subprocess(
                Stage::Decode,
                format!("seek to {time_secs:.3}s failed with {}", output.status),
            ));
        }
        let expected = Frame::byte_len(self.width, self.height);
        if output.stdout.len() != expected {
            return Err(PhosphorError::subprocess(
                Stage::Decode,
                format!(
                    "seek to {time_secs:.3}s produced {} bytes, expected {expected}",
                    output.stdout.len()
                ),
            ));
        }
        Ok(output.stdout)
    }
}

pub async fn run(
    input: PathBuf,
    output: Option<PathBuf>,
    fps: u32,
    duration: Option<f64>,
    at: Option<f64>,
) -> anyhow::Result<()> {
    let (width, height) = probe_dimensions(&input)
        .ok_or_else(|| anyhow::anyhow!("could not probe input dimensions"))?;
    let output_path = output.unwrap_or_else(|| input.with_extension("frames.tar"));

    let mut source = FfmpegSeekSource {
        input: input.clone(),
        width,
        height,
    };

    if let Some(time_secs) = at {
        export_one(&mut source, &output_path, time_secs)?;
        println!("Exported frame at {time_secs:.3}s: {}", output_path.display());
        return Ok(());
    }

    let duration_secs = duration
        .or_else(|| probe_duration(&input))
        .ok_or_else(|| anyhow::anyhow!("could not probe input duration; pass --duration"))?;
    let total_frames = (duration_secs * fps as f64).floor() as u64;

    println!("Exporting {total_frames} stills to: {}", output_path.display());
    println!("  Resolution: {width}x{height} @ {fps} fps");

    let file = std::fs::File::create(&output_path)?;
    let mut sink = ArchiveSink::new(StreamingArchive::new(file), "png");

    let (events_tx, mut events_rx) = progress::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                ExportEvent::Progress(p) => {
                    print!("\r  Progress: {}% ({}/{})  ", p.percent, p.frame_index + 1, p.total_frames);
                }
                ExportEvent::Completed { .. } => break,
            }
        }
    });

    let job = OffloadJob { total_frames, fps };
    let result = OffloadCoordinator::new()
        .with_events(events_tx)
        .run(&job, &mut source, &mut Identity, PngStillEncoder, &mut sink)
        .await;
    let _ = printer.await;

    match result {
        Ok(report) => {
            println!("\nExport complete: {} frames", report.frames);
            Ok(())
        }
        Err(e) => {
            sink.abort();
            let _ = std::fs::remove_file(&output_path);
            println!("\nExport failed: {e}");
            Err(e.into())
        }
    }
}

fn export_one(
    source: &mut FfmpegSeekSource,
    output_path: &Path,
    time_secs: f64,
) -> anyhow::Result<()> {
    let bottom_up = source.frame_at(time_secs)?;
    let pixels = flip_rows(&bottom_up, source.width, source.height);
    let encoded = PngStillEncoder.encode(source.width, source.height, &pixels)?;

    let file = std::fs::File::create(output_path)?;
    let mut sink = ArchiveSink::new(StreamingArchive::new(file), "png");
    export_still(&mut sink, encoded)?;
    Ok(())
}
