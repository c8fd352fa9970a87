//! Render a media file through the pipeline into a new container.

use std::path::PathBuf;

use phosphor_capture::estimate_export_bytes;
use phosphor_export::ffmpeg::{probe_dimensions, probe_duration};
use phosphor_export::progress::{self, ExportEvent};
use phosphor_export::transform::Identity;
use phosphor_export::{ContainerFormat, PipelineCoordinator, RenderJob};

#[allow(clippy::too_many_arguments)]
pub async fn run(
    input: PathBuf,
    output: Option<PathBuf>,
    format: String,
    fps: u32,
    width: Option<u32>,
    height: Option<u32>,
    quality: f64,
    duration: Option<f64>,
) -> anyhow::Result<()> {
    let format = ContainerFormat::from_name(&format)?;
    let output_path = output
        .unwrap_or_else(|| input.with_extension(format!("out.{}", format.extension())));

    let probed = probe_dimensions(&input);
    let width = width
        .or(probed.map(|(w, _)| w))
        .ok_or_else(|| anyhow::anyhow!("could not probe input width; pass --width"))?;
    let height = height
        .or(probed.map(|(_, h)| h))
        .ok_or_else(|| anyhow::anyhow!("could not probe input height; pass --height"))?;
    let duration_secs = duration
        .or_else(|| probe_duration(&input))
        .ok_or_else(|| anyhow::anyhow!("could not probe input duration; pass --duration"))?;

    let job = RenderJob {
        input_path: input,
        output_path: output_path.clone(),
        format,
        fps,
        width,
        height,
        quality,
        duration_secs,
    };

    let total_frames = (duration_secs * fps as f64).floor() as u64;
    let estimate = estimate_export_bytes(format, total_frames, quality, duration_secs);
    println!("Exporting to: {}", output_path.display());
    println!("  Resolution: {width}x{height} @ {fps} fps");
    println!("  Duration: {duration_secs:.2}s ({total_frames} frames)");
    println!("  Estimated size: ~{} KiB", estimate / 1024);

    let (events_tx, mut events_rx) = progress::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                ExportEvent::Progress(p) => {
                    let eta = p.eta_secs.map(|s| format!("{s:.0}s")).unwrap_or_default();
                    print!(
                        "\r  Progress: {}% ({}/{} frames, ETA: {eta})  ",
                        p.percent,
                        p.frame_index + 1,
                        p.total_frames,
                    );
                }
                ExportEvent::Completed { .. } => break,
            }
        }
    });

    let rendered = tokio::task::spawn_blocking(move || {
        let mut coordinator = PipelineCoordinator::with_events(events_tx);
        coordinator.run(&job, &mut Identity)
    })
    .await?;
    let _ = printer.await;

    match rendered {
        Ok(path) => {
            println!("\nExport complete: {}", path.display());
            Ok(())
        }
        Err(e) => {
            println!("\nExport failed: {e}");
            Err(e.into())
        }
    }
}
