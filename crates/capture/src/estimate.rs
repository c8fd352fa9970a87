//! Rough output-size estimates shown before an export starts.

use phosphor_export::ContainerFormat;

const WEBP_BYTES_PER_FRAME: f64 = 20_000.0;
const GIF_BYTES_PER_FRAME: f64 = 50_000.0;
const MP4_BITRATE_BPS: f64 = 2_500_000.0;

/// Estimated output size in bytes for exporting `frames` frames of
/// `duration_secs` at the given quality. These are ballpark figures
/// for a progress UI, not promises.
pub fn estimate_export_bytes(
    format: ContainerFormat,
    frames: u64,
    quality: f64,
    duration_secs: f64,
) -> u64 {
    let q = quality.clamp(0.0, 1.0);
    let estimate = match format {
        ContainerFormat::WebpAnim => frames as f64 * WEBP_BYTES_PER_FRAME * q,
        ContainerFormat::Gif => frames as f64 * GIF_BYTES_PER_FRAME * q,
        ContainerFormat::Mp4 => MP4_BITRATE_BPS * q * duration_secs / 8.0,
    };
    estimate.max(0.0) as u64
}
