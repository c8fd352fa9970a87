//! ffmpeg/ffprobe invocation: argument construction, probing, and
//! subprocess plumbing shared by the pipeline stages.

use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;

use phosphor_common::error::{PhosphorError, PhosphorResult, Stage};

/// Output container formats supported by the whole-media pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    Mp4,
    WebpAnim,
    Gif,
}

impl ContainerFormat {
    pub fn from_name(name: &str) -> PhosphorResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "mp4" => Ok(Self::Mp4),
            "webp" => Ok(Self::WebpAnim),
            "gif" => Ok(Self::Gif),
            other => Err(PhosphorError::validation(format!(
                "unsupported output format: {other}"
            ))),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::WebpAnim => "webp",
            Self::Gif => "gif",
        }
    }
}

/// Map quality [0, 1] to an H.264 CRF value. Higher quality means a
/// lower CRF; q=1.0 gives 23, q=0.5 gives 37.
pub fn crf_for_quality(quality: f64) -> u32 {
    51 - (quality.clamp(0.0, 1.0) * 28.0).round() as u32
}

/// Map quality [0, 1] to a WebP quality percentage.
pub fn webp_quality_percent(quality: f64) -> u32 {
    (quality.clamp(0.0, 1.0) * 100.0).round() as u32
}

/// Arguments for the decode subprocess: demux the input, resample to
/// the target rate, scale to the sanitized dimensions, and emit raw
/// RGBA frames on stdout.
pub fn decoder_args(input: &Path, fps: u32, width: u32, height: u32) -> Vec<String> {
    vec![
        "-i".into(),
        input.display().to_string(),
        "-r".into(),
        fps.to_string(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgba".into(),
        "-vf".into(),
        format!("scale={width}:{height}"),
        "-".into(),
    ]
}

/// Arguments for the encode subprocess: consume raw RGBA frames on
/// stdin and write the output container.
pub fn encoder_args(
    format: ContainerFormat,
    width: u32,
    height: u32,
    fps: u32,
    quality: f64,
    output: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgba".into(),
        "-s".into(),
        format!("{width}x{height}"),
        "-r".into(),
        fps.to_string(),
        "-i".into(),
        "-".into(),
    ];

    match format {
        ContainerFormat::Mp4 => {
            args.extend([
                "-c:v".into(),
                "libx264".into(),
                "-preset".into(),
                "medium".into(),
                "-crf".into(),
                crf_for_quality(quality).to_string(),
                "-pix_fmt".into(),
                "yuv420p".into(),
                "-movflags".into(),
                "+faststart".into(),
            ]);
        }
        ContainerFormat::WebpAnim => {
            args.extend([
                "-c:v".into(),
                "libwebp_anim".into(),
                "-quality".into(),
                webp_quality_percent(quality).to_string(),
                "-loop".into(),
                "0".into(),
            ]);
        }
        ContainerFormat::Gif => {
            args.extend([
                "-vf".into(),
                "split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse".into(),
                "-loop".into(),
                "0".into(),
            ]);
        }
    }

    args.extend(["-y".into(), output.display().to_string()]);
    args
}

/// Spawn an ffmpeg process for the given stage with piped stdio.
pub fn spawn_ffmpeg(stage: Stage, args: &[String]) -> PhosphorResult<Child> {
    tracing::debug!(%stage, ?args, "Spawning ffmpeg");
    let mut cmd = Command::new("ffmpeg");
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    cmd.spawn()
        .map_err(|e| PhosphorError::subprocess(stage, format!("failed to start ffmpeg: {e}")))
}

/// Drain a child's stderr on a dedicated thread so the process never
/// blocks on a full stderr pipe. Join the handle after wait() to
/// recover diagnostics.
pub fn drain_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let stderr = child.stderr.take()?;
    Some(std::thread::spawn(move || -> String {
        use std::io::Read;
        let mut reader = std::io::BufReader::new(stderr);
        let mut output = String::new();
        match reader.read_to_string(&mut output) {
            Ok(_) => output,
            Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
        }
    }))
}

/// Last few lines of a stderr capture, for error messages.
pub fn stderr_tail(captured: &str) -> String {
    let lines: Vec<&str> = captured.lines().collect();
    let start = lines.len().saturating_sub(8);
    lines[start..].join("\n")
}

/// Check whether a binary is reachable on PATH.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Probe a media file's video dimensions with ffprobe.
pub fn probe_dimensions(path: &Path) -> Option<(u32, u32)> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=p=0:s=x",
        ])
        .arg(path)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let raw = String::from_utf8(output.stdout).ok()?;
    let line = raw.lines().next()?.trim();
    let (w, h) = line.split_once('x')?;
    let width = w.parse::<u32>().ok()?;
    let height = h.parse::<u32>().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

/// Probe a media file's duration in seconds with ffprobe.
pub fn probe_duration(path: &Path) -> Option<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "csv=p=0",
        ])
        .arg(path)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let raw = String::from_utf8(output.stdout).ok()?;
    let duration = raw.lines().next()?.trim().parse::<f64>().ok()?;
    if duration.is_finite() && duration > 0.0 {
        Some(duration)
    } else {
        None
    }
}
