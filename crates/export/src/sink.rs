//! Encoded-frame sinks: streamed archive of stills and subprocess
//! container encoders.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, ChildStdin};
use std::thread::JoinHandle;

use phosphor_archive::{ArchiveEntry, ArchiveWrite};
use phosphor_common::error::{PhosphorError, PhosphorResult, Stage};

use crate::ffmpeg::{self, ContainerFormat};

/// Destination for encoded frame payloads, delivered strictly in
/// frame-index order.
pub trait EncodedSink: Send {
    fn accept(&mut self, frame_index: u64, bytes: Vec<u8>) -> PhosphorResult<()>;

    /// Seal the output. Must be called exactly once after the final
    /// frame; anything not finalized is an unusable partial output.
    fn finalize(&mut self) -> PhosphorResult<()>;
}

/// Streams encoded stills into an archive as they arrive.
pub struct ArchiveSink<A: ArchiveWrite> {
    writer: A,
    extension: String,
    next_index: u64,
}

impl<A: ArchiveWrite> ArchiveSink<A> {
    pub fn new(writer: A, extension: impl Into<String>) -> Self {
        Self {
            writer,
            extension: extension.into(),
            next_index: 0,
        }
    }

    /// Abandon the archive, discarding buffered state.
    pub fn abort(&mut self) {
        self.writer.abort();
    }

    pub fn into_writer(self) -> A {
        self.writer
    }
}

impl<A: ArchiveWrite> EncodedSink for ArchiveSink<A> {
    fn accept(&mut self, frame_index: u64, bytes: Vec<u8>) -> PhosphorResult<()> {
        if frame_index != self.next_index {
            return Err(PhosphorError::archive(format!(
                "out-of-order entry: got frame {frame_index}, expected {}",
                self.next_index
            )));
        }
        let name = format!("frame_{frame_index:06}.{}", self.extension);
        let entry = ArchiveEntry::new(name, bytes)?;
        self.writer.append(&entry)?;
        self.next_index += 1;
        Ok(())
    }

    fn finalize(&mut self) -> PhosphorResult<()> {
        let total = self.writer.finish()?;
        tracing::debug!(entries = self.next_index, bytes = total, "Archive sealed");
        Ok(())
    }
}

/// Feeds raw frames to an encode subprocess and owns its lifecycle.
///
/// Success is determined solely by the child's exit status after its
/// stdin has been closed; an output file existing on disk proves
/// nothing.
pub struct ContainerSink {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_task: Option<JoinHandle<String>>,
    output_path: PathBuf,
}

impl ContainerSink {
    /// Spawn the encode subprocess for the given container format.
    pub fn spawn(
        format: ContainerFormat,
        width: u32,
        height: u32,
        fps: u32,
        quality: f64,
        output_path: PathBuf,
    ) -> PhosphorResult<Self> {
        let args = ffmpeg::encoder_args(format, width, height, fps, quality, &output_path);
        let mut child = ffmpeg::spawn_ffmpeg(Stage::Encode, &args)?;

        let stdin = child.stdin.take().ok_or_else(|| {
            PhosphorError::subprocess(Stage::Encode, "failed to capture encoder stdin")
        })?;
        let stderr_task = ffmpeg::drain_stderr(&mut child);

        Ok(Self {
            child: Some(child),
            stdin: Some(stdin),
            stderr_task,
            output_path,
        })
    }

    /// Write one raw frame to the encoder. A broken pipe means the
    /// encoder died; surface that as an encode-stage error.
    pub fn write_frame(&mut self, pixels: &[u8]) -> PhosphorResult<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            PhosphorError::subprocess(Stage::Encode, "encoder input already closed")
        })?;
        stdin.write_all(pixels).map_err(|e| {
            PhosphorError::subprocess(Stage::Encode, format!("writing frame to encoder: {e}"))
        })
    }

    /// Close the encoder's stdin, signalling end of input. Safe to
    /// call more than once; only the first call has an effect.
    pub fn close_input(&mut self) {
        if let Some(stdin) = self.stdin.take() {
            drop(stdin);
        }
    }

    /// Wait for the encoder to exit. Exit code zero is the only
    /// success condition.
    pub fn wait(&mut self) -> PhosphorResult<PathBuf> {
        self.close_input();
        let mut child = self.child.take().ok_or_else(|| {
            PhosphorError::subprocess(Stage::Encode, "encoder already reaped")
        })?;

        let status = child.wait().map_err(|e| {
            PhosphorError::subprocess(Stage::Encode, format!("waiting for encoder: {e}"))
        })?;
        let captured = self
            .stderr_task
            .take()
            .and_then(|task| task.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(PhosphorError::subprocess(
                Stage::Encode,
                format!(
                    "encoder exited with {status}: {}",
                    ffmpeg::stderr_tail(&captured)
                ),
            ));
        }

        Ok(self.output_path.clone())
    }

    /// Kill the encoder if it is still running. Idempotent.
    pub fn kill(&mut self) {
        self.close_input();
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(task) = self.stderr_task.take() {
            let _ = task.join();
        }
    }
}

impl Drop for ContainerSink {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phosphor_archive::ChunkedArchive;

    #[test]
    fn test_archive_sink_names_entries_sequentially() {
        let mut sink = ArchiveSink::new(ChunkedArchive::new(), "png");
        sink.accept(0, vec![1, 2, 3]).unwrap();
        sink.accept(1, vec![4, 5]).unwrap();
        sink.finalize().unwrap();

        let bytes = sink.into_writer().into_bytes().unwrap();
        let name = std::str::from_utf8(&bytes[..16]).unwrap();
        assert!(name.starts_with("frame_000000.png"));
    }

    #[test]
    fn test_archive_sink_rejects_out_of_order_frames() {
        let mut sink = ArchiveSink::new(ChunkedArchive::new(), "png");
        sink.accept(0, vec![0]).unwrap();
        let err = sink.accept(2, vec![0]).unwrap_err();
        assert!(err.to_string().contains("out-of-order"));
    }

    #[test]
    fn test_archive_sink_rejects_duplicate_index() {
        let mut sink = ArchiveSink::new(ChunkedArchive::new(), "png");
        sink.accept(0, vec![0]).unwrap();
        assert!(sink.accept(0, vec![0]).is_err());
    }
}
