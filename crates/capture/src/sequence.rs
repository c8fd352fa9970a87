//! Paced archive sequence export.
//!
//! The producer freezes its source's time progression around each
//! entry: pause, render, hand the entry to the writer, then advance.
//! Every third entry the task yields so a UI sharing the runtime
//! stays responsive.

use std::sync::atomic::{AtomicBool, Ordering};

use phosphor_archive::ArchiveWrite;
use phosphor_common::error::{PhosphorError, PhosphorResult};
use phosphor_export::sink::{ArchiveSink, EncodedSink};

/// Entries between cooperative yields.
pub const YIELD_EVERY: u64 = 3;

/// Control over the producing source's time progression.
pub trait PlaybackControl: Send {
    fn pause(&mut self) -> PhosphorResult<()>;
    fn resume(&mut self) -> PhosphorResult<()>;
}

/// Produces one encoded still per frame index.
pub trait SequenceSource: Send {
    fn frame_count(&self) -> u64;

    /// Render and encode the entry at `index`. The source's clock is
    /// paused for the duration of this call.
    fn render_entry(&mut self, index: u64) -> PhosphorResult<Vec<u8>>;
}

/// Export every frame of the source into the archive.
///
/// The cancellation flag is checked once per entry. On cancellation
/// or error the archive is aborted and the source's playback state is
/// restored exactly once; cancellation surfaces as `Cancelled`,
/// distinct from I/O failure.
pub async fn export_sequence<A: ArchiveWrite>(
    source: &mut dyn SequenceSource,
    playback: &mut dyn PlaybackControl,
    sink: &mut ArchiveSink<A>,
    cancel: &AtomicBool,
) -> PhosphorResult<u64> {
    let total = source.frame_count();
    if total == 0 {
        return Err(PhosphorError::validation("sequence has no frames"));
    }
    tracing::info!(total, "Starting sequence export");

    for index in 0..total {
        if cancel.load(Ordering::SeqCst) {
            sink.abort();
            tracing::info!(exported = index, "Sequence export cancelled");
            return Err(PhosphorError::cancelled(format!(
                "sequence export stopped after {index} of {total} entries"
            )));
        }

        playback.pause()?;
        let handed_over = source
            .render_entry(index)
            .and_then(|bytes| sink.accept(index, bytes));
        // Whatever happened, playback state must be restored exactly
        // once before this entry is finished with.
        let resumed = playback.resume();

        if let Err(err) = handed_over {
            sink.abort();
            return Err(err);
        }
        if let Err(err) = resumed {
            // a writer nobody will finish is a partial output; discard it
            sink.abort();
            return Err(err);
        }

        if (index + 1) % YIELD_EVERY == 0 {
            tokio::task::yield_now().await;
        }
    }

    sink.finalize()?;
    tracing::info!(total, "Sequence export complete");
    Ok(total)
}

/// One-entry archive for a single still image.
pub fn export_still<A: ArchiveWrite>(
    sink: &mut ArchiveSink<A>,
    bytes: Vec<u8>,
) -> PhosphorResult<()> {
    sink.accept(0, bytes)?;
    sink.finalize()
}
