//! Archive writer strategies.
//!
//! Two interchangeable strategies serialize an open-ended sequence of
//! entries into one streamed archive:
//!
//! - [`StreamingArchive`] writes each entry's header, payload, and
//!   padding to an open output handle as it arrives. O(1) memory.
//! - [`ChunkedArchive`] accumulates entries into fixed-size batches,
//!   serializes each batch once into an immutable block, and
//!   concatenates the blocks at the end. Used where no incremental
//!   output handle is available.
//!
//! An archive is not complete until [`ArchiveWrite::finish`] has
//! written the 1024-byte terminator. [`ArchiveWrite::abort`] discards
//! the in-progress output; callers map an abort to a cancellation
//! error, which is distinct from I/O failure.

use std::io::Write;

use phosphor_common::error::{PhosphorError, PhosphorResult};

use crate::header::{entry_header, framed_len, pad_len, NAME_LEN, TERMINATOR_LEN};

/// Entries per serialized block in the chunked strategy.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// One named byte payload. Immutable once created.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    name: String,
    payload: Vec<u8>,
}

impl ArchiveEntry {
    /// Create an entry. The name must fit the 100-byte header field.
    pub fn new(name: impl Into<String>, payload: Vec<u8>) -> PhosphorResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(PhosphorError::archive("entry name is empty"));
        }
        if name.len() > NAME_LEN {
            return Err(PhosphorError::archive(format!(
                "entry name exceeds {NAME_LEN} bytes: {name}"
            )));
        }
        Ok(Self { name, payload })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Framed size of this entry in the archive.
    pub fn framed_len(&self) -> usize {
        framed_len(self.payload.len())
    }
}

/// Terminal writer for an ordered sequence of archive entries.
pub trait ArchiveWrite: Send {
    /// Append one entry. Entries are framed in arrival order.
    fn append(&mut self, entry: &ArchiveEntry) -> PhosphorResult<()>;

    /// Write the archive terminator and seal the archive.
    /// Returns the total archive size in bytes.
    fn finish(&mut self) -> PhosphorResult<u64>;

    /// Discard the in-progress archive. Idempotent; a no-op after
    /// `finish`.
    fn abort(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    Finished,
    Aborted,
}

fn wall_mtime() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Strategy A: direct incremental writes to an open output handle.
pub struct StreamingArchive<W: Write + Send> {
    out: Option<W>,
    mtime_secs: u64,
    bytes_written: u64,
    state: WriterState,
}

impl<W: Write + Send> StreamingArchive<W> {
    /// Stream entries into `out`, stamping headers with the current
    /// wall-clock time.
    pub fn new(out: W) -> Self {
        Self::with_mtime(out, wall_mtime())
    }

    /// Stream entries with a fixed modification time. Two writers
    /// given the same mtime and entry sequence produce byte-identical
    /// archives.
    pub fn with_mtime(out: W, mtime_secs: u64) -> Self {
        Self {
            out: Some(out),
            mtime_secs,
            bytes_written: 0,
            state: WriterState::Open,
        }
    }

    /// Bytes written so far (excluding the terminator until `finish`).
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Recover the output handle after `finish`.
    pub fn into_inner(mut self) -> Option<W> {
        self.out.take()
    }

    fn handle(&mut self) -> PhosphorResult<&mut W> {
        match self.state {
            WriterState::Open => {}
            WriterState::Finished => {
                return Err(PhosphorError::archive("archive already finished"))
            }
            WriterState::Aborted => return Err(PhosphorError::archive("archive aborted")),
        }
        self.out
            .as_mut()
            .ok_or_else(|| PhosphorError::archive("output handle gone"))
    }
}

impl<W: Write + Send> ArchiveWrite for StreamingArchive<W> {
    fn append(&mut self, entry: &ArchiveEntry) -> PhosphorResult<()> {
        let mtime = self.mtime_secs;
        let out = self.handle()?;

        let header = entry_header(entry.name(), entry.payload().len(), mtime);
        out.write_all(&header)?;
        out.write_all(entry.payload())?;
        let padding = pad_len(entry.payload().len());
        if padding > 0 {
            out.write_all(&vec![0u8; padding])?;
        }

        self.bytes_written += entry.framed_len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> PhosphorResult<u64> {
        let out = self.handle()?;
        out.write_all(&[0u8; TERMINATOR_LEN])?;
        out.flush()?;
        self.bytes_written += TERMINATOR_LEN as u64;
        self.state = WriterState::Finished;
        tracing::debug!(bytes = self.bytes_written, "Archive stream finished");
        Ok(self.bytes_written)
    }

    fn abort(&mut self) {
        if self.state == WriterState::Open {
            self.out.take();
            self.state = WriterState::Aborted;
            tracing::debug!("Archive stream aborted, partial output discarded");
        }
    }
}

/// Strategy B: chunked accumulation into immutable blocks.
pub struct ChunkedArchive {
    mtime_secs: u64,
    batch_size: usize,
    pending: Vec<ArchiveEntry>,
    blocks: Vec<Vec<u8>>,
    state: WriterState,
}

impl ChunkedArchive {
    pub fn new() -> Self {
        Self::with_mtime(wall_mtime())
    }

    pub fn with_mtime(mtime_secs: u64) -> Self {
        Self::with_batch_size(mtime_secs, DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(mtime_secs: u64, batch_size: usize) -> Self {
        Self {
            mtime_secs,
            batch_size: batch_size.max(1),
            pending: Vec::new(),
            blocks: Vec::new(),
            state: WriterState::Open,
        }
    }

    /// Serialized blocks built so far. Each block is read-only once
    /// created.
    pub fn blocks(&self) -> &[Vec<u8>] {
        &self.blocks
    }

    /// Concatenate all blocks plus the terminator. Requires `finish`.
    pub fn into_bytes(self) -> PhosphorResult<Vec<u8>> {
        if self.state != WriterState::Finished {
            return Err(PhosphorError::archive("archive not finished"));
        }
        let total: usize = self.blocks.iter().map(Vec::len).sum();
        let mut bytes = Vec::with_capacity(total + TERMINATOR_LEN);
        for block in &self.blocks {
            bytes.extend_from_slice(block);
        }
        bytes.extend_from_slice(&[0u8; TERMINATOR_LEN]);
        Ok(bytes)
    }

    fn flush_batch(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let total: usize = self.pending.iter().map(ArchiveEntry::framed_len).sum();
        let mut block = Vec::with_capacity(total);
        for entry in &self.pending {
            let header = entry_header(entry.name(), entry.payload().len(), self.mtime_secs);
            block.extend_from_slice(&header);
            block.extend_from_slice(entry.payload());
            block.resize(block.len() + pad_len(entry.payload().len()), 0);
        }
        self.blocks.push(block);
        self.pending.clear();
    }

    fn ensure_open(&self) -> PhosphorResult<()> {
        match self.state {
            WriterState::Open => Ok(()),
            WriterState::Finished => Err(PhosphorError::archive("archive already finished")),
            WriterState::Aborted => Err(PhosphorError::archive("archive aborted")),
        }
    }
}

impl Default for ChunkedArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveWrite for ChunkedArchive {
    fn append(&mut self, entry: &ArchiveEntry) -> PhosphorResult<()> {
        self.ensure_open()?;
        self.pending.push(entry.clone());
        if self.pending.len() >= self.batch_size {
            self.flush_batch();
        }
        Ok(())
    }

    fn finish(&mut self) -> PhosphorResult<u64> {
        self.ensure_open()?;
        self.flush_batch();
        self.state = WriterState::Finished;
        let total =
            self.blocks.iter().map(|b| b.len() as u64).sum::<u64>() + TERMINATOR_LEN as u64;
        tracing::debug!(bytes = total, blocks = self.blocks.len(), "Archive chunks finished");
        Ok(total)
    }

    fn abort(&mut self) {
        if self.state == WriterState::Open {
            self.pending.clear();
            self.state = WriterState::Aborted;
            tracing::debug!("Chunked archive aborted, pending batch discarded");
        }
    }
}
