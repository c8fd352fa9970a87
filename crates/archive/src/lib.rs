//! Phosphor Archive Writer
//!
//! Streamed, tar-compatible archive of independently framed byte
//! entries, used for image-sequence exports. Bounded memory via one of
//! two interchangeable strategies:
//!
//! ```text
//! entries ──► StreamingArchive ──► open output handle   (O(1) memory)
//!         └─► ChunkedArchive  ──► immutable blocks      (O(n/batch))
//! ```
//!
//! Both strategies produce byte-identical output for the same entry
//! sequence. Consumers can extract the result with any tar
//! implementation; no other metadata is required.

pub mod header;
pub mod writer;

pub use header::{entry_header, framed_len, pad_len, BLOCK_LEN, TERMINATOR_LEN};
pub use writer::{ArchiveEntry, ArchiveWrite, ChunkedArchive, StreamingArchive};
