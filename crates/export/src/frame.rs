//! Frame model and raw-stream framing.

use std::io::Read;

use phosphor_common::error::{PhosphorError, PhosphorResult, Stage};

/// Bytes per pixel for the fixed RGBA wire format.
pub const BYTES_PER_PIXEL: usize = 4;

/// One uncompressed RGBA pixel buffer tagged with a sequence index.
///
/// Ownership transfers fully at each hand-off: created by the source,
/// consumed exactly once by the transform, consumed exactly once by
/// the sink.
#[derive(Debug)]
pub struct Frame {
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    /// Wrap a pixel buffer, checking it matches the declared size.
    pub fn new(index: u64, width: u32, height: u32, pixels: Vec<u8>) -> PhosphorResult<Self> {
        let expected = Self::byte_len(width, height);
        if pixels.len() != expected {
            return Err(PhosphorError::validation(format!(
                "frame {index}: buffer is {} bytes, expected {expected} for {width}x{height}",
                pixels.len()
            )));
        }
        Ok(Self {
            index,
            width,
            height,
            pixels,
        })
    }

    /// Byte length of one raw frame at the given dimensions.
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * BYTES_PER_PIXEL
    }
}

/// Round a dimension down to the nearest even integer.
///
/// H.264 requires even dimensions; the sanitized size must be used
/// consistently for the decode scale target, the transform surface,
/// and the encode input declaration.
pub fn sanitize_even(v: u32) -> u32 {
    v - v % 2
}

/// Reverse row order of a raw frame.
///
/// Framebuffer readback is bottom-up; container and archive formats
/// expect top-down rows.
pub fn flip_rows(pixels: &[u8], width: u32, height: u32) -> Vec<u8> {
    let stride = width as usize * BYTES_PER_PIXEL;
    debug_assert_eq!(pixels.len(), stride * height as usize);

    let mut flipped = Vec::with_capacity(pixels.len());
    for row in pixels.chunks_exact(stride).rev() {
        flipped.extend_from_slice(row);
    }
    flipped
}

/// Accumulates an unframed byte stream into whole raw frames.
///
/// The decode stage emits back-to-back `W*H*4`-byte frames with no
/// framing; partial reads are buffered here and never forwarded short.
pub struct RawFrameReader<R: Read> {
    inner: R,
    frame_len: usize,
    buf: Vec<u8>,
    filled: usize,
}

impl<R: Read> RawFrameReader<R> {
    pub fn new(inner: R, width: u32, height: u32) -> Self {
        let frame_len = Frame::byte_len(width, height);
        Self {
            inner,
            frame_len,
            buf: vec![0u8; frame_len],
            filled: 0,
        }
    }

    /// Pull the next whole frame.
    ///
    /// Returns `Ok(None)` on a clean end of stream at a frame
    /// boundary. End of stream mid-frame is a decode-stage error.
    pub fn next_frame(&mut self) -> PhosphorResult<Option<Vec<u8>>> {
        loop {
            let n = self.inner.read(&mut self.buf[self.filled..])?;
            if n == 0 {
                if self.filled == 0 {
                    return Ok(None);
                }
                return Err(PhosphorError::subprocess(
                    Stage::Decode,
                    format!(
                        "raw stream ended mid-frame ({} of {} bytes buffered)",
                        self.filled, self.frame_len
                    ),
                ));
            }
            self.filled += n;
            if self.filled == self.frame_len {
                self.filled = 0;
                let frame = std::mem::replace(&mut self.buf, vec![0u8; self.frame_len]);
                return Ok(Some(frame));
            }
        }
    }

    /// Bytes currently buffered toward an incomplete frame.
    pub fn buffered(&self) -> usize {
        self.filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_sanitize_even() {
        assert_eq!(sanitize_even(1920), 1920);
        assert_eq!(sanitize_even(1921), 1920);
        assert_eq!(sanitize_even(1), 0);
        assert_eq!(sanitize_even(0), 0);
        for v in 0..200u32 {
            let s = sanitize_even(v);
            assert_eq!(s % 2, 0);
            assert!(s <= v);
        }
    }

    #[test]
    fn test_frame_rejects_mismatched_buffer() {
        assert!(Frame::new(0, 2, 2, vec![0; 16]).is_ok());
        assert!(Frame::new(0, 2, 2, vec![0; 15]).is_err());
    }

    #[test]
    fn test_flip_rows_reverses_row_order() {
        // 1x3 frame: rows r0, r1, r2 bottom-up become r2, r1, r0.
        let pixels: Vec<u8> = vec![
            0, 0, 0, 0, // row 0
            1, 1, 1, 1, // row 1
            2, 2, 2, 2, // row 2
        ];
        let flipped = flip_rows(&pixels, 1, 3);
        assert_eq!(flipped[..4], [2, 2, 2, 2]);
        assert_eq!(flipped[4..8], [1, 1, 1, 1]);
        assert_eq!(flipped[8..], [0, 0, 0, 0]);
    }

    #[test]
    fn test_flip_rows_is_involutive() {
        let pixels: Vec<u8> = (0..2 * 4 * 4).map(|i| i as u8).collect();
        assert_eq!(flip_rows(&flip_rows(&pixels, 2, 4), 2, 4), pixels);
    }

    /// Reader that returns at most 3 bytes per read call.
    struct Trickle<R: Read>(R);

    impl<R: Read> Read for Trickle<R> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let cap = buf.len().min(3);
            self.0.read(&mut buf[..cap])
        }
    }

    #[test]
    fn test_reader_buffers_partial_reads() {
        // Two 1x2 frames (8 bytes each) delivered 3 bytes at a time.
        let stream: Vec<u8> = (0..16).collect();
        let mut reader = RawFrameReader::new(Trickle(Cursor::new(stream)), 1, 2);

        let first = reader.next_frame().unwrap().unwrap();
        assert_eq!(first, (0..8).collect::<Vec<u8>>());
        let second = reader.next_frame().unwrap().unwrap();
        assert_eq!(second, (8..16).collect::<Vec<u8>>());
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_reader_rejects_eof_mid_frame() {
        let stream: Vec<u8> = vec![0; 5]; // less than one 1x2 frame
        let mut reader = RawFrameReader::new(Cursor::new(stream), 1, 2);
        let err = reader.next_frame().unwrap_err();
        assert!(err.to_string().contains("mid-frame"));
    }
}
