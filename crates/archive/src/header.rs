//! Tar (ustar) entry header codec.
//!
//! Pure functions, no state. Field layout:
//!
//! | offset  | len | field                          |
//! |---------|-----|--------------------------------|
//! | 0       | 100 | entry name                     |
//! | 100     | 8   | file mode, octal ASCII         |
//! | 108     | 8   | owner id, octal ASCII          |
//! | 116     | 8   | group id, octal ASCII          |
//! | 124     | 12  | size, 11 octal digits + NUL    |
//! | 136     | 12  | mtime, 11 octal digits + NUL   |
//! | 148     | 8   | checksum                       |
//! | 156     | 1   | type flag                      |
//! | 257     | 6   | magic "ustar\0"                |
//! | 263     | 2   | version "00"                   |
//! | 265     | 32  | owner name                     |
//! | 297     | 32  | group name                     |
//!
//! The checksum is the byte sum of the header with the checksum field
//! treated as 8 ASCII spaces, written back as 6 octal digits, NUL,
//! space.

/// Size of one archive block; headers are one block, payloads are
/// zero-padded to a block boundary.
pub const BLOCK_LEN: usize = 512;

/// The archive ends with exactly this many zero bytes.
pub const TERMINATOR_LEN: usize = 1024;

/// Maximum entry name length in bytes.
pub const NAME_LEN: usize = 100;

const MODE_FIELD: &[u8; 8] = b"0000777\0";
const ID_FIELD: &[u8; 8] = b"0000000\0";
const MAGIC: &[u8; 6] = b"ustar\0";
const VERSION: &[u8; 2] = b"00";
const OWNER: &[u8] = b"user";
const TYPE_REGULAR: u8 = b'0';

/// Padding bytes needed after a payload of `size` bytes.
pub fn pad_len(size: usize) -> usize {
    let remainder = size % BLOCK_LEN;
    if remainder == 0 {
        0
    } else {
        BLOCK_LEN - remainder
    }
}

/// Total framed size of one entry: header + payload + padding.
pub fn framed_len(payload_len: usize) -> usize {
    BLOCK_LEN + payload_len + pad_len(payload_len)
}

/// Build the 512-byte header for one entry.
///
/// `name` is truncated to 100 bytes by the caller; `mtime_secs` is
/// seconds since the Unix epoch.
pub fn entry_header(name: &str, size: usize, mtime_secs: u64) -> [u8; BLOCK_LEN] {
    let mut buf = [0u8; BLOCK_LEN];

    let name_bytes = name.as_bytes();
    let name_len = name_bytes.len().min(NAME_LEN);
    buf[..name_len].copy_from_slice(&name_bytes[..name_len]);

    buf[100..108].copy_from_slice(MODE_FIELD);
    buf[108..116].copy_from_slice(ID_FIELD);
    buf[116..124].copy_from_slice(ID_FIELD);
    write_octal_11(&mut buf[124..136], size as u64);
    write_octal_11(&mut buf[136..148], mtime_secs);
    buf[156] = TYPE_REGULAR;
    buf[257..263].copy_from_slice(MAGIC);
    buf[263..265].copy_from_slice(VERSION);
    buf[265..265 + OWNER.len()].copy_from_slice(OWNER);
    buf[297..297 + OWNER.len()].copy_from_slice(OWNER);

    // Checksum field counts as spaces while summing.
    buf[148..156].fill(b' ');
    let sum: u32 = buf.iter().map(|&b| b as u32).sum();

    let digits = format!("{sum:06o}");
    let digits = &digits.as_bytes()[digits.len() - 6..];
    buf[148..154].copy_from_slice(digits);
    buf[154] = 0;
    buf[155] = b' ';

    buf
}

/// Recompute the checksum of a written header, applying the same
/// spaces-for-checksum rule the writer used.
pub fn compute_checksum(header: &[u8; BLOCK_LEN]) -> u32 {
    header
        .iter()
        .enumerate()
        .map(|(i, &b)| if (148..156).contains(&i) { 0x20 } else { b as u32 })
        .sum()
}

/// Parse the checksum field of a written header.
pub fn parse_checksum(header: &[u8; BLOCK_LEN]) -> Option<u32> {
    let field = &header[148..154];
    let text = std::str::from_utf8(field).ok()?;
    u32::from_str_radix(text, 8).ok()
}

/// Parse the size field of a written header.
pub fn parse_size(header: &[u8; BLOCK_LEN]) -> Option<u64> {
    let field = &header[124..135];
    let text = std::str::from_utf8(field).ok()?;
    u64::from_str_radix(text, 8).ok()
}

/// 11 zero-padded octal digits followed by NUL.
fn write_octal_11(field: &mut [u8], value: u64) {
    let digits = format!("{value:011o}");
    let digits = &digits.as_bytes()[digits.len() - 11..];
    field[..11].copy_from_slice(digits);
    field[11] = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_len() {
        assert_eq!(pad_len(0), 0);
        assert_eq!(pad_len(1), 511);
        assert_eq!(pad_len(100), 412);
        assert_eq!(pad_len(511), 1);
        assert_eq!(pad_len(512), 0);
        assert_eq!(pad_len(513), 511);
        assert_eq!(pad_len(1024), 0);
    }

    #[test]
    fn test_framed_len() {
        assert_eq!(framed_len(0), 512);
        assert_eq!(framed_len(100), 512 + 100 + 412);
        assert_eq!(framed_len(512), 1024);
    }

    #[test]
    fn test_header_field_layout() {
        let header = entry_header("frame_000000.png", 1234, 1_700_000_000);

        assert_eq!(&header[..16], b"frame_000000.png");
        assert_eq!(header[16], 0);
        assert_eq!(&header[100..108], b"0000777\0");
        assert_eq!(&header[108..116], b"0000000\0");
        assert_eq!(&header[116..124], b"0000000\0");
        assert_eq!(&header[124..136], b"00000002322\0"); // 1234 octal
        assert_eq!(header[156], b'0');
        assert_eq!(&header[257..263], b"ustar\0");
        assert_eq!(&header[263..265], b"00");
        assert_eq!(&header[265..269], b"user");
        assert_eq!(&header[297..301], b"user");
    }

    #[test]
    fn test_checksum_round_trip() {
        let header = entry_header("a.png", 42, 1_700_000_000);
        let written = parse_checksum(&header).unwrap();
        assert_eq!(written, compute_checksum(&header));
        assert_eq!(header[154], 0);
        assert_eq!(header[155], b' ');
    }

    #[test]
    fn test_size_round_trip() {
        let header = entry_header("a.png", 987_654, 0);
        assert_eq!(parse_size(&header), Some(987_654));
    }

    #[test]
    fn test_name_truncated_at_100_bytes() {
        let long = "x".repeat(200);
        let header = entry_header(&long, 0, 0);
        assert!(header[..100].iter().all(|&b| b == b'x'));
        assert_eq!(&header[100..108], b"0000777\0");
    }
}
