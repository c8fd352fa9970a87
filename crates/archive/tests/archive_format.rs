//! Archive format properties shared by both writer strategies.

use phosphor_archive::{
    pad_len, ArchiveEntry, ArchiveWrite, ChunkedArchive, StreamingArchive,
};
use proptest::prelude::*;

const MTIME: u64 = 1_700_000_000;

fn build_both(sizes: &[usize]) -> (Vec<u8>, Vec<u8>) {
    let mut streaming = StreamingArchive::with_mtime(Vec::new(), MTIME);
    let mut chunked = ChunkedArchive::with_mtime(MTIME);

    for (i, &size) in sizes.iter().enumerate() {
        let entry = ArchiveEntry::new(format!("frame_{i:06}.png"), vec![i as u8; size]).unwrap();
        streaming.append(&entry).unwrap();
        chunked.append(&entry).unwrap();
    }

    streaming.finish().unwrap();
    chunked.finish().unwrap();
    (
        streaming.into_inner().unwrap(),
        chunked.into_bytes().unwrap(),
    )
}

fn expected_total(sizes: &[usize]) -> usize {
    sizes.iter().map(|&s| 512 + s + pad_len(s)).sum::<usize>() + 1024
}

proptest! {
    #[test]
    fn archive_size_matches_formula(sizes in prop::collection::vec(0usize..2048, 0..60)) {
        let (streamed, chunked) = build_both(&sizes);
        prop_assert_eq!(streamed.len(), expected_total(&sizes));
        prop_assert_eq!(streamed, chunked);
    }

    #[test]
    fn every_entry_lands_on_a_block_boundary(sizes in prop::collection::vec(0usize..2048, 1..30)) {
        let (streamed, _) = build_both(&sizes);
        prop_assert_eq!(streamed.len() % 512, 0);
    }
}

#[test]
fn three_entry_scenario_byte_count() {
    // payloads [100, 0, 512]: padding is [412, 512, 0]
    let sizes = [100usize, 0, 512];
    let (streamed, chunked) = build_both(&sizes);

    let expected = 3 * 512 + (100 + 0 + 512) + (412 + 512 + 0) + 1024;
    assert_eq!(streamed.len(), expected);
    assert_eq!(chunked.len(), expected);
}

#[test]
fn exact_block_multiple_contributes_no_padding() {
    let (streamed, _) = build_both(&[512]);
    assert_eq!(streamed.len(), 512 + 512 + 1024);
}

#[test]
fn terminator_is_1024_zero_bytes() {
    let (streamed, _) = build_both(&[33]);
    let tail = &streamed[streamed.len() - 1024..];
    assert!(tail.iter().all(|&b| b == 0));
}
