//! Record and window fingerprinting.
//!
//! A [`RecordFp`] identifies a single record's content (after an optional
//! prefix skip and user transform); a [`WindowFp`] identifies `W` consecutive
//! record fingerprints. Both are non-cryptographic: collisions are tolerated
//! because the engine never requires bytewise equality, only a chain of
//! matching fingerprints (see spec §3, "Record Fingerprint").

use xxhash_rust::xxh3::{xxh3_128, xxh3_64};

use crate::error::CliResult;

/// Digest of a single record's (post-skip, post-transform) content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct RecordFp(pub u64);

/// Digest of `W` consecutive record fingerprints, plus `W` itself so that
/// windows of different widths never collide when sharing a library.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct WindowFp(pub u128);

/// A pure record -> record transform applied before hashing (not before
/// output). Implemented by the optional subprocess bridge in `transform.rs`;
/// kept as a trait so the engine stays decoupled from process spawning.
pub trait HashTransform {
    /// Must return exactly the bytes to hash. Framing validation (embedded
    /// delimiters, multiple records) is the implementor's responsibility.
    fn apply(&self, record: &[u8]) -> CliResult<Vec<u8>>;
}

/// Drop `skip_prefix` bytes (binary mode) or chars (text mode) from the
/// front of `record`. Per spec §9, a `skip_prefix` beyond the record's
/// length hashes the empty slice rather than erroring.
pub fn skip_prefix<'a>(record: &'a [u8], skip_prefix: usize, text_mode: bool) -> &'a [u8] {
    if skip_prefix == 0 {
        return record;
    }
    if text_mode {
        // Record bytes are already validated UTF-8 by the reader.
        let s = std::str::from_utf8(record).unwrap_or("");
        match s.char_indices().nth(skip_prefix) {
            Some((byte_idx, _)) => &record[byte_idx..],
            None => &[],
        }
    } else if skip_prefix >= record.len() {
        &[]
    } else {
        &record[skip_prefix..]
    }
}

pub fn fp_record(
    record: &[u8],
    skip: usize,
    text_mode: bool,
    transform: Option<&dyn HashTransform>,
) -> CliResult<RecordFp> {
    let sliced = skip_prefix(record, skip, text_mode);
    let fp = match transform {
        Some(t) => xxh3_64(&t.apply(sliced)?),
        None => xxh3_64(sliced),
    };
    Ok(RecordFp(fp))
}

pub fn fp_window(w: usize, record_fps: &[RecordFp]) -> WindowFp {
    let mut buf = Vec::with_capacity(8 + record_fps.len() * 8);
    buf.extend_from_slice(&(w as u64).to_le_bytes());
    for fp in record_fps {
        buf.extend_from_slice(&fp.0.to_le_bytes());
    }
    WindowFp(xxh3_128(&buf))
}

/// Full-sequence fingerprint used for the on-disk `<hash>.uniqseq` filename
/// (spec §6, §9.5): the aggregate window hash over a sequence's own window
/// fingerprints, re-hashed with the sequence length as the disambiguating
/// scalar -- mirrors `compute_sequence_hash` in the original implementation.
pub fn fp_sequence(window_fps: &[WindowFp], num_records: usize) -> WindowFp {
    let mut buf = Vec::with_capacity(8 + window_fps.len() * 16);
    buf.extend_from_slice(&(num_records as u64).to_le_bytes());
    for fp in window_fps {
        buf.extend_from_slice(&fp.0.to_le_bytes());
    }
    WindowFp(xxh3_128(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_fp_is_deterministic() {
        let a = fp_record(b"hello world", 0, true, None).unwrap();
        let b = fp_record(b"hello world", 0, true, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn skip_prefix_past_end_hashes_empty() {
        let a = fp_record(b"ab", 100, false, None).unwrap();
        let b = fp_record(b"", 0, false, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn skip_prefix_text_mode_counts_chars_not_bytes() {
        // "é" is 2 bytes in UTF-8 but one char.
        let s = "éxyz";
        let a = skip_prefix(s.as_bytes(), 1, true);
        assert_eq!(a, b"xyz");
    }

    #[test]
    fn window_fp_distinguishes_width() {
        let fps = vec![RecordFp(1), RecordFp(2)];
        let w2 = fp_window(2, &fps);
        let w3 = fp_window(3, &fps);
        assert_ne!(w2, w3);
    }

    #[test]
    fn window_fp_order_sensitive() {
        let a = fp_window(2, &[RecordFp(1), RecordFp(2)]);
        let b = fp_window(2, &[RecordFp(2), RecordFp(1)]);
        assert_ne!(a, b);
    }
}
