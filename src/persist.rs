//! On-disk Sequence Library persistence (spec §6, §9.5), grounded in
//! `library.py`'s `save_sequence_file`/`load_sequences_from_directory`/
//! `save_metadata`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;

use crate::error::{CliError, CliResult};
use crate::fingerprint::{fp_record, fp_sequence, fp_window};
use crate::io::delimiter::Delimiter;

/// Noise files tolerated (and ignored) in a library directory, matching
/// `library.py`'s `SKIP_FILES`.
const SKIP_FILES: &[&str] = &[".DS_Store", ".gitignore", "README.md", "README.txt", ".keep"];

const EXTENSION: &str = "uniqseq";

/// Joins `records` with `delimiter`, with no trailing delimiter, and
/// writes them to `<hash>.uniqseq` under `dir`. Returns the path written.
pub fn save_sequence(
    dir: &Path,
    records: &[Vec<u8>],
    delimiter: &Delimiter,
    window_size: usize,
    skip_prefix: usize,
    text_mode: bool,
) -> CliResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let hash = sequence_hash(records, window_size, skip_prefix, text_mode)?;
    let path = dir.join(format!("{hash}.{EXTENSION}"));
    let joined = join_records(records, delimiter);
    fs::write(&path, joined)?;
    Ok(path)
}

fn join_records(records: &[Vec<u8>], delimiter: &Delimiter) -> Vec<u8> {
    let delim = delimiter.bytes();
    let mut out = Vec::new();
    for (i, r) in records.iter().enumerate() {
        if i > 0 {
            out.extend_from_slice(delim);
        }
        out.extend_from_slice(r);
    }
    out
}

/// First 12 hex chars of the full-sequence fingerprint, matching
/// `compute_sequence_hash` in `library.py` (there: blake2b digest_size=16
/// truncated implicitly by taking the hex string; here: xxh3_128 over the
/// same window-hash-of-window-hashes construction).
fn sequence_hash(
    records: &[Vec<u8>],
    window_size: usize,
    skip_prefix: usize,
    text_mode: bool,
) -> CliResult<String> {
    let record_fps: Vec<_> = records
        .iter()
        .map(|r| fp_record(r, skip_prefix, text_mode, None))
        .collect::<CliResult<_>>()?;
    let window_fp = fp_window(window_size, &record_fps);
    let full = fp_sequence(&[window_fp], records.len());
    Ok(format!("{:032x}", full.0)[..12].to_string())
}

pub struct LoadedSequence {
    pub hash: String,
    pub records: Vec<Vec<u8>>,
}

/// Loads every sequence file from `dir`, renaming any whose filename hash
/// no longer matches the current configuration (spec §9.5).
pub fn load_sequences_from_directory(
    dir: &Path,
    delimiter: &Delimiter,
    window_size: usize,
    skip_prefix: usize,
    text_mode: bool,
) -> CliResult<Vec<LoadedSequence>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut loaded = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if SKIP_FILES.contains(&name.as_ref()) {
            continue;
        }
        let raw = fs::read(&path)?;
        if text_mode {
            std::str::from_utf8(&raw).map_err(CliError::Utf8)?;
        }
        let records: Vec<Vec<u8>> = delimiter.split(&raw).into_iter().map(|r| r.to_vec()).collect();
        let hash = sequence_hash(&records, window_size, skip_prefix, text_mode)?;
        if path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
            let expected_name = format!("{hash}.{EXTENSION}");
            if name.as_ref() != expected_name {
                let new_path = path.with_file_name(&expected_name);
                if !new_path.exists() {
                    fs::rename(&path, new_path)?;
                }
            }
        }
        loaded.push(LoadedSequence { hash, records });
    }
    Ok(loaded)
}

#[derive(Serialize)]
struct RunMetadata {
    timestamp: String,
    window_size: usize,
    mode: &'static str,
    delimiter: String,
    max_history: serde_json::Value,
    sequences_discovered: u64,
    sequences_preloaded: u64,
    sequences_saved: u64,
    total_records_processed: u64,
    records_skipped: u64,
}

#[allow(clippy::too_many_arguments)]
pub fn save_metadata(
    library_dir: &Path,
    now: SystemTime,
    window_size: usize,
    max_history: Option<usize>,
    text_mode: bool,
    delimiter: &Delimiter,
    sequences_discovered: u64,
    sequences_preloaded: u64,
    sequences_saved: u64,
    total_records_processed: u64,
    records_skipped: u64,
) -> CliResult<PathBuf> {
    let timestamp = format_iso8601_utc(now);
    let dir_stamp = format_compact_utc(now);
    let metadata_dir = library_dir.join(format!("metadata-{dir_stamp}"));
    fs::create_dir_all(&metadata_dir)?;

    let metadata = RunMetadata {
        timestamp,
        window_size,
        mode: if text_mode { "text" } else { "binary" },
        delimiter: delimiter.display_form(),
        max_history: max_history
            .map(serde_json::Value::from)
            .unwrap_or_else(|| serde_json::Value::from("unlimited")),
        sequences_discovered,
        sequences_preloaded,
        sequences_saved,
        total_records_processed,
        records_skipped,
    };

    let config_path = metadata_dir.join("config.json");
    let rendered = serde_json::to_string_pretty(&metadata).map_err(|e| CliError::Other(e.to_string()))?;
    fs::write(&config_path, rendered)?;
    Ok(config_path)
}

/// Minimal ISO 8601 UTC formatter (`YYYY-MM-DDTHH:MM:SSZ`), avoiding a
/// dependency on a full date/time crate for one timestamp field.
fn format_iso8601_utc(time: SystemTime) -> String {
    let (year, month, day, hour, minute, second) = decompose_utc(time);
    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}Z")
}

/// Compact form matching `library.py`'s `%Y%m%d-%H%M%S` directory naming.
fn format_compact_utc(time: SystemTime) -> String {
    let (year, month, day, hour, minute, second) = decompose_utc(time);
    format!("{year:04}{month:02}{day:02}-{hour:02}{minute:02}{second:02}")
}

fn decompose_utc(time: SystemTime) -> (i64, u32, u32, u64, u64, u64) {
    let secs = time
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let days = secs / 86_400;
    let time_of_day = secs % 86_400;
    let (hour, minute, second) = (time_of_day / 3600, (time_of_day % 3600) / 60, time_of_day % 60);
    let (year, month, day) = civil_from_days(days as i64);
    (year, month, day, hour, minute, second)
}

/// Howard Hinnant's days-from-civil algorithm, inverted: converts a count
/// of days since the Unix epoch into a proleptic-Gregorian (year, month,
/// day) triple without pulling in a calendar crate.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_from_days_epoch() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
    }

    #[test]
    fn civil_from_days_known_date() {
        // 2024-03-01 is 19783 days after the epoch.
        assert_eq!(civil_from_days(19783), (2024, 3, 1));
    }

    #[test]
    fn save_and_reload_round_trips_hash() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()];
        let path = save_sequence(dir.path(), &records, &Delimiter::Newline, 3, 0, true).unwrap();
        assert!(path.exists());
        let loaded = load_sequences_from_directory(dir.path(), &Delimiter::Newline, 3, 0, true).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].records, records);
    }

    #[test]
    fn skip_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".DS_Store"), b"junk").unwrap();
        let loaded = load_sequences_from_directory(dir.path(), &Delimiter::Newline, 3, 0, true).unwrap();
        assert!(loaded.is_empty());
    }
}
