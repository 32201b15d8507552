//! Command-line surface (spec §9.1) and the run loop that wires the
//! Fingerprinter, History, Sequence Library, Match Engine and Emit
//! Pipeline together for one pass over stdin/a file.

use std::io::{IsTerminal, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::SystemTime;

use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};

use crate::config::{self, EngineConfig};
use crate::emit::EmitPipeline;
use crate::engine::MatchEngine;
use crate::error::CliResult;
use crate::fingerprint::fp_record;
use crate::helpers::count::Bound;
use crate::io::record::{RecordReader, RecordWriter};
use crate::persist;
use crate::stats::RunStats;

#[derive(Parser, Debug)]
#[command(
    name = "uniqseq",
    version,
    about = "Remove repeated contiguous windows of records from a stream",
    long_about = "Detects and removes repeated contiguous sequences (windows of at \
least --window-size records) from a stream of delimiter-separated records, the \
way `uniq` removes repeated single lines."
)]
pub struct UniqseqCli {
    /// Input file; reads stdin if omitted.
    pub input: Option<PathBuf>,

    /// Minimum number of consecutive records that must repeat before they
    /// are treated as a duplicate window.
    #[arg(short = 'w', long, default_value = "10")]
    pub window_size: NonZeroUsize,

    /// How many records of recent history to keep available for matching
    /// ("unlimited" or an integer).
    #[arg(short = 'm', long, default_value = "100000")]
    pub max_history: Bound,

    /// Cap on the number of distinct sequences kept in the library
    /// ("unlimited" or an integer); least-recently-used non-preloaded
    /// entries are evicted first.
    #[arg(long, default_value = "10000")]
    pub max_unique_sequences: Bound,

    /// Cap on the number of Active Matches tracked at once ("unlimited" or
    /// an integer); on overflow the candidate with the latest start is
    /// dropped.
    #[arg(long, default_value = "1000")]
    pub max_candidates: Bound,

    /// Number of leading bytes (binary mode) or characters (text mode) to
    /// ignore when fingerprinting each record.
    #[arg(long, default_value_t = 0)]
    pub skip_prefix: usize,

    /// Record delimiter (supports \n, \t, \0 escapes). Defaults to '\n'.
    #[arg(long, conflicts_with = "hex_delimiter")]
    pub delimiter: Option<String>,

    /// Record delimiter given as hex digits (e.g. "00"); requires --binary.
    #[arg(long)]
    pub hex_delimiter: Option<String>,

    /// Treat records as opaque bytes instead of requiring valid UTF-8.
    #[arg(long)]
    pub binary: bool,

    /// Preload a file as a known sequence; may be given multiple times.
    #[arg(long)]
    pub preload: Vec<PathBuf>,

    /// Directory of `<hash>.uniqseq` sequence files to preload from, and
    /// (combined with newly discovered sequences) to save into afterwards.
    #[arg(long)]
    pub library_dir: Option<PathBuf>,

    /// Shell command a record is piped through before fingerprinting;
    /// the transformed bytes are hashed, never emitted.
    #[arg(long)]
    pub hash_transform: Option<String>,

    /// Seconds to wait for --hash-transform to answer before failing.
    #[arg(long, default_value_t = 5)]
    pub hash_transform_timeout: u64,

    /// Track (dedup-eligible) records matching this pattern; may be
    /// combined with --bypass, interleaved in the order given.
    #[arg(short = 't', long = "track", action = clap::ArgAction::Append)]
    track_patterns: Vec<String>,

    /// Bypass (pass straight through, never deduplicated) records
    /// matching this pattern; may be combined with --track.
    #[arg(short = 'b', long = "bypass", action = clap::ArgAction::Append)]
    bypass_patterns: Vec<String>,

    /// Emit the duplicate windows instead of the unique stream.
    #[arg(long)]
    pub inverse: bool,

    /// Emit a comment line describing each removed duplicate window.
    #[arg(long)]
    pub annotate: bool,

    /// Template for --annotate (placeholders: {start} {end} {match_start}
    /// {match_end} {count} {window_size}).
    #[arg(long)]
    pub annotation_format: Option<String>,

    /// Suppress the summary statistics printed to stderr at the end.
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Print progress diagnostics to stderr while running.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Trace each divergence resolution (winner/loser and why) to stderr
    /// as it happens.
    #[arg(long)]
    pub explain: bool,

    /// Show a running record count on stderr while processing;
    /// auto-disabled when stderr is not a terminal.
    #[arg(long)]
    pub progress: bool,

    /// Order-preserving (index, pattern) pairs reconstructed after parsing
    /// from the raw `-t`/`-b` occurrences (spec §9.1: the two flags share
    /// one index space).
    #[arg(skip)]
    pub track: Vec<(usize, String)>,
    #[arg(skip)]
    pub bypass: Vec<(usize, String)>,
}

impl UniqseqCli {
    /// Parses `std::env::args`, then recovers the relative order of `-t`
    /// and `-b` occurrences from the underlying `ArgMatches` -- clap's
    /// derive API hands back each flag's values independently, but
    /// `ArgMatches::indices_of` reports where every occurrence landed in
    /// the overall argument list, which is enough to interleave the two
    /// flags back into one ordered filter list.
    pub fn parse_ordered() -> Self {
        let matches = Self::command().get_matches();
        let mut cli = Self::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
        cli.track = zip_indices(&matches, "track_patterns");
        cli.bypass = zip_indices(&matches, "bypass_patterns");
        cli
    }
}

fn zip_indices(matches: &ArgMatches, id: &str) -> Vec<(usize, String)> {
    let values: Vec<String> = matches
        .get_many::<String>(id)
        .map(|v| v.cloned().collect())
        .unwrap_or_default();
    let indices: Vec<usize> = matches.indices_of(id).map(|v| v.collect()).unwrap_or_default();
    indices.into_iter().zip(values).collect()
}

/// Drives the engine end to end over the configured input/output, per
/// spec §5 (main loop) and §4.4/§4.5 (engine/pipeline step contract).
///
/// `cancelled` is polled once per input record; when set (by a Ctrl-C
/// handler installed in `main`), the loop stops reading new records and
/// falls straight through to the same EOF drain as a normal end of input,
/// so a cancelled run still only ever emits whole records.
pub fn run(cli: &UniqseqCli, cancelled: &std::sync::atomic::AtomicBool) -> CliResult<bool> {
    let (engine_config, library, resolved) = config::resolve(cli)?;
    let EngineConfig {
        window_size,
        max_history,
        max_unique_sequences,
        max_candidates,
        skip_prefix,
        delimiter,
        text_mode,
        inverse,
        annotate,
        annotation_template,
        quiet,
        verbose,
        explain,
        progress,
        library_dir,
        transform,
        filters,
        preload_skipped,
    } = engine_config;

    let mut engine = MatchEngine::new(window_size, max_history, max_unique_sequences, max_candidates);
    engine.library = library;

    let library_dir_for_save = library_dir.clone();
    if let Some(dir) = library_dir.clone() {
        let dir_for_cb = dir.clone();
        let delim_for_cb = delimiter.clone();
        engine.save_sequence_callback = Some(Box::new(move |records: &[Vec<u8>]| {
            let _ = persist::save_sequence(&dir_for_cb, records, &delim_for_cb, window_size, skip_prefix, text_mode);
        }));
    }

    let mut reader = RecordReader::new(resolved.reader, delimiter.clone(), text_mode);
    let mut writer = RecordWriter::new(resolved.writer, delimiter.clone());
    let mut pipeline = EmitPipeline::new(window_size, inverse);
    let mut stats = RunStats {
        preload_skipped,
        ..RunStats::default()
    };

    let transform_ref = transform.as_ref().map(|t| t.as_ref() as &dyn crate::fingerprint::HashTransform);

    // Only the trailing `window_size` record fingerprints are ever read, so
    // a `VecDeque` capped at that size keeps this window O(W) for the
    // lifetime of the stream instead of O(total tracked records).
    let mut record_fps: std::collections::VecDeque<crate::fingerprint::RecordFp> =
        std::collections::VecDeque::with_capacity(window_size);
    let mut original_index: u64 = 0;
    let mut tracked_index: u64 = 0;

    // §9.4: a minimal carriage-return counter, auto-disabled off a TTY
    // rather than pulled in as a dependency on a TUI crate.
    let progress_active = progress && std::io::stderr().is_terminal();

    let mut was_cancelled = false;
    loop {
        if cancelled.load(std::sync::atomic::Ordering::Relaxed) {
            was_cancelled = true;
            break;
        }
        let Some(record) = reader.next_record()? else {
            break;
        };
        original_index += 1;
        stats.total_input += 1;

        if progress_active && stats.total_input % 1000 == 0 {
            eprint!("\r{} records processed", stats.total_input);
        }

        if !filters.is_empty() && filters.action_for(&record) == crate::filter::Action::Bypass {
            pipeline.push_bypass(original_index, record);
            continue;
        }

        tracked_index += 1;
        let fp = fp_record(&record, skip_prefix, text_mode, transform_ref)?;
        record_fps.push_back(fp);
        if record_fps.len() > window_size {
            record_fps.pop_front();
        }
        pipeline.push_tracked(original_index, tracked_index, record, fp);

        if record_fps.len() >= window_size {
            let fp_now = crate::fingerprint::fp_window(window_size, record_fps.make_contiguous());
            let current_window_start_tracked = tracked_index - window_size as u64 + 1;
            let outcome = engine.step(fp_now, current_window_start_tracked);
            for (start, end, origin, count, is_new) in outcome.newly_diverged {
                if explain {
                    explain_divergence(start, end, count, is_new);
                }
                if is_new {
                    if let Some(records) = pipeline.raw_records_in_range(start, end) {
                        if let Some(cb) = engine.save_sequence_callback.as_mut() {
                            cb(&records);
                        }
                    }
                }
                pipeline.mark_diverged(start, end, origin, count);
            }
            engine.append_history(fp_now);
        }

        let floor = pipeline.required_floor(engine.active_tracked_starts(), tracked_index);
        pipeline.drain_ready(floor, &mut writer, &mut engine.history, annotation_if(annotate, &annotation_template), &mut stats)?;

        report!(verbose, "processed {} records, {} active matches", stats.total_input, engine.active_len());
    }

    let newly_diverged = engine.finish();
    for (start, end, origin, count, is_new) in newly_diverged {
        if explain {
            explain_divergence(start, end, count, is_new);
        }
        if is_new {
            if let Some(records) = pipeline.raw_records_in_range(start, end) {
                if let Some(cb) = engine.save_sequence_callback.as_mut() {
                    cb(&records);
                }
            }
        }
        pipeline.mark_diverged(start, end, origin, count);
    }
    pipeline.drain_all(&mut writer, &mut engine.history, annotation_if(annotate, &annotation_template), &mut stats)?;
    writer.flush()?;

    if progress_active {
        eprintln!();
    }

    stats.unique_sequences = engine.library.non_preloaded_len() as u64;

    if let Some(dir) = library_dir_for_save {
        persist::save_metadata(
            &dir,
            SystemTime::now(),
            window_size,
            max_history,
            text_mode,
            &delimiter,
            stats.unique_sequences,
            engine.library.preloaded_len() as u64,
            stats.unique_sequences,
            stats.total_input,
            stats.skipped,
        )?;
    }

    if !quiet {
        eprintln!("{stats}");
    }
    Ok(was_cancelled)
}

/// `--explain` side channel (spec §9.1): one line per resolved divergence,
/// naming the winning range and whether it was a fresh promotion from
/// History or a re-match against an already-recorded sequence.
fn explain_divergence(start: u64, end: u64, count: u64, is_new: bool) {
    let source = if is_new { "history promoted to library" } else { "recorded sequence re-matched" };
    eprintln!("divergence resolved: tracked [{start}, {end}], match_length_count={count}, source={source}");
}

fn annotation_if(annotate: bool, template: &Rc<crate::annotate::AnnotationTemplate>) -> Option<&crate::annotate::AnnotationTemplate> {
    if annotate {
        Some(template.as_ref())
    } else {
        None
    }
}
