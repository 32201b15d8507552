//! Resolves parsed CLI arguments into a validated [`EngineConfig`] plus the
//! IO handles the run loop needs, surfacing invalid combinations as
//! `CliError::Config` up front (spec §7, "Fatal, surfaced to the host").

use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use crate::annotate::AnnotationTemplate;
use crate::cli::UniqseqCli;
use crate::error::{CliError, CliResult};
use crate::filter::{Action, FilterList};
use crate::io::delimiter::Delimiter;
use crate::library::SequenceLibrary;
use crate::transform::SubprocessTransform;

pub struct EngineConfig {
    pub window_size: usize,
    pub max_history: Option<usize>,
    pub max_unique_sequences: Option<usize>,
    pub max_candidates: Option<usize>,
    pub skip_prefix: usize,
    pub delimiter: Delimiter,
    pub text_mode: bool,
    pub inverse: bool,
    pub annotate: bool,
    pub annotation_template: Rc<AnnotationTemplate>,
    pub quiet: bool,
    pub verbose: bool,
    pub explain: bool,
    pub progress: bool,
    pub library_dir: Option<PathBuf>,
    pub transform: Option<Rc<SubprocessTransform>>,
    pub filters: FilterList,
    /// Preloaded inputs (from `--preload` and `--library-dir`) discarded for
    /// being shorter than `window_size` (spec §4.3 invariant).
    pub preload_skipped: u64,
}

pub struct ResolvedInput {
    pub reader: Box<dyn Read>,
    pub writer: Box<dyn Write>,
}

/// Validates the CLI surface and constructs everything the run loop needs
/// that doesn't belong to the engine's own state (library preloading still
/// happens here since it needs the resolved delimiter/window size).
pub fn resolve(cli: &UniqseqCli) -> CliResult<(EngineConfig, SequenceLibrary, ResolvedInput)> {
    if cli.delimiter.is_some() && cli.hex_delimiter.is_some() {
        return Err(CliError::Config(
            "--delimiter and --hex-delimiter are mutually exclusive".to_string(),
        ));
    }
    if cli.hex_delimiter.is_some() && !cli.binary {
        return Err(CliError::Config(
            "--hex-delimiter requires --binary".to_string(),
        ));
    }
    let text_mode = !cli.binary;

    let delimiter = match (&cli.delimiter, &cli.hex_delimiter) {
        (Some(s), None) => Delimiter::parse_literal(s)?,
        (None, Some(hex)) => Delimiter::parse_hex(hex)?,
        (None, None) => Delimiter::Newline,
        (Some(_), Some(_)) => unreachable!("checked above"),
    };

    let window_size = cli.window_size.get();
    let max_history = cli.max_history.as_option();
    let max_unique_sequences = cli.max_unique_sequences.as_option();
    let max_candidates = cli.max_candidates.as_option();

    if let Some(max_history) = max_history {
        if window_size > max_history {
            return Err(CliError::Config(format!(
                "--window-size ({window_size}) exceeds --max-history ({max_history})"
            )));
        }
    }

    let mut filter_entries = Vec::with_capacity(cli.track.len() + cli.bypass.len());
    for (idx, pattern) in &cli.track {
        filter_entries.push((*idx, pattern.clone(), Action::Track));
    }
    for (idx, pattern) in &cli.bypass {
        filter_entries.push((*idx, pattern.clone(), Action::Bypass));
    }
    filter_entries.sort_by_key(|(idx, _, _)| *idx);
    let ordered_entries: Vec<_> = filter_entries
        .into_iter()
        .map(|(_, pattern, action)| (pattern, action))
        .collect();
    if !ordered_entries.is_empty() && !text_mode {
        return Err(CliError::Config(
            "--track/--bypass filters are incompatible with --binary".to_string(),
        ));
    }
    let filters = FilterList::new(ordered_entries)?;

    let annotation_template = Rc::new(match &cli.annotation_format {
        Some(fmt) => AnnotationTemplate::parse(fmt, window_size)?,
        None => AnnotationTemplate::default_for(window_size),
    });

    let transform = match &cli.hash_transform {
        Some(cmd) => Some(Rc::new(SubprocessTransform::spawn(
            cmd,
            delimiter.clone(),
            Duration::from_secs(cli.hash_transform_timeout),
        )?)),
        None => None,
    };

    let mut library = SequenceLibrary::new(max_unique_sequences);
    let mut preload_skipped: u64 = 0;
    for path in &cli.preload {
        let raw = fs::read(path)
            .map_err(|e| CliError::Config(format!("reading preload file '{}': {e}", path.display())))?;
        if library.preload(&raw, &delimiter, window_size, cli.skip_prefix, text_mode).is_none() {
            preload_skipped += 1;
        }
    }
    if let Some(dir) = &cli.library_dir {
        let loaded = crate::persist::load_sequences_from_directory(
            dir,
            &delimiter,
            window_size,
            cli.skip_prefix,
            text_mode,
        )?;
        for seq in loaded {
            let joined = join_with(&seq.records, &delimiter);
            if library.preload(&joined, &delimiter, window_size, cli.skip_prefix, text_mode).is_none() {
                preload_skipped += 1;
            }
        }
    }

    let reader: Box<dyn Read> = match &cli.input {
        Some(path) => Box::new(fs::File::open(path).map_err(CliError::Io)?),
        None => Box::new(io::stdin()),
    };
    let writer: Box<dyn Write> = Box::new(BufWriter::new(io::stdout()));

    let config = EngineConfig {
        window_size,
        max_history,
        max_unique_sequences,
        max_candidates,
        skip_prefix: cli.skip_prefix,
        delimiter,
        text_mode,
        inverse: cli.inverse,
        annotate: cli.annotate,
        annotation_template,
        quiet: cli.quiet,
        verbose: cli.verbose,
        explain: cli.explain,
        progress: cli.progress,
        library_dir: cli.library_dir.clone(),
        transform,
        filters,
        preload_skipped,
    };
    Ok((config, library, ResolvedInput { reader, writer }))
}

fn join_with(records: &[Vec<u8>], delimiter: &Delimiter) -> Vec<u8> {
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
