//! Streaming sequence-deduplication engine: detects and removes repeated
//! contiguous windows of records from a stream, the way `uniq` removes
//! repeated single lines.

use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cli::UniqseqCli;
use crate::error::CliError;

#[macro_use]
mod helpers;
mod annotate;
mod cli;
mod config;
mod emit;
mod engine;
mod error;
mod filter;
mod fingerprint;
mod history;
mod io;
mod library;
mod persist;
mod sequence;
mod stats;
mod transform;

fn main() {
    let cli = UniqseqCli::parse_ordered();

    let cancelled = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancelled);
    // Best-effort: if a handler is already installed (e.g. in a test
    // harness), running without one still behaves correctly, just without
    // the graceful drain-and-report behavior.
    let _ = ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    });

    match cli::run(&cli, &cancelled) {
        Ok(true) => exit_code(130),
        Ok(false) => {}
        Err(CliError::Io(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
        Err(e @ CliError::Config(_)) => exit(&format!("{e}"), 2),
        Err(e) => exit(&format!("{e}"), 1),
    }
}

fn exit(msg: &str, code: i32) {
    eprintln!("{msg}");
    process::exit(code);
}

fn exit_code(code: i32) {
    process::exit(code);
}
