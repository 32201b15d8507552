//! Emit Pipeline (spec §3, §4.5): the record buffer, the bypass side
//! buffer, and the Diverged Range Set that together decide, in input
//! order, what actually reaches the output.

use std::collections::{BTreeMap, VecDeque};

use crate::annotate::AnnotationTemplate;
use crate::fingerprint::RecordFp;
use crate::history::History;
use crate::io::record::{Record, RecordWriter};
use crate::stats::RunStats;

/// What the Match Engine knew about the Known Sequence a recorded match
/// came from, carried along so the Emit Pipeline can annotate and so
/// preloaded matches can be special-cased (spec §4.5, "Preloaded-sequence
/// matches ... never appear in output even in inverse mode").
#[derive(Clone, Copy, Debug)]
pub struct OriginInfo {
    pub first_output_line: Option<u64>,
    pub preloaded: bool,
}

struct DivergedRange {
    end_tracked: u64,
    origin: OriginInfo,
    count: u64,
}

/// Ordered by `start_tracked` (spec §3 "Diverged Range Set").
#[derive(Default)]
pub struct DivergedRangeSet {
    ranges: BTreeMap<u64, DivergedRange>,
}

impl DivergedRangeSet {
    pub fn insert(&mut self, start_tracked: u64, end_tracked: u64, origin: OriginInfo, count: u64) {
        self.ranges.insert(
            start_tracked,
            DivergedRange { end_tracked, origin, count },
        );
    }

    /// The range covering `tracked_index`, if any, without removing it.
    fn range_containing(&self, tracked_index: u64) -> Option<(u64, u64, OriginInfo, u64)> {
        self.ranges
            .range(..=tracked_index)
            .next_back()
            .filter(|(_, r)| tracked_index <= r.end_tracked)
            .map(|(&start, r)| (start, r.end_tracked, r.origin, r.count))
    }

    fn remove_if_exhausted(&mut self, start_tracked: u64, tracked_index: u64) {
        if let Some(r) = self.ranges.get(&start_tracked) {
            if tracked_index >= r.end_tracked {
                self.ranges.remove(&start_tracked);
            }
        }
    }
}

struct BufferedRecord {
    original_index: u64,
    tracked_index: u64,
    record: Record,
    fp: RecordFp,
}

pub struct EmitPipeline {
    record_buffer: VecDeque<BufferedRecord>,
    bypass_buffer: VecDeque<(u64, Record)>,
    diverged: DivergedRangeSet,
    inverse: bool,
    window_size: u64,
}

pub struct EmitOutcome {
    pub emitted: u64,
    pub skipped: u64,
}

impl EmitPipeline {
    pub fn new(window_size: usize, inverse: bool) -> Self {
        EmitPipeline {
            record_buffer: VecDeque::new(),
            bypass_buffer: VecDeque::new(),
            diverged: DivergedRangeSet::default(),
            inverse,
            window_size: window_size as u64,
        }
    }

    pub fn push_tracked(&mut self, original_index: u64, tracked_index: u64, record: Record, fp: RecordFp) {
        self.record_buffer.push_back(BufferedRecord {
            original_index,
            tracked_index,
            record,
            fp,
        });
    }

    pub fn push_bypass(&mut self, original_index: u64, record: Record) {
        self.bypass_buffer.push_back((original_index, record));
    }

    pub fn mark_diverged(&mut self, start_tracked: u64, end_tracked: u64, origin: OriginInfo, count: u64) {
        self.diverged.insert(start_tracked, end_tracked, origin, count);
    }

    /// Minimum buffer depth that must be retained to keep every Active
    /// Match's referenced records alive (spec §4.5): for each match, the
    /// span from its tracked start to the current tail; the floor is the
    /// maximum of those spans, lower-bounded by `W`.
    pub fn required_floor<I: Iterator<Item = u64>>(&self, active_tracked_starts: I, current_tracked_index: u64) -> u64 {
        let mut floor = self.window_size;
        for start in active_tracked_starts {
            let span = current_tracked_index.saturating_sub(start) + 1;
            floor = floor.max(span);
        }
        floor
    }

    /// Drains as much of the record buffer as correctness permits, writing
    /// emitted records (and, interleaved, bypass records whose original
    /// index precedes the next tracked record) through `writer`.
    pub fn drain_ready<W: std::io::Write>(
        &mut self,
        floor: u64,
        writer: &mut RecordWriter<W>,
        history: &mut History,
        annotation: Option<&AnnotationTemplate>,
        stats: &mut RunStats,
    ) -> crate::error::CliResult<()> {
        while self.record_buffer.len() as u64 > floor {
            let next_original = self.record_buffer[0].original_index;
            self.flush_bypass_before(next_original, writer)?;
            let buffered = self.record_buffer.pop_front().expect("checked non-empty above");
            self.emit_one(buffered, writer, history, annotation, stats)?;
        }
        Ok(())
    }

    /// EOF: drains everything, including the remaining bypass tail.
    pub fn drain_all<W: std::io::Write>(
        &mut self,
        writer: &mut RecordWriter<W>,
        history: &mut History,
        annotation: Option<&AnnotationTemplate>,
        stats: &mut RunStats,
    ) -> crate::error::CliResult<()> {
        while let Some(buffered) = self.record_buffer.pop_front() {
            self.flush_bypass_before(buffered.original_index, writer)?;
            self.emit_one(buffered, writer, history, annotation, stats)?;
        }
        while let Some((_, record)) = self.bypass_buffer.pop_front() {
            writer.write_record(&record)?;
        }
        Ok(())
    }

    fn flush_bypass_before<W: std::io::Write>(
        &mut self,
        next_tracked_original: u64,
        writer: &mut RecordWriter<W>,
    ) -> crate::error::CliResult<()> {
        while let Some((orig, _)) = self.bypass_buffer.front() {
            if *orig >= next_tracked_original {
                break;
            }
            let (_, record) = self.bypass_buffer.pop_front().expect("front checked above");
            writer.write_record(&record)?;
        }
        Ok(())
    }

    fn emit_one<W: std::io::Write>(
        &mut self,
        buffered: BufferedRecord,
        writer: &mut RecordWriter<W>,
        history: &mut History,
        annotation: Option<&AnnotationTemplate>,
        stats: &mut RunStats,
    ) -> crate::error::CliResult<()> {
        let tracked = buffered.tracked_index;
        if let Some((start, end, origin, count)) = self.diverged.range_containing(tracked) {
            if origin.preloaded {
                // Never emitted, in either mode (spec §4.5, §Glossary
                // "Preloaded Sequence"), but still counted as skipped
                // (spec §8 invariant 1: total_input == emitted + skipped).
                stats.skipped += 1;
            } else if self.inverse {
                if tracked == start {
                    self.emit_annotation_if_due(start, end, origin, count, annotation, writer)?;
                }
                writer.write_record(&buffered.record)?;
                stats.emitted += 1;
            } else {
                if tracked == start {
                    self.emit_annotation_if_due(start, end, origin, count, annotation, writer)?;
                }
                stats.skipped += 1;
            }
            self.diverged.remove_if_exhausted(start, tracked);
        } else if self.inverse {
            stats.skipped += 1;
        } else {
            writer.write_record(&buffered.record)?;
            stats.emitted += 1;
            history.set_first_output_line(tracked - 1, stats.emitted);
        }
        Ok(())
    }

    fn emit_annotation_if_due<W: std::io::Write>(
        &self,
        start: u64,
        end: u64,
        origin: OriginInfo,
        count: u64,
        annotation: Option<&AnnotationTemplate>,
        writer: &mut RecordWriter<W>,
    ) -> crate::error::CliResult<()> {
        if self.inverse {
            return Ok(());
        }
        let Some(tpl) = annotation else { return Ok(()) };
        let Some(first_output_line) = origin.first_output_line else {
            // "Annotation emission is skipped (not errored) when the
            // origin's first_output_line is unknown" (spec §7).
            return Ok(());
        };
        let rendered = tpl.render(start, end, first_output_line, first_output_line + (end - start), count);
        writer.write_record(rendered.as_bytes())?;
        Ok(())
    }

    /// Best-effort lookup of the raw record bytes for a freshly promoted
    /// sequence's tracked range, used to feed the library's save callback
    /// (spec §4.4 Phase B). Returns `None` once any record in the range has
    /// already left the buffer -- a promoted sequence whose origin predates
    /// the current buffer depth simply isn't saved (spec §9, "library
    /// persistence is an ambient convenience, not a core guarantee").
    pub fn raw_records_in_range(&self, start_tracked: u64, end_tracked: u64) -> Option<Vec<Record>> {
        let mut out = Vec::with_capacity((end_tracked - start_tracked + 1) as usize);
        for tracked in start_tracked..=end_tracked {
            let buffered = self
                .record_buffer
                .iter()
                .find(|b| b.tracked_index == tracked)?;
            out.push(buffered.record.clone());
        }
        Some(out)
    }

    pub fn is_empty(&self) -> bool {
        self.record_buffer.is_empty() && self.bypass_buffer.is_empty()
    }
}
