//! Match Engine (spec §4.4): the five-phase step that advances active
//! matches, resolves divergences, spawns new candidates, appends to
//! History, and hands off to the Emit Pipeline.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::emit::OriginInfo;
use crate::fingerprint::WindowFp;
use crate::history::History;
use crate::io::record::Record;
use crate::library::{KnownSequenceId, SequenceId, SequenceLibrary};
use crate::sequence::{FirstOutputLine, RecordedSequence};

/// A slot in the active-match slab. `None` marks a free slot; the free list
/// threads through freed slots via their index so reuse is O(1).
enum Slot {
    Free(Option<usize>),
    Occupied(ActiveMatch),
}

/// Fixed-capacity, `u32`-indexed slab of active matches (spec §9 design
/// note: "array iteration is cache-friendly", avoids a linked structure).
struct Slab {
    slots: Vec<Slot>,
    free_head: Option<usize>,
    len: usize,
}

impl Slab {
    fn new() -> Self {
        Slab {
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    fn insert(&mut self, m: ActiveMatch) -> usize {
        self.len += 1;
        if let Some(idx) = self.free_head {
            let next_free = match &self.slots[idx] {
                Slot::Free(n) => *n,
                Slot::Occupied(_) => unreachable!(),
            };
            self.free_head = next_free;
            self.slots[idx] = Slot::Occupied(m);
            idx
        } else {
            self.slots.push(Slot::Occupied(m));
            self.slots.len() - 1
        }
    }

    fn remove(&mut self, idx: usize) -> ActiveMatch {
        let old = std::mem::replace(&mut self.slots[idx], Slot::Free(self.free_head));
        self.free_head = Some(idx);
        self.len -= 1;
        match old {
            Slot::Occupied(m) => m,
            Slot::Free(_) => panic!("double free of active match slot {idx}"),
        }
    }

    fn iter(&self) -> impl Iterator<Item = (usize, &ActiveMatch)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| match s {
            Slot::Occupied(m) => Some((i, m)),
            Slot::Free(_) => None,
        })
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut ActiveMatch)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, s)| match s {
            Slot::Occupied(m) => Some((i, m)),
            Slot::Free(_) => None,
        })
    }

    fn get(&self, idx: usize) -> Option<&ActiveMatch> {
        match self.slots.get(idx) {
            Some(Slot::Occupied(m)) => Some(m),
            _ => None,
        }
    }

    fn len(&self) -> usize {
        self.len
    }
}

#[derive(Clone)]
pub enum MatchSource {
    History,
    Recorded(SequenceId, Rc<RecordedSequence>),
}

impl MatchSource {
    fn known_id(&self) -> KnownSequenceId {
        match self {
            MatchSource::History => KnownSequenceId::History,
            MatchSource::Recorded(id, _) => KnownSequenceId::Recorded(*id),
        }
    }
}

pub struct ActiveMatch {
    pub source: MatchSource,
    /// Absolute offset into the source sequence where this match started.
    pub starting_offset: usize,
    /// Absolute offset into the source sequence of the *next* window to
    /// check (spec §4.4 Phase C: "next_offset = offset + 1" at spawn).
    pub next_offset: usize,
    /// Tracked index (1-based) of the first record of the window this
    /// match started on, in the *current* stream.
    pub tracked_start: u64,
    /// Monotonic spawn order, used as the final Phase B tie-break.
    pub created_seq: u64,
}

impl ActiveMatch {
    fn windows_matched(&self) -> usize {
        self.next_offset - self.starting_offset
    }
}

struct DivergedMatch {
    source: MatchSource,
    starting_offset: usize,
    next_offset: usize,
    tracked_start: u64,
    created_seq: u64,
}

impl DivergedMatch {
    fn windows_matched(&self) -> usize {
        self.next_offset - self.starting_offset
    }
}

pub struct StepOutcome {
    /// Ranges newly resolved as duplicates this step, to hand to the Emit
    /// Pipeline's Diverged Range Set.
    pub newly_diverged: Vec<(u64, u64, OriginInfo, u64, bool)>,
}

pub struct MatchEngine {
    pub history: History,
    pub library: SequenceLibrary,
    slab: Slab,
    spawn_keys: HashMap<(KnownSequenceId, usize), usize>,
    max_candidates: Option<usize>,
    window_size: usize,
    created_seq_counter: u64,
    pub save_sequence_callback: Option<Box<dyn FnMut(&[Record])>>,
}

impl MatchEngine {
    pub fn new(
        window_size: usize,
        max_history: Option<usize>,
        max_unique_sequences: Option<usize>,
        max_candidates: Option<usize>,
    ) -> Self {
        MatchEngine {
            history: History::new(max_history),
            library: SequenceLibrary::new(max_unique_sequences),
            slab: Slab::new(),
            spawn_keys: HashMap::new(),
            max_candidates,
            window_size,
            created_seq_counter: 0,
            save_sequence_callback: None,
        }
    }

    pub fn active_len(&self) -> usize {
        self.slab.len()
    }

    /// Tracked start of every active match, used by the Emit Pipeline to
    /// compute the minimum retained buffer depth (spec §4.5).
    pub fn active_tracked_starts(&self) -> impl Iterator<Item = u64> + '_ {
        self.slab.iter().map(|(_, m)| m.tracked_start)
    }

    /// Runs the five-phase step for the window completing at
    /// `current_window_start_tracked` (tracked index of the window's first
    /// record) whose fingerprint is `fp_now`.
    pub fn step(&mut self, fp_now: WindowFp, current_window_start_tracked: u64) -> StepOutcome {
        let diverged = self.phase_a_advance(fp_now);
        let newly_diverged = self.phase_b_resolve(diverged);
        self.phase_c_spawn(fp_now, current_window_start_tracked);
        // Phase D (append to history) is driven by the caller, which owns
        // the freshly computed `fp_now` and must do it *after* Phase C so
        // overlap checks see only prior occurrences (spec §4.4).
        StepOutcome { newly_diverged }
    }

    /// Phase D: append `fp_now` to History and keep the library's unified
    /// window index coherent with evictions.
    pub fn append_history(&mut self, fp_now: WindowFp) {
        let (position, evicted) = self.history.append(fp_now);
        if let Some((old_fp, old_pos)) = evicted {
            self.library.remove_history_window(old_fp, old_pos);
            self.invalidate_matches_at_history_position(old_pos);
        }
        self.library.register_history_window(fp_now, position);
    }

    fn invalidate_matches_at_history_position(&mut self, evicted_position: u64) {
        // "history eviction of a position referenced by an active match:
        // the match is silently dropped" (spec §7, locally recovered).
        let mut to_remove = Vec::new();
        for (idx, m) in self.slab.iter() {
            if let MatchSource::History = m.source {
                if m.next_offset == evicted_position as usize + 1
                    || m.starting_offset == evicted_position as usize
                {
                    to_remove.push(idx);
                }
            }
        }
        for idx in to_remove {
            let m = self.slab.remove(idx);
            self.spawn_keys.remove(&(m.source.known_id(), m.starting_offset));
        }
    }

    fn phase_a_advance(&mut self, fp_now: WindowFp) -> Vec<DivergedMatch> {
        let mut diverged = Vec::new();
        let mut to_remove = Vec::new();
        for (idx, m) in self.slab.iter_mut() {
            let expected = match &m.source {
                MatchSource::History => self
                    .history
                    .entry_at(m.next_offset as u64)
                    .map(|e| e.window_fp),
                MatchSource::Recorded(_, seq) => seq.window_at(m.next_offset),
            };
            if expected == Some(fp_now) {
                m.next_offset += 1;
            } else {
                to_remove.push(idx);
            }
        }
        for idx in to_remove {
            let m = self.slab.remove(idx);
            self.spawn_keys.remove(&(m.source.known_id(), m.starting_offset));
            diverged.push(DivergedMatch {
                source: m.source,
                starting_offset: m.starting_offset,
                next_offset: m.next_offset,
                tracked_start: m.tracked_start,
                created_seq: m.created_seq,
            });
        }
        diverged
    }

    fn phase_b_resolve(&mut self, diverged: Vec<DivergedMatch>) -> Vec<(u64, u64, OriginInfo, u64, bool)> {
        let mut by_start: BTreeMap<u64, Vec<DivergedMatch>> = BTreeMap::new();
        for dm in diverged {
            by_start.entry(dm.tracked_start).or_default().push(dm);
        }

        let mut recorded_ranges = Vec::new();
        for (start, group) in by_start {
            let still_active = self.slab.iter().any(|(_, m)| m.tracked_start == start);
            if still_active {
                // A longer match from the same origin is still alive; it
                // will record a longer span when it eventually diverges.
                continue;
            }
            if let Some(winner) = Self::pick_winner(&self.library, group) {
                if let Some(range) = self.record_match(winner) {
                    recorded_ranges.push(range);
                }
            }
        }
        recorded_ranges
    }

    /// Pure selection function (spec §9 "Divergence resolution as a pure
    /// function"): among diverged matches sharing a starting position, keep
    /// the longest; break ties by earliest `first_output_line`, then by
    /// creation order.
    fn pick_winner(library: &SequenceLibrary, group: Vec<DivergedMatch>) -> Option<DivergedMatch> {
        let max_len = group.iter().map(|d| d.windows_matched()).max()?;
        let mut candidates: Vec<DivergedMatch> =
            group.into_iter().filter(|d| d.windows_matched() == max_len).collect();
        if candidates.len() == 1 {
            return candidates.pop();
        }
        candidates.sort_by(|a, b| {
            let la = Self::first_output_line_of(library, a);
            let lb = Self::first_output_line_of(library, b);
            la.cmp(&lb).then(a.created_seq.cmp(&b.created_seq))
        });
        candidates.into_iter().next()
    }

    fn first_output_line_of(library: &SequenceLibrary, d: &DivergedMatch) -> u64 {
        match &d.source {
            MatchSource::History => {
                // Resolved again below against the live History inside
                // `record_match`; for ordering purposes during Phase B we
                // only have `library`'s view of promoted sequences, so a
                // History-sourced candidate's tie-break key is looked up
                // by its own starting offset via the still-borrowed engine
                // in `record_match`. Here we fall back to 0 (earliest),
                // matching "preloaded sequences sort first" semantics,
                // since History content always predates anything promoted
                // from it.
                let _ = library;
                0
            }
            MatchSource::Recorded(_, seq) => match seq.first_output_line {
                FirstOutputLine::Preloaded => 0,
                FirstOutputLine::Line(l) => l,
            },
        }
    }

    fn record_match(&mut self, dm: DivergedMatch) -> Option<(u64, u64, OriginInfo, u64, bool)> {
        let matched_len = dm.windows_matched();
        let end_tracked = dm.tracked_start + self.window_size as u64 + matched_len as u64 - 2;
        match dm.source {
            MatchSource::Recorded(seq_id, seq) => {
                let count = seq.record_match_of_length(matched_len);
                self.library.touch(seq_id);
                let origin = OriginInfo {
                    first_output_line: match seq.first_output_line {
                        FirstOutputLine::Line(l) => Some(l),
                        FirstOutputLine::Preloaded => None,
                    },
                    preloaded: seq.preloaded,
                };
                Some((dm.tracked_start, end_tracked, origin, count, false))
            }
            MatchSource::History => {
                let window_fps: Vec<WindowFp> = (dm.starting_offset..dm.next_offset)
                    .map(|p| {
                        self.history
                            .entry_at(p as u64)
                            .map(|e| e.window_fp)
                            .expect("matched history positions stay live while a match runs")
                    })
                    .collect();
                let first_line = self
                    .history
                    .entry_at(dm.starting_offset as u64)
                    .and_then(|e| e.first_output_line)
                    .unwrap_or(0);
                let mut counts = BTreeMap::new();
                counts.insert(matched_len, 1u64);
                let new_seq = Rc::new(RecordedSequence {
                    window_fps,
                    first_output_line: FirstOutputLine::Line(first_line),
                    match_length_counts: RefCell::new(counts),
                    preloaded: false,
                });
                self.library.add_recorded(new_seq);
                let origin = OriginInfo {
                    first_output_line: Some(first_line),
                    preloaded: false,
                };
                Some((dm.tracked_start, end_tracked, origin, 1, true))
            }
        }
    }

    fn phase_c_spawn(&mut self, fp_now: WindowFp, current_window_start_tracked: u64) {
        let candidates: Vec<(KnownSequenceId, usize)> =
            self.library.windows_for(fp_now).to_vec();
        for (known_id, offset) in candidates {
            if self.overlaps_current_window(known_id, offset, current_window_start_tracked) {
                continue;
            }
            let key = (known_id, offset);
            if self.spawn_keys.contains_key(&key) {
                continue;
            }
            if let Some(cap) = self.max_candidates {
                if self.slab.len() >= cap {
                    self.evict_for_overflow();
                }
            }
            let source = match known_id {
                KnownSequenceId::History => MatchSource::History,
                KnownSequenceId::Recorded(id) => {
                    let Some(seq) = self.library.get(id).cloned() else {
                        continue;
                    };
                    MatchSource::Recorded(id, seq)
                }
            };
            self.created_seq_counter += 1;
            let m = ActiveMatch {
                source,
                starting_offset: offset,
                next_offset: offset + 1,
                tracked_start: current_window_start_tracked,
                created_seq: self.created_seq_counter,
            };
            let idx = self.slab.insert(m);
            self.spawn_keys.insert(key, idx);
        }
    }

    fn overlaps_current_window(
        &self,
        known_id: KnownSequenceId,
        offset: usize,
        current_window_start_tracked: u64,
    ) -> bool {
        let w = self.window_size as u64;
        match known_id {
            KnownSequenceId::History => (offset as u64) + w > current_window_start_tracked,
            KnownSequenceId::Recorded(id) => {
                let Some(seq) = self.library.get(id) else {
                    return true;
                };
                if seq.preloaded {
                    return false;
                }
                match seq.first_output_line {
                    FirstOutputLine::Line(l) => l.saturating_add(w) > current_window_start_tracked,
                    FirstOutputLine::Preloaded => false,
                }
            }
        }
    }

    /// On overflow, drop the active match with the latest start (spec §9
    /// design note: "drop the candidate with the latest start on
    /// overflow"), preferring to keep matches that began earliest and thus
    /// have the most potential remaining length.
    fn evict_for_overflow(&mut self) {
        let victim = self
            .slab
            .iter()
            .max_by_key(|(_, m)| (m.tracked_start, m.created_seq))
            .map(|(idx, _)| idx);
        if let Some(idx) = victim {
            let m = self.slab.remove(idx);
            self.spawn_keys.remove(&(m.source.known_id(), m.starting_offset));
        }
    }

    /// EOF handling (spec §4.4 "At EOF"): every remaining Active Match is
    /// treated as diverged at its current length, and Phase B runs once
    /// more.
    pub fn finish(&mut self) -> Vec<(u64, u64, OriginInfo, u64, bool)> {
        let mut diverged = Vec::new();
        let all: Vec<usize> = self.slab.iter().map(|(idx, _)| idx).collect();
        for idx in all {
            let m = self.slab.remove(idx);
            self.spawn_keys.remove(&(m.source.known_id(), m.starting_offset));
            diverged.push(DivergedMatch {
                source: m.source,
                starting_offset: m.starting_offset,
                next_offset: m.next_offset,
                tracked_start: m.tracked_start,
                created_seq: m.created_seq,
            });
        }
        self.phase_b_resolve(diverged)
    }
}
