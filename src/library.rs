//! Sequence Library (spec §3, §4.3): the set of Recorded Sequences, plus a
//! unified window index that lets the Match Engine spawn candidates against
//! History and the Library through one lookup (spec §9, "History-as-Sequence
//! unification").

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::fingerprint::WindowFp;
use crate::history::Position;
use crate::io::delimiter::Delimiter;
use crate::sequence::{FirstOutputLine, RecordedSequence};

pub type SequenceId = u64;

/// Identifies either branch of the unified window index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum KnownSequenceId {
    History,
    Recorded(SequenceId),
}

pub struct SequenceLibrary {
    max_unique: Option<usize>,
    /// Ordered by recency: front = least recently used. Preloaded entries
    /// are never evicted and are excluded from the LRU scan entirely.
    sequences: IndexMap<SequenceId, Rc<RecordedSequence>>,
    window_index: IndexMap<WindowFp, Vec<(KnownSequenceId, usize)>>,
    next_id: SequenceId,
}

impl SequenceLibrary {
    pub fn new(max_unique: Option<usize>) -> Self {
        SequenceLibrary {
            max_unique,
            sequences: IndexMap::new(),
            window_index: IndexMap::new(),
            next_id: 0,
        }
    }

    pub fn windows_for(&self, fp: WindowFp) -> &[(KnownSequenceId, usize)] {
        self.window_index
            .get(&fp)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn get(&self, id: SequenceId) -> Option<&Rc<RecordedSequence>> {
        self.sequences.get(&id)
    }

    pub fn register_history_window(&mut self, fp: WindowFp, position: Position) {
        self.window_index
            .entry(fp)
            .or_default()
            .push((KnownSequenceId::History, position as usize));
    }

    pub fn remove_history_window(&mut self, fp: WindowFp, position: Position) {
        self.remove_window_entry(fp, KnownSequenceId::History, position as usize);
    }

    fn remove_window_entry(&mut self, fp: WindowFp, id: KnownSequenceId, offset: usize) {
        if let Some(entries) = self.window_index.get_mut(&fp) {
            if let Some(idx) = entries.iter().position(|e| *e == (id, offset)) {
                entries.remove(idx);
            }
            if entries.is_empty() {
                self.window_index.shift_remove(&fp);
            }
        }
    }

    /// Inserts a newly recorded (not preloaded) sequence, evicting the
    /// least-recently-used non-preloaded entry first if at capacity.
    pub fn add_recorded(&mut self, seq: Rc<RecordedSequence>) -> SequenceId {
        if !seq.preloaded {
            self.evict_if_needed();
        }
        let id = self.next_id;
        self.next_id += 1;
        for (offset, fp) in seq.window_fps.iter().enumerate() {
            self.window_index
                .entry(*fp)
                .or_default()
                .push((KnownSequenceId::Recorded(id), offset));
        }
        self.sequences.insert(id, seq);
        id
    }

    /// Splits `raw` into records on `delimiter`, computes window
    /// fingerprints, and registers it as a preloaded Recorded Sequence.
    /// Sequences shorter than `window_size` are silently discarded (spec
    /// §4.3 invariant).
    pub fn preload(
        &mut self,
        raw: &[u8],
        delimiter: &Delimiter,
        window_size: usize,
        skip_prefix: usize,
        text_mode: bool,
    ) -> Option<SequenceId> {
        let records = delimiter.split(raw);
        if records.len() < window_size {
            return None;
        }
        let record_fps: Vec<_> = records
            .iter()
            .map(|r| crate::fingerprint::fp_record(r, skip_prefix, text_mode, None).expect("no transform during preload"))
            .collect();
        let mut window_fps = Vec::with_capacity(record_fps.len() - window_size + 1);
        for start in 0..=(record_fps.len() - window_size) {
            window_fps.push(crate::fingerprint::fp_window(
                window_size,
                &record_fps[start..start + window_size],
            ));
        }
        let seq = Rc::new(RecordedSequence {
            window_fps,
            first_output_line: FirstOutputLine::Preloaded,
            match_length_counts: RefCell::new(std::collections::BTreeMap::new()),
            preloaded: true,
        });
        Some(self.add_recorded(seq))
    }

    /// Marks `id` as most-recently-used (spec §4.3 `touch`).
    pub fn touch(&mut self, id: SequenceId) {
        if let Some(idx) = self.sequences.get_index_of(&id) {
            // `move_index` keeps insertion order for everyone else while
            // pushing `id` to the back (most-recently-used end).
            self.sequences.move_index(idx, self.sequences.len() - 1);
        }
    }

    fn evict_if_needed(&mut self) {
        let Some(cap) = self.max_unique else {
            return;
        };
        loop {
            let non_preloaded = self.sequences.values().filter(|s| !s.preloaded).count();
            if non_preloaded < cap {
                break;
            }
            let victim = self
                .sequences
                .iter()
                .find(|(_, s)| !s.preloaded)
                .map(|(id, _)| *id);
            match victim {
                Some(id) => self.evict(id),
                None => break,
            }
        }
    }

    fn evict(&mut self, id: SequenceId) {
        if let Some(seq) = self.sequences.shift_remove(&id) {
            for (offset, fp) in seq.window_fps.iter().enumerate() {
                self.remove_window_entry(*fp, KnownSequenceId::Recorded(id), offset);
            }
            // `seq` itself may still be kept alive by an in-flight Active
            // Match's own `Rc` clone; only the library's reference and the
            // window index entries are dropped here (spec §7).
        }
    }

    pub fn non_preloaded_len(&self) -> usize {
        self.sequences.values().filter(|s| !s.preloaded).count()
    }

    pub fn preloaded_len(&self) -> usize {
        self.sequences.values().filter(|s| s.preloaded).count()
    }
}
