//! Positional FIFO of window fingerprints (spec §3 "History", §4.2).
//!
//! History never reorders: position `P` always corresponds to the window
//! that started at tracked record `P + 1`. Capacity-driven eviction only
//! ever removes the oldest entry, which keeps `positions_for` naturally
//! ascending without requiring a sort on lookup.

use indexmap::IndexMap;
use std::collections::VecDeque;

use crate::fingerprint::WindowFp;

pub type Position = u64;

#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub window_fp: WindowFp,
    pub first_output_line: Option<u64>,
}

#[derive(Debug)]
pub struct History {
    capacity: Option<usize>,
    entries: VecDeque<HistoryEntry>,
    oldest_position: Position,
    next_position: Position,
    reverse_index: IndexMap<WindowFp, Vec<Position>>,
}

impl History {
    pub fn new(capacity: Option<usize>) -> Self {
        History {
            capacity,
            entries: VecDeque::new(),
            oldest_position: 0,
            next_position: 0,
            reverse_index: IndexMap::new(),
        }
    }

    /// Append `window_fp`, returning its position and, if the capacity was
    /// exceeded, the `(window_fp, position)` pair that was evicted so the
    /// caller can invalidate any external index entries (spec §4.2, §4.4
    /// Phase D).
    pub fn append(&mut self, window_fp: WindowFp) -> (Position, Option<(WindowFp, Position)>) {
        let position = self.next_position;
        let mut evicted = None;
        if let Some(cap) = self.capacity {
            if cap == 0 {
                // A zero-capacity history immediately evicts what it stores.
                self.reverse_index.clear();
                self.entries.clear();
                self.oldest_position = position + 1;
                self.next_position = position + 1;
                return (position, Some((window_fp, position)));
            }
            if self.entries.len() >= cap {
                let old_pos = self.oldest_position;
                let old_entry = self
                    .entries
                    .pop_front()
                    .expect("capacity > 0 implies entries non-empty when full");
                self.remove_from_index(old_entry.window_fp, old_pos);
                evicted = Some((old_entry.window_fp, old_pos));
                self.oldest_position += 1;
            }
        }
        self.entries.push_back(HistoryEntry {
            window_fp,
            first_output_line: None,
        });
        self.reverse_index.entry(window_fp).or_default().push(position);
        self.next_position += 1;
        (position, evicted)
    }

    fn remove_from_index(&mut self, fp: WindowFp, pos: Position) {
        if let Some(positions) = self.reverse_index.get_mut(&fp) {
            if let Some(idx) = positions.iter().position(|p| *p == pos) {
                positions.remove(idx);
            }
            if positions.is_empty() {
                self.reverse_index.shift_remove(&fp);
            }
        }
    }

    /// Ascending positions of every live entry with this window fingerprint.
    pub fn positions_for(&self, fp: WindowFp) -> &[Position] {
        self.reverse_index
            .get(&fp)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn entry_at(&self, position: Position) -> Option<&HistoryEntry> {
        let idx = self.index_of(position)?;
        self.entries.get(idx)
    }

    /// First-write-wins: once a position's output line is known it never
    /// changes (spec §3 "History" invariant).
    pub fn set_first_output_line(&mut self, position: Position, line: u64) {
        if let Some(idx) = self.index_of(position) {
            if let Some(entry) = self.entries.get_mut(idx) {
                if entry.first_output_line.is_none() {
                    entry.first_output_line = Some(line);
                }
            }
        }
    }

    fn index_of(&self, position: Position) -> Option<usize> {
        if position < self.oldest_position || position >= self.next_position {
            return None;
        }
        Some((position - self.oldest_position) as usize)
    }

    pub fn oldest_position(&self) -> Position {
        self.oldest_position
    }

    pub fn next_position(&self) -> Position {
        self.next_position
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(n: u128) -> WindowFp {
        WindowFp(n)
    }

    #[test]
    fn positions_are_monotonic_and_ascending_on_lookup() {
        let mut h = History::new(None);
        h.append(fp(1));
        h.append(fp(2));
        h.append(fp(1));
        assert_eq!(h.positions_for(fp(1)), &[0, 2]);
    }

    #[test]
    fn eviction_drops_oldest_and_fixes_reverse_index() {
        let mut h = History::new(Some(2));
        h.append(fp(1));
        h.append(fp(2));
        let (_pos, evicted) = h.append(fp(3));
        assert_eq!(evicted, Some((fp(1), 0)));
        assert!(h.entry_at(0).is_none());
        assert_eq!(h.positions_for(fp(1)), &[] as &[Position]);
        assert_eq!(h.oldest_position(), 1);
        assert_eq!(h.next_position(), 3);
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn first_output_line_is_first_write_wins() {
        let mut h = History::new(None);
        h.append(fp(1));
        h.set_first_output_line(0, 5);
        h.set_first_output_line(0, 99);
        assert_eq!(h.entry_at(0).unwrap().first_output_line, Some(5));
    }
}
