//! Run statistics (spec §6 `stats()`), rendered in the style of the
//! teacher's `UniqueStats` (`cmd/unique/mod.rs`).

use std::fmt;

#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub total_input: u64,
    pub emitted: u64,
    pub skipped: u64,
    pub unique_sequences: u64,
    /// Preloaded sequences discarded for being shorter than the window
    /// size (spec §4.3 invariant); ambient diagnostic, not part of the
    /// core contract.
    pub preload_skipped: u64,
}

impl RunStats {
    pub fn redundancy_percent(&self) -> f64 {
        if self.total_input == 0 {
            return 0.0;
        }
        self.skipped as f64 / self.total_input as f64 * 100.0
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} records emitted, {} skipped as duplicates ({:.1}% redundancy), {} unique sequences recorded",
            self.emitted,
            self.total_input,
            self.skipped,
            self.redundancy_percent(),
            self.unique_sequences,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redundancy_percent_on_empty_input_is_zero() {
        let stats = RunStats::default();
        assert_eq!(stats.redundancy_percent(), 0.0);
    }

    #[test]
    fn redundancy_percent_computes_ratio() {
        let stats = RunStats {
            total_input: 8,
            emitted: 5,
            skipped: 3,
            unique_sequences: 1,
            preload_skipped: 0,
        };
        assert!((stats.redundancy_percent() - 37.5).abs() < 1e-9);
    }
}
