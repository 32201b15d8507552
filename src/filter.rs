//! Track/bypass filtering (spec §3 "Filter", §7): an ordered list of
//! patterns, each tagged with the action to take for a matching record.
//! The first matching pattern wins; records matching none default to
//! "track" (the normal, dedup-eligible path).

cfg_if::cfg_if! {
    if #[cfg(feature = "regex-fast")] {
        use regex::Regex;
    } else {
        use regex_lite::Regex as Regex;
    }
}

use crate::error::{CliError, CliResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Track,
    Bypass,
}

pub struct FilterList {
    patterns: Vec<(Regex, Action)>,
    /// Allow-list semantics (default bypass) once any `track` pattern is
    /// present; deny-list semantics (default track) otherwise (spec §3
    /// "Filter").
    default_action: Action,
}

impl FilterList {
    /// Builds a filter list from interleaved `--track`/`--bypass` flags,
    /// preserving the order in which they were given on the command line
    /// (spec §9.1: "order-preserving ... shared index").
    pub fn new(entries: Vec<(String, Action)>) -> CliResult<FilterList> {
        let mut patterns = Vec::with_capacity(entries.len());
        let mut has_track = false;
        for (pattern, action) in entries {
            let re = Regex::new(&pattern)
                .map_err(|e| CliError::Config(format!("invalid pattern '{pattern}': {e}")))?;
            has_track |= action == Action::Track;
            patterns.push((re, action));
        }
        let default_action = if has_track { Action::Bypass } else { Action::Track };
        Ok(FilterList { patterns, default_action })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Resolves the action for `record`. Filters are incompatible with
    /// binary mode (spec §3), so `record` is always valid UTF-8 here; that
    /// invariant is enforced in `config.rs` before this is ever called.
    pub fn action_for(&self, record: &[u8]) -> Action {
        let text = std::str::from_utf8(record).unwrap_or("");
        for (re, action) in &self.patterns {
            if re.is_match(text) {
                return *action;
            }
        }
        self.default_action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_match_wins() {
        let list = FilterList::new(vec![
            ("^DEBUG".to_string(), Action::Bypass),
            (".*".to_string(), Action::Track),
        ])
        .unwrap();
        assert_eq!(list.action_for(b"DEBUG: starting up"), Action::Bypass);
        assert_eq!(list.action_for(b"INFO: ok"), Action::Track);
    }

    #[test]
    fn default_is_track_when_only_bypass_patterns_given() {
        let list = FilterList::new(vec![("^DEBUG".to_string(), Action::Bypass)]).unwrap();
        assert_eq!(list.action_for(b"hello"), Action::Track);
    }

    #[test]
    fn default_is_bypass_once_any_track_pattern_is_given() {
        let list = FilterList::new(vec![("^\\+: ".to_string(), Action::Track)]).unwrap();
        assert_eq!(list.action_for(b"+: keep me"), Action::Track);
        assert_eq!(list.action_for(b"skip me"), Action::Bypass);
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        assert!(FilterList::new(vec![("(".to_string(), Action::Track)]).is_err());
    }
}
