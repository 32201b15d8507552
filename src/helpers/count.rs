//! Parses CLI count arguments that accept either a plain integer or the
//! literal `unlimited` (used by `--max-history`, `--max-unique-sequences`,
//! `--max-candidates`; spec §9.1).

use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bound {
    Unlimited,
    Limit(usize),
}

impl Bound {
    pub fn as_option(self) -> Option<usize> {
        match self {
            Bound::Unlimited => None,
            Bound::Limit(n) => Some(n),
        }
    }
}

impl FromStr for Bound {
    type Err = String;

    fn from_str(s: &str) -> Result<Bound, String> {
        if s.eq_ignore_ascii_case("unlimited") {
            return Ok(Bound::Unlimited);
        }
        s.parse::<usize>()
            .map(Bound::Limit)
            .map_err(|_| format!("expected a non-negative integer or 'unlimited', got '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unlimited_case_insensitively() {
        assert_eq!("Unlimited".parse::<Bound>().unwrap(), Bound::Unlimited);
    }

    #[test]
    fn parses_integers() {
        assert_eq!("42".parse::<Bound>().unwrap(), Bound::Limit(42));
    }

    #[test]
    fn rejects_garbage() {
        assert!("abc".parse::<Bound>().is_err());
    }
}
