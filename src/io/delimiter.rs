//! Record delimiter: how a byte stream is cut into records (spec §6, §9.2).

use memchr::memmem;

use crate::error::{CliError, CliResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delimiter {
    Newline,
    Literal(Vec<u8>),
    Hex(Vec<u8>),
}

impl Delimiter {
    pub fn bytes(&self) -> &[u8] {
        match self {
            Delimiter::Newline => b"\n",
            Delimiter::Literal(b) => b,
            Delimiter::Hex(b) => b,
        }
    }

    /// Parses a `--delimiter` argument, resolving `\n`, `\t`, `\0` escapes
    /// (the original accepts Python-style escapes; the same three are the
    /// only ones that make sense for line-oriented framing here).
    pub fn parse_literal(s: &str) -> CliResult<Delimiter> {
        let mut out = Vec::with_capacity(s.len());
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some('n') => out.push(b'\n'),
                    Some('t') => out.push(b'\t'),
                    Some('0') => out.push(0u8),
                    Some('\\') => out.push(b'\\'),
                    Some(other) => {
                        return Err(CliError::Config(format!(
                            "unsupported escape sequence '\\{other}' in --delimiter"
                        )))
                    }
                    None => {
                        return Err(CliError::Config(
                            "trailing backslash in --delimiter".to_string(),
                        ))
                    }
                }
            } else {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
        if out.is_empty() {
            return Err(CliError::Config("--delimiter must not be empty".to_string()));
        }
        Ok(Delimiter::Literal(out))
    }

    /// Parses a `--hex-delimiter` argument (e.g. `00` for a NUL byte).
    pub fn parse_hex(s: &str) -> CliResult<Delimiter> {
        let s = s.trim();
        if s.is_empty() || s.len() % 2 != 0 {
            return Err(CliError::Config(format!(
                "invalid --hex-delimiter '{s}': expected an even number of hex digits"
            )));
        }
        let mut out = Vec::with_capacity(s.len() / 2);
        let bytes = s.as_bytes();
        for chunk in bytes.chunks(2) {
            let byte_str = std::str::from_utf8(chunk).unwrap_or("");
            let byte = u8::from_str_radix(byte_str, 16)
                .map_err(|_| CliError::Config(format!("invalid hex digits in '{s}'")))?;
            out.push(byte);
        }
        Ok(Delimiter::Hex(out))
    }

    /// Splits `raw` on this delimiter. A trailing empty tail (the normal
    /// case for a file ending in the delimiter) is dropped; embedded empty
    /// records are preserved.
    pub fn split<'a>(&self, raw: &'a [u8]) -> Vec<&'a [u8]> {
        let delim = self.bytes();
        if raw.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut start = 0;
        for pos in memmem::find_iter(raw, delim) {
            out.push(&raw[start..pos]);
            start = pos + delim.len();
        }
        if start < raw.len() {
            out.push(&raw[start..]);
        }
        out
    }

    /// Human-readable form used in on-disk run metadata (spec §9.5):
    /// escaped for text mode, hex digits for binary mode's hex delimiter.
    pub fn display_form(&self) -> String {
        match self {
            Delimiter::Newline => "\\n".to_string(),
            Delimiter::Literal(b) => b
                .iter()
                .map(|&c| match c {
                    b'\n' => "\\n".to_string(),
                    b'\t' => "\\t".to_string(),
                    0 => "\\0".to_string(),
                    c if c.is_ascii_graphic() || c == b' ' => (c as char).to_string(),
                    c => format!("\\x{c:02x}"),
                })
                .collect(),
            Delimiter::Hex(b) => b.iter().map(|c| format!("{c:02x}")).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_newline() {
        let d = Delimiter::Newline;
        assert_eq!(d.split(b"a\nb\nc"), vec![&b"a"[..], &b"b"[..], &b"c"[..]]);
    }

    #[test]
    fn drops_trailing_empty_record() {
        let d = Delimiter::Newline;
        assert_eq!(d.split(b"a\nb\n"), vec![&b"a"[..], &b"b"[..]]);
    }

    #[test]
    fn keeps_embedded_empty_records() {
        let d = Delimiter::Newline;
        assert_eq!(d.split(b"a\n\nb"), vec![&b"a"[..], &b""[..], &b"b"[..]]);
    }

    #[test]
    fn parses_escaped_literal() {
        let d = Delimiter::parse_literal("\\t").unwrap();
        assert_eq!(d.bytes(), b"\t");
    }

    #[test]
    fn parses_hex() {
        let d = Delimiter::parse_hex("00").unwrap();
        assert_eq!(d.bytes(), &[0u8]);
    }

    #[test]
    fn rejects_odd_length_hex() {
        assert!(Delimiter::parse_hex("0").is_err());
    }
}
