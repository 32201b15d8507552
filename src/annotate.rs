//! Annotation formatter (spec §4.5, §9 design note: "a compiled template,
//! parsed once on construction, rather than string interpolation per
//! duplicate").

use crate::error::{CliError, CliResult};

#[derive(Clone, Debug)]
enum Chunk {
    Literal(String),
    Start,
    End,
    MatchStart,
    MatchEnd,
    Count,
    WindowSize,
}

pub struct AnnotationTemplate {
    chunks: Vec<Chunk>,
    window_size: usize,
}

const DEFAULT_FORMAT: &str = "# duplicate: lines {start}-{end} match {match_start}-{match_end} (seen {count} times, window {window_size})";

impl AnnotationTemplate {
    pub fn parse(format: &str, window_size: usize) -> CliResult<AnnotationTemplate> {
        let mut chunks = Vec::new();
        let mut literal = String::new();
        let mut rest = format;
        while let Some(brace) = rest.find('{') {
            literal.push_str(&rest[..brace]);
            let after = &rest[brace + 1..];
            let Some(close) = after.find('}') else {
                return Err(CliError::Config(format!(
                    "unterminated '{{' in annotation format '{format}'"
                )));
            };
            let var = &after[..close];
            let chunk = match var {
                "start" => Chunk::Start,
                "end" => Chunk::End,
                "match_start" => Chunk::MatchStart,
                "match_end" => Chunk::MatchEnd,
                "count" => Chunk::Count,
                "window_size" => Chunk::WindowSize,
                other => {
                    return Err(CliError::Config(format!(
                        "unknown annotation variable '{{{other}}}'"
                    )))
                }
            };
            if !literal.is_empty() {
                chunks.push(Chunk::Literal(std::mem::take(&mut literal)));
            }
            chunks.push(chunk);
            rest = &after[close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            chunks.push(Chunk::Literal(literal));
        }
        Ok(AnnotationTemplate { chunks, window_size })
    }

    pub fn default_for(window_size: usize) -> AnnotationTemplate {
        Self::parse(DEFAULT_FORMAT, window_size).expect("built-in default format is well-formed")
    }

    pub fn render(&self, start: u64, end: u64, match_start: u64, match_end: u64, count: u64) -> String {
        let mut out = String::new();
        for chunk in &self.chunks {
            match chunk {
                Chunk::Literal(s) => out.push_str(s),
                Chunk::Start => out.push_str(&start.to_string()),
                Chunk::End => out.push_str(&end.to_string()),
                Chunk::MatchStart => out.push_str(&match_start.to_string()),
                Chunk::MatchEnd => out.push_str(&match_end.to_string()),
                Chunk::Count => out.push_str(&count.to_string()),
                Chunk::WindowSize => out.push_str(&self.window_size.to_string()),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_variables() {
        let tpl = AnnotationTemplate::parse("{start}-{end}/{match_start}-{match_end}x{count}w{window_size}", 3).unwrap();
        assert_eq!(tpl.render(10, 15, 1, 6, 2), "10-15/1-6x2w3");
    }

    #[test]
    fn rejects_unknown_variable() {
        assert!(AnnotationTemplate::parse("{nonsense}", 3).is_err());
    }

    #[test]
    fn rejects_unterminated_brace() {
        assert!(AnnotationTemplate::parse("{start", 3).is_err());
    }

    #[test]
    fn default_format_parses() {
        let tpl = AnnotationTemplate::default_for(5);
        let rendered = tpl.render(1, 2, 3, 4, 1);
        assert!(rendered.contains('1'));
    }
}
