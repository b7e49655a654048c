//! Search patterns (C7).
//!
//! A pattern is compiled once per search invocation and then matched
//! against many strings. Literal patterns use `memchr`'s substring search;
//! regex patterns use the `regex` crate's linear-time engine. An empty
//! pattern matches everything, which lets callers express "no filter" by
//! compiling `""`.

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternMode {
    Literal,
    Regex,
}

pub enum Pattern {
    Literal(String),
    Regex(regex::Regex),
}

impl Pattern {
    pub fn compile(text: &str, mode: PatternMode) -> Result<Pattern> {
        match mode {
            PatternMode::Literal => Ok(Pattern::Literal(text.to_string())),
            PatternMode::Regex => regex::Regex::new(text)
                .map(Pattern::Regex)
                .map_err(|e| EngineError::InvalidPattern(e.to_string())),
        }
    }

    pub fn matches(&self, haystack: &str) -> bool {
        match self {
            Pattern::Literal(needle) => {
                if needle.is_empty() {
                    true
                } else {
                    memchr::memmem::find(haystack.as_bytes(), needle.as_bytes()).is_some()
                }
            }
            Pattern::Regex(re) => re.is_match(haystack),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_literal_matches_everything() {
        let p = Pattern::compile("", PatternMode::Literal).unwrap();
        assert!(p.matches(""));
        assert!(p.matches("anything"));
    }

    #[test]
    fn literal_matches_as_substring() {
        let p = Pattern::compile("api/users", PatternMode::Literal).unwrap();
        assert!(p.matches("https://example.test/api/users/42"));
        assert!(!p.matches("https://example.test/api/orders/42"));
    }

    #[test]
    fn regex_matches_patterns() {
        let p = Pattern::compile(r"/users/\d+$", PatternMode::Regex).unwrap();
        assert!(p.matches("https://example.test/users/42"));
        assert!(!p.matches("https://example.test/users/abc"));
    }

    #[test]
    fn invalid_regex_reports_error() {
        let err = Pattern::compile("(unclosed", PatternMode::Regex).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPattern(_)));
    }
}
