// src/pattern.rs
//! Validated, compiled regular expressions
//!
//! Every user-supplied regex goes through [`Pattern::make`], so a malformed
//! expression is reported uniformly as an `EINVAL` binding error instead of
//! surfacing somewhere inside procedure logic.

use crate::error::{Error, Result};
use regex::{Regex, RegexBuilder};
use std::fmt;

/// A compiled regular expression together with its source text
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
    anchored: Regex,
}

impl Pattern {
    /// Compile `source`, failing with `EINVAL` on invalid syntax
    pub fn make(source: &str) -> Result<Self> {
        Self::build(source, false)
    }

    /// Compile `source` ignoring letter case
    pub fn make_case_insensitive(source: &str) -> Result<Self> {
        Self::build(source, true)
    }

    fn build(source: &str, case_insensitive: bool) -> Result<Self> {
        let compile = |expr: &str| {
            RegexBuilder::new(expr)
                .case_insensitive(case_insensitive)
                .build()
                .map_err(|e| Error::invalid(format!("Failed to compile regex '{}': {}", source, e)))
        };

        let regex = compile(source)?;
        let anchored = compile(&format!("^(?:{})$", source))?;

        Ok(Self {
            source: source.to_string(),
            regex,
            anchored,
        })
    }

    /// Original expression text
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// True when the pattern matches anywhere in `text`
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// True when the pattern matches the whole of `text`
    pub fn full_match(&self, text: &str) -> bool {
        self.anchored.is_match(text)
    }

    /// First match in `text`: capture group 1 when the pattern has one, else the whole match.
    /// A group 1 that took no part in the match captures the empty string.
    pub fn capture<'t>(&self, text: &'t str) -> Option<&'t str> {
        let captures = self.regex.captures(text)?;
        if self.regex.captures_len() > 1 {
            return Some(captures.get(1).map_or("", |m| m.as_str()));
        }
        captures.get(0).map(|m| m.as_str())
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}
