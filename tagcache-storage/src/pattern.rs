//! Glob-style key patterns.
//!
//! `*` matches any run of characters, including none, `:` and line breaks.
//! Every other character is literal. Patterns are anchored at both ends.

use regex::{Regex, RegexBuilder};

/// Compile a `*` pattern into an anchored regex.
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    RegexBuilder::new(&format!("^{body}$"))
        .dot_matches_new_line(true)
        .build()
}
