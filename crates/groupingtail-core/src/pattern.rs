//! Regex helpers shared by the grouping step and the instruments.

use regex::{Captures, Regex};

use crate::error::{Error, Result};

/// Compile `pattern` so that it only matches at the start of a line.
///
/// The pattern is wrapped in a non-capturing group, so capture indices
/// and names are the same as in the original pattern.
pub fn compile_anchored(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})")).map_err(|source| Error::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}

/// Returns the text of the selected capture.
///
/// With `name`, that named group is used; otherwise the first capture group.
/// `None` when the group does not exist or did not participate in the match.
pub fn capture<'h>(caps: &Captures<'h>, name: Option<&str>) -> Option<&'h str> {
    match name {
        Some(name) => caps.name(name).map(|m| m.as_str()),
        None => caps.get(1).map(|m| m.as_str()),
    }
}

/// Whether `regex` defines a capture group called `name`.
pub fn has_named_group(regex: &Regex, name: &str) -> bool {
    regex.capture_names().flatten().any(|n| n == name)
}

/// Number of capture groups, not counting the implicit whole-match group.
pub fn group_count(regex: &Regex) -> usize {
    regex.captures_len().saturating_sub(1)
}

/// Turn a raw group key into a metric-name-safe fragment.
pub fn normalize_group_key(raw: &str) -> String {
    raw.replace(['.', '-'], "_")
}
