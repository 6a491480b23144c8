//! Probe configuration strings.
//!
//! The loop treats configurations as opaque tokens. The only operations it
//! needs are joining a token list, comparing two configurations and turning
//! a target into a directory-safe name.

use lazy_static::lazy_static;
use regex::Regex;

/// Lighter-weight static probe used when no usable suggestion exists.
pub const DEFAULT_FALLBACK_CONFIGURATION: &str = "-sS -T2";

/// Default retry limit for the adaptive loop.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

lazy_static! {
    /// Anything that is not safe in a file or directory name
    static ref UNSAFE_PATH_CHARS: Regex = Regex::new(r"[^A-Za-z0-9._-]+").unwrap();
}

/// Join configuration tokens into one configuration string.
pub fn join_tokens<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapse whitespace so equivalent configurations compare equal.
pub fn normalize_configuration(configuration: &str) -> String {
    configuration.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether two configurations are the same probe.
pub fn same_configuration(a: &str, b: &str) -> bool {
    normalize_configuration(a) == normalize_configuration(b)
}

/// Directory-safe name for a target or judge.
pub fn slug(value: &str) -> String {
    let replaced = UNSAFE_PATH_CHARS.replace_all(value.trim(), "_");
    let trimmed = replaced.trim_matches('_');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_lowercase()
    }
}
