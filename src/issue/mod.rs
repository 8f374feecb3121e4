//! Issue key validation and wire payload construction.

pub mod payload;

use once_cell::sync::Lazy;
use regex::Regex;

static ISSUE_KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9]*-\d+$").unwrap());

/// Whether `key` looks like a tracker issue key ("OPS-42")
pub fn is_issue_key(key: &str) -> bool {
    ISSUE_KEY_RE.is_match(key)
}
