//! Alias spellings for tracker field names.
//!
//! Trackers render some system fields with slash names ("Component/s",
//! "Fix Version/s") while users type the plain plural. Lookups accept
//! either spelling and find the entry stored under the other.

use std::collections::BTreeMap;

/// Interchangeable normalized-name pairs, resolved in both directions
pub const FIELD_ALIASES: &[(&str, &str)] = &[
    ("component/s", "components"),
    ("affects_version/s", "affects_versions"),
    ("fix_version/s", "fix_versions"),
];

/// Look up `name` in `map`, falling back to its alias spelling.
/// A direct hit always wins over an alias hit.
pub fn field_with_alias<'a, V>(map: &'a BTreeMap<String, V>, name: &str) -> Option<&'a V> {
    if let Some(value) = map.get(name) {
        return Some(value);
    }
    for (a, b) in FIELD_ALIASES {
        if name == *a {
            if let Some(value) = map.get(*b) {
                return Some(value);
            }
        }
        if name == *b {
            if let Some(value) = map.get(*a) {
                return Some(value);
            }
        }
    }
    None
}

/// The key actually present in `map` for `name`, alias-aware.
/// Useful when the entry must be mutated or removed.
pub fn resolve_key<V>(map: &BTreeMap<String, V>, name: &str) -> Option<String> {
    if map.contains_key(name) {
        return Some(name.to_string());
    }
    for (a, b) in FIELD_ALIASES {
        if name == *a && map.contains_key(*b) {
            return Some((*b).to_string());
        }
        if name == *b && map.contains_key(*a) {
            return Some((*a).to_string());
        }
    }
    None
}
