//! Field value resolution: explicit flag, stored default, or interactive
//! prompt, in that order.
//!
//! Prompted answers are written back to the store immediately so the next
//! run does not ask again. A flag that differs from a stored default is
//! used for this run only and logged; it never overwrites the default.

use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::io::{self, BufRead, Write};
use thiserror::Error;
use tracing::info;

use crate::fields::validate::{value_is_empty, value_text};
use crate::fields::{cache, CreateFieldInfo, FieldMap, IssueKind};
use crate::store::Store;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("required field '{field}' has no value; pass a flag or run interactively")]
    MissingRequired { field: String },

    #[error("'{value}' is not an allowed value for {field}. Allowed: {}", .allowed.join(", "))]
    InvalidValue {
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("input cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("failed to persist default: {0}")]
    Store(#[from] anyhow::Error),
}

/// Source of interactive answers. Questions go to stderr so stdout stays
/// parseable.
pub trait Prompt {
    /// Ask a question; `None` means end of input (user closed stdin)
    fn ask(&mut self, question: &str) -> io::Result<Option<String>>;
}

/// Prompt backed by stderr and stdin
#[derive(Default)]
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&mut self, question: &str) -> io::Result<Option<String>> {
        eprint!("{question}");
        io::stderr().flush()?;

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

/// Scripted prompt for tests
#[derive(Default)]
pub struct MockPrompt {
    answers: VecDeque<String>,
    /// Every question asked, in order
    pub questions: Vec<String>,
}

impl MockPrompt {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|s| (*s).to_string()).collect(),
            questions: Vec::new(),
        }
    }
}

impl Prompt for MockPrompt {
    fn ask(&mut self, question: &str) -> io::Result<Option<String>> {
        self.questions.push(question.to_string());
        Ok(self.answers.pop_front())
    }
}

/// How a field got its value, or why it has none
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Value(String),
    /// Not provided and not required; leave the field out of the payload
    Absent,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    pub interactive: bool,
}

/// Resolve one field value. Precedence: explicit flag, stored default,
/// then (for required fields in interactive runs) a prompt whose answer is
/// persisted. Optional fields without a value resolve to `Absent`.
pub fn resolve_field(
    field: &str,
    flag: Option<&str>,
    info: Option<&CreateFieldInfo>,
    required: bool,
    store: &mut Store,
    prompt: &mut dyn Prompt,
    options: &ResolveOptions,
) -> Result<Resolution, ResolveError> {
    if let Some(value) = flag {
        if let Some(stored) = store.default_for(field) {
            let stored_text = value_text(stored);
            if stored_text != value {
                info!("Using '{}' for {} (stored default is '{}')", value, field, stored_text);
            }
        }
        return Ok(Resolution::Value(value.to_string()));
    }

    if let Some(stored) = store.default_for(field) {
        return Ok(Resolution::Value(value_text(stored)));
    }

    if required {
        if !options.interactive {
            return Err(ResolveError::MissingRequired {
                field: field.to_string(),
            });
        }

        let answer = match info.filter(|i| !i.allowed_values.is_empty()) {
            Some(info) => prompt_choice(field, &info.allowed_values, prompt)?,
            None => prompt_free_text(field, prompt)?,
        };
        store.set_custom_default(field, Value::String(answer.clone()));
        store.save()?;
        return Ok(Resolution::Value(answer));
    }

    Ok(Resolution::Absent)
}

/// Note every explicit flag value that shadows a differing stored default.
/// The store is left untouched; the flag wins for this run only. Returns
/// the shadowed field names.
pub fn note_flag_overrides(explicit: &BTreeMap<String, Value>, store: &Store) -> Vec<String> {
    let mut shadowed = Vec::new();
    for (field, value) in explicit {
        let Some(stored) = store.default_for(field) else {
            continue;
        };
        let stored_text = value_text(stored);
        let flag_text = value_text(value);
        if stored_text != flag_text {
            info!(
                "Using '{}' for {} (stored default is '{}')",
                flag_text, field, stored_text
            );
            shadowed.push(field.clone());
        }
    }
    shadowed
}

/// Numbered selection prompt. Accepts a 1-based index, the literal value,
/// or empty input for the first option; anything else re-asks.
fn prompt_choice(
    field: &str,
    options: &[String],
    prompt: &mut dyn Prompt,
) -> Result<String, ResolveError> {
    let mut question = format!("Select a value for {field}:\n");
    for (i, option) in options.iter().enumerate() {
        question.push_str(&format!("  {}. {}\n", i + 1, option));
    }
    question.push_str(&format!("Choice [1-{}] (default 1): ", options.len()));

    loop {
        let Some(answer) = prompt.ask(&question)? else {
            return Err(ResolveError::Cancelled);
        };
        let answer = answer.trim();

        if answer.is_empty() {
            return Ok(options[0].clone());
        }
        // a number is an index first; "2" never means a literal value "2"
        // when the list has at least two entries
        if let Ok(index) = answer.parse::<usize>() {
            if (1..=options.len()).contains(&index) {
                return Ok(options[index - 1].clone());
            }
        }
        if let Some(exact) = options.iter().find(|option| option.as_str() == answer) {
            return Ok(exact.clone());
        }
    }
}

/// Free-text prompt; re-asks on empty input
fn prompt_free_text(field: &str, prompt: &mut dyn Prompt) -> Result<String, ResolveError> {
    let question = format!("Enter a value for {field}: ");
    loop {
        let Some(answer) = prompt.ask(&question)? else {
            return Err(ResolveError::Cancelled);
        };
        let answer = answer.trim();
        if !answer.is_empty() {
            return Ok(answer.to_string());
        }
    }
}

/// Names under which the affects-version field appears across tracker
/// configurations
pub const VERSION_FIELD_ALIASES: &[&str] = &[
    "affects_version/s",
    "affected_version",
    "versions",
    "affects_versions",
];

/// Locate the affects-version field: exact alias names first, then any
/// field whose name mentions versions and has an enumerated value set
pub fn find_version_field(map: &FieldMap) -> Option<(&String, &CreateFieldInfo)> {
    for name in VERSION_FIELD_ALIASES {
        if let Some(entry) = map.get_key_value(*name) {
            return Some(entry);
        }
    }
    map.iter().find(|(name, info)| {
        (name.contains("version") || name.contains("affect")) && !info.allowed_values.is_empty()
    })
}

/// Stored default for the version field: the field's own key first, then
/// the other alias spellings
fn stored_version_default(store: &Store, field_name: &str) -> Option<String> {
    if let Some(value) = store.default_for(field_name) {
        return Some(value_text(value));
    }
    VERSION_FIELD_ALIASES
        .iter()
        .filter(|alias| **alias != field_name)
        .find_map(|alias| store.default_for(alias).map(value_text))
}

/// Pull a string version value out of an explicit field set, checking the
/// mapping key first and then the alias spellings; the matched entry is
/// removed. Returns `None` with the set untouched when the mapping has no
/// version-family field or no spelling carries a string.
pub fn take_version_value(
    explicit: &mut BTreeMap<String, Value>,
    map: &FieldMap,
) -> Option<String> {
    let (name, _) = find_version_field(map)?;
    std::iter::once(name.as_str())
        .chain(VERSION_FIELD_ALIASES.iter().copied())
        .find(|spelling| matches!(explicit.get(*spelling), Some(Value::String(_))))
        .and_then(|spelling| explicit.remove(spelling))
        .map(|value| value_text(&value))
}

/// Resolve the affects-version value for a new issue.
///
/// Returns the mapping key and resolution, or `None` when the project has
/// no version-family field at all. A supplied value (flag or stored
/// default) outside a non-empty allowed set fails immediately instead of
/// round-tripping to the server.
pub fn resolve_version_field(
    kind: IssueKind,
    flag: Option<&str>,
    map: &FieldMap,
    store: &mut Store,
    prompt: &mut dyn Prompt,
    options: &ResolveOptions,
) -> Result<Option<(String, Resolution)>, ResolveError> {
    let Some((name, info)) = find_version_field(map) else {
        return Ok(None);
    };
    let name = name.clone();
    let info = info.clone();

    let required = info.required_for.contains(&kind);

    let supplied = match flag {
        Some(value) => {
            if let Some(stored) = stored_version_default(store, &name) {
                if stored != value {
                    info!(
                        "Using '{}' for {} (stored default is '{}')",
                        value, name, stored
                    );
                }
            }
            Some(value.to_string())
        }
        None => stored_version_default(store, &name),
    };

    if let Some(value) = supplied {
        if !info.allowed_values.is_empty() && !info.allowed_values.contains(&value) {
            return Err(ResolveError::InvalidValue {
                field: name,
                value,
                allowed: info.allowed_values,
            });
        }
        return Ok(Some((name, Resolution::Value(value))));
    }

    if !required {
        return Ok(Some((name, Resolution::Absent)));
    }

    if !options.interactive {
        return Err(ResolveError::MissingRequired { field: name });
    }

    let answer = if info.allowed_values.is_empty() {
        prompt_free_text(&name, prompt)?
    } else {
        prompt_choice(&name, &info.allowed_values, prompt)?
    };
    store.set_custom_default(&name, Value::String(answer.clone()));
    store.save()?;
    Ok(Some((name, Resolution::Value(answer))))
}

/// Assemble the wire-id keyed field set for a payload.
///
/// Name-keyed entries translate through the mapping; names the mapping
/// does not know pass through under their own spelling for the server to
/// judge. System entries are already wire ids and overlay on collision.
pub fn compose_field_set(
    map: &FieldMap,
    custom_by_name: &BTreeMap<String, Value>,
    system_by_id: &BTreeMap<String, Value>,
) -> BTreeMap<String, Value> {
    let mut set = BTreeMap::new();

    for (name, value) in custom_by_name {
        if value_is_empty(value) {
            continue;
        }
        let id = cache::field_id(map, name).unwrap_or_else(|| name.clone());
        set.insert(id, value.clone());
    }

    for (id, value) in system_by_id {
        if value_is_empty(value) {
            continue;
        }
        set.insert(id.clone(), value.clone());
    }

    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn severity_info() -> CreateFieldInfo {
        CreateFieldInfo {
            id: "customfield_1".to_string(),
            schema: Some("select".to_string()),
            allowed_values: vec![
                "Minor".to_string(),
                "Major".to_string(),
                "Critical".to_string(),
            ],
            ..CreateFieldInfo::default()
        }
    }

    fn interactive() -> ResolveOptions {
        ResolveOptions { interactive: true }
    }

    fn non_interactive() -> ResolveOptions {
        ResolveOptions { interactive: false }
    }

    #[test]
    fn test_flag_wins_and_never_overwrites_store() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = Store::load(temp_dir.path()).unwrap();
        store.set_custom_default("severity", json!("Major"));
        store.save().unwrap();

        let mut prompt = MockPrompt::new(&[]);
        let resolution = resolve_field(
            "severity",
            Some("Minor"),
            Some(&severity_info()),
            true,
            &mut store,
            &mut prompt,
            &interactive(),
        )
        .unwrap();

        assert_eq!(resolution, Resolution::Value("Minor".to_string()));
        assert!(prompt.questions.is_empty());

        // the stored default survives on disk
        let reloaded = Store::load(temp_dir.path()).unwrap();
        assert_eq!(reloaded.default_for("severity"), Some(&json!("Major")));
    }

    #[test]
    fn test_stored_default_skips_prompt() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = Store::load(temp_dir.path()).unwrap();
        store.set_custom_default("severity", json!("Critical"));

        let mut prompt = MockPrompt::new(&[]);
        let resolution = resolve_field(
            "severity",
            None,
            Some(&severity_info()),
            true,
            &mut store,
            &mut prompt,
            &interactive(),
        )
        .unwrap();

        assert_eq!(resolution, Resolution::Value("Critical".to_string()));
        assert!(prompt.questions.is_empty());
    }

    #[test]
    fn test_prompt_answer_is_written_back() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = Store::load(temp_dir.path()).unwrap();

        let mut prompt = MockPrompt::new(&["2"]);
        let resolution = resolve_field(
            "severity",
            None,
            Some(&severity_info()),
            true,
            &mut store,
            &mut prompt,
            &interactive(),
        )
        .unwrap();

        assert_eq!(resolution, Resolution::Value("Major".to_string()));
        assert!(prompt.questions[0].contains("1. Minor"));
        assert!(prompt.questions[0].contains("3. Critical"));

        let reloaded = Store::load(temp_dir.path()).unwrap();
        assert_eq!(reloaded.default_for("severity"), Some(&json!("Major")));
    }

    #[test]
    fn test_out_of_range_index_reprompts() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = Store::load(temp_dir.path()).unwrap();

        let mut prompt = MockPrompt::new(&["99", "2"]);
        let resolution = resolve_field(
            "severity",
            None,
            Some(&severity_info()),
            true,
            &mut store,
            &mut prompt,
            &interactive(),
        )
        .unwrap();

        assert_eq!(resolution, Resolution::Value("Major".to_string()));
        assert_eq!(prompt.questions.len(), 2);
    }

    #[test]
    fn test_literal_answer_and_default_choice() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = Store::load(temp_dir.path()).unwrap();

        let mut prompt = MockPrompt::new(&["Critical"]);
        let resolution = resolve_field(
            "severity",
            None,
            Some(&severity_info()),
            true,
            &mut store,
            &mut prompt,
            &interactive(),
        )
        .unwrap();
        assert_eq!(resolution, Resolution::Value("Critical".to_string()));

        store.unset_default("severity");
        let mut prompt = MockPrompt::new(&[""]);
        let resolution = resolve_field(
            "severity",
            None,
            Some(&severity_info()),
            true,
            &mut store,
            &mut prompt,
            &interactive(),
        )
        .unwrap();
        assert_eq!(resolution, Resolution::Value("Minor".to_string()));
    }

    #[test]
    fn test_end_of_input_is_cancelled() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = Store::load(temp_dir.path()).unwrap();

        let mut prompt = MockPrompt::new(&[]);
        let result = resolve_field(
            "severity",
            None,
            Some(&severity_info()),
            true,
            &mut store,
            &mut prompt,
            &interactive(),
        );
        assert!(matches!(result, Err(ResolveError::Cancelled)));
    }

    #[test]
    fn test_required_without_value_fails_non_interactive() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = Store::load(temp_dir.path()).unwrap();

        let mut prompt = MockPrompt::new(&["never asked"]);
        let result = resolve_field(
            "severity",
            None,
            Some(&severity_info()),
            true,
            &mut store,
            &mut prompt,
            &non_interactive(),
        );

        assert!(matches!(
            result,
            Err(ResolveError::MissingRequired { field }) if field == "severity"
        ));
        assert!(prompt.questions.is_empty());
    }

    #[test]
    fn test_optional_field_is_absent_without_prompting() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = Store::load(temp_dir.path()).unwrap();

        let mut prompt = MockPrompt::new(&["never asked"]);
        let resolution = resolve_field(
            "severity",
            None,
            Some(&severity_info()),
            false,
            &mut store,
            &mut prompt,
            &interactive(),
        )
        .unwrap();

        assert_eq!(resolution, Resolution::Absent);
        assert!(prompt.questions.is_empty());
    }

    #[test]
    fn test_flag_shadowing_stored_default_is_noted() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = Store::load(temp_dir.path()).unwrap();
        store.set_custom_default("severity", json!("Major"));
        store.set_system_default("priority", json!("High"));
        store.save().unwrap();

        let explicit = BTreeMap::from([
            ("severity".to_string(), json!("Critical")),
            ("milestone".to_string(), json!("8.1")),
        ]);
        assert_eq!(note_flag_overrides(&explicit, &store), vec!["severity"]);

        // an agreeing value stays quiet
        let agreeing = BTreeMap::from([("severity".to_string(), json!("Major"))]);
        assert!(note_flag_overrides(&agreeing, &store).is_empty());

        // system flags check the system defaults
        let system = BTreeMap::from([("priority".to_string(), json!("Critical"))]);
        assert_eq!(note_flag_overrides(&system, &store), vec!["priority"]);

        // alias spellings reach the same stored entry
        store.set_custom_default("components", json!("backend"));
        let slash = BTreeMap::from([("component/s".to_string(), json!("api"))]);
        assert_eq!(note_flag_overrides(&slash, &store), vec!["component/s"]);

        // noting never writes; the stored values survive on disk
        let reloaded = Store::load(temp_dir.path()).unwrap();
        assert_eq!(reloaded.default_for("severity"), Some(&json!("Major")));
        assert_eq!(reloaded.default_for("priority"), Some(&json!("High")));
    }

    fn version_map(required_for: &[IssueKind]) -> FieldMap {
        let mut map = FieldMap::new();
        map.insert(
            "affects_version/s".to_string(),
            CreateFieldInfo {
                id: "versions".to_string(),
                name: "Affects Version/s".to_string(),
                field_type: Some("array".to_string()),
                schema: Some("array".to_string()),
                required_for: required_for.iter().copied().collect(),
                available_for: IssueKind::all().iter().copied().collect(),
                allowed_values: vec!["1.0".to_string(), "1.1".to_string(), "2.0".to_string()],
            },
        );
        map
    }

    #[test]
    fn test_version_absent_for_kind_not_requiring_it() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = Store::load(temp_dir.path()).unwrap();
        let map = version_map(&[IssueKind::Task]);

        let mut prompt = MockPrompt::new(&["never asked"]);
        let result = resolve_version_field(
            IssueKind::Bug,
            None,
            &map,
            &mut store,
            &mut prompt,
            &interactive(),
        )
        .unwrap();

        let (name, resolution) = result.unwrap();
        assert_eq!(name, "affects_version/s");
        assert_eq!(resolution, Resolution::Absent);
        assert!(prompt.questions.is_empty());
    }

    #[test]
    fn test_version_supplied_value_validated_immediately() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = Store::load(temp_dir.path()).unwrap();
        let map = version_map(&[IssueKind::Bug]);

        let mut prompt = MockPrompt::new(&[]);
        let result = resolve_version_field(
            IssueKind::Bug,
            Some("9.9"),
            &map,
            &mut store,
            &mut prompt,
            &interactive(),
        );

        match result {
            Err(ResolveError::InvalidValue { field, value, allowed }) => {
                assert_eq!(field, "affects_version/s");
                assert_eq!(value, "9.9");
                assert_eq!(allowed, vec!["1.0", "1.1", "2.0"]);
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn test_version_prompt_writes_back() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = Store::load(temp_dir.path()).unwrap();
        let map = version_map(&[IssueKind::Bug]);

        let mut prompt = MockPrompt::new(&["3"]);
        let result = resolve_version_field(
            IssueKind::Bug,
            None,
            &map,
            &mut store,
            &mut prompt,
            &interactive(),
        )
        .unwrap();

        let (_, resolution) = result.unwrap();
        assert_eq!(resolution, Resolution::Value("2.0".to_string()));

        let reloaded = Store::load(temp_dir.path()).unwrap();
        assert_eq!(
            reloaded.default_for("affects_version/s"),
            Some(&json!("2.0"))
        );
    }

    #[test]
    fn test_version_default_found_under_alias_spelling() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = Store::load(temp_dir.path()).unwrap();
        store.set_custom_default("versions", json!("1.1"));
        let map = version_map(&[IssueKind::Bug]);

        let mut prompt = MockPrompt::new(&[]);
        let result = resolve_version_field(
            IssueKind::Bug,
            None,
            &map,
            &mut store,
            &mut prompt,
            &non_interactive(),
        )
        .unwrap();

        let (_, resolution) = result.unwrap();
        assert_eq!(resolution, Resolution::Value("1.1".to_string()));
    }

    #[test]
    fn test_version_given_as_generic_field_resolves_without_prompt() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = Store::load(temp_dir.path()).unwrap();
        let map = version_map(&[IssueKind::Bug]);

        // a --field value under an alias spelling is the flag for the
        // version path
        let mut explicit = BTreeMap::from([("versions".to_string(), json!("1.0"))]);
        let flag = take_version_value(&mut explicit, &map);
        assert_eq!(flag.as_deref(), Some("1.0"));
        // lifted out entirely; nothing is left to pass through
        assert!(explicit.is_empty());

        let mut prompt = MockPrompt::new(&[]);
        let result = resolve_version_field(
            IssueKind::Bug,
            flag.as_deref(),
            &map,
            &mut store,
            &mut prompt,
            &non_interactive(),
        )
        .unwrap();

        let (name, resolution) = result.unwrap();
        assert_eq!(name, "affects_version/s");
        assert_eq!(resolution, Resolution::Value("1.0".to_string()));
        assert!(prompt.questions.is_empty());
    }

    #[test]
    fn test_take_version_value_spellings() {
        let map = version_map(&[IssueKind::Bug]);

        // the mapping key itself is matched first
        let mut explicit = BTreeMap::from([
            ("affects_version/s".to_string(), json!("2.0")),
            ("severity".to_string(), json!("Major")),
        ]);
        assert_eq!(
            take_version_value(&mut explicit, &map).as_deref(),
            Some("2.0")
        );
        assert!(!explicit.contains_key("affects_version/s"));
        assert!(explicit.contains_key("severity"));

        // array values stay on the generic path
        let mut multi = BTreeMap::from([("versions".to_string(), json!(["1.0", "1.1"]))]);
        assert_eq!(take_version_value(&mut multi, &map), None);
        assert_eq!(multi.len(), 1);

        // no version-family field: the set is left alone
        let mut unmapped = BTreeMap::from([("versions".to_string(), json!("1.0"))]);
        assert_eq!(take_version_value(&mut unmapped, &FieldMap::new()), None);
        assert_eq!(unmapped.len(), 1);
    }

    #[test]
    fn test_version_field_found_by_name_scan() {
        let mut map = FieldMap::new();
        map.insert(
            "product_version".to_string(),
            CreateFieldInfo {
                id: "customfield_42".to_string(),
                allowed_values: vec!["alpha".to_string()],
                ..CreateFieldInfo::default()
            },
        );
        // a versions-ish field without enumerated values does not count
        map.insert(
            "aversion_notes".to_string(),
            CreateFieldInfo {
                id: "customfield_43".to_string(),
                ..CreateFieldInfo::default()
            },
        );

        let (name, _) = find_version_field(&map).unwrap();
        assert_eq!(name, "product_version");

        assert!(find_version_field(&FieldMap::new()).is_none());
    }

    #[test]
    fn test_compose_translates_names_and_overlays_system() {
        let map = version_map(&[]);
        let custom = BTreeMap::from([
            ("affects_versions".to_string(), json!("1.0")),
            ("mystery_field".to_string(), json!("kept as-is")),
            ("empty".to_string(), json!("")),
        ]);
        let system = BTreeMap::from([("priority".to_string(), json!("High"))]);

        let set = compose_field_set(&map, &custom, &system);
        assert_eq!(set.get("versions"), Some(&json!("1.0")));
        assert_eq!(set.get("mystery_field"), Some(&json!("kept as-is")));
        assert_eq!(set.get("priority"), Some(&json!("High")));
        assert!(!set.contains_key("empty"));
    }
}
