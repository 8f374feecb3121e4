//! Client-side validation of field values against discovered metadata.
//!
//! Every check runs to completion and the report carries all violations,
//! so one round of feedback covers everything instead of failing piecemeal.
//! Unknown fields are never violations here: the mapping may be degraded
//! and the server has the final say on fields we know nothing about.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::fields::{alias, normalize_name, CreateFieldInfo, EditFieldMap, FieldMap, IssueKind};

/// All violations found in one validation pass
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub violations: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Whether a value counts as "not provided": null, empty string, empty array
pub(crate) fn value_is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Textual form of a value for allowed-value comparison. Objects compare
/// by their "value" or "name" member, matching how the server enumerates
/// allowed values.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("value")
            .or_else(|| obj.get("name"))
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

fn is_multi(info: &CreateFieldInfo) -> bool {
    matches!(
        info.schema.as_deref(),
        Some("array" | "multiselect" | "multicheckboxes")
    )
}

/// Elements a value contributes to allowed-value checks. Strings on
/// multi-valued fields split on commas, mirroring payload construction;
/// single-valued fields compare the whole string.
fn value_elements(info: &CreateFieldInfo, value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(value_text).collect(),
        Value::String(s) if is_multi(info) => s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        other => vec![value_text(other)],
    }
}

/// Validate creation-time values for an issue kind.
///
/// `custom_by_name` holds user-supplied values keyed by field name;
/// `system_by_id` holds flag-driven system fields keyed by wire id.
pub fn validate_fields(
    kind: IssueKind,
    custom_by_name: &BTreeMap<String, Value>,
    system_by_id: &BTreeMap<String, Value>,
    map: &FieldMap,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (name, value) in custom_by_name {
        if value_is_empty(value) {
            continue;
        }
        let Some(info) = alias::field_with_alias(map, &normalize_name(name)) else {
            continue;
        };
        check_field(&mut report, name, info, Some(kind), value);
    }

    for (id, value) in system_by_id {
        if value_is_empty(value) {
            continue;
        }
        let Some(info) = map.values().find(|info| info.id == *id) else {
            continue;
        };
        check_field(&mut report, id, info, Some(kind), value);
    }

    report
}

fn check_field(
    report: &mut ValidationReport,
    label: &str,
    info: &CreateFieldInfo,
    kind: Option<IssueKind>,
    value: &Value,
) {
    if let Some(kind) = kind {
        // an empty set means no per-kind data (degraded mapping); skip
        if !info.available_for.is_empty() && !info.available_for.contains(&kind) {
            let available = info
                .available_for
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            report.violations.push(format!(
                "{label} is not available for issue type '{kind}'. Available for: {available}."
            ));
            return;
        }
    }

    if !info.allowed_values.is_empty() {
        for element in value_elements(info, value) {
            if !info.allowed_values.iter().any(|allowed| *allowed == element) {
                report.violations.push(format!(
                    "'{}' is not an allowed value for {}. Allowed: {}.",
                    element,
                    label,
                    info.allowed_values.join(", ")
                ));
            }
        }
    }
}

/// Validate edit-time values against an issue's edit metadata. Required
/// fields cannot be cleared; enumerated fields must use allowed values.
pub fn validate_edit_fields(
    edits: &BTreeMap<String, Value>,
    map: &EditFieldMap,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (name, value) in edits {
        let Some(info) = alias::field_with_alias(map, &normalize_name(name)) else {
            continue;
        };
        if value_is_empty(value) {
            if info.required {
                report
                    .violations
                    .push(format!("{name} is required and cannot be cleared."));
            }
            continue;
        }
        check_field(&mut report, name, &info.to_create(), None, value);
    }

    report
}

/// Fields the create flow always supplies in the payload envelope, plus
/// reporter, which the server defaults to the calling account
const ENVELOPE_FIELDS: &[&str] = &["project", "issuetype", "summary", "description", "reporter"];

/// Required fields for `kind` that no provided value covers. Matching is
/// by wire id so a value supplied under either alias spelling counts.
pub fn missing_required_fields(
    kind: IssueKind,
    provided_custom: &BTreeMap<String, Value>,
    provided_system: &BTreeMap<String, Value>,
    map: &FieldMap,
) -> Vec<(String, CreateFieldInfo)> {
    let mut provided_ids: Vec<String> = provided_system
        .iter()
        .filter(|(_, value)| !value_is_empty(value))
        .map(|(id, _)| id.clone())
        .collect();

    for (name, value) in provided_custom {
        if value_is_empty(value) {
            continue;
        }
        if let Some(info) = alias::field_with_alias(map, &normalize_name(name)) {
            provided_ids.push(info.id.clone());
        }
    }

    map.iter()
        .filter(|(name, info)| {
            info.required_for.contains(&kind)
                && !provided_ids.contains(&info.id)
                && !ENVELOPE_FIELDS.contains(&name.as_str())
        })
        .map(|(name, info)| (name.clone(), info.clone()))
        .collect()
}
