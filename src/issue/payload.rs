//! Wire payload construction for create and update calls.
//!
//! Users supply plain strings; the tracker wants differently shaped JSON
//! per field. Shaping decides by wire id first (well-known system fields),
//! then by the discovered type tag. Values that arrive already shaped
//! (objects, arrays of objects) pass through untouched so power users can
//! hand raw JSON to `--field`.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::fields::validate::value_is_empty;
use crate::fields::{CreateFieldInfo, FieldMap, IssueKind};

/// Shape one field value for the wire
pub fn format_field_value(info: Option<&CreateFieldInfo>, id: &str, value: &Value) -> Value {
    if matches!(value, Value::Object(_)) {
        return value.clone();
    }
    if let Value::Array(items) = value {
        if !items.is_empty() && items.iter().all(|item| matches!(item, Value::Object(_))) {
            return value.clone();
        }
    }

    match id {
        "components" | "versions" | "fixVersions" => return name_object_list(value),
        "labels" => return string_list(value),
        "priority" | "assignee" | "reporter" => return json!({"name": scalar_text(value)}),
        _ => {}
    }

    match info.and_then(|i| i.schema.as_deref()) {
        Some("multiselect" | "multicheckboxes") => value_object_list(value),
        Some("select" | "radiobuttons" | "option") => json!({"value": scalar_text(value)}),
        Some("float" | "number") => number_value(value),
        Some("array") => string_list(value),
        _ => value.clone(),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Element texts of a value: array items, or comma-separated parts of a
/// string. Trailing and doubled commas contribute nothing.
fn elements(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(scalar_text).collect(),
        Value::String(s) => s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        other => vec![scalar_text(other)],
    }
}

fn name_object_list(value: &Value) -> Value {
    Value::Array(
        elements(value)
            .into_iter()
            .map(|name| json!({"name": name}))
            .collect(),
    )
}

fn value_object_list(value: &Value) -> Value {
    Value::Array(
        elements(value)
            .into_iter()
            .map(|v| json!({"value": v}))
            .collect(),
    )
}

fn string_list(value: &Value) -> Value {
    Value::Array(elements(value).into_iter().map(Value::String).collect())
}

/// Parse numeric strings into JSON numbers; anything unparsable is left
/// for the server to reject with its own message
fn number_value(value: &Value) -> Value {
    match value {
        Value::Number(_) => value.clone(),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map_or_else(|| value.clone(), Value::Number),
        _ => value.clone(),
    }
}

/// Assemble the full create payload. `field_set` is wire-id keyed; `map`
/// supplies shaping metadata where discovery knows the field.
pub fn build_create_payload(
    project: &str,
    kind: IssueKind,
    summary: &str,
    description: Option<&str>,
    field_set: &BTreeMap<String, Value>,
    map: &FieldMap,
) -> Value {
    let mut fields = Map::new();
    fields.insert("project".to_string(), json!({"key": project}));
    fields.insert("issuetype".to_string(), json!({"name": kind.as_str()}));
    fields.insert("summary".to_string(), json!(summary));
    if let Some(description) = description {
        fields.insert("description".to_string(), json!(description));
    }

    for (id, value) in field_set {
        if value_is_empty(value) {
            continue;
        }
        let info = map.values().find(|info| info.id == *id);
        fields.insert(id.clone(), format_field_value(info, id, value));
    }

    json!({"fields": fields})
}

/// Assemble an update payload from wire-id keyed edits. Empty values are
/// kept: an explicit empty clears the field on the server.
pub fn build_update_payload(edits_by_id: &BTreeMap<String, Value>, map: &FieldMap) -> Value {
    let mut fields = Map::new();
    for (id, value) in edits_by_id {
        let info = map.values().find(|info| info.id == *id);
        fields.insert(id.clone(), format_field_value(info, id, value));
    }
    json!({"fields": fields})
}
