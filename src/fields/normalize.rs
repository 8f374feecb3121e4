//! Normalization of raw tracker metadata into field mappings.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::api::tracker::{CatalogField, FieldSchema, RawCreateField, RawEditField};
use crate::fields::{
    normalize_name, CreateFieldInfo, EditFieldInfo, EditFieldMap, FieldMap, IssueKind,
};

/// Merge per-kind creation metadata into one mapping keyed by normalized
/// field name.
///
/// Merge rules for a field seen under several kinds:
/// - `required_for` and `available_for` are unions across kinds
/// - `allowed_values` keeps the first non-empty list seen
/// - `id`, name, and type tags are overwritten on each visit; ids agree
///   across kinds for the same display name on every tracker we have met
pub fn normalize_creation(meta: &[(IssueKind, Vec<RawCreateField>)]) -> FieldMap {
    let mut map = FieldMap::new();

    for (kind, fields) in meta {
        for field in fields {
            let key = normalize_name(&field.name);
            let entry = map.entry(key).or_default();

            entry.id = field.id().to_string();
            entry.name = field.name.clone();
            entry.field_type = base_type(field.schema.as_ref());
            entry.schema = schema_tag(field.schema.as_ref());
            entry.available_for.insert(*kind);
            if field.required {
                entry.required_for.insert(*kind);
            }
            if entry.allowed_values.is_empty() {
                entry.allowed_values = extract_allowed_values(&field.allowed_values);
            }
        }
    }

    map
}

/// Build a degraded mapping from the flat field catalog. That endpoint has
/// no per-kind information, so the kind sets stay empty and required-field
/// enforcement falls to the server.
pub fn normalize_catalog(catalog: &[CatalogField]) -> FieldMap {
    catalog
        .iter()
        .map(|field| {
            (
                normalize_name(&field.name),
                CreateFieldInfo {
                    id: field.id.clone(),
                    name: field.name.clone(),
                    field_type: base_type(field.schema.as_ref()),
                    schema: schema_tag(field.schema.as_ref()),
                    ..CreateFieldInfo::default()
                },
            )
        })
        .collect()
}

/// Normalize edit metadata for one issue. Fields without edit operations
/// are dropped; the server rejects writes to them anyway.
pub fn normalize_edit(fields: &BTreeMap<String, RawEditField>) -> EditFieldMap {
    let mut map = EditFieldMap::new();

    for (id, field) in fields {
        if field.operations.is_empty() {
            debug!("Skipping non-editable field {}", id);
            continue;
        }
        let display = field.name.clone().unwrap_or_else(|| id.clone());
        map.insert(
            normalize_name(&display),
            EditFieldInfo {
                id: id.clone(),
                name: display,
                field_type: base_type(field.schema.as_ref()),
                schema: schema_tag(field.schema.as_ref()),
                required: field.required,
                allowed_values: extract_allowed_values(&field.allowed_values),
            },
        );
    }

    map
}

/// Flatten the server's allowed-value entries into plain strings.
/// Per element: `{"value": ...}` wins, then `{"name": ...}`, then a bare
/// scalar; anything else is skipped.
pub fn extract_allowed_values(raw: &[Value]) -> Vec<String> {
    raw.iter()
        .filter_map(|entry| match entry {
            Value::Object(obj) => obj
                .get("value")
                .or_else(|| obj.get("name"))
                .and_then(Value::as_str)
                .map(String::from),
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
        .collect()
}

/// Base type from a schema ("string", "array", ...), when the server sent one
fn base_type(schema: Option<&FieldSchema>) -> Option<String> {
    schema.and_then(|s| s.schema_type.clone())
}

/// Subtype tag from a schema: the last segment of the custom type when
/// present ("...customfieldtypes:select" becomes "select"), else the base
/// type
fn schema_tag(schema: Option<&FieldSchema>) -> Option<String> {
    let schema = schema?;
    if let Some(custom) = &schema.custom {
        return custom.rsplit(':').next().map(String::from);
    }
    schema.schema_type.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_field(name: &str, required: bool, allowed: Value) -> RawCreateField {
        serde_json::from_value(json!({
            "fieldId": format!("customfield_{}", normalize_name(name)),
            "name": name,
            "required": required,
            "allowedValues": allowed,
        }))
        .unwrap()
    }

    #[test]
    fn test_merge_unions_kind_sets() {
        let meta = vec![
            (
                IssueKind::Bug,
                vec![raw_field("Severity", true, json!([]))],
            ),
            (
                IssueKind::Task,
                vec![raw_field("Severity", false, json!([]))],
            ),
        ];

        let map = normalize_creation(&meta);
        let info = &map["severity"];
        assert_eq!(
            info.available_for,
            [IssueKind::Bug, IssueKind::Task].into_iter().collect()
        );
        assert_eq!(info.required_for, [IssueKind::Bug].into_iter().collect());
    }

    #[test]
    fn test_first_non_empty_allowed_values_wins() {
        let meta = vec![
            (
                IssueKind::Bug,
                vec![raw_field(
                    "Severity",
                    true,
                    json!([{"value": "Minor"}, {"value": "Major"}]),
                )],
            ),
            (
                IssueKind::Task,
                vec![raw_field("Severity", false, json!([{"value": "Other"}]))],
            ),
        ];

        let map = normalize_creation(&meta);
        assert_eq!(map["severity"].allowed_values, vec!["Minor", "Major"]);
    }

    #[test]
    fn test_empty_list_then_populated_takes_populated() {
        let meta = vec![
            (IssueKind::Bug, vec![raw_field("Severity", true, json!([]))]),
            (
                IssueKind::Task,
                vec![raw_field("Severity", false, json!([{"value": "Minor"}]))],
            ),
        ];

        let map = normalize_creation(&meta);
        assert_eq!(map["severity"].allowed_values, vec!["Minor"]);
    }

    #[test]
    fn test_name_case_collapses_to_one_entry() {
        let meta = vec![
            (
                IssueKind::Bug,
                vec![serde_json::from_value::<RawCreateField>(
                    json!({"fieldId": "customfield_9", "name": "Story Points"}),
                )
                .unwrap()],
            ),
            (
                IssueKind::Story,
                vec![serde_json::from_value::<RawCreateField>(
                    json!({"fieldId": "customfield_9", "name": "story points"}),
                )
                .unwrap()],
            ),
        ];

        let map = normalize_creation(&meta);
        assert_eq!(map.len(), 1);
        assert_eq!(map["story_points"].available_for.len(), 2);
    }

    #[test]
    fn test_normalize_creation_is_deterministic() {
        let meta = vec![
            (
                IssueKind::Bug,
                vec![raw_field("Severity", true, json!([{"value": "Minor"}]))],
            ),
            (IssueKind::Task, vec![raw_field("Labels", false, json!([]))]),
        ];

        assert_eq!(normalize_creation(&meta), normalize_creation(&meta));
    }

    #[test]
    fn test_catalog_fallback_has_empty_kind_sets() {
        let catalog: Vec<CatalogField> = serde_json::from_value(json!([
            {"id": "summary", "name": "Summary", "schema": {"type": "string"}},
            {"id": "customfield_1", "name": "Severity"}
        ]))
        .unwrap();

        let map = normalize_catalog(&catalog);
        assert_eq!(map.len(), 2);
        let info = &map["severity"];
        assert_eq!(info.id, "customfield_1");
        assert_eq!(info.name, "Severity");
        assert!(info.required_for.is_empty());
        assert!(info.available_for.is_empty());
        assert!(info.allowed_values.is_empty());

        // plain schema types fill both tags
        assert_eq!(map["summary"].field_type.as_deref(), Some("string"));
        assert_eq!(map["summary"].schema.as_deref(), Some("string"));
    }

    #[test]
    fn test_custom_subtype_splits_from_base_type() {
        let meta = vec![(
            IssueKind::Bug,
            vec![serde_json::from_value::<RawCreateField>(json!({
                "fieldId": "customfield_5",
                "name": "Flavor",
                "schema": {
                    "type": "option",
                    "custom": "com.atlassian.jira.plugin.system.customfieldtypes:select"
                }
            }))
            .unwrap()],
        )];

        let map = normalize_creation(&meta);
        let info = &map["flavor"];
        assert_eq!(info.name, "Flavor");
        assert_eq!(info.field_type.as_deref(), Some("option"));
        assert_eq!(info.schema.as_deref(), Some("select"));
    }

    #[test]
    fn test_normalize_edit_drops_non_editable() {
        let fields: BTreeMap<String, RawEditField> = serde_json::from_value(json!({
            "summary": {"name": "Summary", "required": true, "operations": ["set"]},
            "attachment": {"name": "Attachment", "operations": []}
        }))
        .unwrap();

        let map = normalize_edit(&fields);
        assert!(map.contains_key("summary"));
        assert!(!map.contains_key("attachment"));
        assert!(map["summary"].required);
        assert_eq!(map["summary"].name, "Summary");
    }

    #[test]
    fn test_normalize_edit_falls_back_to_id_for_name() {
        let fields: BTreeMap<String, RawEditField> = serde_json::from_value(json!({
            "customfield_7": {"operations": ["set"]}
        }))
        .unwrap();

        let map = normalize_edit(&fields);
        assert_eq!(map["customfield_7"].id, "customfield_7");
    }

    #[test]
    fn test_extract_allowed_values_priority() {
        let raw = vec![
            json!({"value": "Minor", "name": "ignored"}),
            json!({"name": "webapp"}),
            json!("bare"),
            json!(3),
            json!(true),
            json!({"id": "10001"}),
        ];

        assert_eq!(
            extract_allowed_values(&raw),
            vec!["Minor", "webapp", "bare", "3", "true"]
        );
    }

    #[test]
    fn test_schema_tag_prefers_custom_suffix() {
        let custom: FieldSchema = serde_json::from_value(json!({
            "type": "option",
            "custom": "com.atlassian.jira.plugin.system.customfieldtypes:select"
        }))
        .unwrap();
        assert_eq!(schema_tag(Some(&custom)).as_deref(), Some("select"));

        let plain: FieldSchema = serde_json::from_value(json!({"type": "string"})).unwrap();
        assert_eq!(schema_tag(Some(&plain)).as_deref(), Some("string"));

        assert_eq!(schema_tag(None), None);
    }
}
