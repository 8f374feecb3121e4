//! Field metadata model: issue kinds, normalized field info, and the
//! mapping types discovery produces.

pub mod alias;
pub mod cache;
pub mod normalize;
pub mod resolve;
pub mod validate;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// Issue kinds tkt can create, matched case-insensitively against the
/// tracker's issue type names
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IssueKind {
    Bug,
    Story,
    Task,
    Epic,
    Spike,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Bug => "Bug",
            IssueKind::Story => "Story",
            IssueKind::Task => "Task",
            IssueKind::Epic => "Epic",
            IssueKind::Spike => "Spike",
        }
    }

    pub fn all() -> &'static [IssueKind] {
        &[
            IssueKind::Bug,
            IssueKind::Story,
            IssueKind::Task,
            IssueKind::Epic,
            IssueKind::Spike,
        ]
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IssueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IssueKind::all()
            .iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| {
                format!(
                    "unknown issue kind '{}'; expected one of: {}",
                    s,
                    IssueKind::all()
                        .iter()
                        .map(|k| k.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

/// Canonical key for a field display name: lowercase, spaces as
/// underscores. "Story Points" and "story points" land on the same entry.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// Everything tkt knows about a creatable field, merged across issue kinds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateFieldInfo {
    /// Wire id, e.g. "customfield_10001"
    pub id: String,
    /// Display name as the tracker reports it
    #[serde(default)]
    pub name: String,
    /// Base schema type, e.g. "string", "number", "array"
    #[serde(rename = "type")]
    pub field_type: Option<String>,
    /// Subtype tag: the last segment of the custom type when one exists,
    /// else the base type. Payload shaping and multi-value detection key
    /// off this tag.
    pub schema: Option<String>,
    /// Kinds that require this field on creation
    #[serde(default)]
    pub required_for: BTreeSet<IssueKind>,
    /// Kinds whose creation screen offers this field
    #[serde(default)]
    pub available_for: BTreeSet<IssueKind>,
    /// Values the server accepts, when it enumerates them
    #[serde(default)]
    pub allowed_values: Vec<String>,
}

/// Field metadata from the edit screen of one issue. There are no kind
/// sets here: edit metadata is per-issue, not per-kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditFieldInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: Option<String>,
    pub schema: Option<String>,
    pub required: bool,
    #[serde(default)]
    pub allowed_values: Vec<String>,
}

impl EditFieldInfo {
    /// View as creation-shaped info for payload formatting
    pub fn to_create(&self) -> CreateFieldInfo {
        CreateFieldInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            field_type: self.field_type.clone(),
            schema: self.schema.clone(),
            required_for: BTreeSet::new(),
            available_for: BTreeSet::new(),
            allowed_values: self.allowed_values.clone(),
        }
    }
}

/// Normalized field name to merged creation info, ordered for stable output
pub type FieldMap = BTreeMap<String, CreateFieldInfo>;

/// Normalized field name to edit info for a single issue
pub type EditFieldMap = BTreeMap<String, EditFieldInfo>;

/// Convert an edit map into creation-shaped infos for payload building
pub fn create_view(map: &EditFieldMap) -> FieldMap {
    map.iter()
        .map(|(name, info)| (name.clone(), info.to_create()))
        .collect()
}
