//! Tracker endpoint calls and wire types.
//!
//! The creation metadata endpoint exists in two server generations that
//! differ only in envelope keys: the issue-type page arrives under
//! `"issueTypes"` (modern) or `"values"` (legacy), and the per-type field
//! page under `"fields"` or `"values"`. Both shapes are modeled as untagged
//! enum variants so either parses without version sniffing.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::api::error::ApiError;
use crate::api::transport::{ApiResponse, Transport};
use crate::fields::IssueKind;

/// One entry of the instance-wide field catalog (GET /field)
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogField {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub schema: Option<FieldSchema>,
}

/// Type descriptor attached to field metadata
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub schema_type: Option<String>,
    /// Fully qualified custom type, e.g.
    /// "com.atlassian.jira.plugin.system.customfieldtypes:select"
    #[serde(default)]
    pub custom: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueTypeRef {
    pub id: String,
    pub name: String,
}

/// Issue-type page of the creation metadata endpoint
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IssueTypePage {
    Modern {
        #[serde(rename = "issueTypes")]
        issue_types: Vec<IssueTypeRef>,
    },
    Legacy {
        values: Vec<IssueTypeRef>,
    },
}

impl IssueTypePage {
    pub fn into_issue_types(self) -> Vec<IssueTypeRef> {
        match self {
            IssueTypePage::Modern { issue_types } => issue_types,
            IssueTypePage::Legacy { values } => values,
        }
    }
}

/// Field page of the creation metadata endpoint for one issue type
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CreateFieldPage {
    Modern { fields: Vec<RawCreateField> },
    Legacy { values: Vec<RawCreateField> },
}

impl CreateFieldPage {
    pub fn into_fields(self) -> Vec<RawCreateField> {
        match self {
            CreateFieldPage::Modern { fields } => fields,
            CreateFieldPage::Legacy { values } => values,
        }
    }
}

/// Raw field entry from the creation metadata field page
#[derive(Debug, Clone, Deserialize)]
pub struct RawCreateField {
    #[serde(rename = "fieldId")]
    pub field_id: Option<String>,
    pub key: Option<String>,
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub schema: Option<FieldSchema>,
    #[serde(rename = "allowedValues", default)]
    pub allowed_values: Vec<Value>,
}

impl RawCreateField {
    /// Wire id for this field, preferring `fieldId` over `key` over the
    /// display name (older servers omit the first two)
    pub fn id(&self) -> &str {
        self.field_id
            .as_deref()
            .or(self.key.as_deref())
            .unwrap_or(&self.name)
    }
}

/// Raw field entry from the edit metadata endpoint, keyed by wire id in
/// the envelope
#[derive(Debug, Clone, Deserialize)]
pub struct RawEditField {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub schema: Option<FieldSchema>,
    /// Edit operations the server permits ("set", "add", ...). Empty means
    /// the field is not editable.
    #[serde(default)]
    pub operations: Vec<String>,
    #[serde(rename = "allowedValues", default)]
    pub allowed_values: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct EditMetaResponse {
    #[serde(default)]
    fields: BTreeMap<String, RawEditField>,
}

/// Response to a successful issue creation
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedIssue {
    pub id: String,
    pub key: String,
    #[serde(rename = "self")]
    pub self_url: Option<String>,
}

/// Slim view of an issue for display
#[derive(Debug, Clone)]
pub struct IssueDetails {
    pub key: String,
    pub summary: String,
    pub status: Option<String>,
    pub kind: Option<String>,
    pub assignee: Option<String>,
    pub description: Option<String>,
}

/// Fetch the instance-wide field catalog (GET /field).
///
/// An empty catalog is always an error: even a minimal project exposes
/// system fields, so nothing here means the account cannot see fields at
/// all and discovery would silently produce a useless mapping.
pub fn fetch_all_fields(transport: &dyn Transport) -> Result<Vec<CatalogField>, ApiError> {
    let response = error_for_status(transport.get("/field", &[])?, "field catalog")?;
    let raw = response.json()?;

    let entries = match raw.as_array() {
        Some(entries) if !entries.is_empty() => entries,
        _ => return Err(ApiError::EmptyFieldCatalog),
    };

    let fields: Vec<CatalogField> = entries
        .iter()
        .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
        .collect();

    if fields.is_empty() {
        return Err(ApiError::EmptyFieldCatalog);
    }

    Ok(fields)
}

/// Fetch per-issue-type creation metadata for a project.
///
/// Two-step: the issue-type page maps kind names to server ids, then one
/// field page is fetched per requested kind. Kinds the project does not
/// define are skipped, not errors.
pub fn fetch_creation_metadata(
    transport: &dyn Transport,
    project: &str,
    kinds: &[IssueKind],
) -> Result<Vec<(IssueKind, Vec<RawCreateField>)>, ApiError> {
    let path = format!("/issue/createmeta/{project}/issuetypes");
    let response = error_for_status(transport.get(&path, &[])?, "creation metadata")?;
    let page: IssueTypePage = response.parse()?;
    let issue_types = page.into_issue_types();

    let mut result = Vec::new();
    for kind in kinds {
        let Some(type_ref) = issue_types
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(kind.as_str()))
        else {
            debug!("Project {} has no issue type named {}", project, kind);
            continue;
        };

        let path = format!("/issue/createmeta/{project}/issuetypes/{}", type_ref.id);
        let response = error_for_status(transport.get(&path, &[])?, "creation metadata")?;
        let page: CreateFieldPage = response.parse()?;
        result.push((*kind, page.into_fields()));
    }

    Ok(result)
}

/// Fetch edit metadata for an existing issue (GET /issue/{key}/editmeta)
pub fn fetch_edit_metadata(
    transport: &dyn Transport,
    key: &str,
) -> Result<BTreeMap<String, RawEditField>, ApiError> {
    let path = format!("/issue/{key}/editmeta");
    let response = error_for_status(transport.get(&path, &[])?, &format!("issue {key}"))?;
    let meta: EditMetaResponse = response.parse()?;
    Ok(meta.fields)
}

/// Create an issue (POST /issue)
pub fn create_issue(transport: &dyn Transport, payload: &Value) -> Result<CreatedIssue, ApiError> {
    let response = error_for_status(transport.post("/issue", payload)?, "issue creation")?;
    response.parse()
}

/// Update an issue (PUT /issue/{key}); success is 204 with no body
pub fn update_issue(transport: &dyn Transport, key: &str, payload: &Value) -> Result<(), ApiError> {
    let path = format!("/issue/{key}");
    error_for_status(transport.put(&path, payload)?, &format!("issue {key}"))?;
    Ok(())
}

/// Fetch a full issue document (GET /issue/{key})
pub fn get_issue(transport: &dyn Transport, key: &str) -> Result<Value, ApiError> {
    let path = format!("/issue/{key}");
    let response = error_for_status(transport.get(&path, &[])?, &format!("issue {key}"))?;
    response.json()
}

/// Extract the fields `tkt view` renders from a raw issue document
pub fn issue_details(raw: &Value) -> IssueDetails {
    let fields = &raw["fields"];
    IssueDetails {
        key: raw["key"].as_str().unwrap_or_default().to_string(),
        summary: fields["summary"].as_str().unwrap_or_default().to_string(),
        status: fields["status"]["name"].as_str().map(String::from),
        kind: fields["issuetype"]["name"].as_str().map(String::from),
        assignee: fields["assignee"]["displayName"].as_str().map(String::from),
        description: fields["description"].as_str().map(String::from),
    }
}

/// Map response statuses onto the error taxonomy. `what` names the
/// resource for 404 messages.
fn error_for_status(response: ApiResponse, what: &str) -> Result<ApiResponse, ApiError> {
    match response.status {
        200 | 201 | 204 => Ok(response),
        400 => Err(parse_validation_body(&response)),
        401 => Err(ApiError::Unauthorized),
        403 => Err(ApiError::Forbidden),
        404 => Err(ApiError::NotFound(what.to_string())),
        status => Err(ApiError::http(status, response.body)),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(rename = "errorMessages", default)]
    error_messages: Vec<String>,
    #[serde(default)]
    errors: BTreeMap<String, String>,
}

/// Preserve server-side rejection messages verbatim; the server knows
/// things client-side validation cannot (screens, workflow conditions)
fn parse_validation_body(response: &ApiResponse) -> ApiError {
    let body: ErrorBody = serde_json::from_str(&response.body).unwrap_or_default();
    ApiError::Validation {
        messages: body.error_messages,
        field_errors: body.errors,
    }
}
