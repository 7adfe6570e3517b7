use crate::error::Reason;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use time::OffsetDateTime;

// =============================================================================
// LEADS
// =============================================================================

/// A lead as returned by the filter endpoint. Fields requested beyond the
/// default set land in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadResult {
    pub id: i64,
    #[serde(rename = "firstName", default)]
    pub first_name: Option<String>,
    #[serde(rename = "lastName", default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "createdAt", default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(rename = "updatedAt", default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Name and read-only state of a lead attribute in one of the API flavours.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadAttributeMap {
    pub name: String,
    #[serde(rename = "readOnly", default)]
    pub read_only: bool,
}

/// Returned by the legacy lead describe endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadAttribute {
    #[serde(rename = "dataType")]
    pub data_type: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub id: i64,
    #[serde(default)]
    pub length: Option<u32>,
    #[serde(default)]
    pub rest: Option<LeadAttributeMap>,
    #[serde(default)]
    pub soap: Option<LeadAttributeMap>,
}

// =============================================================================
// FIELDS (shared by leads and custom objects)
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectField {
    pub name: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "dataType")]
    pub data_type: String,
    #[serde(default)]
    pub length: Option<u32>,
    #[serde(default)]
    pub updateable: bool,
    #[serde(rename = "crmManaged", default)]
    pub crm_managed: bool,
    /// Whether the field can be used as a filter type; filled in from the
    /// owning schema's searchable field groups
    #[serde(default)]
    pub searchable: bool,
}

/// Tags every field that appears in one of the searchable groups.
pub(crate) fn mark_searchable(fields: &mut [ObjectField], groups: &[Vec<String>]) {
    for field in fields {
        field.searchable = groups
            .iter()
            .any(|group| group.iter().any(|name| *name == field.name));
    }
}

// =============================================================================
// CUSTOM OBJECTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectState {
    Draft,
    Approved,
    ApprovedWithDraft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectVersion {
    Draft,
    Approved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedObject {
    pub field: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRelation {
    pub field: String,
    #[serde(rename = "relatedTo")]
    pub related_to: RelatedObject,
    #[serde(rename = "type")]
    pub relation_type: String,
}

/// Schema of a custom object. List calls leave `fields` empty; describe
/// fills it in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomObjectMetadata {
    /// API name, e.g. "car_c"
    pub name: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "pluralName", default)]
    pub plural_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "idField", default)]
    pub id_field: Option<String>,
    #[serde(default)]
    pub fields: Vec<ObjectField>,
    #[serde(rename = "searchableFields", default)]
    pub searchable_fields: Vec<Vec<String>>,
    #[serde(rename = "dedupeFields", default)]
    pub dedupe_fields: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<ObjectRelation>,
    #[serde(rename = "createdAt", default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(rename = "updatedAt", default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub state: Option<ObjectState>,
    #[serde(default)]
    pub version: Option<ObjectVersion>,
}

/// One custom object record from a filter call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomObject {
    #[serde(default)]
    pub seq: Option<u32>,
    #[serde(rename = "marketoGUID", default)]
    pub marketo_guid: Option<String>,
    #[serde(flatten)]
    pub fields: HashMap<String, serde_json::Value>,
}

// =============================================================================
// BULK IMPORT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    Queued,
    Importing,
    Complete,
    Failed,
    /// A status this client does not know about, kept verbatim
    #[serde(untagged)]
    Other(String),
}

impl BatchStatus {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => f.write_str("Queued"),
            Self::Importing => f.write_str("Importing"),
            Self::Complete => f.write_str("Complete"),
            Self::Failed => f.write_str("Failed"),
            Self::Other(status) => f.write_str(status),
        }
    }
}

/// State of an import batch, returned by both create and status calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    #[serde(rename = "batchId")]
    pub batch_id: i64,
    #[serde(rename = "importId", default)]
    pub import_id: Option<String>,
    pub status: BatchStatus,
    #[serde(rename = "numOfLeadsProcessed", default)]
    pub leads_processed: u64,
    #[serde(rename = "numOfRowsFailed", default)]
    pub failures: u64,
    #[serde(rename = "numOfRowsWithWarning", default)]
    pub warnings: u64,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadImportResponse {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub result: Vec<BatchResult>,
}

/// One row of an import failure or warning report. `reason` is the report's
/// last column, `fields` maps the remaining header names to the row's values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadImportFailure {
    pub reason: String,
    pub fields: HashMap<String, String>,
}

// =============================================================================
// RECORDS
// =============================================================================

/// Per-record outcome of create, update and delete calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResult {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub seq: Option<u32>,
    pub status: String,
    #[serde(default)]
    pub reasons: Vec<Reason>,
}
