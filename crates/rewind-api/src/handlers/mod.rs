//! HTTP handlers for rewind-api.
//!
//! `history` exposes list/undo/redo. `annotations` and `connections` are the
//! recorded document endpoints; every write they make goes through a
//! [`rewind_core::RecordingSession`] so it can be undone.

pub mod annotations;
pub mod connections;
pub mod history;
pub mod system;

use rewind_core::defaults::{PAGE_LIMIT, PAGE_LIMIT_MAX, PAGE_OFFSET};
use rewind_core::{Document, DocumentPatch, DocumentQuery, FindOptions};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::ApiError;

/// Field holding the owning dataset, which is also the history scope.
pub const DATASET_FIELD: &str = "datasetId";

/// Listing filters shared by annotations and connections.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DatasetListQuery {
    /// Only documents of this dataset.
    pub dataset_id: Option<Uuid>,
    /// Page size (default 50, max 1000).
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl DatasetListQuery {
    pub(crate) fn filter(&self) -> DocumentQuery {
        match self.dataset_id {
            Some(id) => DocumentQuery::eq(DATASET_FIELD, id.to_string()),
            None => DocumentQuery::All,
        }
    }

    pub(crate) fn options(&self) -> FindOptions {
        page_options(self.limit, self.offset)
    }
}

/// Paging options with the default page size and the upper bound applied.
pub(crate) fn page_options(limit: Option<i64>, offset: Option<i64>) -> FindOptions {
    FindOptions::new()
        .limit(limit.unwrap_or(PAGE_LIMIT).clamp(1, PAGE_LIMIT_MAX))
        .offset(offset.unwrap_or(PAGE_OFFSET).max(0))
}

/// Parse a request body into a document, checking `required` fields.
///
/// Required fields must be present and non-null; `datasetId` must be a UUID.
pub(crate) fn document_from_body(body: JsonValue, required: &[&str]) -> Result<Document, ApiError> {
    let document = Document::from_json(body)?;

    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|field| document.get(field).map_or(true, JsonValue::is_null))
        .collect();
    if !missing.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    if document.get(DATASET_FIELD).is_some() && document.get_uuid(DATASET_FIELD).is_none() {
        return Err(ApiError::BadRequest(format!(
            "'{DATASET_FIELD}' must be a UUID string"
        )));
    }

    Ok(document)
}

/// Parse a patch body, refusing to remove `required` fields or to set a
/// non-UUID `datasetId`.
pub(crate) fn patch_from_body(body: JsonValue, required: &[&str]) -> Result<DocumentPatch, ApiError> {
    let patch = DocumentPatch::from_json(body)?;
    if let Some(field) = patch.unset.iter().find(|f| required.contains(&f.as_str())) {
        return Err(ApiError::BadRequest(format!(
            "Required field '{field}' cannot be removed"
        )));
    }
    if let Some(dataset) = patch.set.get(DATASET_FIELD) {
        if dataset.as_str().and_then(|raw| Uuid::parse_str(raw).ok()).is_none() {
            return Err(ApiError::BadRequest(format!(
                "'{DATASET_FIELD}' must be a UUID string"
            )));
        }
    }
    Ok(patch)
}

/// History scope of a document.
pub(crate) fn dataset_of(document: &Document) -> Option<Uuid> {
    document.get_uuid(DATASET_FIELD)
}
