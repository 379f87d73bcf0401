//! Annotation endpoints.
//!
//! Writes are recorded actions scoped by the annotation's `datasetId`.
//! Deleting an annotation also deletes every connection that references it
//! as parent or child, inside the same action.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rewind_core::{
    Document, DocumentCollection, DocumentQuery, FindOptions, Recordable, RecordingSession,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::connections::references_any;
use super::{dataset_of, document_from_body, patch_from_body, DatasetListQuery};
use crate::{ApiError, AppState, RequireUser};

/// Fields every annotation must carry.
pub const REQUIRED_FIELDS: &[&str] = &[
    "coordinates",
    "tags",
    "channel",
    "location",
    "shape",
    "datasetId",
];

/// Body of `DELETE /api/v1/annotations/multiple`.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DeleteAnnotationsRequest {
    pub ids: Vec<Uuid>,
}

fn recordable(action_name: &'static str) -> Recordable<Document> {
    Recordable::new(action_name, dataset_of)
}

async fn load(annotations: &Arc<dyn DocumentCollection>, id: Uuid) -> Result<Document, ApiError> {
    annotations
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Annotation {id} not found")))
}

/// Delete annotations and their connections through one session.
async fn delete_with_connections(
    state: &AppState,
    session: &RecordingSession,
    ids: Vec<Uuid>,
) -> rewind_core::Result<u64> {
    session
        .collection(state.connections.clone())
        .delete_by_query(&references_any(&ids))
        .await?;
    session
        .collection(state.annotations.clone())
        .delete_by_query(&DocumentQuery::Ids(ids))
        .await
}

/// List annotations, optionally filtered by dataset.
#[utoipa::path(
    get,
    path = "/api/v1/annotations",
    tag = "Annotations",
    params(DatasetListQuery),
    responses(
        (status = 200, description = "Annotations"),
        (status = 401, description = "Missing or unknown token")
    )
)]
pub async fn list_annotations(
    State(state): State<AppState>,
    _user: RequireUser,
    query: Result<Query<DatasetListQuery>, QueryRejection>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let Query(query) = query?;
    let annotations = state
        .annotations
        .find(&query.filter(), &query.options())
        .await?;
    Ok(Json(annotations))
}

/// Get one annotation.
#[utoipa::path(
    get,
    path = "/api/v1/annotations/{id}",
    tag = "Annotations",
    params(("id" = Uuid, Path, description = "Annotation id")),
    responses(
        (status = 200, description = "The annotation"),
        (status = 404, description = "No such annotation")
    )
)]
pub async fn get_annotation(
    State(state): State<AppState>,
    _user: RequireUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>, ApiError> {
    Ok(Json(load(&state.annotations, id).await?))
}

/// Create an annotation (recorded).
#[utoipa::path(
    post,
    path = "/api/v1/annotations",
    tag = "Annotations",
    responses(
        (status = 201, description = "Stored annotation"),
        (status = 400, description = "Missing required fields")
    )
)]
pub async fn create_annotation(
    State(state): State<AppState>,
    user: RequireUser,
    Json(body): Json<JsonValue>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let document = document_from_body(body, REQUIRED_FIELDS)?;
    let annotations = state.annotations.clone();

    let stored = state
        .recorder
        .run(
            &recordable("Create an annotation"),
            user.user_id,
            document,
            |document, session| async move {
                session
                    .collection(annotations)
                    .insert_or_replace(&document)
                    .await
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(stored)))
}

/// Create several annotations in one recorded action.
///
/// The scope is taken from the first annotation; an empty list is a no-op.
#[utoipa::path(
    post,
    path = "/api/v1/annotations/multiple",
    tag = "Annotations",
    responses(
        (status = 201, description = "Stored annotations"),
        (status = 400, description = "Missing required fields")
    )
)]
pub async fn create_annotations(
    State(state): State<AppState>,
    user: RequireUser,
    Json(body): Json<Vec<JsonValue>>,
) -> Result<(StatusCode, Json<Vec<Document>>), ApiError> {
    let documents = body
        .into_iter()
        .map(|value| document_from_body(value, REQUIRED_FIELDS))
        .collect::<Result<Vec<_>, _>>()?;
    let annotations = state.annotations.clone();

    let recordable = Recordable::new("Create multiple annotations", |docs: &Vec<Document>| {
        docs.first().and_then(dataset_of)
    });
    let stored = state
        .recorder
        .run(&recordable, user.user_id, documents, |documents, session| async move {
            session
                .collection(annotations)
                .bulk_insert_or_replace(&documents)
                .await
        })
        .await?;

    Ok((StatusCode::CREATED, Json(stored)))
}

/// Patch an annotation (recorded). `null` values remove fields.
///
/// An empty patch returns the annotation unchanged and records nothing.
#[utoipa::path(
    put,
    path = "/api/v1/annotations/{id}",
    tag = "Annotations",
    params(("id" = Uuid, Path, description = "Annotation id")),
    responses(
        (status = 200, description = "Updated annotation"),
        (status = 400, description = "Invalid patch"),
        (status = 404, description = "No such annotation")
    )
)]
pub async fn update_annotation(
    State(state): State<AppState>,
    user: RequireUser,
    Path(id): Path<Uuid>,
    Json(body): Json<JsonValue>,
) -> Result<Json<Document>, ApiError> {
    let patch = patch_from_body(body, REQUIRED_FIELDS)?;
    let existing = load(&state.annotations, id).await?;
    if patch.is_empty() {
        return Ok(Json(existing));
    }
    let annotations = state.annotations.clone();

    let updated = state
        .recorder
        .run(
            &recordable("Update an annotation"),
            user.user_id,
            existing,
            |existing, session| async move {
                let annotations = session.collection(annotations);
                annotations
                    .update_by_query(&DocumentQuery::id(existing.id), &patch)
                    .await?;
                annotations.find_by_id(existing.id).await
            },
        )
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Annotation {id} not found")))?;

    Ok(Json(updated))
}

/// Delete an annotation and its connections (recorded).
#[utoipa::path(
    delete,
    path = "/api/v1/annotations/{id}",
    tag = "Annotations",
    params(("id" = Uuid, Path, description = "Annotation id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such annotation")
    )
)]
pub async fn delete_annotation(
    State(state): State<AppState>,
    user: RequireUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let existing = load(&state.annotations, id).await?;
    let ctx = state.clone();

    state
        .recorder
        .run(
            &recordable("Delete an annotation"),
            user.user_id,
            existing,
            |existing, session| async move {
                delete_with_connections(&ctx, &session, vec![existing.id]).await
            },
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Delete several annotations and their connections in one recorded action.
#[utoipa::path(
    delete,
    path = "/api/v1/annotations/multiple",
    tag = "Annotations",
    request_body = DeleteAnnotationsRequest,
    responses((status = 200, description = "Number of annotations deleted"))
)]
pub async fn delete_annotations(
    State(state): State<AppState>,
    user: RequireUser,
    Json(req): Json<DeleteAnnotationsRequest>,
) -> Result<Json<JsonValue>, ApiError> {
    let existing = state
        .annotations
        .find(&DocumentQuery::Ids(req.ids), &FindOptions::default())
        .await?;
    let ctx = state.clone();

    let recordable = Recordable::new("Delete multiple annotations", |docs: &Vec<Document>| {
        docs.first().and_then(dataset_of)
    });
    let deleted = state
        .recorder
        .run(&recordable, user.user_id, existing, |existing, session| async move {
            let ids = existing.iter().map(|d| d.id).collect();
            delete_with_connections(&ctx, &session, ids).await
        })
        .await?;

    Ok(Json(serde_json::json!({ "deleted": deleted })))
}
