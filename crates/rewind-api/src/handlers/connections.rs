//! Connection endpoints.
//!
//! A connection links a parent annotation to a child annotation. Both must
//! exist when the connection is created or re-pointed.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rewind_core::{Document, DocumentCollection, DocumentQuery, FindOptions, Recordable};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::{dataset_of, document_from_body, page_options, patch_from_body, DATASET_FIELD};
use crate::{ApiError, AppState, RequireUser};

pub const PARENT_FIELD: &str = "parentId";
pub const CHILD_FIELD: &str = "childId";

/// Fields every connection must carry.
pub const REQUIRED_FIELDS: &[&str] = &[PARENT_FIELD, CHILD_FIELD, "datasetId", "tags"];

/// Connections whose parent or child is one of `annotation_ids`.
pub fn references_any(annotation_ids: &[Uuid]) -> DocumentQuery {
    let ids: Vec<String> = annotation_ids.iter().map(Uuid::to_string).collect();
    DocumentQuery::Or(vec![
        DocumentQuery::is_in(CHILD_FIELD, ids.clone()),
        DocumentQuery::is_in(PARENT_FIELD, ids),
    ])
}

/// Listing filters for connections. All given filters must match.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ConnectionListQuery {
    pub dataset_id: Option<Uuid>,
    /// Connections from this annotation.
    pub parent_id: Option<Uuid>,
    /// Connections to this annotation.
    pub child_id: Option<Uuid>,
    /// Connections from or to this annotation.
    pub node_annotation_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ConnectionListQuery {
    pub(crate) fn filter(&self) -> DocumentQuery {
        let mut parts = Vec::new();
        if let Some(id) = self.dataset_id {
            parts.push(DocumentQuery::eq(DATASET_FIELD, id.to_string()));
        }
        if let Some(id) = self.parent_id {
            parts.push(DocumentQuery::eq(PARENT_FIELD, id.to_string()));
        }
        if let Some(id) = self.child_id {
            parts.push(DocumentQuery::eq(CHILD_FIELD, id.to_string()));
        }
        if let Some(id) = self.node_annotation_id {
            parts.push(references_any(&[id]));
        }
        match parts.len() {
            0 => DocumentQuery::All,
            1 => parts.remove(0),
            _ => DocumentQuery::And(parts),
        }
    }

    pub(crate) fn options(&self) -> FindOptions {
        page_options(self.limit, self.offset)
    }
}

/// Body of `DELETE /api/v1/connections/multiple`.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DeleteConnectionsRequest {
    pub ids: Vec<Uuid>,
}

fn recordable(action_name: &'static str) -> Recordable<Document> {
    Recordable::new(action_name, dataset_of)
}

fn recordable_many(action_name: &'static str) -> Recordable<Vec<Document>> {
    Recordable::new(action_name, |docs: &Vec<Document>| {
        docs.first().and_then(dataset_of)
    })
}

async fn load(connections: &Arc<dyn DocumentCollection>, id: Uuid) -> Result<Document, ApiError> {
    connections
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Connection {id} not found")))
}

/// Check that every endpoint `document` names is an existing annotation.
async fn check_endpoints(state: &AppState, document: &Document) -> Result<(), ApiError> {
    for field in [PARENT_FIELD, CHILD_FIELD] {
        let Some(raw) = document.get(field) else {
            continue;
        };
        let id = raw
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| ApiError::BadRequest(format!("'{field}' must be a UUID string")))?;
        if state.annotations.find_by_id(id).await?.is_none() {
            return Err(ApiError::BadRequest(format!(
                "'{field}' references unknown annotation {id}"
            )));
        }
    }
    Ok(())
}

/// List connections by dataset, parent, child or either endpoint.
#[utoipa::path(
    get,
    path = "/api/v1/connections",
    tag = "Connections",
    params(ConnectionListQuery),
    responses(
        (status = 200, description = "Connections"),
        (status = 400, description = "Malformed filter"),
        (status = 401, description = "Missing or unknown token")
    )
)]
pub async fn list_connections(
    State(state): State<AppState>,
    _user: RequireUser,
    query: Result<Query<ConnectionListQuery>, QueryRejection>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let Query(query) = query?;
    let connections = state
        .connections
        .find(&query.filter(), &query.options())
        .await?;
    Ok(Json(connections))
}

#[utoipa::path(
    get,
    path = "/api/v1/connections/{id}",
    tag = "Connections",
    params(("id" = Uuid, Path, description = "Connection id")),
    responses(
        (status = 200, description = "The connection"),
        (status = 404, description = "No such connection")
    )
)]
pub async fn get_connection(
    State(state): State<AppState>,
    _user: RequireUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>, ApiError> {
    Ok(Json(load(&state.connections, id).await?))
}

/// Create a connection between two existing annotations (recorded).
#[utoipa::path(
    post,
    path = "/api/v1/connections",
    tag = "Connections",
    responses(
        (status = 201, description = "Stored connection"),
        (status = 400, description = "Missing fields or unknown parent/child")
    )
)]
pub async fn create_connection(
    State(state): State<AppState>,
    user: RequireUser,
    Json(body): Json<JsonValue>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let document = document_from_body(body, REQUIRED_FIELDS)?;
    check_endpoints(&state, &document).await?;

    let connections = state.connections.clone();
    let stored = state
        .recorder
        .run(
            &recordable("Create a connection"),
            user.user_id,
            document,
            |document, session| async move {
                session
                    .collection(connections)
                    .insert_or_replace(&document)
                    .await
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(stored)))
}

/// Create several connections in one recorded action, scoped by the first.
#[utoipa::path(
    post,
    path = "/api/v1/connections/multiple",
    tag = "Connections",
    responses(
        (status = 201, description = "Stored connections"),
        (status = 400, description = "Missing fields or unknown parent/child")
    )
)]
pub async fn create_connections(
    State(state): State<AppState>,
    user: RequireUser,
    Json(body): Json<Vec<JsonValue>>,
) -> Result<(StatusCode, Json<Vec<Document>>), ApiError> {
    let documents = body
        .into_iter()
        .map(|value| document_from_body(value, REQUIRED_FIELDS))
        .collect::<Result<Vec<_>, _>>()?;
    for document in &documents {
        check_endpoints(&state, document).await?;
    }

    let connections = state.connections.clone();
    let stored = state
        .recorder
        .run(
            &recordable_many("Create multiple connections"),
            user.user_id,
            documents,
            |documents, session| async move {
                session
                    .collection(connections)
                    .bulk_insert_or_replace(&documents)
                    .await
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(stored)))
}

/// Patch a connection (recorded). An empty patch records nothing.
#[utoipa::path(
    put,
    path = "/api/v1/connections/{id}",
    tag = "Connections",
    params(("id" = Uuid, Path, description = "Connection id")),
    responses(
        (status = 200, description = "Updated connection"),
        (status = 400, description = "Invalid patch"),
        (status = 404, description = "No such connection")
    )
)]
pub async fn update_connection(
    State(state): State<AppState>,
    user: RequireUser,
    Path(id): Path<Uuid>,
    Json(body): Json<JsonValue>,
) -> Result<Json<Document>, ApiError> {
    let patch = patch_from_body(body, REQUIRED_FIELDS)?;
    let existing = load(&state.connections, id).await?;
    if patch.is_empty() {
        return Ok(Json(existing));
    }

    let mut preview = existing.clone();
    patch.apply(&mut preview);
    check_endpoints(&state, &preview).await?;

    let connections = state.connections.clone();
    let updated = state
        .recorder
        .run(
            &recordable("Update a connection"),
            user.user_id,
            existing,
            |existing, session| async move {
                let connections = session.collection(connections);
                connections
                    .update_by_query(&DocumentQuery::id(existing.id), &patch)
                    .await?;
                connections.find_by_id(existing.id).await
            },
        )
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Connection {id} not found")))?;

    Ok(Json(updated))
}

/// Delete a connection (recorded).
#[utoipa::path(
    delete,
    path = "/api/v1/connections/{id}",
    tag = "Connections",
    params(("id" = Uuid, Path, description = "Connection id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such connection")
    )
)]
pub async fn delete_connection(
    State(state): State<AppState>,
    user: RequireUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let existing = load(&state.connections, id).await?;
    let connections = state.connections.clone();

    state
        .recorder
        .run(
            &recordable("Delete a connection"),
            user.user_id,
            existing,
            |existing, session| async move {
                session.collection(connections).delete_by_id(existing.id).await
            },
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Delete several connections in one recorded action.
#[utoipa::path(
    delete,
    path = "/api/v1/connections/multiple",
    tag = "Connections",
    request_body = DeleteConnectionsRequest,
    responses((status = 200, description = "Number of connections deleted"))
)]
pub async fn delete_connections(
    State(state): State<AppState>,
    user: RequireUser,
    Json(req): Json<DeleteConnectionsRequest>,
) -> Result<Json<JsonValue>, ApiError> {
    let existing = state
        .connections
        .find(&DocumentQuery::Ids(req.ids), &FindOptions::default())
        .await?;
    let connections = state.connections.clone();

    let deleted = state
        .recorder
        .run(
            &recordable_many("Delete multiple connections"),
            user.user_id,
            existing,
            |existing, session| async move {
                let ids = existing.iter().map(|d| d.id).collect();
                session
                    .collection(connections)
                    .delete_by_query(&DocumentQuery::Ids(ids))
                    .await
            },
        )
        .await?;

    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn link(parent: Uuid, child: Uuid, dataset: Uuid) -> Document {
        Document::from_json(json!({
            "parentId": parent.to_string(),
            "childId": child.to_string(),
            "datasetId": dataset.to_string(),
        }))
        .unwrap()
    }

    #[test]
    fn test_references_any_matches_parent_or_child() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let query = references_any(&[a]);

        let as_child = Document::from_json(json!({"childId": a.to_string(), "parentId": b.to_string()}))
            .unwrap();
        let as_parent = Document::from_json(json!({"childId": b.to_string(), "parentId": a.to_string()}))
            .unwrap();
        let unrelated = Document::from_json(json!({"childId": b.to_string(), "parentId": b.to_string()}))
            .unwrap();

        assert!(query.matches(&as_child));
        assert!(query.matches(&as_parent));
        assert!(!query.matches(&unrelated));
        assert!(!references_any(&[]).matches(&as_child));
    }

    #[test]
    fn test_list_filters_combine() {
        let (a, b, c, dataset) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let a_to_b = link(a, b, dataset);
        let b_to_c = link(b, c, dataset);
        let elsewhere = link(a, b, Uuid::now_v7());

        assert_eq!(ConnectionListQuery::default().filter(), DocumentQuery::All);

        let by_node = ConnectionListQuery {
            node_annotation_id: Some(b),
            dataset_id: Some(dataset),
            ..Default::default()
        }
        .filter();
        assert!(by_node.matches(&a_to_b));
        assert!(by_node.matches(&b_to_c));
        assert!(!by_node.matches(&elsewhere));

        let by_parent = ConnectionListQuery {
            parent_id: Some(b),
            ..Default::default()
        }
        .filter();
        assert!(by_parent.matches(&b_to_c));
        assert!(!by_parent.matches(&a_to_b));

        let by_child = ConnectionListQuery {
            child_id: Some(b),
            parent_id: Some(c),
            ..Default::default()
        }
        .filter();
        assert!(!by_child.matches(&a_to_b));
    }
}
