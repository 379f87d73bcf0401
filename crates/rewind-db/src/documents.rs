//! Document collection implementation over the shared `document` table.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use rewind_core::{
    Document, DocumentCollection, DocumentPatch, DocumentQuery, Error, FindOptions, Result,
};

use crate::filter::{bind_params, order_and_page, DocumentFilterQueryBuilder, QueryParam};

/// PostgreSQL implementation of DocumentCollection.
///
/// Every collection shares one table, partitioned by `collection_name`.
#[derive(Clone)]
pub struct PgDocumentCollection {
    pool: Pool<Postgres>,
    name: String,
}

impl PgDocumentCollection {
    pub fn new(pool: Pool<Postgres>, name: impl Into<String>) -> Self {
        Self {
            pool,
            name: name.into(),
        }
    }
}

fn body_of(document: &Document) -> JsonValue {
    JsonValue::Object(document.fields.clone())
}

fn document_from_row(row: &PgRow) -> Result<Document> {
    let id: Uuid = row.get("id");
    match row.get::<JsonValue, _>("body") {
        JsonValue::Object(fields) => Ok(Document::new(id, fields)),
        other => Err(Error::Serialization(format!(
            "document {id} has a non-object body: {other}"
        ))),
    }
}

/// `WHERE collection_name = $1 AND (<filter>)` with the filter's parameters.
fn scoped_filter(query: &DocumentQuery) -> (String, Vec<QueryParam>) {
    let (filter, params) = DocumentFilterQueryBuilder::new(query, 1).build();
    (format!("WHERE collection_name = $1 AND ({filter})"), params)
}

#[async_trait]
impl DocumentCollection for PgDocumentCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, query: &DocumentQuery, options: &FindOptions) -> Result<Vec<Document>> {
        let (where_clause, mut params) = scoped_filter(query);
        let (tail, page_params) = order_and_page(options, params.len() + 1);
        params.extend(page_params);
        let sql = format!("SELECT id, body FROM document {where_clause}{tail}");

        let q = bind_params!(sqlx::query(&sql).bind(&self.name), params);
        let rows = q.fetch_all(&self.pool).await.map_err(Error::Database)?;
        rows.iter().map(document_from_row).collect()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT id, body FROM document WHERE collection_name = $1 AND id = $2")
            .bind(&self.name)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn insert_or_replace(&self, document: &Document) -> Result<Document> {
        let row = sqlx::query(
            r#"
            INSERT INTO document (collection_name, id, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection_name, id) DO UPDATE SET body = EXCLUDED.body
            RETURNING id, body
            "#,
        )
        .bind(&self.name)
        .bind(document.id)
        .bind(body_of(document))
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        document_from_row(&row)
    }

    async fn insert_many(&self, documents: &[Document]) -> Result<Vec<Document>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let mut stored = Vec::with_capacity(documents.len());
        for document in documents {
            let row = sqlx::query(
                r#"
                INSERT INTO document (collection_name, id, body)
                VALUES ($1, $2, $3)
                ON CONFLICT (collection_name, id) DO UPDATE SET body = EXCLUDED.body
                RETURNING id, body
                "#,
            )
            .bind(&self.name)
            .bind(document.id)
            .bind(body_of(document))
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::Database)?;
            stored.push(document_from_row(&row)?);
        }
        tx.commit().await.map_err(Error::Database)?;
        Ok(stored)
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM document WHERE collection_name = $1 AND id = $2")
            .bind(&self.name)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_query(&self, query: &DocumentQuery) -> Result<u64> {
        let (where_clause, params) = scoped_filter(query);
        let sql = format!("DELETE FROM document {where_clause}");
        let q = bind_params!(sqlx::query(&sql).bind(&self.name), params);
        let result = q.execute(&self.pool).await.map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn update_by_query(&self, query: &DocumentQuery, patch: &DocumentPatch) -> Result<u64> {
        patch.validate()?;
        let (where_clause, mut params) = scoped_filter(query);
        let set_idx = params.len() + 2;
        let unset_idx = params.len() + 3;
        params.push(QueryParam::Json(JsonValue::Object(patch.set.clone())));
        params.push(QueryParam::StringArray(patch.unset.clone()));

        let sql = format!(
            "UPDATE document SET body = (body || ${set_idx}::jsonb) - ${unset_idx}::text[] {where_clause}"
        );
        let q = bind_params!(sqlx::query(&sql).bind(&self.name), params);
        let result = q.execute(&self.pool).await.map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}

/// Snapshot encoding used by the ledger: the flat document with its id.
pub(crate) fn snapshot_to_json(document: Option<&Document>) -> Option<JsonValue> {
    document.map(Document::to_json)
}

/// Inverse of [`snapshot_to_json`].
pub(crate) fn snapshot_from_json(value: Option<JsonValue>) -> Result<Option<Document>> {
    value.map(Document::from_json).transpose()
}
