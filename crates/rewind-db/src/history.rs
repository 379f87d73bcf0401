//! History log and change ledger repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use rewind_core::{
    ChangeLedgerRepository, DocumentChange, Error, HistoryEntry, HistoryRepository,
    ReplayDirection, Result,
};

use crate::documents::{snapshot_from_json, snapshot_to_json};

const ENTRY_COLUMNS: &str = "id, action_name, action_date, user_id, scope_id, is_undone";

/// PostgreSQL implementation of HistoryRepository and ChangeLedgerRepository.
#[derive(Clone)]
pub struct PgHistoryRepository {
    pool: Pool<Postgres>,
}

impl PgHistoryRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn entry_from_row(row: &PgRow) -> HistoryEntry {
    HistoryEntry {
        id: row.get("id"),
        action_name: row.get("action_name"),
        action_date: row.get("action_date"),
        user_id: row.get("user_id"),
        scope_id: row.get("scope_id"),
        is_undone: row.get("is_undone"),
    }
}

fn change_from_row(row: &PgRow) -> Result<DocumentChange> {
    Ok(DocumentChange {
        id: row.get("id"),
        history_id: row.get("history_id"),
        collection_name: row.get("collection_name"),
        document_id: row.get("document_id"),
        before: snapshot_from_json(row.get::<Option<JsonValue>, _>("before"))?,
        after: snapshot_from_json(row.get::<Option<JsonValue>, _>("after"))?,
    })
}

#[async_trait]
impl HistoryRepository for PgHistoryRepository {
    async fn insert(&self, entry: &HistoryEntry, changes: &[DocumentChange]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            "INSERT INTO history_entry (id, action_name, action_date, user_id, scope_id, is_undone)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.id)
        .bind(&entry.action_name)
        .bind(entry.action_date)
        .bind(entry.user_id)
        .bind(entry.scope_id)
        .bind(entry.is_undone)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        for change in changes {
            sqlx::query(
                "INSERT INTO document_change
                     (id, history_id, collection_name, document_id, before, after)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(change.id)
            .bind(change.history_id)
            .bind(&change.collection_name)
            .bind(change.document_id)
            .bind(snapshot_to_json(change.before.as_ref()))
            .bind(snapshot_to_json(change.after.as_ref()))
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<HistoryEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM history_entry WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.as_ref().map(entry_from_row))
    }

    async fn list(&self, user_id: Uuid, scope_id: Uuid) -> Result<Vec<HistoryEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM history_entry
             WHERE user_id = $1 AND scope_id = $2
             ORDER BY action_date DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(scope_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(rows.iter().map(entry_from_row).collect())
    }

    async fn next_for(
        &self,
        user_id: Uuid,
        scope_id: Uuid,
        direction: ReplayDirection,
    ) -> Result<Option<HistoryEntry>> {
        let (is_undone, order) = match direction {
            ReplayDirection::Undo => (false, "DESC"),
            ReplayDirection::Redo => (true, "ASC"),
        };
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM history_entry
             WHERE user_id = $1 AND scope_id = $2 AND is_undone = $3
             ORDER BY action_date {order}
             LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(scope_id)
            .bind(is_undone)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.as_ref().map(entry_from_row))
    }

    async fn set_undone(&self, id: Uuid, is_undone: bool) -> Result<()> {
        let result = sqlx::query("UPDATE history_entry SET is_undone = $2 WHERE id = $1")
            .bind(id)
            .bind(is_undone)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("history entry {id}")));
        }
        Ok(())
    }

    async fn find_expired(
        &self,
        user_id: Uuid,
        scope_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT id FROM history_entry
             WHERE user_id = $1 AND scope_id = $2
               AND (action_date < $3 OR is_undone)",
        )
        .bind(user_id)
        .bind(scope_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    async fn find_overflow(&self, user_id: Uuid, keep: usize) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT id FROM history_entry
             WHERE user_id = $1
             ORDER BY action_date DESC
             OFFSET $2",
        )
        .bind(user_id)
        .bind(keep as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        // document_change rows go with their entry via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM history_entry WHERE id = ANY($1::uuid[])")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ChangeLedgerRepository for PgHistoryRepository {
    async fn list_for_history(&self, history_id: Uuid) -> Result<Vec<DocumentChange>> {
        let rows = sqlx::query(
            "SELECT id, history_id, collection_name, document_id, before, after
             FROM document_change
             WHERE history_id = $1
             ORDER BY collection_name ASC, document_id ASC",
        )
        .bind(history_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        rows.iter().map(change_from_row).collect()
    }

    async fn count_for_history(&self, history_id: Uuid) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM document_change WHERE history_id = $1")
            .bind(history_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.get("count"))
    }
}
