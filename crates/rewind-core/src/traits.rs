//! Core traits for rewind abstractions.
//!
//! The document store, the history log and the change ledger are all
//! reached through these traits so the engine runs the same way over
//! PostgreSQL and over the in-memory backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// DOCUMENT STORE TRAITS
// =============================================================================

/// One named collection of documents in the store.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    /// Stable collection name, stored in ledger rows.
    fn name(&self) -> &str;

    /// List matching documents.
    async fn find(&self, query: &DocumentQuery, options: &FindOptions) -> Result<Vec<Document>>;

    /// Fetch one document by id.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Document>>;

    /// Insert the document, or fully replace the stored one with the same id.
    async fn insert_or_replace(&self, document: &Document) -> Result<Document>;

    /// Insert (or replace) many documents.
    async fn insert_many(&self, documents: &[Document]) -> Result<Vec<Document>>;

    /// Delete one document. Returns whether it existed.
    async fn delete_by_id(&self, id: Uuid) -> Result<bool>;

    /// Delete all matching documents. Returns the number deleted.
    async fn delete_by_query(&self, query: &DocumentQuery) -> Result<u64>;

    /// Patch all matching documents. Returns the number updated.
    async fn update_by_query(&self, query: &DocumentQuery, patch: &DocumentPatch) -> Result<u64>;
}

/// The two primitives the undo/redo engine needs from a collection.
///
/// Both are idempotent and never recorded.
#[async_trait]
pub trait ReplayTarget: Send + Sync {
    /// Upsert the full document by id.
    async fn replace(&self, document: &Document) -> Result<()>;

    /// Delete the document by id. A missing document is not an error.
    async fn remove(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
impl<C> ReplayTarget for C
where
    C: DocumentCollection + ?Sized,
{
    async fn replace(&self, document: &Document) -> Result<()> {
        self.insert_or_replace(document).await.map(|_| ())
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        self.delete_by_id(id).await.map(|_| ())
    }
}

// =============================================================================
// HISTORY REPOSITORY TRAITS
// =============================================================================

/// Persistence for history entries.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Persist an entry together with its ledger rows, atomically.
    async fn insert(&self, entry: &HistoryEntry, changes: &[DocumentChange]) -> Result<()>;

    /// Fetch one entry by id.
    async fn fetch(&self, id: Uuid) -> Result<Option<HistoryEntry>>;

    /// All entries for a user in a scope, newest first.
    async fn list(&self, user_id: Uuid, scope_id: Uuid) -> Result<Vec<HistoryEntry>>;

    /// Next entry to replay for a user in a scope.
    ///
    /// Undo: newest entry with `is_undone = false`.
    /// Redo: oldest entry with `is_undone = true`.
    async fn next_for(
        &self,
        user_id: Uuid,
        scope_id: Uuid,
        direction: ReplayDirection,
    ) -> Result<Option<HistoryEntry>>;

    /// Flip the undone flag.
    async fn set_undone(&self, id: Uuid, is_undone: bool) -> Result<()>;

    /// Ids of entries for a user in a scope that are either older than
    /// `cutoff` or undone.
    async fn find_expired(
        &self,
        user_id: Uuid,
        scope_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Uuid>>;

    /// Ids of a user's entries past the newest `keep`, across all scopes.
    async fn find_overflow(&self, user_id: Uuid, keep: usize) -> Result<Vec<Uuid>>;

    /// Delete entries and their ledger rows. Returns the number of entries deleted.
    async fn delete(&self, ids: &[Uuid]) -> Result<u64>;
}

/// Read access to ledger rows.
#[async_trait]
pub trait ChangeLedgerRepository: Send + Sync {
    /// Ledger rows of one entry, ordered by collection name then document id.
    async fn list_for_history(&self, history_id: Uuid) -> Result<Vec<DocumentChange>>;

    /// Number of ledger rows of one entry.
    async fn count_for_history(&self, history_id: Uuid) -> Result<i64>;
}
