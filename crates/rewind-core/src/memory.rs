//! In-memory backends for the document store and the history log.
//!
//! Used by the `memory` store backend and by tests. State lives behind
//! synchronous locks that are never held across an await point.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::*;
use crate::traits::{ChangeLedgerRepository, DocumentCollection, HistoryRepository};

// =============================================================================
// DOCUMENT COLLECTION
// =============================================================================

/// A named collection held in a `BTreeMap` keyed by document id.
#[derive(Debug)]
pub struct MemoryCollection {
    name: String,
    documents: RwLock<BTreeMap<Uuid, Document>>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(BTreeMap::new()),
        }
    }

    /// Every stored document in id order.
    pub fn snapshot(&self) -> Vec<Document> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<Uuid, Document>> {
        self.documents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<Uuid, Document>> {
        self.documents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn json_rank(value: &JsonValue) -> u8 {
    match value {
        JsonValue::Null => 0,
        JsonValue::Bool(_) => 1,
        JsonValue::Number(_) => 2,
        JsonValue::String(_) => 3,
        JsonValue::Array(_) => 4,
        JsonValue::Object(_) => 5,
    }
}

/// Total order over JSON values: by type, then by value within a type.
fn compare_json(a: &JsonValue, b: &JsonValue) -> Ordering {
    match (a, b) {
        (JsonValue::Bool(x), JsonValue::Bool(y)) => x.cmp(y),
        (JsonValue::Number(x), JsonValue::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (JsonValue::String(x), JsonValue::String(y)) => x.cmp(y),
        (JsonValue::Array(x), JsonValue::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(a, b)| compare_json(a, b))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (JsonValue::Object(x), JsonValue::Object(y)) => x.len().cmp(&y.len()),
        _ => json_rank(a).cmp(&json_rank(b)),
    }
}

fn compare_field(a: &Document, b: &Document, field: &str) -> Ordering {
    match (a.get(field), b.get(field)) {
        (Some(x), Some(y)) => compare_json(x, y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, query: &DocumentQuery, options: &FindOptions) -> Result<Vec<Document>> {
        let mut found: Vec<Document> = self
            .read()
            .values()
            .filter(|d| query.matches(d))
            .cloned()
            .collect();

        if let Some(sort) = &options.sort {
            found.sort_by(|a, b| {
                let ordering = compare_field(a, b, &sort.field).then_with(|| a.id.cmp(&b.id));
                match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        let offset = options.offset.unwrap_or(0).max(0) as usize;
        let limit = options
            .limit
            .map(|l| l.max(0) as usize)
            .unwrap_or(usize::MAX);
        Ok(found.into_iter().skip(offset).take(limit).collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.read().get(&id).cloned())
    }

    async fn insert_or_replace(&self, document: &Document) -> Result<Document> {
        self.write().insert(document.id, document.clone());
        Ok(document.clone())
    }

    async fn insert_many(&self, documents: &[Document]) -> Result<Vec<Document>> {
        let mut stored = self.write();
        for document in documents {
            stored.insert(document.id, document.clone());
        }
        Ok(documents.to_vec())
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool> {
        Ok(self.write().remove(&id).is_some())
    }

    async fn delete_by_query(&self, query: &DocumentQuery) -> Result<u64> {
        let mut stored = self.write();
        let before = stored.len();
        stored.retain(|_, d| !query.matches(d));
        Ok((before - stored.len()) as u64)
    }

    async fn update_by_query(&self, query: &DocumentQuery, patch: &DocumentPatch) -> Result<u64> {
        patch.validate()?;
        let mut stored = self.write();
        let mut updated = 0;
        for document in stored.values_mut().filter(|d| query.matches(d)) {
            patch.apply(document);
            updated += 1;
        }
        Ok(updated)
    }
}

// =============================================================================
// HISTORY STORE
// =============================================================================

#[derive(Debug, Default)]
struct HistoryState {
    entries: HashMap<Uuid, HistoryEntry>,
    changes: Vec<DocumentChange>,
}

/// History log and change ledger held in memory.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    state: Mutex<HistoryState>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total ledger rows across all entries.
    pub fn change_row_count(&self) -> usize {
        self.lock().changes.len()
    }

    /// Total entries across all users and scopes.
    pub fn entry_count(&self) -> usize {
        self.lock().entries.len()
    }

    fn lock(&self) -> MutexGuard<'_, HistoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl HistoryRepository for MemoryHistoryStore {
    async fn insert(&self, entry: &HistoryEntry, changes: &[DocumentChange]) -> Result<()> {
        let mut seen = HashSet::new();
        for change in changes {
            if change.history_id != entry.id {
                return Err(Error::InvalidInput(format!(
                    "document change {} belongs to history {}, not {}",
                    change.id, change.history_id, entry.id
                )));
            }
            if !seen.insert((change.collection_name.as_str(), change.document_id)) {
                return Err(Error::InvalidInput(format!(
                    "duplicate document change for {}/{}",
                    change.collection_name, change.document_id
                )));
            }
        }

        let mut state = self.lock();
        if state.entries.contains_key(&entry.id) {
            return Err(Error::InvalidInput(format!(
                "history entry {} already exists",
                entry.id
            )));
        }
        state.entries.insert(entry.id, entry.clone());
        state.changes.extend_from_slice(changes);
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<HistoryEntry>> {
        Ok(self.lock().entries.get(&id).cloned())
    }

    async fn list(&self, user_id: Uuid, scope_id: Uuid) -> Result<Vec<HistoryEntry>> {
        let mut entries: Vec<HistoryEntry> = self
            .lock()
            .entries
            .values()
            .filter(|e| e.user_id == user_id && e.scope_id == scope_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.action_date.cmp(&a.action_date));
        Ok(entries)
    }

    async fn next_for(
        &self,
        user_id: Uuid,
        scope_id: Uuid,
        direction: ReplayDirection,
    ) -> Result<Option<HistoryEntry>> {
        let state = self.lock();
        let candidates = state.entries.values().filter(|e| {
            e.user_id == user_id
                && e.scope_id == scope_id
                && e.is_undone == matches!(direction, ReplayDirection::Redo)
        });
        let next = match direction {
            ReplayDirection::Undo => candidates.max_by_key(|e| e.action_date),
            ReplayDirection::Redo => candidates.min_by_key(|e| e.action_date),
        };
        Ok(next.cloned())
    }

    async fn set_undone(&self, id: Uuid, is_undone: bool) -> Result<()> {
        match self.lock().entries.get_mut(&id) {
            Some(entry) => {
                entry.is_undone = is_undone;
                Ok(())
            }
            None => Err(Error::NotFound(format!("history entry {id}"))),
        }
    }

    async fn find_expired(
        &self,
        user_id: Uuid,
        scope_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        Ok(self
            .lock()
            .entries
            .values()
            .filter(|e| e.user_id == user_id && e.scope_id == scope_id)
            .filter(|e| e.action_date < cutoff || e.is_undone)
            .map(|e| e.id)
            .collect())
    }

    async fn find_overflow(&self, user_id: Uuid, keep: usize) -> Result<Vec<Uuid>> {
        let state = self.lock();
        let mut entries: Vec<&HistoryEntry> = state
            .entries
            .values()
            .filter(|e| e.user_id == user_id)
            .collect();
        entries.sort_by(|a, b| b.action_date.cmp(&a.action_date));
        Ok(entries.into_iter().skip(keep).map(|e| e.id).collect())
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let doomed: HashSet<Uuid> = ids.iter().copied().collect();
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|id, _| !doomed.contains(id));
        state.changes.retain(|c| !doomed.contains(&c.history_id));
        Ok((before - state.entries.len()) as u64)
    }
}

#[async_trait]
impl ChangeLedgerRepository for MemoryHistoryStore {
    async fn list_for_history(&self, history_id: Uuid) -> Result<Vec<DocumentChange>> {
        let mut changes: Vec<DocumentChange> = self
            .lock()
            .changes
            .iter()
            .filter(|c| c.history_id == history_id)
            .cloned()
            .collect();
        changes.sort_by(|a, b| {
            a.collection_name
                .cmp(&b.collection_name)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        Ok(changes)
    }

    async fn count_for_history(&self, history_id: Uuid) -> Result<i64> {
        Ok(self
            .lock()
            .changes
            .iter()
            .filter(|c| c.history_id == history_id)
            .count() as i64)
    }
}
