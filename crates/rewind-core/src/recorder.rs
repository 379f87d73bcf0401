//! Change recording for reversible actions.
//!
//! A [`RecordingSession`] belongs to exactly one action. Writes made through
//! a [`RecordedCollection`] obtained from the session capture full-document
//! before/after snapshots into the session's [`ChangeRecord`]; writes made
//! any other way are invisible to it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, trace};
use uuid::Uuid;

use crate::defaults::MAX_BULK_DOCUMENTS;
use crate::error::{Error, Result};
use crate::models::{
    change_count, ChangePair, ChangeSet, Document, DocumentPatch, DocumentQuery, FindOptions,
};
use crate::traits::DocumentCollection;

/// Accumulator of coalesced document changes.
#[derive(Debug, Default)]
pub struct ChangeRecord {
    changes: ChangeSet,
}

impl ChangeRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one mutation of `document_id` in `collection`.
    ///
    /// The first mutation of a document fixes its `before`; later ones only
    /// move `after` forward.
    pub fn change_document(
        &mut self,
        collection: &str,
        document_id: Uuid,
        before: Option<Document>,
        after: Option<Document>,
    ) {
        let documents = self.changes.entry(collection.to_string()).or_default();
        match documents.get_mut(&document_id) {
            Some(pair) => pair.after = after,
            None => {
                documents.insert(document_id, ChangePair { before, after });
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.values().all(BTreeMap::is_empty)
    }

    /// Drain into a change set, dropping documents created and deleted
    /// within the same session and collections left empty.
    pub fn into_change_set(self) -> ChangeSet {
        self.changes
            .into_iter()
            .filter_map(|(collection, documents)| {
                let kept: BTreeMap<Uuid, ChangePair> = documents
                    .into_iter()
                    .filter(|(_, pair)| !pair.is_cancelled())
                    .collect();
                (!kept.is_empty()).then_some((collection, kept))
            })
            .collect()
    }
}

#[derive(Debug)]
struct SessionInner {
    collections: HashSet<String>,
    record: Mutex<ChangeRecord>,
    closed: AtomicBool,
}

/// Recording window of a single action.
///
/// Cloning yields another handle to the same window, so the operation can
/// pass it to helpers.
#[derive(Debug, Clone, Default)]
pub struct RecordingSession {
    inner: Option<Arc<SessionInner>>,
}

impl RecordingSession {
    /// Open a window recording writes to the named collections.
    pub fn begin<I, S>(collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let collections: HashSet<String> = collections.into_iter().map(Into::into).collect();
        debug!(
            subsystem = "history",
            component = "recorder",
            op = "begin",
            collection_count = collections.len(),
            "Recording session opened"
        );
        Self {
            inner: Some(Arc::new(SessionInner {
                collections,
                record: Mutex::new(ChangeRecord::new()),
                closed: AtomicBool::new(false),
            })),
        }
    }

    /// A session that records nothing.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Whether the window is open.
    pub fn is_recording(&self) -> bool {
        self.inner
            .as_ref()
            .map(|inner| !inner.closed.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Whether writes to `collection` are captured right now.
    pub fn records(&self, collection: &str) -> bool {
        self.is_recording()
            && self
                .inner
                .as_ref()
                .map(|inner| inner.collections.contains(collection))
                .unwrap_or(false)
    }

    /// Wrap a collection so writes through it are recorded by this session.
    pub fn collection(&self, collection: Arc<dyn DocumentCollection>) -> RecordedCollection {
        RecordedCollection {
            inner: collection,
            session: self.clone(),
        }
    }

    /// Close the window and return the coalesced changes.
    ///
    /// A disabled or already finished session returns an empty set.
    pub fn finish(&self) -> ChangeSet {
        let Some(inner) = self.inner.as_ref() else {
            return ChangeSet::new();
        };
        if inner.closed.swap(true, Ordering::AcqRel) {
            return ChangeSet::new();
        }
        let record = std::mem::take(&mut *lock(&inner.record));
        let changes = record.into_change_set();
        debug!(
            subsystem = "history",
            component = "recorder",
            op = "finish",
            change_count = change_count(&changes),
            "Recording session closed"
        );
        changes
    }

    fn change_document(
        &self,
        collection: &str,
        document_id: Uuid,
        before: Option<Document>,
        after: Option<Document>,
    ) {
        if let Some(inner) = self.inner.as_ref() {
            trace!(
                collection,
                document_id = %document_id,
                had_before = before.is_some(),
                has_after = after.is_some(),
                "Captured document snapshot"
            );
            lock(&inner.record).change_document(collection, document_id, before, after);
        }
    }
}

fn lock(record: &Mutex<ChangeRecord>) -> MutexGuard<'_, ChangeRecord> {
    record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Instrumented view over a [`DocumentCollection`].
///
/// Writes capture snapshots while the owning session records this
/// collection's name and pass straight through otherwise.
#[derive(Clone)]
pub struct RecordedCollection {
    inner: Arc<dyn DocumentCollection>,
    session: RecordingSession,
}

impl RecordedCollection {
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    fn recording(&self) -> bool {
        self.session.records(self.inner.name())
    }

    /// Unrecorded read.
    pub async fn find(&self, query: &DocumentQuery, options: &FindOptions) -> Result<Vec<Document>> {
        self.inner.find(query, options).await
    }

    /// Unrecorded read.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Document>> {
        self.inner.find_by_id(id).await
    }

    /// Insert or fully replace one document.
    pub async fn insert_or_replace(&self, document: &Document) -> Result<Document> {
        if !self.recording() {
            return self.inner.insert_or_replace(document).await;
        }
        let before = self.inner.find_by_id(document.id).await?;
        let stored = self.inner.insert_or_replace(document).await?;
        self.session
            .change_document(self.name(), stored.id, before, Some(stored.clone()));
        Ok(stored)
    }

    /// Delete one document. Returns whether it existed.
    pub async fn delete_by_id(&self, id: Uuid) -> Result<bool> {
        if !self.recording() {
            return self.inner.delete_by_id(id).await;
        }
        let before = self.inner.find_by_id(id).await?;
        let deleted = self.inner.delete_by_id(id).await?;
        if let Some(before) = before {
            self.session.change_document(self.name(), id, Some(before), None);
        }
        Ok(deleted)
    }

    /// Delete every matching document.
    ///
    /// While recording, the query is resolved first and exactly the
    /// resolved documents are deleted.
    pub async fn delete_by_query(&self, query: &DocumentQuery) -> Result<u64> {
        if !self.recording() {
            return self.inner.delete_by_query(query).await;
        }
        let matched = self.inner.find(query, &FindOptions::default()).await?;
        if matched.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = matched.iter().map(|d| d.id).collect();
        let deleted = self.inner.delete_by_query(&DocumentQuery::Ids(ids)).await?;
        for before in matched {
            self.session
                .change_document(self.name(), before.id, Some(before), None);
        }
        Ok(deleted)
    }

    /// Patch every matching document.
    ///
    /// The after-state is read back by the ids matched before the patch.
    pub async fn update_by_query(&self, query: &DocumentQuery, patch: &DocumentPatch) -> Result<u64> {
        patch.validate()?;
        if !self.recording() {
            return self.inner.update_by_query(query, patch).await;
        }
        let matched = self.inner.find(query, &FindOptions::default()).await?;
        if matched.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = matched.iter().map(|d| d.id).collect();
        let by_ids = DocumentQuery::Ids(ids);
        let updated = self.inner.update_by_query(&by_ids, patch).await?;
        let mut afters: HashMap<Uuid, Document> = self
            .inner
            .find(&by_ids, &FindOptions::default())
            .await?
            .into_iter()
            .map(|d| (d.id, d))
            .collect();
        for before in matched {
            let id = before.id;
            let after = afters.remove(&id);
            self.session.change_document(self.name(), id, Some(before), after);
        }
        Ok(updated)
    }

    /// Insert or replace a batch of documents.
    ///
    /// Documents already stored under the same ids are recorded as deleted
    /// first, so coalescing turns a replaced id into `{before: old, after: new}`.
    pub async fn bulk_insert_or_replace(&self, documents: &[Document]) -> Result<Vec<Document>> {
        if documents.len() > MAX_BULK_DOCUMENTS {
            return Err(Error::InvalidInput(format!(
                "bulk write of {} documents exceeds the limit of {MAX_BULK_DOCUMENTS}",
                documents.len()
            )));
        }
        if !self.recording() {
            return self.inner.insert_many(documents).await;
        }
        let ids: Vec<Uuid> = documents.iter().map(|d| d.id).collect();
        let existing = self
            .inner
            .find(&DocumentQuery::Ids(ids), &FindOptions::default())
            .await?;
        for old in existing {
            self.session.change_document(self.name(), old.id, Some(old), None);
        }
        let stored = self.inner.insert_many(documents).await?;
        for new in &stored {
            self.session
                .change_document(self.name(), new.id, None, Some(new.clone()));
        }
        Ok(stored)
    }
}
