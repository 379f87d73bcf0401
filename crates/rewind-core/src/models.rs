//! Data models: stored documents, store queries, history entries and
//! ledger rows.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::defaults::{MAX_ACTION_NAME_LEN, MAX_COLLECTION_NAME_LEN};
use crate::error::{Error, Result};

// =============================================================================
// DOCUMENTS
// =============================================================================

/// Name of the identity field in a serialized document.
pub const ID_FIELD: &str = "id";

/// A stored record: a stable id plus arbitrary top-level JSON fields.
///
/// Serializes flat, e.g. `{"id": "...", "datasetId": "...", "tags": []}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    #[serde(flatten)]
    pub fields: Map<String, JsonValue>,
}

impl Document {
    /// Create a document with an explicit id. Any `id` key in `fields` is dropped.
    pub fn new(id: Uuid, mut fields: Map<String, JsonValue>) -> Self {
        fields.remove(ID_FIELD);
        Self { id, fields }
    }

    /// Create a document with a freshly generated UUIDv7 id.
    pub fn with_new_id(fields: Map<String, JsonValue>) -> Self {
        Self::new(Uuid::now_v7(), fields)
    }

    /// Build a document from a JSON object.
    ///
    /// A missing `id` gets a new UUIDv7; a present one must parse as a UUID.
    pub fn from_json(value: JsonValue) -> Result<Self> {
        let JsonValue::Object(mut fields) = value else {
            return Err(Error::InvalidInput(
                "document must be a JSON object".to_string(),
            ));
        };
        let id = match fields.remove(ID_FIELD) {
            None | Some(JsonValue::Null) => Uuid::now_v7(),
            Some(JsonValue::String(raw)) => Uuid::parse_str(&raw)
                .map_err(|e| Error::InvalidInput(format!("invalid document id '{raw}': {e}")))?,
            Some(other) => {
                return Err(Error::InvalidInput(format!(
                    "document id must be a string, got {other}"
                )))
            }
        };
        Ok(Self { id, fields })
    }

    /// Serialize to a flat JSON object.
    pub fn to_json(&self) -> JsonValue {
        let mut object = Map::with_capacity(self.fields.len() + 1);
        object.insert(ID_FIELD.to_string(), JsonValue::String(self.id.to_string()));
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.clone());
        }
        JsonValue::Object(object)
    }

    /// Read a top-level field.
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.fields.get(field)
    }

    /// Read a top-level field as a UUID (stored as a string).
    pub fn get_uuid(&self, field: &str) -> Option<Uuid> {
        self.get(field)
            .and_then(JsonValue::as_str)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }

    /// Set a top-level field. Setting `id` is ignored.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<JsonValue>) {
        let field = field.into();
        if field != ID_FIELD {
            self.fields.insert(field, value.into());
        }
    }
}

// =============================================================================
// STORE QUERIES
// =============================================================================

/// Filter over documents of one collection.
///
/// Field conditions compare top-level fields by JSON equality. Use
/// [`DocumentQuery::Ids`] to match on document identity.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentQuery {
    /// Every document.
    All,
    /// Documents whose id is in the list.
    Ids(Vec<Uuid>),
    /// `field == value`.
    Eq(String, JsonValue),
    /// `field` equals one of the values.
    In(String, Vec<JsonValue>),
    /// All sub-queries match (empty matches everything).
    And(Vec<DocumentQuery>),
    /// At least one sub-query matches (empty matches nothing).
    Or(Vec<DocumentQuery>),
}

impl DocumentQuery {
    /// Match a single document by id.
    pub fn id(id: Uuid) -> Self {
        Self::Ids(vec![id])
    }

    /// `field == value`.
    pub fn eq(field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    /// `field` in `values`.
    pub fn is_in<V: Into<JsonValue>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    /// Conjunction of `self` and `other`.
    pub fn and(self, other: DocumentQuery) -> Self {
        match self {
            Self::And(mut parts) => {
                parts.push(other);
                Self::And(parts)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Evaluate the filter against a document.
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Ids(ids) => ids.contains(&document.id),
            Self::Eq(field, value) => document.get(field) == Some(value),
            Self::In(field, values) => document
                .get(field)
                .map(|found| values.contains(found))
                .unwrap_or(false),
            Self::And(parts) => parts.iter().all(|q| q.matches(document)),
            Self::Or(parts) => parts.iter().any(|q| q.matches(document)),
        }
    }
}

/// Field-level patch applied by `update_by_query`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPatch {
    /// Fields to set (overwrite or add).
    pub set: Map<String, JsonValue>,
    /// Fields to remove.
    pub unset: Vec<String>,
}

impl DocumentPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    /// Remove a field.
    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.unset.push(field.into());
        self
    }

    /// Build a patch from a JSON object: `null` values unset, others set.
    pub fn from_json(value: JsonValue) -> Result<Self> {
        let JsonValue::Object(object) = value else {
            return Err(Error::InvalidInput("patch must be a JSON object".to_string()));
        };
        let mut patch = Self::new();
        for (field, value) in object {
            if value.is_null() {
                patch.unset.push(field);
            } else {
                patch.set.insert(field, value);
            }
        }
        patch.validate()?;
        Ok(patch)
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// The identity field cannot be patched.
    pub fn validate(&self) -> Result<()> {
        if self.set.contains_key(ID_FIELD) || self.unset.iter().any(|f| f == ID_FIELD) {
            return Err(Error::InvalidInput(
                "the 'id' field cannot be patched".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply the patch in place.
    pub fn apply(&self, document: &mut Document) {
        for (field, value) in &self.set {
            document.set(field.clone(), value.clone());
        }
        for field in &self.unset {
            document.fields.remove(field);
        }
    }
}

/// Sort direction for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Sort key for `find`.
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

/// Options for `find`. Without a sort key, results come back in id order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<SortSpec>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some(SortSpec {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }
}

// =============================================================================
// HISTORY
// =============================================================================

/// One recorded user action.
///
/// Immutable once written, except for `is_undone`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub action_name: String,
    pub action_date: DateTime<Utc>,
    pub user_id: Uuid,
    pub scope_id: Uuid,
    pub is_undone: bool,
}

impl HistoryEntry {
    /// A new, active entry.
    pub fn new(
        action_name: impl Into<String>,
        action_date: DateTime<Utc>,
        user_id: Uuid,
        scope_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            action_name: action_name.into(),
            action_date,
            user_id,
            scope_id,
            is_undone: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.action_name.trim().is_empty() {
            return Err(Error::InvalidInput(
                "history entry action name is empty".to_string(),
            ));
        }
        if self.action_name.len() > MAX_ACTION_NAME_LEN {
            return Err(Error::InvalidInput(format!(
                "history entry action name exceeds {MAX_ACTION_NAME_LEN} bytes"
            )));
        }
        Ok(())
    }

    /// The caller-facing projection.
    pub fn listing(&self) -> HistoryListing {
        HistoryListing {
            action_name: self.action_name.clone(),
            action_date: self.action_date,
            is_undone: self.is_undone,
        }
    }
}

/// What `list_history` returns: never the ledger payload, never the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryListing {
    pub action_name: String,
    pub action_date: DateTime<Utc>,
    pub is_undone: bool,
}

/// Which side of the ledger a replay applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayDirection {
    Undo,
    Redo,
}

impl ReplayDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Undo => "undo",
            Self::Redo => "redo",
        }
    }

    /// Value of `is_undone` after a replay in this direction.
    pub fn resulting_undone(self) -> bool {
        matches!(self, Self::Undo)
    }
}

/// Before/after snapshots of one document within one recording session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangePair {
    pub before: Option<Document>,
    pub after: Option<Document>,
}

impl ChangePair {
    /// Created and deleted inside the same session.
    pub fn is_cancelled(&self) -> bool {
        self.before.is_none() && self.after.is_none()
    }
}

/// Coalesced changes of one session: collection → document id → pair.
pub type ChangeSet = BTreeMap<String, BTreeMap<Uuid, ChangePair>>;

/// Total number of document pairs in a change set.
pub fn change_count(changes: &ChangeSet) -> usize {
    changes.values().map(BTreeMap::len).sum()
}

/// How a ledger row changed its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Deleted,
    Replaced,
}

/// One ledger row: the before/after state of a document for one history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChange {
    pub id: Uuid,
    pub history_id: Uuid,
    pub collection_name: String,
    pub document_id: Uuid,
    pub before: Option<Document>,
    pub after: Option<Document>,
}

impl DocumentChange {
    /// Flatten a change set into ledger rows owned by `history_id`.
    pub fn from_change_set(history_id: Uuid, changes: &ChangeSet) -> Vec<DocumentChange> {
        changes
            .iter()
            .flat_map(|(collection_name, documents)| {
                documents.iter().map(move |(document_id, pair)| DocumentChange {
                    id: Uuid::now_v7(),
                    history_id,
                    collection_name: collection_name.clone(),
                    document_id: *document_id,
                    before: pair.before.clone(),
                    after: pair.after.clone(),
                })
            })
            .collect()
    }

    pub fn kind(&self) -> ChangeKind {
        match (&self.before, &self.after) {
            (None, _) => ChangeKind::Created,
            (_, None) => ChangeKind::Deleted,
            _ => ChangeKind::Replaced,
        }
    }

    /// `before` when undoing, `after` when redoing.
    pub fn replacement(&self, direction: ReplayDirection) -> Option<&Document> {
        match direction {
            ReplayDirection::Undo => self.before.as_ref(),
            ReplayDirection::Redo => self.after.as_ref(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_collection_name(&self.collection_name)?;
        if self.before.is_none() && self.after.is_none() {
            return Err(Error::InvalidInput(format!(
                "document change for {} has neither before nor after",
                self.document_id
            )));
        }
        for snapshot in [&self.before, &self.after].into_iter().flatten() {
            if snapshot.id != self.document_id {
                return Err(Error::InvalidInput(format!(
                    "snapshot id {} does not match document id {}",
                    snapshot.id, self.document_id
                )));
            }
        }
        Ok(())
    }
}

/// Collection names are stored as data and used as registry keys.
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput("collection name is empty".to_string()));
    }
    if name.len() > MAX_COLLECTION_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "collection name exceeds {MAX_COLLECTION_NAME_LEN} bytes"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::InvalidInput(format!(
            "collection name '{name}' may only contain ASCII letters, digits, '_' and '-'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: JsonValue) -> Document {
        Document::from_json(value).unwrap()
    }

    #[test]
    fn test_document_round_trips_flat_json() {
        let id = Uuid::now_v7();
        let d = doc(json!({"id": id.to_string(), "label": "cell", "tags": ["a"]}));
        assert_eq!(d.id, id);
        assert_eq!(d.get("label"), Some(&json!("cell")));
        assert!(d.get("id").is_none());

        let serialized = serde_json::to_value(&d).unwrap();
        assert_eq!(serialized, json!({"id": id.to_string(), "label": "cell", "tags": ["a"]}));
        assert_eq!(d.to_json(), serialized);
    }

    #[test]
    fn test_document_without_id_gets_one() {
        let d = doc(json!({"label": "nucleus"}));
        assert!(!d.id.is_nil());
    }

    #[test]
    fn test_document_rejects_non_object_and_bad_id() {
        assert!(Document::from_json(json!([1, 2])).is_err());
        assert!(Document::from_json(json!({"id": "nope"})).is_err());
        assert!(Document::from_json(json!({"id": 7})).is_err());
    }

    #[test]
    fn test_document_set_ignores_id() {
        let mut d = doc(json!({}));
        let id = d.id;
        d.set("id", "other");
        d.set("label", "x");
        assert_eq!(d.id, id);
        assert!(d.get("id").is_none());
        assert_eq!(d.get("label"), Some(&json!("x")));
    }

    #[test]
    fn test_query_matching() {
        let d = doc(json!({"datasetId": "ds1", "shape": "point", "parentId": "p"}));

        assert!(DocumentQuery::All.matches(&d));
        assert!(DocumentQuery::id(d.id).matches(&d));
        assert!(!DocumentQuery::Ids(vec![]).matches(&d));
        assert!(DocumentQuery::eq("datasetId", "ds1").matches(&d));
        assert!(!DocumentQuery::eq("datasetId", "ds2").matches(&d));
        assert!(!DocumentQuery::eq("missing", "ds1").matches(&d));
        assert!(DocumentQuery::is_in("shape", ["line", "point"]).matches(&d));
        assert!(!DocumentQuery::is_in("shape", Vec::<String>::new()).matches(&d));
        assert!(DocumentQuery::eq("datasetId", "ds1")
            .and(DocumentQuery::eq("shape", "point"))
            .matches(&d));
        assert!(DocumentQuery::And(vec![]).matches(&d));
        assert!(!DocumentQuery::Or(vec![]).matches(&d));
        assert!(DocumentQuery::Or(vec![
            DocumentQuery::eq("childId", "p"),
            DocumentQuery::eq("parentId", "p"),
        ])
        .matches(&d));
    }

    #[test]
    fn test_patch_from_json_and_apply() {
        let mut d = doc(json!({"label": "a", "color": "red"}));
        let patch = DocumentPatch::from_json(json!({"label": "b", "color": null})).unwrap();
        patch.apply(&mut d);
        assert_eq!(d.get("label"), Some(&json!("b")));
        assert!(d.get("color").is_none());
    }

    #[test]
    fn test_patch_rejects_id() {
        assert!(DocumentPatch::from_json(json!({"id": "x"})).is_err());
        assert!(DocumentPatch::new().unset("id").validate().is_err());
        assert!(DocumentPatch::new().set("label", 1).validate().is_ok());
    }

    #[test]
    fn test_history_entry_validation() {
        let now = Utc::now();
        let ok = HistoryEntry::new("Create an annotation", now, Uuid::now_v7(), Uuid::now_v7());
        assert!(ok.validate().is_ok());
        assert!(!ok.is_undone);

        let blank = HistoryEntry::new("   ", now, Uuid::now_v7(), Uuid::now_v7());
        assert!(blank.validate().is_err());

        let long = HistoryEntry::new("x".repeat(MAX_ACTION_NAME_LEN + 1), now, Uuid::nil(), Uuid::nil());
        assert!(long.validate().is_err());
    }

    #[test]
    fn test_listing_serializes_camel_case() {
        let entry = HistoryEntry::new("Delete a connection", Utc::now(), Uuid::nil(), Uuid::nil());
        let value = serde_json::to_value(entry.listing()).unwrap();
        assert_eq!(value["actionName"], "Delete a connection");
        assert_eq!(value["isUndone"], false);
        assert!(value.get("actionDate").is_some());
        assert!(value.get("userId").is_none());
    }

    #[test]
    fn test_change_kind_and_replacement() {
        let d = doc(json!({"label": "a"}));
        let created = DocumentChange {
            id: Uuid::now_v7(),
            history_id: Uuid::now_v7(),
            collection_name: "annotation".to_string(),
            document_id: d.id,
            before: None,
            after: Some(d.clone()),
        };
        assert_eq!(created.kind(), ChangeKind::Created);
        assert!(created.replacement(ReplayDirection::Undo).is_none());
        assert_eq!(created.replacement(ReplayDirection::Redo), Some(&d));

        let deleted = DocumentChange {
            before: Some(d.clone()),
            after: None,
            ..created.clone()
        };
        assert_eq!(deleted.kind(), ChangeKind::Deleted);

        let replaced = DocumentChange {
            before: Some(d.clone()),
            after: Some(d.clone()),
            ..created
        };
        assert_eq!(replaced.kind(), ChangeKind::Replaced);
    }

    #[test]
    fn test_change_validation() {
        let d = doc(json!({}));
        let mut change = DocumentChange {
            id: Uuid::now_v7(),
            history_id: Uuid::now_v7(),
            collection_name: "annotation".to_string(),
            document_id: d.id,
            before: None,
            after: Some(d),
        };
        assert!(change.validate().is_ok());

        change.document_id = Uuid::now_v7();
        assert!(change.validate().is_err());

        change.after = None;
        assert!(change.validate().is_err());
    }

    #[test]
    fn test_from_change_set_flattens_all_pairs() {
        let a = doc(json!({}));
        let b = doc(json!({}));
        let mut changes = ChangeSet::new();
        changes.entry("annotation".to_string()).or_default().insert(
            a.id,
            ChangePair {
                before: None,
                after: Some(a.clone()),
            },
        );
        changes.entry("annotation_connection".to_string()).or_default().insert(
            b.id,
            ChangePair {
                before: Some(b.clone()),
                after: None,
            },
        );

        let history_id = Uuid::now_v7();
        let rows = DocumentChange::from_change_set(history_id, &changes);
        assert_eq!(rows.len(), 2);
        assert_eq!(change_count(&changes), 2);
        assert!(rows.iter().all(|r| r.history_id == history_id));
        assert!(rows.iter().all(|r| r.validate().is_ok()));
    }

    #[test]
    fn test_collection_name_rules() {
        assert!(validate_collection_name("annotation_connection").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("drop table").is_err());
        assert!(validate_collection_name(&"a".repeat(MAX_COLLECTION_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_replay_direction() {
        assert!(ReplayDirection::Undo.resulting_undone());
        assert!(!ReplayDirection::Redo.resulting_undone());
        assert_eq!(ReplayDirection::Redo.as_str(), "redo");
    }
}
