//! Integration tests for the PostgreSQL document store and history ledger.
//!
//! These need a migrated database; run with `cargo test -- --ignored`.

use std::sync::Arc;

use rewind_db::test_fixtures::{connect_test_database, unique_collection_name};
use rewind_db::{
    ActionRecorder, ChangeLedgerRepository, CollectionRegistry, Database, Document,
    DocumentCollection, DocumentPatch, DocumentQuery, FindOptions, HistoryLog, HistoryRepository,
    Recordable, RetentionPolicy, SortDirection, UndoRedoEngine,
};
use serde_json::json;
use uuid::Uuid;

fn doc(value: serde_json::Value) -> Document {
    Document::from_json(value).unwrap()
}

async fn connect() -> Database {
    dotenvy::dotenv().ok();
    connect_test_database().await.expect("Failed to connect")
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_document_crud_and_queries() {
    let db = connect().await;
    let coll = db.collection(unique_collection_name("annotation"));

    let a = coll
        .insert_or_replace(&doc(json!({"shape": "point", "rank": 2})))
        .await
        .unwrap();
    let b = coll
        .insert_or_replace(&doc(json!({"shape": "line", "rank": 1})))
        .await
        .unwrap();

    let found = coll.find_by_id(a.id).await.unwrap().unwrap();
    assert_eq!(found, a);

    let sorted = coll
        .find(
            &DocumentQuery::All,
            &FindOptions::new().sort_by("rank", SortDirection::Asc),
        )
        .await
        .unwrap();
    assert_eq!(sorted.iter().map(|d| d.id).collect::<Vec<_>>(), vec![b.id, a.id]);

    let points = coll
        .find(&DocumentQuery::is_in("shape", ["point", "polygon"]), &FindOptions::default())
        .await
        .unwrap();
    assert_eq!(points.len(), 1);

    let updated = coll
        .update_by_query(
            &DocumentQuery::eq("shape", "line"),
            &DocumentPatch::new().set("color", "red").unset("rank"),
        )
        .await
        .unwrap();
    assert_eq!(updated, 1);
    let b2 = coll.find_by_id(b.id).await.unwrap().unwrap();
    assert_eq!(b2.get("color"), Some(&json!("red")));
    assert!(b2.get("rank").is_none());

    assert_eq!(coll.delete_by_query(&DocumentQuery::All).await.unwrap(), 2);
    assert!(!coll.delete_by_id(a.id).await.unwrap());
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_insert_many_replaces_existing() {
    let db = connect().await;
    let coll = db.collection(unique_collection_name("annotation"));

    let original = coll.insert_or_replace(&doc(json!({"v": 1}))).await.unwrap();
    let mut replacement = original.clone();
    replacement.set("v", 2);

    let stored = coll
        .insert_many(&[replacement.clone(), doc(json!({"v": 3}))])
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(coll.find_by_id(original.id).await.unwrap(), Some(replacement));

    coll.delete_by_query(&DocumentQuery::All).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_recorded_action_round_trip() {
    let db = connect().await;
    let annotations = Arc::new(db.collection(unique_collection_name("annotation")));
    let registry = Arc::new(CollectionRegistry::new().with(annotations.clone()).unwrap());
    let history = Arc::new(db.history.clone());
    let recorder = ActionRecorder::new(
        registry.clone(),
        HistoryLog::new(history.clone(), RetentionPolicy::default()),
    );
    let engine = UndoRedoEngine::new(history.clone(), history.clone(), registry);

    let (user, scope) = (Uuid::now_v7(), Uuid::now_v7());
    let recordable = Recordable::new("Create an annotation", |s: &Uuid| Some(*s));
    let handle: Arc<dyn DocumentCollection> = annotations.clone();
    let created = recorder
        .run(&recordable, user, scope, |_, session| async move {
            session
                .collection(handle)
                .insert_or_replace(&Document::from_json(json!({"label": "x"}))?)
                .await
        })
        .await
        .unwrap();

    let entries = history.list(user, scope).await.unwrap();
    assert_eq!(entries.len(), 1);
    let rows = history.list_for_history(entries[0].id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].after.as_ref(), Some(&created));

    engine.undo(user, scope).await.unwrap().unwrap();
    assert!(annotations.find_by_id(created.id).await.unwrap().is_none());
    engine.redo(user, scope).await.unwrap().unwrap();
    assert_eq!(annotations.find_by_id(created.id).await.unwrap(), Some(created));

    assert_eq!(history.delete(&[entries[0].id]).await.unwrap(), 1);
    assert_eq!(history.count_for_history(entries[0].id).await.unwrap(), 0);
    annotations.delete_by_query(&DocumentQuery::All).await.unwrap();
}
