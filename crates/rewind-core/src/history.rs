//! History log with bounded retention.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::defaults::{HISTORY_MAX_AGE_SECS, HISTORY_MAX_ENTRIES_PER_USER};
use crate::error::{Error, Result};
use crate::models::{change_count, ChangeSet, DocumentChange, HistoryEntry, HistoryListing};
use crate::traits::HistoryRepository;

/// How long and how many history entries are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Entries older than this are evicted on the next create for the same
    /// user and scope.
    pub max_age: Duration,
    /// Maximum entries kept per user across all scopes, counting the new one.
    pub max_entries_per_user: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::seconds(HISTORY_MAX_AGE_SECS),
            max_entries_per_user: HISTORY_MAX_ENTRIES_PER_USER,
        }
    }
}

impl RetentionPolicy {
    pub fn new(max_age: Duration, max_entries_per_user: usize) -> Result<Self> {
        if max_age <= Duration::zero() {
            return Err(Error::Config("history max age must be positive".to_string()));
        }
        if Utc::now().checked_sub_signed(max_age).is_none() {
            return Err(Error::Config(format!(
                "history max age of {}s is out of range",
                max_age.num_seconds()
            )));
        }
        if max_entries_per_user == 0 {
            return Err(Error::Config(
                "history max entries per user must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            max_age,
            max_entries_per_user,
        })
    }
}

/// Creates and lists history entries, applying the retention policy on
/// every create.
#[derive(Clone)]
pub struct HistoryLog {
    entries: Arc<dyn HistoryRepository>,
    policy: RetentionPolicy,
}

impl HistoryLog {
    pub fn new(entries: Arc<dyn HistoryRepository>, policy: RetentionPolicy) -> Self {
        Self { entries, policy }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Persist a new entry and its ledger group.
    ///
    /// Evicts this user's expired (old or undone) entries in the entry's
    /// scope, then trims the user's history so that the new entry fits under
    /// the cap, then writes entry and ledger in one unit.
    pub async fn create(&self, entry: HistoryEntry, changes: &ChangeSet) -> Result<HistoryEntry> {
        let start = Instant::now();
        entry.validate()?;
        if changes.is_empty() {
            return Err(Error::InvalidInput(format!(
                "history entry '{}' has no document changes",
                entry.action_name
            )));
        }
        let rows = DocumentChange::from_change_set(entry.id, changes);
        for row in &rows {
            row.validate()?;
        }

        let evicted = self.evict(entry.user_id, entry.scope_id).await?;

        self.entries.insert(&entry, &rows).await?;

        info!(
            subsystem = "history",
            component = "history_log",
            op = "create",
            history_id = %entry.id,
            user_id = %entry.user_id,
            scope_id = %entry.scope_id,
            action_name = %entry.action_name,
            change_count = change_count(changes),
            evicted_count = evicted,
            duration_ms = start.elapsed().as_millis() as u64,
            "History entry recorded"
        );
        Ok(entry)
    }

    async fn evict(&self, user_id: Uuid, scope_id: Uuid) -> Result<u64> {
        let cutoff = Utc::now()
            .checked_sub_signed(self.policy.max_age)
            .ok_or_else(|| Error::Config("history max age is out of range".to_string()))?;
        let expired = self.entries.find_expired(user_id, scope_id, cutoff).await?;
        let expired_count = self.entries.delete(&expired).await?;

        let keep = self.policy.max_entries_per_user.saturating_sub(1);
        let overflow = self.entries.find_overflow(user_id, keep).await?;
        let overflow_count = self.entries.delete(&overflow).await?;

        debug!(
            subsystem = "history",
            component = "history_log",
            op = "evict",
            user_id = %user_id,
            scope_id = %scope_id,
            expired = expired_count,
            overflow = overflow_count,
            "Retention applied"
        );
        Ok(expired_count + overflow_count)
    }

    /// Entries of a user in a scope, newest first.
    pub async fn list(&self, user_id: Uuid, scope_id: Uuid) -> Result<Vec<HistoryListing>> {
        let listings: Vec<HistoryListing> = self
            .entries
            .list(user_id, scope_id)
            .await?
            .iter()
            .map(HistoryEntry::listing)
            .collect();
        debug!(
            subsystem = "history",
            component = "history_log",
            op = "list",
            user_id = %user_id,
            scope_id = %scope_id,
            result_count = listings.len(),
            "History listed"
        );
        Ok(listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHistoryStore;
    use crate::models::{ChangePair, Document};
    use serde_json::json;

    fn one_change() -> ChangeSet {
        let doc = Document::from_json(json!({"label": "a"})).unwrap();
        let mut changes = ChangeSet::new();
        changes.entry("annotation".to_string()).or_default().insert(
            doc.id,
            ChangePair {
                before: None,
                after: Some(doc),
            },
        );
        changes
    }

    fn log(store: &Arc<MemoryHistoryStore>, policy: RetentionPolicy) -> HistoryLog {
        HistoryLog::new(store.clone(), policy)
    }

    #[test]
    fn test_default_policy() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.max_age, Duration::hours(1));
        assert_eq!(policy.max_entries_per_user, 10);
    }

    #[test]
    fn test_policy_rejects_degenerate_values() {
        assert!(RetentionPolicy::new(Duration::zero(), 10).is_err());
        assert!(RetentionPolicy::new(Duration::hours(1), 0).is_err());
        assert!(matches!(
            RetentionPolicy::new(Duration::MAX, 10),
            Err(Error::Config(_))
        ));
        assert!(RetentionPolicy::new(Duration::minutes(5), 3).is_ok());
    }

    #[tokio::test]
    async fn test_create_rejects_empty_change_set() {
        let store = Arc::new(MemoryHistoryStore::new());
        let log = log(&store, RetentionPolicy::default());
        let entry = HistoryEntry::new("Noop", Utc::now(), Uuid::now_v7(), Uuid::now_v7());

        let err = log.create(entry, &ChangeSet::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_out_of_range_age_is_a_config_error() {
        let store = Arc::new(MemoryHistoryStore::new());
        let policy = RetentionPolicy {
            max_age: Duration::MAX,
            max_entries_per_user: 10,
        };
        let log = log(&store, policy);
        let (user, scope) = (Uuid::now_v7(), Uuid::now_v7());
        let entry = HistoryEntry::new("Create an annotation", Utc::now(), user, scope);

        let err = log.create(entry, &one_change()).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(log.list(user, scope).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_entry_evicts_nothing() {
        let store = Arc::new(MemoryHistoryStore::new());
        let log = log(&store, RetentionPolicy::default());
        let (user, scope) = (Uuid::now_v7(), Uuid::now_v7());

        let old = HistoryEntry::new("Old", Utc::now() - Duration::hours(2), user, scope);
        log.create(old, &one_change()).await.unwrap();

        let bad = HistoryEntry::new("", Utc::now(), user, scope);
        assert!(log.create(bad, &one_change()).await.is_err());
        assert_eq!(log.list(user, scope).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let store = Arc::new(MemoryHistoryStore::new());
        let log = log(&store, RetentionPolicy::default());
        let (user, scope) = (Uuid::now_v7(), Uuid::now_v7());
        let now = Utc::now();

        for (name, minutes) in [("first", 3), ("second", 2), ("third", 1)] {
            let entry = HistoryEntry::new(name, now - Duration::minutes(minutes), user, scope);
            log.create(entry, &one_change()).await.unwrap();
        }

        let names: Vec<String> = log
            .list(user, scope)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.action_name)
            .collect();
        assert_eq!(names, vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn test_cap_counts_new_entry() {
        let store = Arc::new(MemoryHistoryStore::new());
        let policy = RetentionPolicy::new(Duration::hours(1), 3).unwrap();
        let log = log(&store, policy);
        let (user, scope) = (Uuid::now_v7(), Uuid::now_v7());
        let now = Utc::now();

        for i in 0..5 {
            let entry = HistoryEntry::new(
                format!("action {i}"),
                now - Duration::minutes(10 - i),
                user,
                scope,
            );
            log.create(entry, &one_change()).await.unwrap();
        }

        let listed = log.list(user, scope).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].action_name, "action 4");
        assert_eq!(listed[2].action_name, "action 2");
    }

    #[tokio::test]
    async fn test_cap_is_per_user_across_scopes() {
        let store = Arc::new(MemoryHistoryStore::new());
        let policy = RetentionPolicy::new(Duration::hours(1), 2).unwrap();
        let log = log(&store, policy);
        let user = Uuid::now_v7();
        let (scope_a, scope_b) = (Uuid::now_v7(), Uuid::now_v7());
        let now = Utc::now();

        log.create(
            HistoryEntry::new("a1", now - Duration::minutes(3), user, scope_a),
            &one_change(),
        )
        .await
        .unwrap();
        log.create(
            HistoryEntry::new("b1", now - Duration::minutes(2), user, scope_b),
            &one_change(),
        )
        .await
        .unwrap();
        log.create(
            HistoryEntry::new("b2", now - Duration::minutes(1), user, scope_b),
            &one_change(),
        )
        .await
        .unwrap();

        assert!(log.list(user, scope_a).await.unwrap().is_empty());
        assert_eq!(log.list(user, scope_b).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_other_users_are_untouched() {
        let store = Arc::new(MemoryHistoryStore::new());
        let policy = RetentionPolicy::new(Duration::hours(1), 1).unwrap();
        let log = log(&store, policy);
        let scope = Uuid::now_v7();
        let (alice, bob) = (Uuid::now_v7(), Uuid::now_v7());

        log.create(HistoryEntry::new("alice", Utc::now(), alice, scope), &one_change())
            .await
            .unwrap();
        log.create(HistoryEntry::new("bob", Utc::now(), bob, scope), &one_change())
            .await
            .unwrap();

        assert_eq!(log.list(alice, scope).await.unwrap().len(), 1);
        assert_eq!(log.list(bob, scope).await.unwrap().len(), 1);
    }
}
