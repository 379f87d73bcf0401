//! Recordable actions: run a multi-document operation and record it as one
//! history entry.

use std::borrow::Cow;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::history::HistoryLog;
use crate::models::HistoryEntry;
use crate::recorder::RecordingSession;
use crate::registry::CollectionRegistry;

type ScopeResolver<I> = Box<dyn Fn(&I) -> Option<Uuid> + Send + Sync>;

/// An action name plus the rule that finds the scope an input belongs to.
pub struct Recordable<I> {
    action_name: Cow<'static, str>,
    find_scope: ScopeResolver<I>,
}

impl<I> Recordable<I> {
    pub fn new<F>(action_name: impl Into<Cow<'static, str>>, find_scope: F) -> Self
    where
        F: Fn(&I) -> Option<Uuid> + Send + Sync + 'static,
    {
        Self {
            action_name: action_name.into(),
            find_scope: Box::new(find_scope),
        }
    }

    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    /// Scope of the input, if any.
    pub fn scope_of(&self, input: &I) -> Option<Uuid> {
        (self.find_scope)(input)
    }
}

impl<I> std::fmt::Debug for Recordable<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recordable")
            .field("action_name", &self.action_name)
            .finish_non_exhaustive()
    }
}

static LAST_ACTION_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Strictly increasing action timestamp (microsecond resolution) for this
/// process.
pub fn next_action_date() -> DateTime<Utc> {
    let now = Utc::now().timestamp_micros();
    let previous = LAST_ACTION_MICROS
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            Some(now.max(last.saturating_add(1)))
        })
        .unwrap_or(now);
    let assigned = now.max(previous.saturating_add(1));
    DateTime::from_timestamp_micros(assigned).unwrap_or_else(Utc::now)
}

/// Runs recordable actions and writes their history.
#[derive(Clone)]
pub struct ActionRecorder {
    registry: Arc<CollectionRegistry>,
    log: HistoryLog,
}

impl ActionRecorder {
    pub fn new(registry: Arc<CollectionRegistry>, log: HistoryLog) -> Self {
        Self { registry, log }
    }

    pub fn registry(&self) -> &Arc<CollectionRegistry> {
        &self.registry
    }

    pub fn log(&self) -> &HistoryLog {
        &self.log
    }

    /// Run `operation` as a recorded action on behalf of `user_id`.
    ///
    /// When no scope resolves the operation runs unrecorded. An error from
    /// the operation is returned unchanged and nothing is written to history.
    /// An operation that changes nothing leaves no entry.
    pub async fn run<I, T, F, Fut>(
        &self,
        recordable: &Recordable<I>,
        user_id: Uuid,
        input: I,
        operation: F,
    ) -> Result<T>
    where
        F: FnOnce(I, RecordingSession) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let action_date = next_action_date();

        let Some(scope_id) = recordable.scope_of(&input) else {
            debug!(
                subsystem = "history",
                component = "action",
                op = "run",
                action_name = %recordable.action_name(),
                "No scope resolved, running unrecorded"
            );
            return operation(input, RecordingSession::disabled()).await;
        };

        let session = RecordingSession::begin(self.registry.names());
        let value = operation(input, session.clone()).await?;
        let changes = session.finish();

        if changes.is_empty() {
            debug!(
                subsystem = "history",
                component = "action",
                op = "run",
                action_name = %recordable.action_name(),
                scope_id = %scope_id,
                "Action changed nothing, no history written"
            );
            return Ok(value);
        }

        let entry = HistoryEntry::new(
            recordable.action_name().to_string(),
            action_date,
            user_id,
            scope_id,
        );
        self.log.create(entry, &changes).await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_dates_strictly_increase() {
        let mut last = next_action_date();
        for _ in 0..1000 {
            let next = next_action_date();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn test_recordable_resolves_scope() {
        let scope = Uuid::now_v7();
        let recordable: Recordable<Option<Uuid>> = Recordable::new("Create an annotation", |i: &Option<Uuid>| *i);
        assert_eq!(recordable.action_name(), "Create an annotation");
        assert_eq!(recordable.scope_of(&Some(scope)), Some(scope));
        assert_eq!(recordable.scope_of(&None), None);
    }
}
