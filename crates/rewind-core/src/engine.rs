//! Undo/redo replay of recorded actions.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{HistoryListing, ReplayDirection};
use crate::registry::CollectionRegistry;
use crate::traits::{ChangeLedgerRepository, HistoryRepository, ReplayTarget};

/// Moves history entries between active and undone by replaying their
/// ledger groups into the live collections.
#[derive(Clone)]
pub struct UndoRedoEngine {
    history: Arc<dyn HistoryRepository>,
    ledger: Arc<dyn ChangeLedgerRepository>,
    registry: Arc<CollectionRegistry>,
}

impl UndoRedoEngine {
    pub fn new(
        history: Arc<dyn HistoryRepository>,
        ledger: Arc<dyn ChangeLedgerRepository>,
        registry: Arc<CollectionRegistry>,
    ) -> Self {
        Self {
            history,
            ledger,
            registry,
        }
    }

    /// Revert the most recent active action of the user in the scope.
    ///
    /// Returns the entry that became undone, or `None` when there was
    /// nothing to undo.
    pub async fn undo(&self, user_id: Uuid, scope_id: Uuid) -> Result<Option<HistoryListing>> {
        self.replay(user_id, scope_id, ReplayDirection::Undo).await
    }

    /// Re-apply the oldest undone action of the user in the scope.
    ///
    /// Returns the entry that became active again, or `None` when there was
    /// nothing to redo.
    pub async fn redo(&self, user_id: Uuid, scope_id: Uuid) -> Result<Option<HistoryListing>> {
        self.replay(user_id, scope_id, ReplayDirection::Redo).await
    }

    async fn replay(
        &self,
        user_id: Uuid,
        scope_id: Uuid,
        direction: ReplayDirection,
    ) -> Result<Option<HistoryListing>> {
        let start = Instant::now();
        let Some(mut entry) = self.history.next_for(user_id, scope_id, direction).await? else {
            debug!(
                subsystem = "history",
                component = "engine",
                op = direction.as_str(),
                user_id = %user_id,
                scope_id = %scope_id,
                "Nothing to replay"
            );
            return Ok(None);
        };

        let changes = self.ledger.list_for_history(entry.id).await?;

        // Resolve every target up front so an unknown collection aborts
        // before any document is touched.
        let targets: Vec<Arc<dyn ReplayTarget>> = changes
            .iter()
            .map(|change| self.registry.resolve(&change.collection_name))
            .collect::<Result<_>>()?;

        for (change, target) in changes.iter().zip(&targets) {
            match change.replacement(direction) {
                Some(document) => target.replace(document).await?,
                None => target.remove(change.document_id).await?,
            }
            trace!(
                collection = %change.collection_name,
                document_id = %change.document_id,
                kind = ?change.kind(),
                "Replayed document change"
            );
        }

        entry.is_undone = direction.resulting_undone();
        self.history.set_undone(entry.id, entry.is_undone).await?;

        info!(
            subsystem = "history",
            component = "engine",
            op = direction.as_str(),
            history_id = %entry.id,
            user_id = %user_id,
            scope_id = %scope_id,
            action_name = %entry.action_name,
            change_count = changes.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "History entry replayed"
        );
        Ok(Some(entry.listing()))
    }
}
