//! Structured logging schema and field name constants for rewind.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation can query by the same field names in every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, committed actions, undo/redo completions |
//! | DEBUG | Decision points (scope skipped, eviction counts), config choices |
//! | TRACE | Per-document replay and snapshot capture |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated across a request. Format: UUIDv7.
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "history", "db", "store"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "recorder", "history_log", "engine", "action", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "create", "evict", "undo", "redo", "replay"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// History entry UUID.
pub const HISTORY_ID: &str = "history_id";

/// Acting user UUID.
pub const USER_ID: &str = "user_id";

/// Owning scope (dataset) UUID.
pub const SCOPE_ID: &str = "scope_id";

/// Free-text action name.
pub const ACTION_NAME: &str = "action_name";

/// Collection a document lives in.
pub const COLLECTION: &str = "collection";

/// Document UUID.
pub const DOCUMENT_ID: &str = "document_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of ledger rows written or replayed.
pub const CHANGE_COUNT: &str = "change_count";

/// Number of history entries evicted.
pub const EVICTED_COUNT: &str = "evicted_count";

/// Number of results returned by a listing.
pub const RESULT_COUNT: &str = "result_count";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const ALL_FIELDS: &[&str] = &[
        REQUEST_ID,
        SUBSYSTEM,
        COMPONENT,
        OPERATION,
        HISTORY_ID,
        USER_ID,
        SCOPE_ID,
        ACTION_NAME,
        COLLECTION,
        DOCUMENT_ID,
        DURATION_MS,
        CHANGE_COUNT,
        EVICTED_COUNT,
        RESULT_COUNT,
        POOL_SIZE,
        POOL_IDLE,
        SUCCESS,
        ERROR_MSG,
    ];

    #[test]
    fn test_field_names_are_unique_snake_case() {
        let unique: HashSet<&str> = ALL_FIELDS.iter().copied().collect();
        assert_eq!(unique.len(), ALL_FIELDS.len());
        for field in ALL_FIELDS {
            assert!(
                field
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'),
                "field '{field}' is not snake_case"
            );
        }
    }
}
