//! Centralized default constants for rewind.
//!
//! All crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// HISTORY RETENTION
// =============================================================================

/// Entries older than this are evicted on the next create for the same
/// user and scope.
pub const HISTORY_MAX_AGE_SECS: i64 = 60 * 60;

/// Upper bound on retained entries per user, including the one being created.
pub const HISTORY_MAX_ENTRIES_PER_USER: usize = 10;

/// Longest accepted action name.
pub const MAX_ACTION_NAME_LEN: usize = 200;

// =============================================================================
// DOCUMENT STORE
// =============================================================================

/// Longest accepted collection name.
pub const MAX_COLLECTION_NAME_LEN: usize = 64;

/// Largest batch accepted by one recorded bulk write.
pub const MAX_BULK_DOCUMENTS: usize = 5_000;

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for document listings.
pub const PAGE_LIMIT: i64 = 50;

/// Hard cap on page size for document listings.
pub const PAGE_LIMIT_MAX: i64 = 1_000;

/// Default page offset.
pub const PAGE_OFFSET: i64 = 0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_defaults() {
        assert_eq!(HISTORY_MAX_AGE_SECS, 3600);
        assert_eq!(HISTORY_MAX_ENTRIES_PER_USER, 10);
    }

    #[test]
    fn test_page_limits_are_ordered() {
        assert!(PAGE_LIMIT > 0);
        assert!(PAGE_LIMIT <= PAGE_LIMIT_MAX);
        assert_eq!(PAGE_OFFSET, 0);
    }
}
