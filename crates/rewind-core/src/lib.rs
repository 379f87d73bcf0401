//! # rewind-core
//!
//! Core types, traits, and the undo/redo history engine for rewind.
//!
//! Writes made through a [`RecordingSession`] are captured as full-document
//! before/after snapshots. [`ActionRecorder`] groups them into one
//! [`HistoryEntry`] per action, [`HistoryLog`] keeps history bounded, and
//! [`UndoRedoEngine`] replays an entry's ledger backwards or forwards.

pub mod action;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod history;
pub mod logging;
pub mod memory;
pub mod models;
pub mod recorder;
pub mod registry;
pub mod traits;

// Re-export commonly used types at crate root
pub use action::{next_action_date, ActionRecorder, Recordable};
pub use engine::UndoRedoEngine;
pub use error::{Error, Result};
pub use history::{HistoryLog, RetentionPolicy};
pub use memory::{MemoryCollection, MemoryHistoryStore};
pub use models::*;
pub use recorder::{ChangeRecord, RecordedCollection, RecordingSession};
pub use registry::CollectionRegistry;
pub use traits::*;
