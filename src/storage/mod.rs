// Storage layer module
pub mod sqlite_storage;

pub use sqlite_storage::{DocumentInfo, PropertySummary, SqliteStorage};

use crate::types::{ParsedDocument, Result};

/// Destination for finished documents. (file name, unit) is the natural
/// key: storing a document again replaces its previous unit rows.
pub trait RecordSink {
    /// Persist a document and its units, returning the document id.
    fn store(&mut self, doc: &ParsedDocument) -> Result<i64>;
}
