//! Whole-document JSON persistence for the memory store

use super::table::EntityTable;
use super::types::Relation;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors from writing the memory file
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The on-disk shape: `{"entities": {name: Entity}, "relations": [Relation]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryDocument {
    #[serde(default)]
    pub entities: EntityTable,

    #[serde(default)]
    pub relations: Vec<Relation>,
}

/// Load the document at `path`.
///
/// A missing file yields an empty document and the empty document is written
/// out. An unreadable or corrupt file yields an empty document with a warning;
/// the bad file is left in place until the next successful save.
pub fn load_document(path: &Path) -> MemoryDocument {
    if !path.exists() {
        tracing::info!(path = %path.display(), "Memory file not found, starting empty");
        let doc = MemoryDocument::default();
        if let Err(e) = save_document(path, &doc) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to create memory file");
        }
        return doc;
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Error loading memory, starting empty");
            return MemoryDocument::default();
        }
    };

    match serde_json::from_str::<MemoryDocument>(&contents) {
        Ok(doc) => {
            tracing::debug!(
                path = %path.display(),
                entities = doc.entities.len(),
                relations = doc.relations.len(),
                "Memory loaded from file"
            );
            doc
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Error parsing memory, starting empty");
            MemoryDocument::default()
        }
    }
}

/// Overwrite `path` with the pretty-printed document
pub fn save_document(path: &Path, doc: &MemoryDocument) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let content = serde_json::to_string_pretty(doc)?;
    std::fs::write(path, content)?;
    Ok(())
}
