//! Entity/relation memory - store, persistence, and bootstrap data

mod error;
mod persist;
mod seed;
mod store;
mod table;
mod types;

pub use error::StoreError;
pub use persist::MemoryDocument;
pub use seed::SeedSet;
pub use store::MemoryStore;
pub use types::{DeleteOutcome, Entity, EntityInput, Relation, RelationOutcome};
