//! Configuration types and loading for entity-memory

mod loader;

pub use loader::{ClientConfig, MemoryConfig, Overrides, ServerConfig};
