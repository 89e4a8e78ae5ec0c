//! CLI module for entity-memory
//!
//! This module provides:
//! - Command implementations (serve, init, doctor, entity and relation edits)
//! - Output handlers (console, JSON, quiet)
//! - Signal handling for graceful shutdown

pub mod commands;
pub mod output;
pub mod signals;

pub use output::{OutputMode, create_handler};
pub use signals::CancellationToken;
