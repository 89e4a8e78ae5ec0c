//! Output handlers for CLI commands
//!
//! Supports console (pretty), JSON, and quiet output modes.

use crate::memory::{Entity, Relation};
use serde::{Deserialize, Serialize};

/// Output mode for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Console,
    Json,
    Quiet,
}

impl OutputMode {
    /// Pick the mode from the global flags; `--json` beats `--quiet`
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if json {
            Self::Json
        } else if quiet {
            Self::Quiet
        } else {
            Self::Console
        }
    }
}

/// Events emitted by memory commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputEvent {
    ServerStart {
        address: String,
        store: String,
    },
    Entities {
        entities: Vec<Entity>,
    },
    Relations {
        relations: Vec<Relation>,
    },
    /// One entity with the relations touching it
    Entity {
        entity: Entity,
        relations: Vec<Relation>,
    },
    Success {
        message: String,
    },
    Failure {
        error: String,
    },
    /// Doctor check line
    Check {
        name: String,
        ok: bool,
        detail: String,
    },
    Info {
        message: String,
    },
    Debug {
        message: String,
    },
}

/// Output handler trait
pub trait OutputHandler: Send + Sync {
    /// Emit an event
    fn emit(&self, event: OutputEvent);
}

/// Console output handler. Data goes to stdout, status to stderr.
pub struct ConsoleHandler {
    debug: bool,
}

impl ConsoleHandler {
    /// Create a new console handler
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    fn format_entity(entity: &Entity) -> String {
        let mut out = format!("{} ({})", entity.name, entity.entity_type);
        for observation in &entity.observations {
            out.push_str("\n  - ");
            out.push_str(observation);
        }
        out
    }

    fn format_relation(relation: &Relation) -> String {
        format!(
            "{} -[{}]-> {}",
            relation.from, relation.relation_type, relation.to
        )
    }
}

impl OutputHandler for ConsoleHandler {
    fn emit(&self, event: OutputEvent) {
        match event {
            OutputEvent::ServerStart { address, store } => {
                eprintln!("Memory server running on http://{} (store: {})", address, store);
            }
            OutputEvent::Entities { entities } => {
                if entities.is_empty() {
                    eprintln!("(no entities)");
                }
                for entity in &entities {
                    println!("{}", Self::format_entity(entity));
                }
            }
            OutputEvent::Relations { relations } => {
                if relations.is_empty() {
                    eprintln!("(no relations)");
                }
                for relation in &relations {
                    println!("{}", Self::format_relation(relation));
                }
            }
            OutputEvent::Entity { entity, relations } => {
                println!("{}", Self::format_entity(&entity));
                println!("  updated {}", entity.updated_at.to_rfc3339());
                if !relations.is_empty() {
                    println!("Relations:");
                    for relation in &relations {
                        println!("  {}", Self::format_relation(relation));
                    }
                }
            }
            OutputEvent::Success { message } => {
                eprintln!("✓ {}", message);
            }
            OutputEvent::Failure { error } => {
                eprintln!("✗ {}", error);
            }
            OutputEvent::Check { name, ok, detail } => {
                let mark = if ok { "✓" } else { "✗" };
                eprintln!("{} {}: {}", mark, name, detail);
            }
            OutputEvent::Info { message } => {
                eprintln!("{}", message);
            }
            OutputEvent::Debug { message } => {
                if self.debug {
                    eprintln!("[debug] {}", message);
                }
            }
        }
    }
}

/// JSON output handler, one document per event on stdout
pub struct JsonHandler {
    pretty: bool,
}

impl JsonHandler {
    /// Create a new JSON handler
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn print_json<T: Serialize>(&self, value: &T) {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };

        if let Ok(s) = json {
            println!("{}", s);
        }
    }
}

impl OutputHandler for JsonHandler {
    fn emit(&self, event: OutputEvent) {
        self.print_json(&event);
    }
}

/// Quiet handler: only failures, and data for scripts
pub struct QuietHandler;

impl OutputHandler for QuietHandler {
    fn emit(&self, event: OutputEvent) {
        match event {
            OutputEvent::Entities { entities } => {
                for entity in entities {
                    println!("{}", entity.name);
                }
            }
            OutputEvent::Entity { entity, .. } => println!("{}", entity.name),
            OutputEvent::Failure { error } => eprintln!("{}", error),
            _ => {}
        }
    }
}

/// Create an output handler based on mode
pub fn create_handler(mode: OutputMode, debug: bool) -> Box<dyn OutputHandler> {
    match mode {
        OutputMode::Console => Box::new(ConsoleHandler::new(debug)),
        OutputMode::Json => Box::new(JsonHandler::new(true)),
        OutputMode::Quiet => Box::new(QuietHandler),
    }
}
