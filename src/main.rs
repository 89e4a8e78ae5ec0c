mod cli;
mod client;
mod config;
mod logging;
mod memory;
mod rpc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::{OutputMode, commands, create_handler};
use client::{HttpTransport, LocalTransport, MemoryClient, RpcTransport};
use config::{MemoryConfig, Overrides};
use memory::MemoryStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Parser)]
#[command(name = "entity-memory")]
#[command(about = "Entity/relation memory persisted to JSON, served over JSON-RPC and REST")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Extra config file, applied after user and project config
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Memory file (overrides [store] path)
    #[arg(long, global = true)]
    file: Option<PathBuf>,

    /// Server port; client commands also target it on localhost
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Server URL for client commands
    #[arg(long, global = true)]
    url: Option<String>,

    /// Operate on the memory file directly instead of a running server
    #[arg(long, global = true)]
    local: bool,

    /// Emit JSON events on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress normal output
    #[arg(long, global = true)]
    quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Write logs under the config directory
    #[arg(long, global = true, conflicts_with = "log_file")]
    log: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the memory server
    Serve,

    /// Seed the memory file with the project bootstrap entities
    Init,

    /// Check configuration, memory file, and server
    Doctor,

    /// Handshake with the server
    Ping,

    /// List entities
    Entities {
        /// Only this entity type
        #[arg(long = "type")]
        entity_type: Option<String>,

        /// Only this entity name
        #[arg(long)]
        name: Option<String>,
    },

    /// List relations
    Relations,

    /// Create an entity or add observations to it
    Add {
        name: String,
        entity_type: String,

        #[arg(trailing_var_arg = true)]
        observations: Vec<String>,
    },

    /// Create a relation
    Relate {
        from: String,
        to: String,
        relation_type: String,
    },

    /// Delete an entity and its relations
    Delete { name: String },

    /// Delete relations between two entities
    Unrelate {
        from: String,
        to: String,
        /// Only this relation type (default: all)
        relation_type: Option<String>,
    },

    /// Show the most recently created entity
    Latest,

    /// Delete the most recently created entity
    DeleteLatest {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Serve => "serve",
            Commands::Init => "init",
            Commands::Doctor => "doctor",
            Commands::Ping => "ping",
            Commands::Entities { .. } => "entities",
            Commands::Relations => "relations",
            Commands::Add { .. } => "add",
            Commands::Relate { .. } => "relate",
            Commands::Delete { .. } => "delete",
            Commands::Unrelate { .. } => "unrelate",
            Commands::Latest => "latest",
            Commands::DeleteLatest { .. } => "delete-latest",
        }
    }
}

fn transport(config: &MemoryConfig, local: bool) -> Box<dyn RpcTransport> {
    if local {
        let store = MemoryStore::open(config.store.resolved_path());
        Box::new(LocalTransport::new(Arc::new(Mutex::new(store))))
    } else {
        Box::new(HttpTransport::from_config(&config.client))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = match cli.log_file.clone() {
        Some(path) => Some(path),
        None if cli.log => Some(logging::default_log_path(cli.command.name())?),
        None => None,
    };
    logging::init_logging(cli.debug, cli.quiet, log_file)?;

    let mut config = MemoryConfig::load(None, cli.config.as_deref())?;
    config.apply_overrides(&Overrides {
        port: cli.port,
        file: cli.file.clone(),
        url: cli.url.clone(),
    });
    if !matches!(cli.command, Commands::Doctor) {
        config.validate().map_err(|errors| {
            anyhow::anyhow!("invalid configuration:\n  {}", errors.join("\n  "))
        })?;
    }

    let handler = create_handler(OutputMode::from_flags(cli.json, cli.quiet), cli.debug);
    let handler = handler.as_ref();
    let client = || MemoryClient::new(transport(&config, cli.local));

    let code = match cli.command {
        Commands::Serve => commands::serve(&config, handler).await?,
        Commands::Init => commands::init(&config, handler)?,
        Commands::Doctor => commands::doctor(&config, &client(), handler).await,
        Commands::Ping => commands::ping(&client(), handler).await,
        Commands::Entities { entity_type, name } => {
            commands::list_entities(&client(), entity_type.as_deref(), name.as_deref(), handler)
                .await
        }
        Commands::Relations => commands::list_relations(&client(), handler).await,
        Commands::Add {
            name,
            entity_type,
            observations,
        } => commands::add_entity(&client(), &name, &entity_type, observations, handler).await,
        Commands::Relate {
            from,
            to,
            relation_type,
        } => commands::relate(&client(), &from, &to, &relation_type, handler).await,
        Commands::Delete { name } => commands::delete_entity(&client(), &name, handler).await,
        Commands::Unrelate {
            from,
            to,
            relation_type,
        } => {
            commands::unrelate(&client(), &from, &to, relation_type.as_deref(), handler).await
        }
        Commands::Latest => commands::show_latest(&client(), handler).await,
        Commands::DeleteLatest { yes } => {
            commands::delete_latest(&client(), yes, &commands::confirm_on_stdin, handler).await
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
