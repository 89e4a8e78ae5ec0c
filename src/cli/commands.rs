//! CLI command implementations

use super::output::{OutputEvent, OutputHandler};
use super::signals::{CancellationToken, setup_signal_handlers};
use crate::client::{MemoryClient, OperationResult, RpcTransport};
use crate::config::MemoryConfig;
use crate::memory::{Entity, EntityInput, MemoryDocument, MemoryStore, Relation};
use crate::rpc::{self, AppState};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Run the memory server until SIGINT/SIGTERM
pub async fn serve(config: &MemoryConfig, handler: &dyn OutputHandler) -> anyhow::Result<i32> {
    let path = config.store.resolved_path();
    let store = MemoryStore::open(&path);
    handler.emit(OutputEvent::Debug {
        message: format!(
            "Loaded {} entities and {} relations",
            store.document().entities.len(),
            store.relations().len()
        ),
    });
    let state = Arc::new(AppState::new(
        Arc::new(Mutex::new(store)),
        config.seed_set(),
    ));

    let shutdown = CancellationToken::new();
    tokio::spawn(setup_signal_handlers(shutdown.clone()));

    handler.emit(OutputEvent::ServerStart {
        address: config.server.address(),
        store: path.display().to_string(),
    });

    rpc::serve(&config.server, state, shutdown).await?;
    Ok(0)
}

/// Seed the local memory file
pub fn init(config: &MemoryConfig, handler: &dyn OutputHandler) -> anyhow::Result<i32> {
    let path = config.store.resolved_path();
    let mut store = MemoryStore::open(&path);
    let report = config.seed_set().apply(&mut store)?;

    handler.emit(OutputEvent::Success {
        message: format!(
            "Project memory initialized in {} ({} entities, {} new relations)",
            path.display(),
            report.entities,
            report.relations_created
        ),
    });
    Ok(0)
}

/// Check configuration, the memory file, and the server
pub async fn doctor<T: RpcTransport>(
    config: &MemoryConfig,
    client: &MemoryClient<T>,
    handler: &dyn OutputHandler,
) -> i32 {
    let mut all_ok = true;

    match config.validate() {
        Ok(()) => handler.emit(OutputEvent::Check {
            name: "config".into(),
            ok: true,
            detail: "valid".into(),
        }),
        Err(errors) => {
            all_ok = false;
            handler.emit(OutputEvent::Check {
                name: "config".into(),
                ok: false,
                detail: errors.join("; "),
            });
        }
    }

    let path = config.store.resolved_path();
    let (ok, detail) = match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<MemoryDocument>(&contents) {
            Ok(doc) => (
                true,
                format!(
                    "{} ({} entities, {} relations)",
                    path.display(),
                    doc.entities.len(),
                    doc.relations.len()
                ),
            ),
            Err(e) => (false, format!("{} does not parse: {}", path.display(), e)),
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => (
            true,
            format!("{} missing; created on first start", path.display()),
        ),
        Err(e) => (false, format!("{}: {}", path.display(), e)),
    };
    all_ok &= ok;
    handler.emit(OutputEvent::Check {
        name: "store".into(),
        ok,
        detail,
    });

    let endpoint = client.transport().endpoint();
    match client.initialize().await {
        Ok(_) => handler.emit(OutputEvent::Check {
            name: "server".into(),
            ok: true,
            detail: format!("{} answers initialize", endpoint),
        }),
        Err(e) => {
            all_ok = false;
            handler.emit(OutputEvent::Check {
                name: "server".into(),
                ok: false,
                detail: format!("{}: {}", endpoint, e),
            });
        }
    }

    if all_ok { 0 } else { 1 }
}

/// Handshake with the server
pub async fn ping<T: RpcTransport>(client: &MemoryClient<T>, handler: &dyn OutputHandler) -> i32 {
    let endpoint = client.transport().endpoint();
    match client.initialize().await {
        Ok(info) => {
            let server = &info["serverInfo"];
            handler.emit(OutputEvent::Success {
                message: format!(
                    "Connected to {} ({} {})",
                    endpoint,
                    server["name"].as_str().unwrap_or("unknown"),
                    server["version"].as_str().unwrap_or("?")
                ),
            });
            0
        }
        Err(e) => {
            handler.emit(OutputEvent::Failure {
                error: format!("Failed to connect to memory server at {}: {}", endpoint, e),
            });
            1
        }
    }
}

/// List entities, optionally filtered by exact type and/or name
pub async fn list_entities<T: RpcTransport>(
    client: &MemoryClient<T>,
    entity_type: Option<&str>,
    name: Option<&str>,
    handler: &dyn OutputHandler,
) -> i32 {
    let mut entities = match entity_type {
        Some(kind) => client.find_entities_by_type(kind).await,
        None => client.get_all_entities().await,
    };
    if let Some(name) = name {
        entities.retain(|e| e.name == name);
    }

    handler.emit(OutputEvent::Entities { entities });
    0
}

pub async fn list_relations<T: RpcTransport>(
    client: &MemoryClient<T>,
    handler: &dyn OutputHandler,
) -> i32 {
    let relations = client.get_all_relations().await;
    handler.emit(OutputEvent::Relations { relations });
    0
}

/// Create an entity, or add observations to an existing one
pub async fn add_entity<T: RpcTransport>(
    client: &MemoryClient<T>,
    name: &str,
    entity_type: &str,
    observations: Vec<String>,
    handler: &dyn OutputHandler,
) -> i32 {
    let input = EntityInput::new(name, entity_type).with_observations(observations);
    let result = client.create_entity(input).await;
    report(result, format!("Entity '{}' saved", name), handler)
}

pub async fn relate<T: RpcTransport>(
    client: &MemoryClient<T>,
    from: &str,
    to: &str,
    relation_type: &str,
    handler: &dyn OutputHandler,
) -> i32 {
    let result = client.create_relation(from, to, relation_type).await;
    report(
        result,
        format!("{} -[{}]-> {}", from, relation_type, to),
        handler,
    )
}

pub async fn delete_entity<T: RpcTransport>(
    client: &MemoryClient<T>,
    name: &str,
    handler: &dyn OutputHandler,
) -> i32 {
    let result = client.delete_entity(name).await;
    report(result, format!("Entity '{}' deleted", name), handler)
}

pub async fn unrelate<T: RpcTransport>(
    client: &MemoryClient<T>,
    from: &str,
    to: &str,
    relation_type: Option<&str>,
    handler: &dyn OutputHandler,
) -> i32 {
    let result = client.delete_relation(from, to, relation_type).await;
    let what = match relation_type {
        Some(kind) => format!("{} -[{}]-> {}", from, kind, to),
        None => format!("{} -> {}", from, to),
    };
    report(result, format!("Removed {}", what), handler)
}

/// Show the latest entity (insertion order) and its relations
pub async fn show_latest<T: RpcTransport>(
    client: &MemoryClient<T>,
    handler: &dyn OutputHandler,
) -> i32 {
    match latest_with_relations(client).await {
        Some((entity, relations)) => {
            handler.emit(OutputEvent::Entity { entity, relations });
            0
        }
        None => {
            handler.emit(OutputEvent::Failure {
                error: "No entities found".into(),
            });
            1
        }
    }
}

/// Delete the latest entity. Without `yes`, show it and ask `confirm` first.
pub async fn delete_latest<T: RpcTransport>(
    client: &MemoryClient<T>,
    yes: bool,
    confirm: &dyn Fn(&Entity) -> bool,
    handler: &dyn OutputHandler,
) -> i32 {
    if yes {
        let result = client.delete_latest_entity().await;
        return report(result, "Latest entity deleted".to_string(), handler);
    }

    let Some((entity, relations)) = latest_with_relations(client).await else {
        handler.emit(OutputEvent::Failure {
            error: "No entities found to delete".into(),
        });
        return 1;
    };
    handler.emit(OutputEvent::Entity {
        entity: entity.clone(),
        relations,
    });

    if !confirm(&entity) {
        handler.emit(OutputEvent::Info {
            message: "Nothing deleted".into(),
        });
        return 0;
    }

    let result = client.delete_entity(&entity.name).await;
    report(result, format!("Entity '{}' deleted", entity.name), handler)
}

/// Ask on stdin; anything but y/yes declines
pub fn confirm_on_stdin(entity: &Entity) -> bool {
    eprint!("Remove entity '{}'? (y/n): ", entity.name);
    let _ = io::stderr().flush();

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

async fn latest_with_relations<T: RpcTransport>(
    client: &MemoryClient<T>,
) -> Option<(Entity, Vec<Relation>)> {
    let entity = client.latest_entity().await?;
    let relations = client
        .get_all_relations()
        .await
        .into_iter()
        .filter(|r| r.touches(&entity.name))
        .collect();
    Some((entity, relations))
}

/// Emit the outcome of a mutation and map it to an exit code
fn report(result: OperationResult, fallback: String, handler: &dyn OutputHandler) -> i32 {
    if result.success {
        handler.emit(OutputEvent::Success {
            message: result.message.unwrap_or(fallback),
        });
        0
    } else {
        handler.emit(OutputEvent::Failure {
            error: result.error.unwrap_or_else(|| "unknown error".into()),
        });
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LocalTransport;
    use crate::config::Overrides;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    struct MockHandler {
        events: Arc<StdMutex<Vec<OutputEvent>>>,
    }

    impl MockHandler {
        fn new() -> Self {
            Self {
                events: Arc::new(StdMutex::new(Vec::new())),
            }
        }

        fn events(&self) -> Vec<OutputEvent> {
            self.events.lock().unwrap().clone()
        }

        fn last(&self) -> OutputEvent {
            self.events().pop().expect("no events")
        }
    }

    impl OutputHandler for MockHandler {
        fn emit(&self, event: OutputEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn local_client(dir: &TempDir) -> MemoryClient<LocalTransport> {
        let store = MemoryStore::open(dir.path().join("memory.json"));
        MemoryClient::new(LocalTransport::new(Arc::new(Mutex::new(store))))
    }

    fn config_in(dir: &TempDir) -> MemoryConfig {
        let mut config = MemoryConfig::default();
        config.apply_overrides(&Overrides {
            file: Some(dir.path().join("memory.json")),
            ..Default::default()
        });
        config
    }

    #[tokio::test]
    async fn test_add_list_and_relate() {
        let dir = TempDir::new().unwrap();
        let client = local_client(&dir);
        let handler = MockHandler::new();

        assert_eq!(
            add_entity(&client, "Project", "project", vec!["A".into()], &handler).await,
            0
        );
        assert_eq!(add_entity(&client, "Phase", "phase", vec![], &handler).await, 0);
        assert_eq!(relate(&client, "Project", "Phase", "is_in", &handler).await, 0);
        assert_eq!(relate(&client, "Project", "Ghost", "is_in", &handler).await, 1);

        list_entities(&client, Some("phase"), None, &handler).await;
        match handler.last() {
            OutputEvent::Entities { entities } => {
                assert_eq!(entities.len(), 1);
                assert_eq!(entities[0].name, "Phase");
            }
            other => panic!("unexpected event {:?}", other),
        }

        list_entities(&client, None, Some("Project"), &handler).await;
        match handler.last() {
            OutputEvent::Entities { entities } => assert_eq!(entities[0].name, "Project"),
            other => panic!("unexpected event {:?}", other),
        }

        list_relations(&client, &handler).await;
        match handler.last() {
            OutputEvent::Relations { relations } => assert_eq!(relations.len(), 1),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_show_latest() {
        let dir = TempDir::new().unwrap();
        let client = local_client(&dir);
        let handler = MockHandler::new();

        assert_eq!(show_latest(&client, &handler).await, 1);

        add_entity(&client, "A", "t", vec![], &handler).await;
        add_entity(&client, "B", "t", vec![], &handler).await;
        relate(&client, "A", "B", "r", &handler).await;

        assert_eq!(show_latest(&client, &handler).await, 0);
        match handler.last() {
            OutputEvent::Entity { entity, relations } => {
                assert_eq!(entity.name, "B");
                assert_eq!(relations.len(), 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_latest_respects_confirmation() {
        let dir = TempDir::new().unwrap();
        let client = local_client(&dir);
        let handler = MockHandler::new();

        add_entity(&client, "A", "t", vec![], &handler).await;
        add_entity(&client, "B", "t", vec![], &handler).await;

        assert_eq!(delete_latest(&client, false, &|_| false, &handler).await, 0);
        assert_eq!(client.get_all_entities().await.len(), 2);

        assert_eq!(delete_latest(&client, false, &|e| e.name == "B", &handler).await, 0);
        assert_eq!(client.latest_entity().await.unwrap().name, "A");

        assert_eq!(delete_latest(&client, true, &|_| false, &handler).await, 0);
        assert!(client.get_all_entities().await.is_empty());

        assert_eq!(delete_latest(&client, true, &|_| true, &handler).await, 1);
        assert_eq!(
            handler.last(),
            OutputEvent::Failure {
                error: "No entities found to delete".into()
            }
        );
    }

    #[tokio::test]
    async fn test_delete_and_unrelate_report_failures() {
        let dir = TempDir::new().unwrap();
        let client = local_client(&dir);
        let handler = MockHandler::new();

        assert_eq!(delete_entity(&client, "ghost", &handler).await, 1);
        assert_eq!(
            handler.last(),
            OutputEvent::Failure {
                error: "RPC Error: Entity 'ghost' not found".into()
            }
        );

        assert_eq!(unrelate(&client, "a", "b", None, &handler).await, 1);
    }

    #[tokio::test]
    async fn test_ping_and_doctor_local() {
        let dir = TempDir::new().unwrap();
        let client = local_client(&dir);
        let handler = MockHandler::new();

        assert_eq!(ping(&client, &handler).await, 0);

        let config = config_in(&dir);
        assert_eq!(doctor(&config, &client, &handler).await, 0);
        let checks: Vec<_> = handler
            .events()
            .into_iter()
            .filter_map(|e| match e {
                OutputEvent::Check { name, ok, .. } => Some((name, ok)),
                _ => None,
            })
            .collect();
        assert_eq!(
            checks,
            vec![
                ("config".to_string(), true),
                ("store".to_string(), true),
                ("server".to_string(), true),
            ]
        );
    }

    #[tokio::test]
    async fn test_doctor_flags_corrupt_store() {
        let dir = TempDir::new().unwrap();
        let client = local_client(&dir);
        std::fs::write(dir.path().join("memory.json"), "{oops").unwrap();

        let handler = MockHandler::new();
        assert_eq!(doctor(&config_in(&dir), &client, &handler).await, 1);
    }

    #[test]
    fn test_init_seeds_file() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let handler = MockHandler::new();

        assert_eq!(init(&config, &handler).unwrap(), 0);
        assert_eq!(init(&config, &handler).unwrap(), 0);

        let store = MemoryStore::open(dir.path().join("memory.json"));
        assert_eq!(store.entities().count(), 4);
        assert_eq!(store.relations().len(), 3);
    }
}
