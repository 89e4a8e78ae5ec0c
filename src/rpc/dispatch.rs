//! Routes façade methods to store operations

use super::types::{MemoryMethod, RelationInput, RpcError, RpcRequest, RpcResponse};
use crate::memory::{DeleteOutcome, EntityInput, MemoryStore, StoreError};
use serde_json::{Value, json};
use std::collections::HashSet;

/// Parse, dispatch, and wrap one envelope. Never fails: errors come back in
/// the envelope with the caller's id.
pub fn handle_request(store: &mut MemoryStore, request: RpcRequest) -> RpcResponse {
    let RpcRequest {
        id, method, params, ..
    } = request;

    let outcome = MemoryMethod::parse(&method, &params).and_then(|m| dispatch(store, m));
    match outcome {
        Ok(result) => {
            tracing::debug!(%method, "RPC ok");
            RpcResponse::success(id, result)
        }
        Err(e) => {
            tracing::info!(%method, error = %e, "RPC error");
            RpcResponse::failure(id, e.message)
        }
    }
}

/// Run one method against the store
pub fn dispatch(store: &mut MemoryStore, method: MemoryMethod) -> Result<Value, RpcError> {
    match method {
        MemoryMethod::Initialize => Ok(json!({
            "status": "ok",
            "message": "Memory server initialized",
            "serverInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        })),

        MemoryMethod::CreateEntities(entities) => create_entities(store, entities),

        MemoryMethod::CreateRelations(relations) => create_relations(store, relations),

        MemoryMethod::Entities => {
            let entities: Vec<_> = store.entities().collect();
            Ok(json!({ "entities": entities }))
        }

        MemoryMethod::Relations => Ok(json!({ "relations": store.relations() })),

        MemoryMethod::DeleteEntity { name } => match store.delete_entity(&name) {
            DeleteOutcome::Deleted { cascaded, .. } => Ok(json!({
                "status": "ok",
                "message": format!("Entity '{}' deleted successfully", name),
                "relationsRemoved": cascaded,
            })),
            DeleteOutcome::NotFound => Err(RpcError::new(format!("Entity '{}' not found", name))),
        },

        MemoryMethod::DeleteRelation {
            from,
            to,
            relation_type,
        } => {
            let outcome = store.delete_relation(&from, &to, relation_type.as_deref())?;
            if !outcome.is_deleted() {
                return Err(RpcError::new("No matching relations found"));
            }
            Ok(json!({ "status": "ok", "deleted": outcome.count() }))
        }
    }
}

/// Nameless entries are skipped. Everything else is checked before the first
/// write so a bad entry leaves the store untouched. Entries apply in order, so
/// a name created earlier in the batch counts as existing for later ones.
fn create_entities(store: &mut MemoryStore, entities: Vec<EntityInput>) -> Result<Value, RpcError> {
    let named: Vec<_> = entities.iter().filter(|e| e.name().is_some()).collect();

    let mut pending: HashSet<&str> = HashSet::new();
    for entity in &named {
        let name = entity.name().unwrap_or_default();
        let exists = store.get_entity(name).is_some() || pending.contains(name);
        if !exists && entity.entity_type().is_empty() {
            return Err(StoreError::validation("Entity name and type are required").into());
        }
        pending.insert(name);
    }

    for entity in &named {
        store.upsert_entity(
            entity.name().unwrap_or_default(),
            entity.entity_type(),
            entity.observations.iter().cloned(),
        )?;
    }

    let skipped = entities.len() - named.len();
    if skipped > 0 {
        tracing::debug!(skipped, "Skipped entities without a name");
    }
    Ok(json!({ "status": "ok", "created": named.len() }))
}

/// All-or-nothing on validation, like `create_entities`
fn create_relations(
    store: &mut MemoryStore,
    relations: Vec<RelationInput>,
) -> Result<Value, RpcError> {
    for rel in &relations {
        if rel.from_name().is_empty() || rel.to_name().is_empty() || rel.relation_type().is_empty()
        {
            return Err(StoreError::validation("From, to, and relationType are required").into());
        }
        for endpoint in [rel.from_name(), rel.to_name()] {
            if store.get_entity(endpoint).is_none() {
                return Err(
                    StoreError::not_found(format!("Entity '{}' does not exist", endpoint)).into(),
                );
            }
        }
    }

    let mut created = 0;
    for rel in &relations {
        if store
            .create_relation(rel.from_name(), rel.to_name(), rel.relation_type())?
            .is_created()
        {
            created += 1;
        }
    }

    Ok(json!({
        "status": "ok",
        "created": created,
        "existing": relations.len() - created,
    }))
}
