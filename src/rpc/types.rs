//! Wire envelope and the closed set of façade methods

use crate::memory::{EntityInput, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

pub const JSONRPC_VERSION: &str = "2.0";

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// `{"jsonrpc": "2.0", "id": ..., "method": ..., "params": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default = "default_version")]
    pub jsonrpc: String,

    /// Correlation id, echoed back verbatim. Any JSON value.
    #[serde(default)]
    pub id: Value,

    pub method: String,

    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    /// Envelope for `method` with a fresh correlation id
    pub fn for_method(method: &MemoryMethod) -> Self {
        Self {
            jsonrpc: default_version(),
            id: Value::String(uuid::Uuid::new_v4().to_string()),
            method: method.name().to_string(),
            params: method.params(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    pub message: String,
}

/// Exactly one of `result` / `error` is set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default = "default_version")]
    pub jsonrpc: String,

    #[serde(default)]
    pub id: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: None,
            error: Some(RpcErrorBody {
                message: message.into(),
            }),
        }
    }
}

/// A façade failure, reported in the response envelope rather than raised
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RpcError {
    pub message: String,
}

impl RpcError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<StoreError> for RpcError {
    fn from(err: StoreError) -> Self {
        Self::new(err.to_string())
    }
}

/// Relation create/delete payload; fields optional so presence checks can
/// report which one is missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationInput {
    #[serde(default)]
    pub from: Option<String>,

    #[serde(default)]
    pub to: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_type: Option<String>,
}

impl RelationInput {
    pub fn new(from: impl Into<String>, to: impl Into<String>, relation_type: Option<&str>) -> Self {
        Self {
            from: Some(from.into()),
            to: Some(to.into()),
            relation_type: relation_type.map(str::to_string),
        }
    }

    pub fn from_name(&self) -> &str {
        self.from.as_deref().unwrap_or_default()
    }

    pub fn to_name(&self) -> &str {
        self.to.as_deref().unwrap_or_default()
    }

    pub fn relation_type(&self) -> &str {
        self.relation_type.as_deref().unwrap_or_default()
    }
}

/// Every operation the façade accepts
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryMethod {
    /// Liveness handshake; touches nothing
    Initialize,
    CreateEntities(Vec<EntityInput>),
    CreateRelations(Vec<RelationInput>),
    Entities,
    Relations,
    DeleteEntity {
        name: String,
    },
    DeleteRelation {
        from: String,
        to: String,
        relation_type: Option<String>,
    },
}

impl MemoryMethod {
    pub const INITIALIZE: &'static str = "initialize";
    pub const CREATE_ENTITIES: &'static str = "memory/create_entities";
    pub const CREATE_RELATIONS: &'static str = "memory/create_relations";
    pub const ENTITIES: &'static str = "memory/entities";
    pub const RELATIONS: &'static str = "memory/relations";
    pub const DELETE_ENTITY: &'static str = "memory/delete_entity";
    pub const DELETE_RELATION: &'static str = "memory/delete_relation";

    /// Wire name
    pub fn name(&self) -> &'static str {
        match self {
            MemoryMethod::Initialize => Self::INITIALIZE,
            MemoryMethod::CreateEntities(_) => Self::CREATE_ENTITIES,
            MemoryMethod::CreateRelations(_) => Self::CREATE_RELATIONS,
            MemoryMethod::Entities => Self::ENTITIES,
            MemoryMethod::Relations => Self::RELATIONS,
            MemoryMethod::DeleteEntity { .. } => Self::DELETE_ENTITY,
            MemoryMethod::DeleteRelation { .. } => Self::DELETE_RELATION,
        }
    }

    /// Wire params
    pub fn params(&self) -> Value {
        match self {
            MemoryMethod::Initialize => json!({
                "client": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "capabilities": {},
            }),
            MemoryMethod::CreateEntities(entities) => json!({ "entities": entities }),
            MemoryMethod::CreateRelations(relations) => json!({ "relations": relations }),
            MemoryMethod::Entities | MemoryMethod::Relations => json!({}),
            MemoryMethod::DeleteEntity { name } => json!({ "name": name }),
            MemoryMethod::DeleteRelation {
                from,
                to,
                relation_type,
            } => {
                let mut params = json!({ "from": from, "to": to });
                if let Some(kind) = relation_type {
                    params["relationType"] = Value::String(kind.clone());
                }
                params
            }
        }
    }

    /// Decode a method name and its params
    pub fn parse(method: &str, params: &Value) -> Result<Self, RpcError> {
        match method {
            Self::INITIALIZE => Ok(MemoryMethod::Initialize),
            Self::CREATE_ENTITIES => {
                parse_list(params, "entities").map(MemoryMethod::CreateEntities)
            }
            Self::CREATE_RELATIONS => {
                parse_list(params, "relations").map(MemoryMethod::CreateRelations)
            }
            Self::ENTITIES => Ok(MemoryMethod::Entities),
            Self::RELATIONS => Ok(MemoryMethod::Relations),
            Self::DELETE_ENTITY => {
                let name = non_empty_str(params, "name")
                    .ok_or_else(|| RpcError::new("Entity name is required"))?;
                Ok(MemoryMethod::DeleteEntity { name })
            }
            Self::DELETE_RELATION => {
                let (Some(from), Some(to)) =
                    (non_empty_str(params, "from"), non_empty_str(params, "to"))
                else {
                    return Err(RpcError::new("Both from and to entity names are required"));
                };
                Ok(MemoryMethod::DeleteRelation {
                    from,
                    to,
                    relation_type: non_empty_str(params, "relationType"),
                })
            }
            _ => Err(RpcError::new("Method not implemented")),
        }
    }
}

fn non_empty_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `params[key]` must be an array of objects
fn parse_list<T: serde::de::DeserializeOwned>(params: &Value, key: &str) -> Result<Vec<T>, RpcError> {
    let invalid = || RpcError::new(format!("Invalid {} format", key));

    let items = params.get(key).and_then(Value::as_array).ok_or_else(invalid)?;
    items
        .iter()
        .map(|item| {
            if !item.is_object() {
                return Err(invalid());
            }
            serde_json::from_value(item.clone()).map_err(|_| invalid())
        })
        .collect()
}
