//! Typed calls over an `RpcTransport`

use super::transport::{ClientError, RpcTransport};
use crate::memory::{Entity, EntityInput, Relation};
use crate::rpc::{MemoryMethod, RelationInput, RpcRequest};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Normalized outcome of a mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl OperationResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            message: None,
        }
    }

    pub fn ok_with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            message: None,
        }
    }
}

impl From<Result<Value, ClientError>> for OperationResult {
    fn from(result: Result<Value, ClientError>) -> Self {
        match result {
            Ok(value) => match value.get("message").and_then(Value::as_str) {
                Some(message) => Self::ok_with_message(message),
                None => Self::ok(),
            },
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

/// Memory operations as method calls.
///
/// Reads return plain values and fall back to empty on failure; mutations
/// return an `OperationResult`. Nothing here returns a transport error to the
/// caller except `call` and `initialize`.
pub struct MemoryClient<T: RpcTransport> {
    transport: T,
}

impl<T: RpcTransport> MemoryClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// One round trip. Error envelopes and results carrying an `error` field
    /// both come back as `ClientError::Rpc`.
    pub async fn call(&self, method: MemoryMethod) -> Result<Value, ClientError> {
        let request = RpcRequest::for_method(&method);
        tracing::debug!(method = %request.method, id = %request.id, "RPC call");

        let response = self.transport.call(&request).await?;
        if let Some(error) = response.error {
            return Err(ClientError::rpc(error.message));
        }

        let result = response.result.unwrap_or(Value::Null);
        if let Some(error) = result.get("error").and_then(Value::as_str) {
            return Err(ClientError::rpc(error));
        }
        Ok(result)
    }

    /// Handshake; returns the server's `initialize` result
    pub async fn initialize(&self) -> Result<Value, ClientError> {
        self.call(MemoryMethod::Initialize).await
    }

    pub async fn get_all_entities(&self) -> Vec<Entity> {
        self.read_list(MemoryMethod::Entities, "entities").await
    }

    pub async fn get_all_relations(&self) -> Vec<Relation> {
        self.read_list(MemoryMethod::Relations, "relations").await
    }

    pub async fn find_entities_by_type(&self, entity_type: &str) -> Vec<Entity> {
        let mut entities = self.get_all_entities().await;
        entities.retain(|e| e.entity_type == entity_type);
        entities
    }

    pub async fn find_entity_by_name(&self, name: &str) -> Option<Entity> {
        self.get_all_entities()
            .await
            .into_iter()
            .find(|e| e.name == name)
    }

    /// Last entity in insertion order
    pub async fn latest_entity(&self) -> Option<Entity> {
        self.get_all_entities().await.pop()
    }

    pub async fn create_entity(&self, entity: EntityInput) -> OperationResult {
        if entity.name().is_none() {
            return OperationResult::failed("Entity must have a name");
        }
        self.call(MemoryMethod::CreateEntities(vec![entity]))
            .await
            .into()
    }

    pub async fn create_relation(&self, from: &str, to: &str, relation_type: &str) -> OperationResult {
        if from.is_empty() || to.is_empty() || relation_type.is_empty() {
            return OperationResult::failed("Relation must have from, to, and relationType");
        }
        let relation = RelationInput::new(from, to, Some(relation_type));
        self.call(MemoryMethod::CreateRelations(vec![relation]))
            .await
            .into()
    }

    pub async fn delete_entity(&self, name: &str) -> OperationResult {
        if name.is_empty() {
            return OperationResult::failed("Entity name is required");
        }
        self.call(MemoryMethod::DeleteEntity {
            name: name.to_string(),
        })
        .await
        .into()
    }

    /// Fetch everything, pick the last entity, delete it
    pub async fn delete_latest_entity(&self) -> OperationResult {
        match self.latest_entity().await {
            Some(latest) => self.delete_entity(&latest.name).await,
            None => OperationResult::failed("No entities found to delete"),
        }
    }

    /// Without `relation_type`, removes every relation from `from` to `to`
    pub async fn delete_relation(
        &self,
        from: &str,
        to: &str,
        relation_type: Option<&str>,
    ) -> OperationResult {
        if from.is_empty() || to.is_empty() {
            return OperationResult::failed("Both from and to entity names are required");
        }
        self.call(MemoryMethod::DeleteRelation {
            from: from.to_string(),
            to: to.to_string(),
            relation_type: relation_type.filter(|t| !t.is_empty()).map(str::to_string),
        })
        .await
        .into()
    }

    async fn read_list<D: DeserializeOwned>(&self, method: MemoryMethod, key: &str) -> Vec<D> {
        let name = method.name();
        let outcome = self
            .call(method)
            .await
            .and_then(|mut result| take_list(&mut result, key));

        match outcome {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(method = name, error = %e, "Read failed, returning empty");
                Vec::new()
            }
        }
    }
}

fn take_list<D: DeserializeOwned>(result: &mut Value, key: &str) -> Result<Vec<D>, ClientError> {
    match result.get_mut(key).map(Value::take) {
        Some(list) => serde_json::from_value(list).map_err(|e| ClientError::parse(e.to_string())),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LocalTransport;
    use crate::memory::MemoryStore;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    fn local_client() -> (TempDir, MemoryClient<LocalTransport>) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::open(dir.path().join("memory.json"));
        let client = MemoryClient::new(LocalTransport::new(Arc::new(Mutex::new(store))));
        (dir, client)
    }

    #[tokio::test]
    async fn test_initialize() {
        let (_dir, client) = local_client();
        let info = client.initialize().await.unwrap();
        assert_eq!(info["serverInfo"]["name"], env!("CARGO_PKG_NAME"));
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let (_dir, client) = local_client();

        let result = client
            .create_entity(EntityInput::new("Project", "project").with_observations(["A"]))
            .await;
        assert!(result.success);
        client
            .create_entity(EntityInput::new("Phase", "phase").with_observations(["B"]))
            .await;

        assert_eq!(client.get_all_entities().await.len(), 2);
        assert_eq!(client.find_entities_by_type("phase").await[0].name, "Phase");
        assert!(client.find_entity_by_name("Project").await.is_some());
        assert!(client.find_entity_by_name("Nope").await.is_none());
        assert_eq!(client.latest_entity().await.unwrap().name, "Phase");
    }

    #[tokio::test]
    async fn test_create_entity_requires_name() {
        let (_dir, client) = local_client();
        let result = client.create_entity(EntityInput::default()).await;
        assert_eq!(result, OperationResult::failed("Entity must have a name"));
    }

    #[tokio::test]
    async fn test_relations() {
        let (_dir, client) = local_client();
        client.create_entity(EntityInput::new("a", "t")).await;
        client.create_entity(EntityInput::new("b", "t")).await;

        assert!(client.create_relation("a", "b", "r").await.success);
        assert_eq!(client.get_all_relations().await.len(), 1);

        let missing = client.create_relation("a", "ghost", "r").await;
        assert!(!missing.success);
        assert_eq!(
            missing.error.as_deref(),
            Some("RPC Error: Entity 'ghost' does not exist")
        );

        assert!(client.delete_relation("a", "b", None).await.success);
        assert!(client.get_all_relations().await.is_empty());

        let none = client.delete_relation("a", "b", None).await;
        assert_eq!(
            none.error.as_deref(),
            Some("RPC Error: No matching relations found")
        );
        assert!(!client.delete_relation("", "b", None).await.success);
    }

    #[tokio::test]
    async fn test_delete_entity() {
        let (_dir, client) = local_client();
        client.create_entity(EntityInput::new("a", "t")).await;

        let result = client.delete_entity("a").await;
        assert!(result.success);
        assert_eq!(
            result.message.as_deref(),
            Some("Entity 'a' deleted successfully")
        );

        let again = client.delete_entity("a").await;
        assert_eq!(again.error.as_deref(), Some("RPC Error: Entity 'a' not found"));

        let empty = client.delete_entity("").await;
        assert_eq!(empty.error.as_deref(), Some("Entity name is required"));
    }

    #[tokio::test]
    async fn test_delete_latest_entity() {
        let (_dir, client) = local_client();

        let result = client.delete_latest_entity().await;
        assert_eq!(result, OperationResult::failed("No entities found to delete"));

        client.create_entity(EntityInput::new("A", "t")).await;
        client.create_entity(EntityInput::new("B", "t")).await;
        client.create_entity(EntityInput::new("C", "t")).await;
        client
            .create_entity(EntityInput::new("B", "t").with_observations(["later"]))
            .await;

        assert!(client.delete_latest_entity().await.success);
        let names: Vec<_> = client
            .get_all_entities()
            .await
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }
}
