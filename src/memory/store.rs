//! Entity/relation memory store

use super::error::StoreError;
use super::persist::{MemoryDocument, load_document, save_document};
use super::types::{DeleteOutcome, Entity, Relation, RelationOutcome};
use chrono::Utc;
use std::path::{Path, PathBuf};

/// In-process entity/relation store backed by one JSON file.
///
/// Every effective mutation rewrites the whole file before returning. A
/// failed write is logged and the in-memory change is kept. The store has no
/// locking of its own; share it behind a mutex.
#[derive(Debug)]
pub struct MemoryStore {
    path: PathBuf,
    doc: MemoryDocument,
}

impl MemoryStore {
    /// Open the store at `path`, starting empty if the file is missing or bad
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = load_document(&path);
        Self { path, doc }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full snapshot of entities and relations
    pub fn document(&self) -> &MemoryDocument {
        &self.doc
    }

    fn persist(&self) {
        if let Err(e) = save_document(&self.path, &self.doc) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Error saving memory; in-memory state kept"
            );
        }
    }

    /// Create `name`, or fold `observations` into the existing entity.
    ///
    /// On update the type argument is ignored and the original type kept.
    /// `updatedAt` is refreshed either way.
    pub fn upsert_entity<I, S>(
        &mut self,
        name: &str,
        entity_type: &str,
        observations: I,
    ) -> Result<Entity, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if name.is_empty() {
            return Err(StoreError::validation("Entity name and type are required"));
        }

        let entity = match self.doc.entities.get_mut(name) {
            Some(existing) => {
                existing.merge_observations(observations);
                existing.updated_at = Utc::now();
                tracing::debug!(entity = name, "Updated entity");
                existing.clone()
            }
            None => {
                if entity_type.is_empty() {
                    return Err(StoreError::validation("Entity name and type are required"));
                }
                let mut entity = Entity::new(name, entity_type);
                entity.merge_observations(observations);
                self.doc.entities.insert(entity.clone());
                tracing::debug!(entity = name, entity_type, "Created entity");
                entity
            }
        };

        self.persist();
        Ok(entity)
    }

    /// Add a directed relation between two existing entities.
    /// A repeated (from, to, relationType) triple is a no-op.
    pub fn create_relation(
        &mut self,
        from: &str,
        to: &str,
        relation_type: &str,
    ) -> Result<RelationOutcome, StoreError> {
        if from.is_empty() || to.is_empty() || relation_type.is_empty() {
            return Err(StoreError::validation(
                "From, to, and relationType are required",
            ));
        }
        for endpoint in [from, to] {
            if !self.doc.entities.contains(endpoint) {
                return Err(StoreError::not_found(format!(
                    "Entity '{}' does not exist",
                    endpoint
                )));
            }
        }

        if self
            .doc
            .relations
            .iter()
            .any(|r| r.is_same_edge(from, to, relation_type))
        {
            return Ok(RelationOutcome::AlreadyExists);
        }

        let relation = Relation::new(from, to, relation_type);
        self.doc.relations.push(relation.clone());
        self.persist();
        Ok(RelationOutcome::Created(relation))
    }

    /// Remove an entity and every relation that references it, in one write
    pub fn delete_entity(&mut self, name: &str) -> DeleteOutcome {
        if self.doc.entities.remove(name).is_none() {
            return DeleteOutcome::NotFound;
        }

        let before = self.doc.relations.len();
        self.doc.relations.retain(|r| !r.touches(name));
        let cascaded = before - self.doc.relations.len();

        self.persist();
        tracing::debug!(entity = name, cascaded, "Deleted entity");
        DeleteOutcome::Deleted { count: 1, cascaded }
    }

    /// Remove relations from `from` to `to`. With no type, every type between
    /// the pair goes; with a type, only that exact edge.
    pub fn delete_relation(
        &mut self,
        from: &str,
        to: &str,
        relation_type: Option<&str>,
    ) -> Result<DeleteOutcome, StoreError> {
        if from.is_empty() || to.is_empty() {
            return Err(StoreError::validation(
                "Both from and to entity names are required",
            ));
        }
        let relation_type = relation_type.filter(|t| !t.is_empty());

        let before = self.doc.relations.len();
        self.doc.relations.retain(|r| {
            let pair = r.from == from && r.to == to;
            let kind = relation_type.is_none_or(|t| r.relation_type == t);
            !(pair && kind)
        });
        let count = before - self.doc.relations.len();

        if count == 0 {
            return Ok(DeleteOutcome::NotFound);
        }
        self.persist();
        Ok(DeleteOutcome::Deleted { count, cascaded: 0 })
    }

    /// Case-insensitive substring search over name, type, and observations.
    /// An empty query matches nothing.
    pub fn search_entities(&self, query: &str) -> Vec<&Entity> {
        if query.is_empty() {
            return Vec::new();
        }
        let needle = query.to_lowercase();
        self.doc.entities.iter().filter(|e| e.matches(&needle)).collect()
    }

    pub fn entities_by_type(&self, entity_type: &str) -> Vec<&Entity> {
        self.doc
            .entities
            .iter()
            .filter(|e| e.entity_type == entity_type)
            .collect()
    }

    /// Relations where `name` is either end
    pub fn relations_for_entity(&self, name: &str) -> Vec<&Relation> {
        self.doc.relations.iter().filter(|r| r.touches(name)).collect()
    }

    /// Last entity by insertion order, not by modification time
    pub fn latest_entity(&self) -> Option<&Entity> {
        self.doc.entities.last()
    }

    pub fn get_entity(&self, name: &str) -> Option<&Entity> {
        self.doc.entities.get(name)
    }

    /// All entities in insertion order
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.doc.entities.iter()
    }

    pub fn relations(&self) -> &[Relation] {
        &self.doc.relations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, MemoryStore) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::open(dir.path().join("memory.json"));
        (dir, store)
    }

    fn no_obs() -> Vec<String> {
        Vec::new()
    }

    #[test]
    fn test_upsert_creates_then_merges() {
        let (_dir, mut store) = open_temp();

        let created = store.upsert_entity("Project", "project", ["A", "B"]).unwrap();
        assert_eq!(created.observations, vec!["A", "B"]);

        let merged = store
            .upsert_entity("Project", "ignored", ["B", "C", "A", "D"])
            .unwrap();
        assert_eq!(merged.entity_type, "project");
        assert_eq!(merged.observations, vec!["A", "B", "C", "D"]);
        assert_eq!(merged.created_at, created.created_at);
        assert!(merged.updated_at >= created.updated_at);
        assert_eq!(store.entities().count(), 1);
    }

    #[test]
    fn test_upsert_requires_name_and_type() {
        let (_dir, mut store) = open_temp();

        let err = store.upsert_entity("", "project", no_obs()).unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));

        let err = store.upsert_entity("Project", "", no_obs()).unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
        assert!(store.get_entity("Project").is_none());
    }

    #[test]
    fn test_failed_validation_does_not_write() {
        let (dir, mut store) = open_temp();
        let path = dir.path().join("memory.json");
        let before = std::fs::read_to_string(&path).unwrap();

        let _ = store.upsert_entity("", "", no_obs());
        let _ = store.create_relation("a", "b", "");

        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_update_path_accepts_empty_type() {
        let (_dir, mut store) = open_temp();
        store.upsert_entity("Project", "project", ["A"]).unwrap();

        let updated = store.upsert_entity("Project", "", ["B"]).unwrap();
        assert_eq!(updated.entity_type, "project");
        assert_eq!(updated.observations, vec!["A", "B"]);
    }

    #[test]
    fn test_relation_scenario() {
        let (_dir, mut store) = open_temp();
        store.upsert_entity("Project", "project", ["A"]).unwrap();
        store.upsert_entity("Phase", "phase", ["B"]).unwrap();

        let outcome = store.create_relation("Project", "Phase", "is_in").unwrap();
        assert!(outcome.is_created());

        let relations = store.relations_for_entity("Project");
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].from, "Project");
        assert_eq!(relations[0].to, "Phase");
        assert_eq!(relations[0].relation_type, "is_in");
    }

    #[test]
    fn test_duplicate_relation_is_noop() {
        let (_dir, mut store) = open_temp();
        store.upsert_entity("a", "t", no_obs()).unwrap();
        store.upsert_entity("b", "t", no_obs()).unwrap();

        assert!(store.create_relation("a", "b", "r").unwrap().is_created());
        assert_eq!(
            store.create_relation("a", "b", "r").unwrap(),
            RelationOutcome::AlreadyExists
        );
        // Reverse direction is a different edge
        assert!(store.create_relation("b", "a", "r").unwrap().is_created());
        assert_eq!(store.relations().len(), 2);
    }

    #[test]
    fn test_relation_requires_existing_entities() {
        let (_dir, mut store) = open_temp();
        store.upsert_entity("a", "t", no_obs()).unwrap();

        let err = store.create_relation("a", "ghost", "r").unwrap_err();
        assert_eq!(err, StoreError::not_found("Entity 'ghost' does not exist"));

        let err = store.create_relation("a", "a", "").unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
        assert!(store.relations().is_empty());
    }

    #[test]
    fn test_delete_entity_cascades() {
        let (_dir, mut store) = open_temp();
        for name in ["a", "b", "c"] {
            store.upsert_entity(name, "t", no_obs()).unwrap();
        }
        store.create_relation("a", "b", "r").unwrap();
        store.create_relation("c", "a", "r").unwrap();
        store.create_relation("b", "c", "r").unwrap();

        let outcome = store.delete_entity("a");
        assert_eq!(
            outcome,
            DeleteOutcome::Deleted {
                count: 1,
                cascaded: 2
            }
        );
        assert!(store.relations_for_entity("a").is_empty());
        assert_eq!(store.relations().len(), 1);

        assert_eq!(store.delete_entity("a"), DeleteOutcome::NotFound);
    }

    #[test]
    fn test_delete_relation_without_type_removes_all_between_pair() {
        let (_dir, mut store) = open_temp();
        store.upsert_entity("Project", "project", no_obs()).unwrap();
        store.upsert_entity("Phase", "phase", no_obs()).unwrap();
        store.create_relation("Project", "Phase", "is_in").unwrap();
        store.create_relation("Project", "Phase", "follows").unwrap();

        let outcome = store.delete_relation("Project", "Phase", None).unwrap();
        assert_eq!(outcome.count(), 2);
        assert!(store.relations_for_entity("Project").is_empty());
    }

    #[test]
    fn test_delete_relation_with_type_is_exact() {
        let (_dir, mut store) = open_temp();
        store.upsert_entity("a", "t", no_obs()).unwrap();
        store.upsert_entity("b", "t", no_obs()).unwrap();
        store.create_relation("a", "b", "x").unwrap();
        store.create_relation("a", "b", "y").unwrap();

        assert_eq!(store.delete_relation("a", "b", Some("x")).unwrap().count(), 1);
        assert_eq!(
            store.delete_relation("a", "b", Some("x")).unwrap(),
            DeleteOutcome::NotFound
        );
        assert_eq!(store.relations()[0].relation_type, "y");

        // Direction matters
        assert_eq!(
            store.delete_relation("b", "a", None).unwrap(),
            DeleteOutcome::NotFound
        );
        assert!(store.delete_relation("", "b", None).is_err());
    }

    #[test]
    fn test_search() {
        let (_dir, mut store) = open_temp();
        store
            .upsert_entity("CurrentFocus", "task_group", ["Drag-and-drop widgets"])
            .unwrap();
        store.upsert_entity("Project", "project", ["Next.js app"]).unwrap();

        assert!(store.search_entities("").is_empty());
        assert_eq!(store.search_entities("FOCUS").len(), 1);
        assert_eq!(store.search_entities("task_").len(), 1);
        assert_eq!(store.search_entities("next.JS")[0].name, "Project");
        assert_eq!(store.search_entities("t").len(), 2);
        assert!(store.search_entities("calendar").is_empty());
    }

    #[test]
    fn test_entities_by_type_is_exact() {
        let (_dir, mut store) = open_temp();
        store.upsert_entity("a", "milestone", no_obs()).unwrap();
        store.upsert_entity("b", "Milestone", no_obs()).unwrap();
        store.upsert_entity("c", "milestone", no_obs()).unwrap();

        let names: Vec<_> = store
            .entities_by_type("milestone")
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_latest_is_insertion_order_not_update_order() {
        let (_dir, mut store) = open_temp();
        assert!(store.latest_entity().is_none());

        for name in ["A", "B", "C"] {
            store.upsert_entity(name, "t", no_obs()).unwrap();
        }
        store.upsert_entity("B", "t", ["touched"]).unwrap();

        assert_eq!(store.latest_entity().unwrap().name, "C");

        store.delete_entity("C");
        assert_eq!(store.latest_entity().unwrap().name, "B");
    }

    #[test]
    fn test_reopen_reproduces_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memory.json");

        {
            let mut store = MemoryStore::open(&path);
            for name in ["C", "A", "B"] {
                store.upsert_entity(name, "t", [format!("{} obs", name)]).unwrap();
            }
            store.create_relation("C", "A", "r1").unwrap();
            store.create_relation("A", "B", "r2").unwrap();
            store.upsert_entity("A", "t", ["later"]).unwrap();
        }

        let reopened = MemoryStore::open(&path);
        let names: Vec<_> = reopened.entities().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
        assert_eq!(reopened.latest_entity().unwrap().name, "B");
        assert_eq!(
            reopened.get_entity("A").unwrap().observations,
            vec!["A obs", "later"]
        );

        let rel_types: Vec<_> = reopened
            .relations()
            .iter()
            .map(|r| r.relation_type.as_str())
            .collect();
        assert_eq!(rel_types, vec!["r1", "r2"]);
    }

    #[test]
    fn test_write_failure_keeps_in_memory_change() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be makes every write fail
        let path = dir.path().join("memory.json");
        std::fs::create_dir(&path).unwrap();

        let mut store = MemoryStore::open(&path);
        let entity = store.upsert_entity("a", "t", no_obs()).unwrap();

        assert_eq!(entity.name, "a");
        assert!(store.get_entity("a").is_some());
    }
}
