//! Project bootstrap memory

use super::store::MemoryStore;
use super::types::EntityInput;
use serde::{Deserialize, Serialize};

/// A relation to seed, by entity name
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SeedRelation {
    pub from: String,
    pub to: String,
    pub relation_type: String,
}

/// Entities and relations written by `init` and `POST /memory/initialize`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SeedSet {
    #[serde(default)]
    pub entities: Vec<EntityInput>,

    #[serde(default)]
    pub relations: Vec<SeedRelation>,
}

/// What a seed run changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub entities: usize,
    pub relations_created: usize,
}

impl Default for SeedSet {
    fn default() -> Self {
        fn entity(name: &str, kind: &str, obs: &[&str]) -> EntityInput {
            EntityInput::new(name, kind).with_observations(obs.iter().copied())
        }
        fn relation(to: &str, kind: &str) -> SeedRelation {
            SeedRelation {
                from: "Project".into(),
                to: to.into(),
                relation_type: kind.into(),
            }
        }

        Self {
            entities: vec![
                entity(
                    "Project",
                    "project",
                    &[
                        "Social Media Marketing Agent",
                        "Next.js web application",
                        "Uses Tailwind CSS for styling",
                        "Uses Shadcn UI for components",
                    ],
                ),
                entity(
                    "CurrentPhase",
                    "project_phase",
                    &[
                        "Phase 2: SME Dashboard & Content Management",
                        "Sprint 2: Dashboard Framework & Widgets",
                        "Development Mode: Prototyping (frontend-only with mocked data)",
                    ],
                ),
                entity(
                    "CompletedWork",
                    "milestone",
                    &[
                        "Completed Sprint 1 and Phase 1 (Core UI Framework & Authentication Flow)",
                        "Updated project management documents",
                        "Setup authentication UI and navigation shell",
                    ],
                ),
                entity(
                    "CurrentFocus",
                    "task_group",
                    &[
                        "Dashboard layout with widget grid",
                        "Widget container component implementation",
                        "Drag-and-drop functionality for widgets",
                        "Core widgets: Analytics, Content Calendar, Quick Actions, Recent Activity",
                    ],
                ),
            ],
            relations: vec![
                relation("CurrentPhase", "is_in"),
                relation("CompletedWork", "has_achieved"),
                relation("CurrentFocus", "is_working_on"),
            ],
        }
    }
}

impl SeedSet {
    /// Check that every seed entity is named and typed, and that relations
    /// only point at entities in the set or already in `store`
    pub fn validate(&self, store: &MemoryStore) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (i, entity) in self.entities.iter().enumerate() {
            if entity.name().is_none() || entity.entity_type().is_empty() {
                errors.push(format!("seed entity #{} needs a name and entityType", i + 1));
            }
        }

        let known = |name: &str| {
            store.get_entity(name).is_some() || self.entities.iter().any(|e| e.name() == Some(name))
        };
        for rel in &self.relations {
            for endpoint in [&rel.from, &rel.to] {
                if !known(endpoint.as_str()) {
                    errors.push(format!(
                        "seed relation {} -[{}]-> {} references unknown entity '{}'",
                        rel.from, rel.relation_type, rel.to, endpoint
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Upsert every seed entity, then create every relation. Safe to repeat.
    pub fn apply(&self, store: &mut MemoryStore) -> anyhow::Result<SeedReport> {
        self.validate(store).map_err(|errors| {
            anyhow::anyhow!("seed validation failed:\n  {}", errors.join("\n  "))
        })?;

        let mut report = SeedReport::default();
        for entity in &self.entities {
            store.upsert_entity(
                entity.name().unwrap_or_default(),
                entity.entity_type(),
                entity.observations.iter().cloned(),
            )?;
            report.entities += 1;
        }
        for rel in &self.relations {
            if store
                .create_relation(&rel.from, &rel.to, &rel.relation_type)?
                .is_created()
            {
                report.relations_created += 1;
            }
        }

        tracing::info!(
            entities = report.entities,
            relations = report.relations_created,
            "Project memory initialized"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_seed_applies_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut store = MemoryStore::open(dir.path().join("memory.json"));
        let seed = SeedSet::default();

        let first = seed.apply(&mut store).unwrap();
        assert_eq!(first.entities, 4);
        assert_eq!(first.relations_created, 3);

        let second = seed.apply(&mut store).unwrap();
        assert_eq!(second.relations_created, 0);

        assert_eq!(store.entities().count(), 4);
        assert_eq!(store.relations_for_entity("Project").len(), 3);
        assert_eq!(store.get_entity("Project").unwrap().observations.len(), 4);
        assert_eq!(store.latest_entity().unwrap().name, "CurrentFocus");
    }

    #[test]
    fn test_seed_from_toml() {
        let seed: SeedSet = toml::from_str(
            r#"
            [[entities]]
            name = "Service"
            entityType = "component"
            observations = ["Runs on port 3100"]

            [[relations]]
            from = "Service"
            to = "Service"
            relationType = "depends_on"
        "#,
        )
        .unwrap();

        assert_eq!(seed.entities.len(), 1);
        assert_eq!(seed.entities[0].entity_type(), "component");
        assert_eq!(seed.relations[0].relation_type, "depends_on");
    }

    #[test]
    fn test_validation_rejects_dangling_relations() {
        let dir = TempDir::new().unwrap();
        let mut store = MemoryStore::open(dir.path().join("memory.json"));
        let seed = SeedSet {
            entities: vec![EntityInput::new("A", "t")],
            relations: vec![SeedRelation {
                from: "A".into(),
                to: "Missing".into(),
                relation_type: "r".into(),
            }],
        };

        let errors = seed.validate(&store).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Missing"));

        assert!(seed.apply(&mut store).is_err());
        assert!(store.get_entity("A").is_none());
    }
}
