//! Entity and relation records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named, typed record holding free-text observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Unique key; the table key wins if a loaded record disagrees
    #[serde(default)]
    pub name: String,

    /// Older files may lack it; loads as empty
    #[serde(default)]
    pub entity_type: String,

    /// Insertion-ordered, no exact duplicates
    #[serde(default)]
    pub observations: Vec<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Create a fresh entity with no observations
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            observations: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append observations that are not already present (exact match).
    /// Returns how many were added.
    pub fn merge_observations<I, S>(&mut self, observations: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = 0;
        for obs in observations {
            let obs = obs.into();
            if !self.observations.contains(&obs) {
                self.observations.push(obs);
                added += 1;
            }
        }
        added
    }

    /// Case-insensitive substring match on name, type, or any observation.
    /// `needle` must already be lowercased.
    pub fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self.entity_type.to_lowercase().contains(needle)
            || self
                .observations
                .iter()
                .any(|obs| obs.to_lowercase().contains(needle))
    }
}

/// A directed, typed edge between two entity names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub relation_type: String,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Relation {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            relation_type: relation_type.into(),
            created_at: Utc::now(),
        }
    }

    /// Same (from, to, relationType) triple
    pub fn is_same_edge(&self, from: &str, to: &str, relation_type: &str) -> bool {
        self.from == from && self.to == to && self.relation_type == relation_type
    }

    /// Entity appears at either end
    pub fn touches(&self, name: &str) -> bool {
        self.from == name || self.to == name
    }
}

/// Create/upsert payload as it arrives from callers.
///
/// Every field is optional here so presence checks surface as validation
/// messages instead of deserialization failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityInput {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub entity_type: Option<String>,

    #[serde(default)]
    pub observations: Vec<String>,
}

impl EntityInput {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            entity_type: Some(entity_type.into()),
            observations: Vec::new(),
        }
    }

    pub fn with_observations<I, S>(mut self, observations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.observations = observations.into_iter().map(Into::into).collect();
        self
    }

    /// Name, treating empty as absent
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }

    pub fn entity_type(&self) -> &str {
        self.entity_type.as_deref().unwrap_or_default()
    }
}

/// Result of a relation create
#[derive(Debug, Clone, PartialEq)]
pub enum RelationOutcome {
    Created(Relation),
    /// The exact triple already exists; nothing was written
    AlreadyExists,
}

impl RelationOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, RelationOutcome::Created(_))
    }
}

/// Result of a delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// `count` is entities or relations removed, depending on the call.
    /// Entity deletes also report the relations swept with them.
    Deleted { count: usize, cascaded: usize },
    NotFound,
}

impl DeleteOutcome {
    pub fn is_deleted(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted { .. })
    }

    pub fn count(&self) -> usize {
        match self {
            DeleteOutcome::Deleted { count, .. } => *count,
            DeleteOutcome::NotFound => 0,
        }
    }
}
