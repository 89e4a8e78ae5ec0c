//! Insertion-ordered entity table
//!
//! A plain map loses enumeration order, and "latest entity" is defined by
//! insertion order, so the table keeps an explicit key list beside the map.
//! The JSON form is an object whose keys follow that order.

use super::types::Entity;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityTable {
    by_name: HashMap<String, Entity>,
    order: Vec<String>,
}

impl EntityTable {
    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.by_name.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Entity> {
        self.by_name.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Insert or replace. A new name goes to the end of the order; a
    /// replaced name keeps its original position.
    pub fn insert(&mut self, entity: Entity) -> Option<Entity> {
        let name = entity.name.clone();
        let previous = self.by_name.insert(name.clone(), entity);
        if previous.is_none() {
            self.order.push(name);
        }
        previous
    }

    pub fn remove(&mut self, name: &str) -> Option<Entity> {
        let removed = self.by_name.remove(name)?;
        self.order.retain(|n| n != name);
        Some(removed)
    }

    /// Entities in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.order.iter().filter_map(|name| self.by_name.get(name))
    }

    /// Most recently inserted entity (updates don't move it)
    pub fn last(&self) -> Option<&Entity> {
        self.order.last().and_then(|name| self.by_name.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Serialize for EntityTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.order.len()))?;
        for entity in self.iter() {
            map.serialize_entry(&entity.name, entity)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EntityTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(TableVisitor)
    }
}

struct TableVisitor;

impl<'de> Visitor<'de> for TableVisitor {
    type Value = EntityTable;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object mapping entity names to entities")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut table = EntityTable::default();
        while let Some((key, mut entity)) = access.next_entry::<String, Entity>()? {
            entity.name = key;
            table.insert(entity);
        }
        Ok(table)
    }
}
