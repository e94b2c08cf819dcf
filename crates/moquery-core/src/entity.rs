//! Entity metadata: the table a logical model maps to.
//!
//! The query core never introspects models itself. It consumes an [`Entity`]
//! (table name, ordered fields, primary key) and, for join targets referenced
//! by name, an [`EntityResolver`] consulted only when SQL is composed.

use crate::types::SqlType;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A mapped column of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Database column name
    pub column: String,
    /// Semantic type of the column
    pub sql_type: SqlType,
}

impl FieldDef {
    pub fn new(column: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            column: column.into(),
            sql_type,
        }
    }
}

/// Table mapping for one logical entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// Registry name, e.g. `"shop.FruitProduct"`
    pub name: String,
    /// Database table name
    pub table: String,
    /// Mapped columns in declaration order
    pub fields: Vec<FieldDef>,
    /// Primary key column
    pub primary_key: String,
}

impl Entity {
    /// Create an entity with an `id` primary key and no fields yet.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            fields: Vec::new(),
            primary_key: "id".to_string(),
        }
    }

    /// Append a field.
    pub fn field(mut self, column: impl Into<String>, sql_type: SqlType) -> Self {
        self.fields.push(FieldDef::new(column, sql_type));
        self
    }

    /// Set the primary key column.
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    /// Column names in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.column.as_str())
    }
}

/// Looks up entities by registry name.
///
/// Implemented by whatever owns the model metadata. Lookups happen at
/// composition time, so entities may be registered after a query that
/// references them was built.
pub trait EntityResolver: Send + Sync {
    fn resolve_entity(&self, name: &str) -> Option<Entity>;
}

/// An in-process [`EntityResolver`] backed by a map.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: RwLock<HashMap<String, Entity>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared registry.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register (or replace) an entity under its name.
    pub fn register(&self, entity: Entity) {
        let mut entities = self
            .entities
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        tracing::trace!(name = %entity.name, table = %entity.table, "registered entity");
        entities.insert(entity.name.clone(), entity);
    }

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.entities
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EntityResolver for EntityRegistry {
    fn resolve_entity(&self, name: &str) -> Option<Entity> {
        self.entities
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn department() -> Entity {
        Entity::new("staff.Department", "staff_department")
            .field("id", SqlType::Integer)
            .field("name", SqlType::VarChar(50))
    }

    #[test]
    fn builder_collects_fields_in_order() {
        let entity = department();
        assert_eq!(entity.columns().collect::<Vec<_>>(), vec!["id", "name"]);
        assert_eq!(entity.primary_key, "id");
    }

    #[test]
    fn registry_resolves_after_late_registration() {
        let registry = EntityRegistry::new();
        assert!(registry.resolve_entity("staff.Department").is_none());

        registry.register(department());
        let found = registry.resolve_entity("staff.Department").unwrap();
        assert_eq!(found.table, "staff_department");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn register_replaces_existing_entry() {
        let registry = EntityRegistry::new();
        registry.register(department());
        registry.register(department().primary_key("name"));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry
                .resolve_entity("staff.Department")
                .unwrap()
                .primary_key,
            "name"
        );
    }
}
