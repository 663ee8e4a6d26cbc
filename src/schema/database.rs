use std::collections::BTreeMap;

use super::entity::EntityDescriptor;
use super::types::{parse_flag, property, Relationship};
use crate::error::DescriptorError;

/// Dialect used when a database descriptor does not name one
pub const DEFAULT_DIALECT: &str = "sqlite";

/// File suffix of a physical database
pub const DATABASE_FILE_SUFFIX: &str = ".db";

/// One configured database and, once resolved, the entities it owns
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseDescriptor {
    pub database_name: String,
    pub description: Option<String>,
    /// Dialect identifier
    pub dialect: String,
    pub version: i64,
    pub transaction_safe: bool,
    pub external_storage: bool,
    entity_descriptor_paths: Vec<String>,
    /// path -> entity, insertion ordered, keys unique
    entities: Vec<(String, EntityDescriptor)>,
    properties: BTreeMap<String, String>,
}

impl Default for DatabaseDescriptor {
    fn default() -> Self {
        Self {
            database_name: String::new(),
            description: None,
            dialect: DEFAULT_DIALECT.to_string(),
            version: 0,
            transaction_safe: false,
            external_storage: false,
            entity_descriptor_paths: Vec::new(),
            entities: Vec::new(),
            properties: BTreeMap::new(),
        }
    }
}

impl DatabaseDescriptor {
    pub fn new(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            ..Self::default()
        }
    }

    pub fn with_version(self, version: i64) -> Self {
        Self { version, ..self }
    }

    /// Builder-style `add_entity_descriptor`, keyed by class name
    pub fn with_entity(mut self, entity: EntityDescriptor) -> Self {
        let path = entity.class_name.clone();
        self.add_entity_descriptor_path(path.clone());
        self.add_entity_descriptor(path, entity);
        self
    }

    pub fn identity(&self) -> String {
        if self.database_name.is_empty() {
            "database".to_string()
        } else {
            format!("database {}", self.database_name)
        }
    }

    /// Name of the physical file, `.db` appended when missing
    pub fn file_name(&self) -> String {
        if self.database_name.ends_with(DATABASE_FILE_SUFFIX) {
            self.database_name.clone()
        } else {
            format!("{}{}", self.database_name, DATABASE_FILE_SUFFIX)
        }
    }

    pub fn add_property(&mut self, name: &str, value: &str) -> Result<(), DescriptorError> {
        let context = self.identity();

        match name.to_ascii_lowercase().as_str() {
            property::DATABASE_NAME => self.database_name = value.trim().to_string(),
            property::DESCRIPTION => self.description = Some(value.trim().to_string()),
            property::TYPE => {
                let dialect = value.trim();
                self.dialect = if dialect.is_empty() {
                    DEFAULT_DIALECT.to_string()
                } else {
                    dialect.to_ascii_lowercase()
                };
            }
            property::VERSION => {
                let version = value.trim();
                self.version = if version.is_empty() {
                    0
                } else {
                    version
                        .parse()
                        .map_err(|_| DescriptorError::invalid(context, property::VERSION, value))?
                };
            }
            property::TRANSACTION_SAFE => {
                self.transaction_safe = parse_flag(&context, property::TRANSACTION_SAFE, value)?
            }
            property::EXTERNAL_STORAGE => {
                self.external_storage = parse_flag(&context, property::EXTERNAL_STORAGE, value)?
            }
            other => {
                self.properties.insert(other.to_string(), value.to_string());
            }
        }
        Ok(())
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Register an entity descriptor path; repeated paths are ignored
    pub fn add_entity_descriptor_path(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.entity_descriptor_paths.contains(&path) {
            self.entity_descriptor_paths.push(path);
        }
    }

    pub fn entity_descriptor_paths(&self) -> &[String] {
        &self.entity_descriptor_paths
    }

    /// Attach a parsed entity under its path. Re-adding a path replaces the entity in place.
    pub fn add_entity_descriptor(&mut self, path: impl Into<String>, entity: EntityDescriptor) {
        let path = path.into();
        match self.entities.iter_mut().find(|(p, _)| *p == path) {
            Some((_, existing)) => *existing = entity,
            None => self.entities.push((path, entity)),
        }
    }

    /// Entities in insertion order
    pub fn entities(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.iter().map(|(_, e)| e)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entity_at(&self, index: usize) -> Option<&EntityDescriptor> {
        self.entities.get(index).map(|(_, e)| e)
    }

    pub(crate) fn entity_at_mut(&mut self, index: usize) -> Option<&mut EntityDescriptor> {
        self.entities.get_mut(index).map(|(_, e)| e)
    }

    pub fn entity_by_path(&self, path: &str) -> Option<&EntityDescriptor> {
        self.entities
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, e)| e)
    }

    pub fn position_of_class(&self, class_name: &str) -> Option<usize> {
        self.entities
            .iter()
            .position(|(_, e)| e.class_name == class_name)
    }

    pub fn entity_by_class_name(&self, class_name: &str) -> Option<&EntityDescriptor> {
        self.position_of_class(class_name)
            .and_then(|i| self.entity_at(i))
    }

    pub fn entity_by_table_name(&self, table_name: &str) -> Option<&EntityDescriptor> {
        self.entities()
            .find(|e| e.table_name.eq_ignore_ascii_case(table_name))
    }

    /// Target of a resolved relationship
    pub fn referred_entity(&self, relationship: &Relationship) -> Option<&EntityDescriptor> {
        relationship
            .referred_index()
            .and_then(|i| self.entity_at(i))
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        let identity = self.identity();
        if self.database_name.is_empty() {
            return Err(DescriptorError::missing(identity, property::DATABASE_NAME));
        }
        if self.version < 0 {
            return Err(DescriptorError::invalid(
                identity,
                property::VERSION,
                self.version.to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_suffix() {
        assert_eq!(DatabaseDescriptor::new("shop").file_name(), "shop.db");
        assert_eq!(DatabaseDescriptor::new("shop.db").file_name(), "shop.db");
    }

    #[test]
    fn test_properties() {
        let mut database = DatabaseDescriptor::default();
        database.add_property("database_name", "shop").unwrap();
        database.add_property("version", "3").unwrap();
        database.add_property("type", "").unwrap();
        database.add_property("transaction_safe", "true").unwrap();

        assert_eq!(database.version, 3);
        assert_eq!(database.dialect, DEFAULT_DIALECT);
        assert!(database.transaction_safe);
        assert!(!database.external_storage);
        assert!(database.add_property("version", "two").is_err());
    }

    #[test]
    fn test_validate_version() {
        let database = DatabaseDescriptor::new("shop").with_version(-1);
        assert!(database.validate().is_err());
        assert!(DatabaseDescriptor::default().validate().is_err());
    }

    #[test]
    fn test_entity_map_keeps_insertion_order() {
        let mut database = DatabaseDescriptor::new("shop");
        database.add_entity_descriptor("b.json", EntityDescriptor::new("B", "B"));
        database.add_entity_descriptor("a.json", EntityDescriptor::new("A", "A"));
        database.add_entity_descriptor("b.json", EntityDescriptor::new("B2", "B"));

        let tables: Vec<_> = database.entities().map(|e| e.table_name.as_str()).collect();
        assert_eq!(tables, vec!["B2", "A"]);
        assert_eq!(database.position_of_class("A"), Some(1));
        assert!(database.entity_by_table_name("b2").is_some());
    }
}
