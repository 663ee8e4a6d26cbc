use std::collections::BTreeMap;

use super::database::DatabaseDescriptor;
use super::entity::EntityDescriptor;
use super::types::property;
use crate::error::DescriptorError;

/// Root of the descriptor tree. Owns every resolved database.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
    database_descriptor_paths: Vec<String>,
    library_descriptor_paths: Vec<String>,
    event_handlers: Vec<String>,
    databases: Vec<DatabaseDescriptor>,
    properties: BTreeMap<String, String>,
}

impl ApplicationDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn identity(&self) -> String {
        if self.name.is_empty() {
            "application".to_string()
        } else {
            format!("application {}", self.name)
        }
    }

    pub fn add_property(&mut self, name: &str, value: &str) {
        match name.to_ascii_lowercase().as_str() {
            property::NAME => self.name = value.trim().to_string(),
            property::DESCRIPTION => self.description = Some(value.trim().to_string()),
            property::VERSION => self.version = Some(value.trim().to_string()),
            other => {
                self.properties.insert(other.to_string(), value.to_string());
            }
        }
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn add_database_descriptor_path(&mut self, path: impl Into<String>) {
        self.database_descriptor_paths.push(path.into());
    }

    pub fn database_descriptor_paths(&self) -> &[String] {
        &self.database_descriptor_paths
    }

    pub fn add_library_descriptor_path(&mut self, path: impl Into<String>) {
        self.library_descriptor_paths.push(path.into());
    }

    pub fn library_descriptor_paths(&self) -> &[String] {
        &self.library_descriptor_paths
    }

    pub fn add_event_handler(&mut self, handler: impl Into<String>) {
        self.event_handlers.push(handler.into());
    }

    pub fn event_handlers(&self) -> &[String] {
        &self.event_handlers
    }

    /// Attach a database; names must be unique within the application
    pub fn add_database(&mut self, database: DatabaseDescriptor) -> Result<(), DescriptorError> {
        if self.database(&database.database_name).is_some() {
            return Err(DescriptorError::Duplicate {
                descriptor: self.identity(),
                field: property::DATABASE_NAME.to_string(),
                value: database.database_name,
            });
        }
        self.databases.push(database);
        Ok(())
    }

    pub fn with_database(mut self, database: DatabaseDescriptor) -> Result<Self, DescriptorError> {
        self.add_database(database)?;
        Ok(self)
    }

    pub fn databases(&self) -> &[DatabaseDescriptor] {
        &self.databases
    }

    pub(crate) fn databases_mut(&mut self) -> &mut [DatabaseDescriptor] {
        &mut self.databases
    }

    pub fn database(&self, name: &str) -> Option<&DatabaseDescriptor> {
        self.databases.iter().find(|d| d.database_name == name)
    }

    pub fn database_position(&self, name: &str) -> Option<usize> {
        self.databases.iter().position(|d| d.database_name == name)
    }

    /// Database that maps `class_name`, with the entity itself
    pub fn entity(&self, class_name: &str) -> Option<(usize, &DatabaseDescriptor, &EntityDescriptor)> {
        self.databases.iter().enumerate().find_map(|(i, database)| {
            database
                .entity_by_class_name(class_name)
                .map(|entity| (i, database, entity))
        })
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.name.is_empty() {
            return Err(DescriptorError::missing(self.identity(), property::NAME));
        }
        Ok(())
    }
}

/// Externally packaged entities, merged into named databases before resolution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibraryDescriptor {
    pub name: String,
    pub description: Option<String>,
    entity_descriptor_paths: Vec<String>,
    properties: BTreeMap<String, String>,
}

impl LibraryDescriptor {
    pub fn identity(&self) -> String {
        if self.name.is_empty() {
            "library".to_string()
        } else {
            format!("library {}", self.name)
        }
    }

    pub fn add_property(&mut self, name: &str, value: &str) {
        match name.to_ascii_lowercase().as_str() {
            property::NAME => self.name = value.trim().to_string(),
            property::DESCRIPTION => self.description = Some(value.trim().to_string()),
            other => {
                self.properties.insert(other.to_string(), value.to_string());
            }
        }
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn add_entity_descriptor_path(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.entity_descriptor_paths.contains(&path) {
            self.entity_descriptor_paths.push(path);
        }
    }

    pub fn entity_descriptor_paths(&self) -> &[String] {
        &self.entity_descriptor_paths
    }

    /// `(database name, relative path)` for every entity path, split on the first `.`
    pub fn entity_targets(&self) -> Result<Vec<(&str, &str)>, DescriptorError> {
        self.entity_descriptor_paths
            .iter()
            .map(|path| match path.split_once('.') {
                Some((database, relative)) if !database.is_empty() && !relative.is_empty() => {
                    Ok((database, relative))
                }
                _ => Err(DescriptorError::invalid(
                    self.identity(),
                    "entity_descriptor",
                    path.as_str(),
                )),
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.name.is_empty() {
            return Err(DescriptorError::missing(self.identity(), property::NAME));
        }
        self.entity_targets().map(|_| ())
    }
}
