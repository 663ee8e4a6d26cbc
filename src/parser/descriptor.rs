//! Reads descriptor documents into the descriptor model and resolves them.
//!
//! Every document is a JSON object. Scalar members are handed to the
//! element's `add_property`; list members carry the nested collections.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::source::{sibling_path, DescriptorSource};
use crate::error::{DescriptorError, Result};
use crate::schema::{
    property, resolve, ApplicationDescriptor, Attribute, DatabaseDescriptor, EntityDescriptor,
    Index, LibraryDescriptor, Relationship,
};

/// Label used in errors about the application document itself
const APPLICATION_DOCUMENT: &str = "application descriptor";

#[derive(Debug, Deserialize)]
struct RawApplication {
    #[serde(default)]
    database_descriptors: Vec<String>,
    #[serde(default)]
    library_descriptors: Vec<String>,
    #[serde(default)]
    event_handlers: Vec<String>,
    #[serde(flatten)]
    properties: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawDatabase {
    #[serde(default)]
    entity_descriptors: Vec<String>,
    #[serde(flatten)]
    properties: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawLibrary {
    #[serde(default)]
    entity_descriptors: Vec<String>,
    #[serde(flatten)]
    properties: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawIndex {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(flatten)]
    properties: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    #[serde(default)]
    attributes: Vec<Map<String, Value>>,
    #[serde(default)]
    indexes: Vec<RawIndex>,
    #[serde(default)]
    relationships: Vec<Map<String, Value>>,
    #[serde(flatten)]
    properties: Map<String, Value>,
}

fn from_text<'a, T: Deserialize<'a>>(path: &str, text: &'a str) -> Result<T, DescriptorError> {
    serde_json::from_str(text).map_err(|err| DescriptorError::Malformed {
        path: path.to_string(),
        message: err.to_string(),
    })
}

/// Scalar members as `(name, text)`; nested members are skipped
fn scalars(map: &Map<String, Value>) -> impl Iterator<Item = (&str, String)> {
    map.iter().filter_map(|(name, value)| {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Null => return None,
            Value::Array(_) | Value::Object(_) => {
                tracing::debug!(member = %name, "ignoring nested descriptor member");
                return None;
            }
        };
        Some((name.as_str(), text))
    })
}

pub fn parse_application(text: &str) -> Result<ApplicationDescriptor, DescriptorError> {
    let raw: RawApplication = from_text(APPLICATION_DOCUMENT, text)?;

    let mut application = ApplicationDescriptor::default();
    for (name, value) in scalars(&raw.properties) {
        application.add_property(name, &value);
    }
    for path in raw.database_descriptors {
        application.add_database_descriptor_path(path);
    }
    for path in raw.library_descriptors {
        application.add_library_descriptor_path(path);
    }
    for handler in raw.event_handlers {
        application.add_event_handler(handler);
    }
    Ok(application)
}

pub fn parse_database(path: &str, text: &str) -> Result<DatabaseDescriptor, DescriptorError> {
    let raw: RawDatabase = from_text(path, text)?;

    let mut database = DatabaseDescriptor::default();
    for (name, value) in scalars(&raw.properties) {
        database
            .add_property(name, &value)
            .map_err(|err| err.within(path))?;
    }
    for entity_path in raw.entity_descriptors {
        database.add_entity_descriptor_path(entity_path);
    }
    Ok(database)
}

pub fn parse_library(path: &str, text: &str) -> Result<LibraryDescriptor, DescriptorError> {
    let raw: RawLibrary = from_text(path, text)?;

    let mut library = LibraryDescriptor::default();
    for (name, value) in scalars(&raw.properties) {
        library.add_property(name, &value);
    }
    for entity_path in raw.entity_descriptors {
        library.add_entity_descriptor_path(entity_path);
    }
    Ok(library)
}

pub fn parse_entity(path: &str, text: &str) -> Result<EntityDescriptor, DescriptorError> {
    let raw: RawEntity = from_text(path, text)?;

    let mut entity = EntityDescriptor::default();
    for (name, value) in scalars(&raw.properties) {
        entity.add_property(name, &value);
    }

    for bag in &raw.attributes {
        let mut attribute = Attribute::default();
        for (name, value) in scalars(bag) {
            attribute
                .add_property(name, &value)
                .map_err(|err| err.within(path))?;
        }
        entity.add_attribute(attribute);
    }

    for raw_index in &raw.indexes {
        let mut index = Index::default();
        for (name, value) in scalars(&raw_index.properties) {
            index
                .add_property(name, &value)
                .map_err(|err| err.within(path))?;
        }
        for column in &raw_index.columns {
            index.add_column(column.trim());
        }
        entity.add_index(index);
    }

    for bag in &raw.relationships {
        let mut relationship = Relationship::empty();
        for (name, value) in scalars(bag) {
            relationship
                .add_property(name, &value)
                .map_err(|err| err.within(path))?;
        }
        entity.add_relationship(relationship);
    }

    Ok(entity)
}

/// Read, validate and resolve the whole descriptor tree rooted at the
/// application document `text`.
///
/// Database and entity paths are looked up in `source` as written. Entity
/// paths contributed by a library are relative to the library document.
pub fn resolve_schema(text: &str, source: &dyn DescriptorSource) -> Result<ApplicationDescriptor> {
    let mut application = parse_application(text)?;
    application
        .validate()
        .map_err(|err| err.within(APPLICATION_DOCUMENT))?;

    let mut databases = Vec::with_capacity(application.database_descriptor_paths().len());
    for path in application.database_descriptor_paths() {
        let database = parse_database(path, &source.read(path)?)?;
        database.validate().map_err(|err| err.within(path))?;
        databases.push(database);
    }

    for path in application.library_descriptor_paths() {
        let library = parse_library(path, &source.read(path)?)?;
        library.validate().map_err(|err| err.within(path))?;

        for (database_name, relative) in library.entity_targets()? {
            let database = databases
                .iter_mut()
                .find(|d| d.database_name == database_name)
                .ok_or_else(|| {
                    DescriptorError::invalid(library.identity(), property::DATABASE_NAME, database_name)
                        .within(path)
                })?;
            database.add_entity_descriptor_path(sibling_path(path, relative));
        }
        tracing::debug!(library = %library.name, "merged library entities");
    }

    for mut database in databases {
        for path in database.entity_descriptor_paths().to_vec() {
            let entity = parse_entity(&path, &source.read(&path)?)?;
            entity.validate().map_err(|err| err.within(&path))?;

            if database.position_of_class(&entity.class_name).is_some() {
                return Err(DescriptorError::Duplicate {
                    descriptor: database.identity(),
                    field: property::CLASS_NAME.to_string(),
                    value: entity.class_name,
                }
                .within(&path)
                .into());
            }
            database.add_entity_descriptor(path, entity);
        }
        application.add_database(database)?;
    }

    for database in application.databases_mut() {
        resolve(database)?;
        tracing::info!(
            database = %database.database_name,
            entities = database.entity_count(),
            "resolved database schema"
        );
    }

    Ok(application)
}

/// Read the application document at `path` from `source` and resolve it
pub fn load_application(source: &dyn DescriptorSource, path: &str) -> Result<ApplicationDescriptor> {
    let text = source.read(path)?;
    resolve_schema(&text, source)
}
