use std::collections::{BTreeMap, HashSet};

use super::types::{property, Attribute, Index, Relationship, RelationshipKind};
use crate::error::DescriptorError;

/// A mapped table and the class bound to it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityDescriptor {
    pub table_name: String,
    /// Class identifier of the mapped application type
    pub class_name: String,
    attributes: Vec<Attribute>,
    indexes: Vec<Index>,
    relationships: Vec<Relationship>,
    /// Complete foreign-key set, filled in by the relationship resolver
    pub(crate) foreign_keys: Option<Vec<Attribute>>,
    properties: BTreeMap<String, String>,
}

impl EntityDescriptor {
    pub fn new(table_name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            class_name: class_name.into(),
            ..Self::default()
        }
    }

    /// Builder-style `add_attribute`
    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.add_attribute(attribute);
        self
    }

    pub fn with_index(mut self, index: Index) -> Self {
        self.add_index(index);
        self
    }

    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.add_relationship(relationship);
        self
    }

    /// Human-readable identity used in error messages
    pub fn identity(&self) -> String {
        match (self.class_name.is_empty(), self.table_name.is_empty()) {
            (false, false) => format!("class {} (table {})", self.class_name, self.table_name),
            (false, true) => format!("class {}", self.class_name),
            (true, false) => format!("table {}", self.table_name),
            (true, true) => "entity".to_string(),
        }
    }

    pub fn add_property(&mut self, name: &str, value: &str) {
        match name.to_ascii_lowercase().as_str() {
            property::TABLE_NAME => self.table_name = value.trim().to_string(),
            property::CLASS_NAME => self.class_name = value.trim().to_string(),
            other => {
                self.properties.insert(other.to_string(), value.to_string());
            }
        }
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    pub fn add_index(&mut self, index: Index) {
        self.indexes.push(index);
    }

    pub fn add_relationship(&mut self, relationship: Relationship) {
        self.relationships.push(relationship);
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub(crate) fn relationships_mut(&mut self) -> &mut [Relationship] {
        &mut self.relationships
    }

    /// Relationships of one cardinality, in declaration order
    pub fn relationships_of(&self, kind: RelationshipKind) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter().filter(move |r| r.is(kind))
    }

    pub fn attribute_by_column(&self, column_name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.column_name.eq_ignore_ascii_case(column_name))
    }

    pub fn attribute_by_variable(&self, variable_name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.variable_name == variable_name)
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name.eq_ignore_ascii_case(name))
    }

    pub fn relationship_by_refer(&self, refer: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.refer == refer)
    }

    /// Primary-key attributes in declaration order
    pub fn primary_keys(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter().filter(|a| a.primary_key)
    }

    /// Resolved foreign-key set; `None` until the resolver has run
    pub fn foreign_keys(&self) -> Option<&[Attribute]> {
        self.foreign_keys.as_deref()
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        let identity = self.identity();

        if self.table_name.is_empty() {
            return Err(DescriptorError::missing(identity, property::TABLE_NAME));
        }
        if self.class_name.is_empty() {
            return Err(DescriptorError::missing(identity, property::CLASS_NAME));
        }

        let mut columns = HashSet::new();
        let mut variables = HashSet::new();
        for attribute in &self.attributes {
            attribute.validate(&identity)?;

            if !columns.insert(attribute.column_name.to_ascii_lowercase()) {
                return Err(DescriptorError::Duplicate {
                    descriptor: identity,
                    field: property::COLUMN_NAME.to_string(),
                    value: attribute.column_name.clone(),
                });
            }
            if !variables.insert(attribute.variable_name.as_str()) {
                return Err(DescriptorError::Duplicate {
                    descriptor: identity,
                    field: property::VARIABLE_NAME.to_string(),
                    value: attribute.variable_name.clone(),
                });
            }
        }

        let mut index_names = HashSet::new();
        for index in &self.indexes {
            index.validate(&identity)?;
            if !index_names.insert(index.name.to_ascii_lowercase()) {
                return Err(DescriptorError::Duplicate {
                    descriptor: identity,
                    field: "index name".to_string(),
                    value: index.name.clone(),
                });
            }
        }

        for relationship in &self.relationships {
            relationship.validate(&identity)?;
        }

        Ok(())
    }
}
