use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::DescriptorError;

/// Property names understood by the descriptor model
pub mod property {
    pub const NAME: &str = "name";
    pub const DESCRIPTION: &str = "description";
    pub const VERSION: &str = "version";

    pub const DATABASE_NAME: &str = "database_name";
    pub const TYPE: &str = "type";
    pub const TRANSACTION_SAFE: &str = "transaction_safe";
    pub const EXTERNAL_STORAGE: &str = "external_storage";

    pub const TABLE_NAME: &str = "table_name";
    pub const CLASS_NAME: &str = "class_name";

    pub const COLUMN_NAME: &str = "column_name";
    pub const VARIABLE_NAME: &str = "variable_name";
    pub const PRIMARY_KEY: &str = "primary_key";
    pub const NOT_NULL: &str = "not_null";
    pub const UNIQUE: &str = "unique";
    pub const DEFAULT: &str = "default";
    pub const CHECK: &str = "check";

    pub const COLUMN: &str = "column";

    pub const REFER: &str = "refer";
    pub const REFER_TO: &str = "refer_to";
    pub const ON_UPDATE: &str = "on_update";
    pub const ON_DELETE: &str = "on_delete";
    pub const LOAD: &str = "load";
}

/// Parse a descriptor boolean ("true"/"false", any case)
pub fn parse_flag(descriptor: &str, field: &str, value: &str) -> Result<bool, DescriptorError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" | "" => Ok(false),
        _ => Err(DescriptorError::invalid(descriptor, field, value)),
    }
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Cardinality of a relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::OneToOne => "one-to-one",
            RelationshipKind::OneToMany => "one-to-many",
            RelationshipKind::ManyToOne => "many-to-one",
            RelationshipKind::ManyToMany => "many-to-many",
        }
    }

    /// Whether the declaring entity's table holds a foreign key to the target
    pub fn carries_foreign_key(&self) -> bool {
        matches!(
            self,
            RelationshipKind::ManyToOne | RelationshipKind::ManyToMany
        )
    }
}

impl FromStr for RelationshipKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "one-to-one" => Ok(RelationshipKind::OneToOne),
            "one-to-many" => Ok(RelationshipKind::OneToMany),
            "many-to-one" => Ok(RelationshipKind::ManyToOne),
            "many-to-many" => Ok(RelationshipKind::ManyToMany),
            _ => Err(()),
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens to dependent rows when the referenced row changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferentialAction {
    Cascade,
    Restrict,
    NoAction,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    /// SQL keyword for the action
    pub fn keyword(&self) -> &'static str {
        match self {
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

impl FromStr for ReferentialAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cascade" => Ok(ReferentialAction::Cascade),
            "restrict" => Ok(ReferentialAction::Restrict),
            "no_action" => Ok(ReferentialAction::NoAction),
            "set_null" => Ok(ReferentialAction::SetNull),
            "set_default" => Ok(ReferentialAction::SetDefault),
            _ => Err(()),
        }
    }
}

/// Column definition of a mapped entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attribute {
    pub column_name: String,
    pub variable_name: String,
    /// Declared source type, translated by a `DataTypeHandler`
    pub data_type: String,
    pub primary_key: bool,
    pub unique: bool,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub check: Option<String>,
    properties: BTreeMap<String, String>,
}

impl Attribute {
    /// Create a plain (nullable, non-key) attribute
    pub fn new(
        column_name: impl Into<String>,
        variable_name: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            column_name: column_name.into(),
            variable_name: variable_name.into(),
            data_type: data_type.into(),
            ..Self::default()
        }
    }

    pub fn primary(self) -> Self {
        Self {
            primary_key: true,
            ..self
        }
    }

    pub fn required(self) -> Self {
        Self {
            not_null: true,
            ..self
        }
    }

    pub fn unique(self) -> Self {
        Self {
            unique: true,
            ..self
        }
    }

    pub fn default_value(self, value: impl Into<String>) -> Self {
        Self {
            default_value: Some(value.into()),
            ..self
        }
    }

    pub fn check(self, expression: impl Into<String>) -> Self {
        Self {
            check: Some(expression.into()),
            ..self
        }
    }

    /// Accessor the entity adapter reads the value through
    pub fn getter_name(&self) -> &str {
        &self.variable_name
    }

    /// Accessor the entity adapter writes the value through
    pub fn setter_name(&self) -> String {
        format!("set_{}", self.variable_name)
    }

    pub fn add_property(&mut self, name: &str, value: &str) -> Result<(), DescriptorError> {
        let context = format!("attribute {}", self.column_name);

        match name.to_ascii_lowercase().as_str() {
            property::COLUMN_NAME => self.column_name = value.trim().to_string(),
            property::VARIABLE_NAME => self.variable_name = value.trim().to_string(),
            property::TYPE => self.data_type = value.trim().to_string(),
            property::PRIMARY_KEY => {
                self.primary_key = parse_flag(&context, property::PRIMARY_KEY, value)?
            }
            property::NOT_NULL => {
                self.not_null = parse_flag(&context, property::NOT_NULL, value)?
            }
            property::UNIQUE => self.unique = parse_flag(&context, property::UNIQUE, value)?,
            property::DEFAULT => self.default_value = optional(value),
            property::CHECK => self.check = optional(value),
            other => {
                self.properties.insert(other.to_string(), value.to_string());
            }
        }
        Ok(())
    }

    /// Property that has no dedicated field
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn validate(&self, descriptor: &str) -> Result<(), DescriptorError> {
        let context = format!("{} attribute '{}'", descriptor, self.column_name);
        if self.variable_name.is_empty() {
            return Err(DescriptorError::missing(context, property::VARIABLE_NAME));
        }
        if self.column_name.is_empty() {
            return Err(DescriptorError::missing(context, property::COLUMN_NAME));
        }
        if self.data_type.is_empty() {
            return Err(DescriptorError::missing(context, property::TYPE));
        }
        Ok(())
    }
}

/// Index definition; column order is significant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Index {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
    properties: BTreeMap<String, String>,
}

impl Index {
    /// Create a non-unique index
    pub fn on(name: impl Into<String>, columns: &[&str]) -> Self {
        let mut index = Self {
            name: name.into(),
            ..Self::default()
        };
        for column in columns {
            index.add_column(*column);
        }
        index
    }

    /// Create a unique index
    pub fn unique(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            unique: true,
            ..Self::on(name, columns)
        }
    }

    /// Append a column; repeated columns keep their first position
    pub fn add_column(&mut self, column: impl Into<String>) {
        let column = column.into();
        if !self.columns.iter().any(|c| c.eq_ignore_ascii_case(&column)) {
            self.columns.push(column);
        }
    }

    pub fn add_property(&mut self, name: &str, value: &str) -> Result<(), DescriptorError> {
        match name.to_ascii_lowercase().as_str() {
            property::NAME => self.name = value.trim().to_string(),
            property::UNIQUE => {
                let context = format!("index {}", self.name);
                self.unique = parse_flag(&context, property::UNIQUE, value)?
            }
            property::COLUMN => self.add_column(value.trim()),
            other => {
                self.properties.insert(other.to_string(), value.to_string());
            }
        }
        Ok(())
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn validate(&self, descriptor: &str) -> Result<(), DescriptorError> {
        let context = format!("{} index '{}'", descriptor, self.name);
        if self.name.is_empty() {
            return Err(DescriptorError::missing(context, property::NAME));
        }
        if self.columns.is_empty() {
            return Err(DescriptorError::missing(context, property::COLUMN));
        }
        Ok(())
    }
}

/// Declared association with another entity
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub kind: Option<RelationshipKind>,
    /// Local field holding the related object(s)
    pub refer: String,
    /// Class identifier of the target entity
    pub refer_to: String,
    pub on_update: Option<ReferentialAction>,
    pub on_delete: Option<ReferentialAction>,
    /// Eagerly load the related object(s)
    pub load: bool,
    /// Position of the target in the owning database's entity list, once resolved
    pub(crate) referred: Option<usize>,
    properties: BTreeMap<String, String>,
}

impl Relationship {
    pub fn new(kind: RelationshipKind, refer: impl Into<String>, refer_to: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            refer: refer.into(),
            refer_to: refer_to.into(),
            ..Self::empty()
        }
    }

    /// Relationship with nothing set, ready for `add_property`
    pub fn empty() -> Self {
        Self {
            kind: None,
            refer: String::new(),
            refer_to: String::new(),
            on_update: None,
            on_delete: None,
            load: false,
            referred: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn on_delete(self, action: ReferentialAction) -> Self {
        Self {
            on_delete: Some(action),
            ..self
        }
    }

    pub fn on_update(self, action: ReferentialAction) -> Self {
        Self {
            on_update: Some(action),
            ..self
        }
    }

    pub fn eager(self) -> Self {
        Self { load: true, ..self }
    }

    pub fn is(&self, kind: RelationshipKind) -> bool {
        self.kind == Some(kind)
    }

    /// Index of the resolved target entity, if resolution has run
    pub fn referred_index(&self) -> Option<usize> {
        self.referred
    }

    pub fn getter_name(&self) -> &str {
        &self.refer
    }

    pub fn setter_name(&self) -> String {
        format!("set_{}", self.refer)
    }

    pub fn add_property(&mut self, name: &str, value: &str) -> Result<(), DescriptorError> {
        let context = format!("relationship {}", self.refer);
        let action = |field: &str| {
            value
                .parse::<ReferentialAction>()
                .map_err(|_| DescriptorError::invalid(context.as_str(), field, value))
        };

        match name.to_ascii_lowercase().as_str() {
            property::TYPE => {
                let kind = value
                    .parse::<RelationshipKind>()
                    .map_err(|_| DescriptorError::invalid(context.as_str(), property::TYPE, value))?;
                self.kind = Some(kind);
            }
            property::REFER => self.refer = value.trim().to_string(),
            property::REFER_TO => self.refer_to = value.trim().to_string(),
            property::ON_UPDATE => self.on_update = Some(action(property::ON_UPDATE)?),
            property::ON_DELETE => self.on_delete = Some(action(property::ON_DELETE)?),
            property::LOAD => self.load = parse_flag(&context, property::LOAD, value)?,
            other => {
                self.properties.insert(other.to_string(), value.to_string());
            }
        }
        Ok(())
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn validate(&self, descriptor: &str) -> Result<(), DescriptorError> {
        let context = format!("{} relationship '{}'", descriptor, self.refer);
        if self.kind.is_none() {
            return Err(DescriptorError::missing(context, property::TYPE));
        }
        if self.refer.is_empty() {
            return Err(DescriptorError::missing(context, property::REFER));
        }
        if self.refer_to.is_empty() {
            return Err(DescriptorError::missing(context, property::REFER_TO));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_kind_parsing() {
        assert_eq!(
            "Many-To-One".parse::<RelationshipKind>(),
            Ok(RelationshipKind::ManyToOne)
        );
        assert!("many_to_one".parse::<RelationshipKind>().is_err());
        assert!(RelationshipKind::ManyToMany.carries_foreign_key());
        assert!(!RelationshipKind::OneToMany.carries_foreign_key());
    }

    #[test]
    fn test_action_keywords() {
        let action: ReferentialAction = "set_null".parse().unwrap();
        assert_eq!(action.keyword(), "SET NULL");
        assert_eq!(
            "NO_ACTION".parse::<ReferentialAction>().unwrap().keyword(),
            "NO ACTION"
        );
    }

    #[test]
    fn test_attribute_property_bag() {
        let mut attribute = Attribute::default();
        attribute.add_property("column_name", "EMAIL").unwrap();
        attribute.add_property("variable_name", "email").unwrap();
        attribute.add_property("type", "String").unwrap();
        attribute.add_property("NOT_NULL", "TRUE").unwrap();
        attribute.add_property("default", "").unwrap();
        attribute.add_property("comment", "login").unwrap();

        assert!(attribute.not_null);
        assert_eq!(attribute.default_value, None);
        assert_eq!(attribute.property("comment"), Some("login"));
        assert_eq!(attribute.setter_name(), "set_email");
        assert!(attribute.validate("User").is_ok());
    }

    #[test]
    fn test_attribute_rejects_bad_flag() {
        let mut attribute = Attribute::new("id", "id", "i64");
        let err = attribute.add_property("primary_key", "yes").unwrap_err();
        assert!(err.to_string().contains("primary_key"));
    }

    #[test]
    fn test_attribute_missing_type() {
        let attribute = Attribute::new("id", "id", "");
        let err = attribute.validate("class User").unwrap_err();
        assert!(matches!(err, DescriptorError::MissingField { ref field, .. } if field == "type"));
        assert!(err.to_string().contains("class User"));
    }

    #[test]
    fn test_index_keeps_column_order() {
        let mut index = Index::unique("idx_name", &["last", "first"]);
        index.add_property("column", "last").unwrap();
        index.add_property("column", "middle").unwrap();
        assert_eq!(index.columns, vec!["last", "first", "middle"]);
    }

    #[test]
    fn test_relationship_validation() {
        let mut relationship = Relationship::empty();
        relationship.add_property("type", "many-to-one").unwrap();
        relationship.add_property("refer", "user").unwrap();
        assert!(relationship.validate("class Order").is_err());

        relationship.add_property("refer_to", "shop.User").unwrap();
        relationship.add_property("on_delete", "cascade").unwrap();
        assert!(relationship.validate("class Order").is_ok());
        assert_eq!(relationship.on_delete, Some(ReferentialAction::Cascade));

        assert!(relationship.add_property("on_update", "explode").is_err());
    }
}
