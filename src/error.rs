//! Error taxonomy shared by every layer of the mapper.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Any failure surfaced by the mapper.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    SqlGeneration(#[from] SqlGenerationError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Critical(#[from] CriticalError),
}

/// Malformed or incomplete descriptor. Always fatal at startup.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// A mandatory field is absent or empty.
    #[error("{field} is a mandatory field ({descriptor})")]
    MissingField { descriptor: String, field: String },

    /// A field holds a value outside of its domain.
    #[error("invalid value '{value}' for {field} ({descriptor})")]
    InvalidValue {
        descriptor: String,
        field: String,
        value: String,
    },

    /// Two elements of one descriptor share an identifier that must be unique.
    #[error("duplicate {field} '{value}' ({descriptor})")]
    Duplicate {
        descriptor: String,
        field: String,
        value: String,
    },

    /// The descriptor source has nothing under the given path.
    #[error("descriptor not found: {path}")]
    NotFound { path: String },

    /// The descriptor text could not be read into a property bag.
    #[error("failed to parse descriptor {path}: {message}")]
    Malformed { path: String, message: String },
}

impl DescriptorError {
    pub fn missing(descriptor: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            descriptor: descriptor.into(),
            field: field.into(),
        }
    }

    pub fn invalid(
        descriptor: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            descriptor: descriptor.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    /// Re-labels the error with a more specific descriptor identity (e.g. the file path).
    pub fn within(self, context: &str) -> Self {
        let relabel = |descriptor: String| {
            if descriptor.is_empty() {
                context.to_string()
            } else {
                format!("{}: {}", context, descriptor)
            }
        };

        match self {
            Self::MissingField { descriptor, field } => Self::MissingField {
                descriptor: relabel(descriptor),
                field,
            },
            Self::InvalidValue {
                descriptor,
                field,
                value,
            } => Self::InvalidValue {
                descriptor: relabel(descriptor),
                field,
                value,
            },
            Self::Duplicate {
                descriptor,
                field,
                value,
            } => Self::Duplicate {
                descriptor: relabel(descriptor),
                field,
                value,
            },
            other => other,
        }
    }
}

/// Relationship graph could not be resolved. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// `refer_to` names a class that no entity of the database maps.
    #[error("entity {entity} refers to unknown class {class_name}")]
    UnresolvedReference { entity: String, class_name: String },

    /// The foreign-key graph loops back on itself.
    #[error("relationship cycle: {}", .cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },
}

/// Structurally invalid query parameters. Fatal to the request only.
#[derive(Debug, Error, PartialEq)]
pub enum SqlGenerationError {
    #[error("HAVING clauses are only permitted when using a GROUP BY clause")]
    HavingWithoutGroupBy,

    #[error("invalid LIMIT clause: {0}")]
    InvalidLimit(String),

    #[error("{statement} requires a table name")]
    MissingTableName { statement: &'static str },

    #[error("{statement} requires an index name")]
    MissingIndexName { statement: &'static str },

    #[error("{statement} requires at least one column")]
    NoColumns { statement: &'static str },

    #[error("{function} requires a column")]
    MissingColumn { function: &'static str },
}

/// Failure reported while talking to the physical database.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The driver rejected a statement.
    #[error("database {database}: failed to execute `{sql}`: {message}")]
    Execution {
        database: String,
        sql: String,
        message: String,
    },

    /// The driver could not open or create the database file.
    #[error("database {database}: failed to open {path}: {message}")]
    Open {
        database: String,
        path: String,
        message: String,
    },

    /// An operation needed a connection that is not open.
    #[error("database {database} is not open")]
    NotOpen { database: String },

    /// CRUD attempted before the lifecycle coordinator finished.
    #[error("database {database} is not ready (state: {state})")]
    NotReady { database: String, state: String },

    /// Storage-level I/O failure (directories, file removal).
    #[error("database {database}: storage failure at {path}: {source}")]
    Storage {
        database: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// No configured database or entity answers to the given name.
    #[error("unknown {kind}: {name}")]
    Unknown { kind: &'static str, name: String },
}

/// Unexpected adapter failure or unrecoverable runtime state. Never swallowed.
#[derive(Debug, Error)]
pub enum CriticalError {
    /// The entity adapter could not move values in or out of an object.
    #[error("entity adapter failed for {class_name}: {message}")]
    Adapter { class_name: String, message: String },

    /// A database initialization thread panicked.
    #[error("initialization of database {database} panicked")]
    Panicked { database: String },

    /// One or more databases could not be closed on shutdown.
    #[error("failed to close databases: {}", .databases.join(", "))]
    Shutdown { databases: Vec<String> },
}

impl CriticalError {
    pub fn adapter(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Adapter {
            class_name: class_name.into(),
            message: message.into(),
        }
    }
}
