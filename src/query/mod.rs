//! SQL generation engine.
//!
//! Every generator is a pure function from a request to SQL text. A dialect
//! implements [`QueryBuilder`]; [`generate_sql`] dispatches a [`QueryRequest`]
//! to the matching generator.

pub mod sqlite;
pub mod types;

pub use sqlite::SqliteQueryBuilder;
pub use types::{DataTypeHandler, SqliteTypeHandler};

use crate::error::SqlGenerationError;
use crate::schema::ReferentialAction;

/// One column of a CREATE TABLE statement
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    /// Storage type, already translated by a `DataTypeHandler`
    pub sql_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub check: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            not_null: false,
            default_value: None,
            check: None,
        }
    }
}

/// `FOREIGN KEY(cols) REFERENCES parent(cols) [ON DELETE ..] [ON UPDATE ..]`
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyClause {
    /// Local columns; the parent columns carry the same names
    pub columns: Vec<String>,
    pub parent_table: String,
    pub on_delete: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateTable {
    pub table: String,
    /// Declaration order is kept in the statement
    pub columns: Vec<ColumnDefinition>,
    pub primary_keys: Vec<String>,
    pub unique_columns: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyClause>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateIndex {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

impl OrderDirection {
    pub fn keyword(&self) -> &'static str {
        match self {
            OrderDirection::Ascending => "ASC",
            OrderDirection::Descending => "DESC",
        }
    }
}

/// Parameters of a SELECT. Empty fields are left out of the statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub table: String,
    pub distinct: bool,
    /// Projected columns; empty selects `*`
    pub columns: Vec<String>,
    pub where_clause: Option<String>,
    pub group_by: Vec<String>,
    pub having: Option<String>,
    pub order_by: Vec<String>,
    pub order_direction: Option<OrderDirection>,
    /// `count` or `offset,count`
    pub limit: Option<String>,
}

impl SelectQuery {
    /// Query over every row of `table`
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn distinct(self) -> Self {
        Self {
            distinct: true,
            ..self
        }
    }

    pub fn columns<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn filter(self, where_clause: impl Into<String>) -> Self {
        Self {
            where_clause: Some(where_clause.into()),
            ..self
        }
    }

    pub fn group_by<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            group_by: columns.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn having(self, having: impl Into<String>) -> Self {
        Self {
            having: Some(having.into()),
            ..self
        }
    }

    pub fn order_by<I, S>(self, columns: I, direction: Option<OrderDirection>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            order_by: columns.into_iter().map(Into::into).collect(),
            order_direction: direction,
            ..self
        }
    }

    pub fn limit(self, limit: impl Into<String>) -> Self {
        Self {
            limit: Some(limit.into()),
            ..self
        }
    }
}

/// Aggregate functions understood by the generators
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateFunction {
    Count { distinct: bool },
    Avg,
    Sum,
    Total,
    Max,
    Min,
    GroupConcat { delimiter: Option<String> },
}

impl AggregateFunction {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count { .. } => "COUNT",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Total => "TOTAL",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Min => "MIN",
            AggregateFunction::GroupConcat { .. } => "GROUP_CONCAT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateQuery {
    pub function: AggregateFunction,
    pub table: String,
    /// Required by every function but COUNT, which falls back to `*`
    pub column: Option<String>,
    pub where_clause: Option<String>,
    pub group_by: Vec<String>,
    pub having: Option<String>,
}

impl AggregateQuery {
    pub fn new(function: AggregateFunction, table: impl Into<String>) -> Self {
        Self {
            function,
            table: table.into(),
            column: None,
            where_clause: None,
            group_by: Vec::new(),
            having: None,
        }
    }

    pub fn column(self, column: impl Into<String>) -> Self {
        Self {
            column: Some(column.into()),
            ..self
        }
    }

    pub fn filter(self, where_clause: impl Into<String>) -> Self {
        Self {
            where_clause: Some(where_clause.into()),
            ..self
        }
    }

    pub fn group_by<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            group_by: columns.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn having(self, having: impl Into<String>) -> Self {
        Self {
            having: Some(having.into()),
            ..self
        }
    }
}

/// Dialect-specific SQL generation.
///
/// Identifiers are interpolated as given; callers pass names the descriptor
/// model has already validated.
pub trait QueryBuilder: Send + Sync {
    /// Column metadata of one table
    fn table_info(&self, table: &str) -> Result<String, SqlGenerationError>;

    fn fetch_database_version(&self) -> String;

    fn update_database_version(&self, version: i64) -> String;

    /// Added columns are always typed TEXT
    fn alter_add_column(&self, table: &str, column: &str) -> Result<String, SqlGenerationError>;

    /// Enumerate the tables of the open database
    fn table_names(&self) -> String;

    fn enable_foreign_keys(&self) -> String;

    /// Engine-owned tables that never map an entity
    fn is_reserved_table(&self, table: &str) -> bool;

    fn create_table(&self, request: &CreateTable) -> Result<String, SqlGenerationError>;

    fn foreign_key(&self, clause: &ForeignKeyClause) -> String;

    fn create_index(&self, request: &CreateIndex) -> Result<String, SqlGenerationError>;

    fn drop_table(&self, table: &str) -> Result<String, SqlGenerationError>;

    fn drop_index(&self, name: &str, table: &str) -> Result<String, SqlGenerationError>;

    fn select(&self, request: &SelectQuery) -> Result<String, SqlGenerationError>;

    /// INSERT with one positional placeholder per column, in column order
    fn insert(&self, table: &str, columns: &[String]) -> Result<String, SqlGenerationError>;

    /// UPDATE with one positional placeholder per column, in column order
    fn update(
        &self,
        table: &str,
        columns: &[String],
        where_clause: Option<&str>,
    ) -> Result<String, SqlGenerationError>;

    fn delete(&self, table: &str, where_clause: Option<&str>) -> Result<String, SqlGenerationError>;

    fn aggregate(&self, request: &AggregateQuery) -> Result<String, SqlGenerationError>;
}

/// Every statement the engine can generate, with its parameters
#[derive(Debug, Clone, PartialEq)]
pub enum QueryRequest {
    TableInfo { table: String },
    FetchDatabaseVersion,
    UpdateDatabaseVersion { version: i64 },
    AlterAddColumn { table: String, column: String },
    TableNames,
    EnableForeignKeys,
    CreateTable(CreateTable),
    ForeignKey(ForeignKeyClause),
    CreateIndex(CreateIndex),
    DropTable { table: String },
    DropIndex { name: String, table: String },
    Select(SelectQuery),
    Insert { table: String, columns: Vec<String> },
    Update {
        table: String,
        columns: Vec<String>,
        where_clause: Option<String>,
    },
    Delete {
        table: String,
        where_clause: Option<String>,
    },
    Aggregate(AggregateQuery),
}

/// Generate the SQL text for `request` in the dialect of `builder`
pub fn generate_sql(
    builder: &dyn QueryBuilder,
    request: &QueryRequest,
) -> Result<String, SqlGenerationError> {
    match request {
        QueryRequest::TableInfo { table } => builder.table_info(table),
        QueryRequest::FetchDatabaseVersion => Ok(builder.fetch_database_version()),
        QueryRequest::UpdateDatabaseVersion { version } => {
            Ok(builder.update_database_version(*version))
        }
        QueryRequest::AlterAddColumn { table, column } => builder.alter_add_column(table, column),
        QueryRequest::TableNames => Ok(builder.table_names()),
        QueryRequest::EnableForeignKeys => Ok(builder.enable_foreign_keys()),
        QueryRequest::CreateTable(request) => builder.create_table(request),
        QueryRequest::ForeignKey(clause) => Ok(builder.foreign_key(clause)),
        QueryRequest::CreateIndex(request) => builder.create_index(request),
        QueryRequest::DropTable { table } => builder.drop_table(table),
        QueryRequest::DropIndex { name, table } => builder.drop_index(name, table),
        QueryRequest::Select(request) => builder.select(request),
        QueryRequest::Insert { table, columns } => builder.insert(table, columns),
        QueryRequest::Update {
            table,
            columns,
            where_clause,
        } => builder.update(table, columns, where_clause.as_deref()),
        QueryRequest::Delete {
            table,
            where_clause,
        } => builder.delete(table, where_clause.as_deref()),
        QueryRequest::Aggregate(request) => builder.aggregate(request),
    }
}
