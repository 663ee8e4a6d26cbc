use super::{
    AggregateFunction, AggregateQuery, CreateIndex, CreateTable, ForeignKeyClause, QueryBuilder,
    SelectQuery,
};
use crate::error::SqlGenerationError;

/// Tables SQLite and its hosts create for themselves
const RESERVED_PREFIX: &str = "sqlite_";
const RESERVED_TABLES: &[&str] = &["android_metadata"];

/// SQL generation for SQLite
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteQueryBuilder;

fn present(clause: Option<&str>) -> Option<&str> {
    clause.map(str::trim).filter(|c| !c.is_empty())
}

fn require_table(table: &str, statement: &'static str) -> Result<(), SqlGenerationError> {
    if table.trim().is_empty() {
        Err(SqlGenerationError::MissingTableName { statement })
    } else {
        Ok(())
    }
}

/// `\s*\d+\s*(,\s*\d+\s*)?`
fn is_valid_limit(limit: &str) -> bool {
    let is_number = |part: &str| {
        let part = part.trim();
        !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit())
    };

    match limit.split_once(',') {
        Some((offset, count)) => is_number(offset) && is_number(count),
        None => is_number(limit),
    }
}

fn append_clause(sql: &mut String, keyword: &str, clause: Option<&str>) {
    if let Some(clause) = present(clause) {
        sql.push(' ');
        sql.push_str(keyword);
        sql.push(' ');
        sql.push_str(clause);
    }
}

fn append_list(sql: &mut String, keyword: &str, columns: &[String]) {
    if !columns.is_empty() {
        sql.push(' ');
        sql.push_str(keyword);
        sql.push(' ');
        sql.push_str(&columns.join(", "));
    }
}

fn check_having(group_by: &[String], having: Option<&str>) -> Result<(), SqlGenerationError> {
    if group_by.is_empty() && present(having).is_some() {
        Err(SqlGenerationError::HavingWithoutGroupBy)
    } else {
        Ok(())
    }
}

impl QueryBuilder for SqliteQueryBuilder {
    fn table_info(&self, table: &str) -> Result<String, SqlGenerationError> {
        require_table(table, "TABLE INFO")?;
        Ok(format!("pragma table_info({})", table))
    }

    fn fetch_database_version(&self) -> String {
        "PRAGMA user_version;".to_string()
    }

    fn update_database_version(&self, version: i64) -> String {
        format!("PRAGMA user_version={}", version)
    }

    fn alter_add_column(&self, table: &str, column: &str) -> Result<String, SqlGenerationError> {
        require_table(table, "ALTER TABLE")?;
        if column.trim().is_empty() {
            return Err(SqlGenerationError::NoColumns {
                statement: "ALTER TABLE",
            });
        }
        Ok(format!("ALTER TABLE {} ADD COLUMN {} TEXT", table, column))
    }

    fn table_names(&self) -> String {
        "SELECT * FROM sqlite_master WHERE type='table'".to_string()
    }

    fn enable_foreign_keys(&self) -> String {
        "PRAGMA foreign_keys=ON;".to_string()
    }

    fn is_reserved_table(&self, table: &str) -> bool {
        let table = table.to_ascii_lowercase();
        table.starts_with(RESERVED_PREFIX) || RESERVED_TABLES.contains(&table.as_str())
    }

    fn create_table(&self, request: &CreateTable) -> Result<String, SqlGenerationError> {
        require_table(&request.table, "CREATE TABLE")?;
        if request.columns.is_empty() {
            return Err(SqlGenerationError::NoColumns {
                statement: "CREATE TABLE",
            });
        }

        let mut definitions: Vec<String> = request
            .columns
            .iter()
            .map(|column| {
                let mut definition = format!("{} {}", column.name, column.sql_type);
                if column.not_null {
                    definition.push_str(" NOT NULL");
                }
                if let Some(default_value) = present(column.default_value.as_deref()) {
                    definition.push_str(&format!(" DEFAULT '{}'", default_value));
                }
                if let Some(check) = present(column.check.as_deref()) {
                    definition.push_str(&format!(" CHECK('{}')", check));
                }
                definition
            })
            .collect();

        if !request.primary_keys.is_empty() {
            definitions.push(format!("PRIMARY KEY({})", request.primary_keys.join(", ")));
        }
        if !request.unique_columns.is_empty() {
            definitions.push(format!("UNIQUE({})", request.unique_columns.join(", ")));
        }
        for clause in &request.foreign_keys {
            definitions.push(self.foreign_key(clause));
        }

        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            request.table,
            definitions.join(", ")
        ))
    }

    fn foreign_key(&self, clause: &ForeignKeyClause) -> String {
        let columns = clause.columns.join(", ");
        let mut sql = format!(
            "FOREIGN KEY({}) REFERENCES {}({})",
            columns, clause.parent_table, columns
        );
        if let Some(action) = clause.on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(action.keyword());
        }
        if let Some(action) = clause.on_update {
            sql.push_str(" ON UPDATE ");
            sql.push_str(action.keyword());
        }
        sql
    }

    fn create_index(&self, request: &CreateIndex) -> Result<String, SqlGenerationError> {
        if request.name.trim().is_empty() {
            return Err(SqlGenerationError::MissingIndexName {
                statement: "CREATE INDEX",
            });
        }
        require_table(&request.table, "CREATE INDEX")?;
        if request.columns.is_empty() {
            return Err(SqlGenerationError::NoColumns {
                statement: "CREATE INDEX",
            });
        }

        let unique = if request.unique { "UNIQUE " } else { "" };
        Ok(format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {}({})",
            unique,
            request.name,
            request.table,
            request.columns.join(", ")
        ))
    }

    fn drop_table(&self, table: &str) -> Result<String, SqlGenerationError> {
        require_table(table, "DROP TABLE")?;
        Ok(format!("DROP TABLE IF EXISTS {}", table))
    }

    fn drop_index(&self, name: &str, table: &str) -> Result<String, SqlGenerationError> {
        if name.trim().is_empty() {
            return Err(SqlGenerationError::MissingIndexName {
                statement: "DROP INDEX",
            });
        }
        require_table(table, "DROP INDEX")?;
        Ok(format!("DROP INDEX IF EXISTS {} ON {}", name, table))
    }

    fn select(&self, request: &SelectQuery) -> Result<String, SqlGenerationError> {
        require_table(&request.table, "SELECT")?;
        check_having(&request.group_by, request.having.as_deref())?;

        let limit = present(request.limit.as_deref());
        if let Some(limit) = limit {
            if !is_valid_limit(limit) {
                return Err(SqlGenerationError::InvalidLimit(limit.to_string()));
            }
        }

        let mut sql = String::from("SELECT ");
        if request.distinct {
            sql.push_str("DISTINCT ");
        }
        if request.columns.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&request.columns.join(", "));
        }
        sql.push_str(" FROM ");
        sql.push_str(&request.table);

        append_clause(&mut sql, "WHERE", request.where_clause.as_deref());
        append_list(&mut sql, "GROUP BY", &request.group_by);
        append_clause(&mut sql, "HAVING", request.having.as_deref());
        if !request.order_by.is_empty() {
            append_list(&mut sql, "ORDER BY", &request.order_by);
            if let Some(direction) = request.order_direction {
                sql.push(' ');
                sql.push_str(direction.keyword());
            }
        }
        append_clause(&mut sql, "LIMIT", limit);

        Ok(sql)
    }

    fn insert(&self, table: &str, columns: &[String]) -> Result<String, SqlGenerationError> {
        require_table(table, "INSERT")?;
        if columns.is_empty() {
            return Err(SqlGenerationError::NoColumns { statement: "INSERT" });
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        Ok(format!(
            "INSERT INTO {}({}) VALUES({})",
            table,
            columns.join(", "),
            placeholders
        ))
    }

    fn update(
        &self,
        table: &str,
        columns: &[String],
        where_clause: Option<&str>,
    ) -> Result<String, SqlGenerationError> {
        require_table(table, "UPDATE")?;
        if columns.is_empty() {
            return Err(SqlGenerationError::NoColumns { statement: "UPDATE" });
        }

        let assignments: Vec<String> = columns.iter().map(|c| format!("{} = ?", c)).collect();
        let mut sql = format!("UPDATE {} SET {}", table, assignments.join(", "));
        append_clause(&mut sql, "WHERE", where_clause);
        Ok(sql)
    }

    fn delete(&self, table: &str, where_clause: Option<&str>) -> Result<String, SqlGenerationError> {
        require_table(table, "DELETE")?;
        let mut sql = format!("DELETE FROM {}", table);
        append_clause(&mut sql, "WHERE", where_clause);
        Ok(sql)
    }

    fn aggregate(&self, request: &AggregateQuery) -> Result<String, SqlGenerationError> {
        let function = request.function.name();
        require_table(&request.table, function)?;
        check_having(&request.group_by, request.having.as_deref())?;

        let column = present(request.column.as_deref());
        let argument = match (&request.function, column) {
            (AggregateFunction::Count { distinct: true }, Some(column)) => {
                format!("DISTINCT {} ", column)
            }
            (AggregateFunction::Count { .. }, Some(column)) => column.to_string(),
            (AggregateFunction::Count { .. }, None) => "*".to_string(),
            (AggregateFunction::GroupConcat { delimiter }, Some(column)) => {
                match delimiter.as_deref().filter(|d| !d.is_empty()) {
                    Some(delimiter) => {
                        format!("{}, '{}'", column, delimiter.replace('\'', "''"))
                    }
                    None => column.to_string(),
                }
            }
            (_, Some(column)) => column.to_string(),
            (_, None) => return Err(SqlGenerationError::MissingColumn { function }),
        };

        let mut sql = format!("SELECT {}({}) FROM {}", function, argument, request.table);
        append_clause(&mut sql, "WHERE", request.where_clause.as_deref());
        append_list(&mut sql, "GROUP BY", &request.group_by);
        append_clause(&mut sql, "HAVING", request.having.as_deref());
        Ok(sql)
    }
}
