use rusqlite::Connection;
use std::path::Path;

use super::driver::Driver;
use super::value::{Row, SqlValue};
use crate::error::DatabaseError;
use crate::query::{DataTypeHandler, SqliteTypeHandler};
use crate::schema::{DatabaseDescriptor, EntityDescriptor};

/// `Driver` backed by a single rusqlite connection
#[derive(Default)]
pub struct SqliteDriver {
    conn: Option<Connection>,
    types: SqliteTypeHandler,
}

impl SqliteDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn connection(&self, database: &DatabaseDescriptor) -> Result<&Connection, DatabaseError> {
        self.conn.as_ref().ok_or_else(|| DatabaseError::NotOpen {
            database: database.database_name.clone(),
        })
    }

    fn execution_error(database: &DatabaseDescriptor, sql: &str, err: rusqlite::Error) -> DatabaseError {
        DatabaseError::Execution {
            database: database.database_name.clone(),
            sql: sql.to_string(),
            message: err.to_string(),
        }
    }

    /// Whether the column maps a boolean attribute of `entity`
    fn is_boolean_column(&self, entity: Option<&EntityDescriptor>, column: &str) -> bool {
        entity
            .and_then(|e| e.attribute_by_column(column))
            .map(|a| self.types.is_boolean(&a.data_type))
            .unwrap_or(false)
    }
}

impl Driver for SqliteDriver {
    fn open(&mut self, database: &DatabaseDescriptor, path: &Path) -> Result<(), DatabaseError> {
        let conn = Connection::open(path).map_err(|e| DatabaseError::Open {
            database: database.database_name.clone(),
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        tracing::debug!(database = %database.database_name, path = %path.display(), "opened connection");
        self.conn = Some(conn);
        Ok(())
    }

    fn close(&mut self, database: &DatabaseDescriptor) -> Result<(), DatabaseError> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };

        match conn.close() {
            Ok(()) => {
                tracing::debug!(database = %database.database_name, "closed connection");
                Ok(())
            }
            Err((conn, err)) => {
                self.conn = Some(conn);
                Err(DatabaseError::Execution {
                    database: database.database_name.clone(),
                    sql: "close".to_string(),
                    message: err.to_string(),
                })
            }
        }
    }

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn execute_query(
        &mut self,
        database: &DatabaseDescriptor,
        _entity: Option<&EntityDescriptor>,
        sql: &str,
    ) -> Result<(), DatabaseError> {
        tracing::debug!(database = %database.database_name, sql, "execute");
        self.connection(database)?
            .execute_batch(sql)
            .map_err(|e| Self::execution_error(database, sql, e))
    }

    fn execute_parameterized(
        &mut self,
        database: &DatabaseDescriptor,
        _entity: Option<&EntityDescriptor>,
        sql: &str,
        values: &[SqlValue],
    ) -> Result<usize, DatabaseError> {
        tracing::debug!(database = %database.database_name, sql, parameters = values.len(), "execute");
        let conn = self.connection(database)?;

        let run = || -> rusqlite::Result<usize> {
            let mut stmt = conn.prepare_cached(sql)?;
            for (idx, value) in values.iter().enumerate() {
                value.bind_to(idx + 1, &mut stmt)?;
            }
            stmt.raw_execute()
        };
        run().map_err(|e| Self::execution_error(database, sql, e))
    }

    fn execute_select(
        &mut self,
        database: &DatabaseDescriptor,
        entity: Option<&EntityDescriptor>,
        sql: &str,
    ) -> Result<Vec<Row>, DatabaseError> {
        tracing::debug!(database = %database.database_name, sql, "select");
        let conn = self.connection(database)?;

        let run = || -> rusqlite::Result<Vec<Row>> {
            let mut stmt = conn.prepare(sql)?;
            let columns: Vec<(String, bool)> = stmt
                .column_names()
                .into_iter()
                .map(|name| (name.to_string(), self.is_boolean_column(entity, name)))
                .collect();

            let mut rows = stmt.query([])?;
            let mut result = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Row::new();
                for (idx, (name, boolean)) in columns.iter().enumerate() {
                    values.insert(name.clone(), SqlValue::from_column(row.get_ref(idx)?, *boolean));
                }
                result.push(values);
            }
            Ok(result)
        };
        run().map_err(|e| Self::execution_error(database, sql, e))
    }

    fn begin_transaction(&mut self, database: &DatabaseDescriptor) -> Result<(), DatabaseError> {
        self.execute_query(database, None, "BEGIN TRANSACTION")
    }

    fn commit_transaction(&mut self, database: &DatabaseDescriptor) -> Result<(), DatabaseError> {
        self.execute_query(database, None, "COMMIT TRANSACTION")
    }

    fn rollback_transaction(&mut self, database: &DatabaseDescriptor) -> Result<(), DatabaseError> {
        self.execute_query(database, None, "ROLLBACK TRANSACTION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip_with_boolean_hint() {
        let dir = TempDir::new().unwrap();
        let database = DatabaseDescriptor::new("flags");
        let entity = EntityDescriptor::new("Flag", "Flag")
            .with_attribute(Attribute::new("id", "id", "i64").primary())
            .with_attribute(Attribute::new("enabled", "enabled", "bool"));

        let mut driver = SqliteDriver::new();
        driver.open(&database, &dir.path().join("flags.db")).unwrap();
        driver
            .execute_query(&database, None, "CREATE TABLE Flag (id INTEGER, enabled NUMERIC)")
            .unwrap();
        let inserted = driver
            .execute_parameterized(
                &database,
                Some(&entity),
                "INSERT INTO Flag(id, enabled) VALUES(?, ?)",
                &[SqlValue::Integer(1), SqlValue::Boolean(true)],
            )
            .unwrap();
        assert_eq!(inserted, 1);

        let rows = driver
            .execute_select(&database, Some(&entity), "SELECT * FROM Flag")
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["enabled"], SqlValue::Boolean(true));

        let raw = driver.execute_select(&database, None, "SELECT * FROM Flag").unwrap();
        assert_eq!(raw[0]["enabled"], SqlValue::Integer(1));

        driver.close(&database).unwrap();
        assert!(!driver.is_open());
    }

    #[test]
    fn test_closed_driver_reports_not_open() {
        let database = DatabaseDescriptor::new("nothing");
        let mut driver = SqliteDriver::new();
        let err = driver.execute_query(&database, None, "SELECT 1").unwrap_err();
        assert!(matches!(err, DatabaseError::NotOpen { .. }));
    }

    #[test]
    fn test_execution_error_carries_sql() {
        let dir = TempDir::new().unwrap();
        let database = DatabaseDescriptor::new("broken");
        let mut driver = SqliteDriver::new();
        driver.open(&database, &dir.path().join("broken.db")).unwrap();

        let err = driver
            .execute_query(&database, None, "CREATE TABLE (")
            .unwrap_err();
        assert!(err.to_string().contains("CREATE TABLE ("));
    }
}
