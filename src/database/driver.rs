use std::path::Path;

use super::value::{Row, SqlValue};
use crate::error::DatabaseError;
use crate::schema::{DatabaseDescriptor, EntityDescriptor};

/// Physical database primitives.
///
/// The entity hint lets a driver coerce column values by the declared type of
/// the matching attribute when decoding rows.
pub trait Driver: Send {
    fn open(&mut self, database: &DatabaseDescriptor, path: &Path) -> Result<(), DatabaseError>;

    fn close(&mut self, database: &DatabaseDescriptor) -> Result<(), DatabaseError>;

    fn is_open(&self) -> bool;

    fn execute_query(
        &mut self,
        database: &DatabaseDescriptor,
        entity: Option<&EntityDescriptor>,
        sql: &str,
    ) -> Result<(), DatabaseError>;

    /// Run `sql` with `values` bound positionally; returns the affected row count
    fn execute_parameterized(
        &mut self,
        database: &DatabaseDescriptor,
        entity: Option<&EntityDescriptor>,
        sql: &str,
        values: &[SqlValue],
    ) -> Result<usize, DatabaseError>;

    fn execute_select(
        &mut self,
        database: &DatabaseDescriptor,
        entity: Option<&EntityDescriptor>,
        sql: &str,
    ) -> Result<Vec<Row>, DatabaseError>;

    fn begin_transaction(&mut self, database: &DatabaseDescriptor) -> Result<(), DatabaseError>;

    fn commit_transaction(&mut self, database: &DatabaseDescriptor) -> Result<(), DatabaseError>;

    fn rollback_transaction(&mut self, database: &DatabaseDescriptor)
        -> Result<(), DatabaseError>;
}
