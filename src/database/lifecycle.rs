//! Create-or-open-or-upgrade decision for one configured database.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::driver::Driver;
use super::events::{DatabaseEvents, NoEvents};
use super::sqlite::SqliteDriver;
use super::storage::StorageProvider;
use super::value::SqlValue;
use crate::error::{DatabaseError, Result};
use crate::query::{DataTypeHandler, QueryBuilder, SqliteQueryBuilder, SqliteTypeHandler};
use crate::schema::{creation_order, DatabaseDescriptor, EntityDescriptor};
use crate::writer::{create_table_request, index_requests, table_columns};

/// Where a database stands on its way to accepting CRUD operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unresolved,
    Missing,
    Present,
    Created,
    Opened,
    Upgraded,
    Active,
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Unresolved => "unresolved",
            LifecycleState::Missing => "missing",
            LifecycleState::Present => "present",
            LifecycleState::Created => "created",
            LifecycleState::Opened => "opened",
            LifecycleState::Upgraded => "upgraded",
            LifecycleState::Active => "active",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The single connection of one database with its dialect
pub struct DatabaseBundle {
    pub driver: Box<dyn Driver>,
    pub query_builder: Box<dyn QueryBuilder>,
    pub types: Box<dyn DataTypeHandler>,
    state: LifecycleState,
    path: Option<PathBuf>,
}

impl DatabaseBundle {
    pub fn new(
        driver: Box<dyn Driver>,
        query_builder: Box<dyn QueryBuilder>,
        types: Box<dyn DataTypeHandler>,
    ) -> Self {
        Self {
            driver,
            query_builder,
            types,
            state: LifecycleState::Unresolved,
            path: None,
        }
    }

    /// Bundle for the built-in SQLite dialect
    pub fn sqlite() -> Self {
        Self::new(
            Box::new(SqliteDriver::new()),
            Box::new(SqliteQueryBuilder),
            Box::new(SqliteTypeHandler),
        )
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == LifecycleState::Active
    }

    /// Forget readiness after the connection was closed
    pub(crate) fn reset(&mut self) {
        self.state = LifecycleState::Unresolved;
    }

    /// Database file, once the coordinator has located it
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Fail with `NotReady` unless the database accepts CRUD operations
    pub fn ensure_active(&self, database: &DatabaseDescriptor) -> std::result::Result<(), DatabaseError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(DatabaseError::NotReady {
                database: database.database_name.clone(),
                state: self.state.to_string(),
            })
        }
    }

    /// Run `f` inside a transaction; any error rolls it back before propagating
    pub fn transaction<T>(
        &mut self,
        database: &DatabaseDescriptor,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.driver.begin_transaction(database)?;
        match f(self) {
            Ok(value) => {
                self.driver.commit_transaction(database)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.driver.rollback_transaction(database) {
                    tracing::warn!(database = %database.database_name, error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Create an entity's table and its indexes, firing the matching events
    pub fn create_table(
        &mut self,
        database: &DatabaseDescriptor,
        entity: &EntityDescriptor,
        events: &dyn DatabaseEvents,
    ) -> Result<()> {
        let request = create_table_request(database, entity, self.types.as_ref())?;
        let sql = self.query_builder.create_table(&request)?;
        self.driver.execute_query(database, Some(entity), &sql)?;
        events.on_table_created(database, entity);

        self.create_indexes(database, entity, events)
    }

    fn create_indexes(
        &mut self,
        database: &DatabaseDescriptor,
        entity: &EntityDescriptor,
        events: &dyn DatabaseEvents,
    ) -> Result<()> {
        for (request, index) in index_requests(entity).iter().zip(entity.indexes()) {
            let sql = self.query_builder.create_index(request)?;
            self.driver.execute_query(database, Some(entity), &sql)?;
            events.on_index_created(database, entity, index);
        }
        Ok(())
    }

    /// Run a single-column query and return the first value
    pub fn scalar(&mut self, database: &DatabaseDescriptor, sql: &str) -> Result<SqlValue> {
        let rows = self.driver.execute_select(database, None, sql)?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_values().next())
            .unwrap_or(SqlValue::Null))
    }

    /// Values of one named column across all rows
    fn column_values(
        &mut self,
        database: &DatabaseDescriptor,
        sql: &str,
        column: &str,
    ) -> Result<Vec<String>> {
        let rows = self.driver.execute_select(database, None, sql)?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| match row.remove(column) {
                Some(SqlValue::Text(value)) => Some(value),
                _ => None,
            })
            .collect())
    }
}

/// Drives every configured database to `Active`
#[derive(Clone)]
pub struct LifecycleCoordinator {
    storage: Arc<dyn StorageProvider>,
    events: Arc<dyn DatabaseEvents>,
}

impl LifecycleCoordinator {
    pub fn new(storage: Arc<dyn StorageProvider>) -> Self {
        Self {
            storage,
            events: Arc::new(NoEvents),
        }
    }

    pub fn with_events(self, events: Arc<dyn DatabaseEvents>) -> Self {
        Self { events, ..self }
    }

    pub fn storage(&self) -> &dyn StorageProvider {
        self.storage.as_ref()
    }

    pub fn events(&self) -> &dyn DatabaseEvents {
        self.events.as_ref()
    }

    /// Create, or open and upgrade, the database behind `bundle`.
    ///
    /// Returns once the database is `Active`. A failed creation removes the
    /// partially written file; a failed open leaves the existing file alone.
    pub fn ensure_ready(
        &self,
        database: &DatabaseDescriptor,
        bundle: &mut DatabaseBundle,
    ) -> Result<LifecycleState> {
        if bundle.is_active() {
            return Ok(LifecycleState::Active);
        }

        let path = self.storage.database_path(database);
        bundle.path = Some(path.clone());
        bundle.state = if self.storage.exists(&path) {
            LifecycleState::Present
        } else {
            LifecycleState::Missing
        };
        tracing::info!(
            database = %database.database_name,
            path = %path.display(),
            state = %bundle.state,
            "preparing database"
        );

        let result = match bundle.state {
            LifecycleState::Missing => self.create(database, bundle, &path),
            _ => self.open(database, bundle, &path),
        };

        match result {
            Ok(state) => {
                tracing::info!(database = %database.database_name, via = %state, "database active");
                bundle.state = LifecycleState::Active;
                Ok(LifecycleState::Active)
            }
            Err(err) => {
                let created = bundle.state == LifecycleState::Missing;
                bundle.state = LifecycleState::Failed;
                self.close_quietly(database, bundle);
                if created {
                    if let Err(cleanup) = self.storage.remove(database, &path) {
                        tracing::warn!(database = %database.database_name, error = %cleanup, "failed to remove partial database");
                    }
                }
                tracing::error!(database = %database.database_name, error = %err, "database deployment failed");
                Err(err)
            }
        }
    }

    fn close_quietly(&self, database: &DatabaseDescriptor, bundle: &mut DatabaseBundle) {
        if let Err(err) = bundle.driver.close(database) {
            tracing::warn!(database = %database.database_name, error = %err, "failed to close database");
        }
    }

    fn create(
        &self,
        database: &DatabaseDescriptor,
        bundle: &mut DatabaseBundle,
        path: &Path,
    ) -> Result<LifecycleState> {
        self.storage.prepare(database, path)?;
        bundle.driver.open(database, path)?;

        let sql = bundle.query_builder.update_database_version(database.version);
        bundle.driver.execute_query(database, None, &sql)?;
        self.events.on_database_created(database);

        let sql = bundle.query_builder.enable_foreign_keys();
        bundle.driver.execute_query(database, None, &sql)?;

        let order = creation_order(database)?;
        bundle.transaction(database, |bundle| {
            for index in order {
                if let Some(entity) = database.entity_at(index) {
                    bundle.create_table(database, entity, self.events.as_ref())?;
                }
            }
            Ok(())
        })?;

        Ok(LifecycleState::Created)
    }

    fn open(
        &self,
        database: &DatabaseDescriptor,
        bundle: &mut DatabaseBundle,
        path: &Path,
    ) -> Result<LifecycleState> {
        bundle.driver.open(database, path)?;

        let sql = bundle.query_builder.enable_foreign_keys();
        bundle.driver.execute_query(database, None, &sql)?;

        self.upgrade(database, bundle)
    }

    /// Bring an existing database up to the described schema. Only adds tables,
    /// columns and indexes.
    fn upgrade(
        &self,
        database: &DatabaseDescriptor,
        bundle: &mut DatabaseBundle,
    ) -> Result<LifecycleState> {
        let sql = bundle.query_builder.fetch_database_version();
        let stored = bundle.scalar(database, &sql)?.as_i64().unwrap_or(0);
        if stored == database.version {
            tracing::debug!(database = %database.database_name, version = stored, "schema up to date");
            return Ok(LifecycleState::Opened);
        }

        tracing::info!(
            database = %database.database_name,
            from = stored,
            to = database.version,
            "upgrading database"
        );

        let order = creation_order(database)?;
        bundle.transaction(database, |bundle| {
            let sql = bundle.query_builder.table_names();
            let existing: HashSet<String> = bundle
                .column_values(database, &sql, "name")?
                .into_iter()
                .filter(|table| !bundle.query_builder.is_reserved_table(table))
                .map(|table| table.to_ascii_lowercase())
                .collect();

            for index in order {
                let Some(entity) = database.entity_at(index) else {
                    continue;
                };

                if !existing.contains(&entity.table_name.to_ascii_lowercase()) {
                    bundle.create_table(database, entity, self.events.as_ref())?;
                    continue;
                }

                let sql = bundle.query_builder.table_info(&entity.table_name)?;
                let columns: HashSet<String> = bundle
                    .column_values(database, &sql, "name")?
                    .into_iter()
                    .map(|column| column.to_ascii_lowercase())
                    .collect();

                for column in table_columns(database, entity)? {
                    let name = &column.attribute.column_name;
                    if columns.contains(&name.to_ascii_lowercase()) {
                        continue;
                    }
                    let sql = bundle.query_builder.alter_add_column(&entity.table_name, name)?;
                    bundle.driver.execute_query(database, Some(entity), &sql)?;
                    tracing::info!(table = %entity.table_name, column = %name, "added column");
                }

                for request in index_requests(entity) {
                    let sql = bundle.query_builder.create_index(&request)?;
                    bundle.driver.execute_query(database, Some(entity), &sql)?;
                }
            }

            let sql = bundle.query_builder.update_database_version(database.version);
            bundle.driver.execute_query(database, None, &sql)?;
            Ok(())
        })?;

        Ok(LifecycleState::Upgraded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::storage::FileStorage;
    use crate::schema::{resolve, Attribute, Relationship, RelationshipKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Counter {
        databases: AtomicUsize,
        tables: AtomicUsize,
    }

    impl DatabaseEvents for Counter {
        fn on_database_created(&self, _database: &DatabaseDescriptor) {
            self.databases.fetch_add(1, Ordering::SeqCst);
        }

        fn on_table_created(&self, _database: &DatabaseDescriptor, _entity: &EntityDescriptor) {
            self.tables.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn shop(version: i64) -> DatabaseDescriptor {
        let user = EntityDescriptor::new("User", "User")
            .with_attribute(Attribute::new("id", "id", "i64").primary());
        let order = EntityDescriptor::new("Orders", "Order")
            .with_attribute(Attribute::new("id", "id", "i64").primary())
            .with_relationship(Relationship::new(RelationshipKind::ManyToOne, "user", "User"));
        let mut database = DatabaseDescriptor::new("shop")
            .with_version(version)
            .with_entity(order)
            .with_entity(user);
        resolve(&mut database).unwrap();
        database
    }

    #[test]
    fn test_missing_database_is_created() {
        let dir = TempDir::new().unwrap();
        let events = Arc::new(Counter::default());
        let coordinator = LifecycleCoordinator::new(Arc::new(FileStorage::new(dir.path().join("db"))))
            .with_events(events.clone());

        let database = shop(2);
        let mut bundle = DatabaseBundle::sqlite();
        assert_eq!(bundle.state(), LifecycleState::Unresolved);

        let state = coordinator.ensure_ready(&database, &mut bundle).unwrap();
        assert_eq!(state, LifecycleState::Active);
        assert!(bundle.path().unwrap().is_file());
        assert_eq!(events.databases.load(Ordering::SeqCst), 1);
        assert_eq!(events.tables.load(Ordering::SeqCst), 2);

        let version = bundle.scalar(&database, "PRAGMA user_version;").unwrap();
        assert_eq!(version, SqlValue::Integer(2));

        // already active: nothing happens
        coordinator.ensure_ready(&database, &mut bundle).unwrap();
        assert_eq!(events.databases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transaction_rolls_back() {
        let dir = TempDir::new().unwrap();
        let coordinator = LifecycleCoordinator::new(Arc::new(FileStorage::new(dir.path())));
        let database = shop(1);
        let mut bundle = DatabaseBundle::sqlite();
        coordinator.ensure_ready(&database, &mut bundle).unwrap();

        let result: Result<()> = bundle.transaction(&database, |bundle| {
            bundle
                .driver
                .execute_query(&database, None, "INSERT INTO User(id) VALUES(1)")?;
            Err(DatabaseError::NotOpen {
                database: "forced".to_string(),
            }
            .into())
        });
        assert!(result.is_err());

        let count = bundle.scalar(&database, "SELECT COUNT(*) FROM User").unwrap();
        assert_eq!(count, SqlValue::Integer(0));
    }

    #[test]
    fn test_ensure_active_gate() {
        let bundle = DatabaseBundle::sqlite();
        let err = bundle.ensure_active(&shop(1)).unwrap_err();
        assert!(err.to_string().contains("unresolved"));
    }
}
