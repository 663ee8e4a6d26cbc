//! Explicitly constructed owner of the resolved schema and its connections.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;

use super::adapter::EntityAdapter;
use super::events::DatabaseEvents;
use super::lifecycle::{DatabaseBundle, LifecycleCoordinator, LifecycleState};
use super::storage::StorageProvider;
use super::value::SqlValue;
use crate::error::{CriticalError, DatabaseError, DescriptorError, Result};
use crate::query::{AggregateFunction, AggregateQuery, SelectQuery};
use crate::schema::{
    property, ApplicationDescriptor, DatabaseDescriptor, EntityDescriptor, Index,
    DEFAULT_DIALECT,
};
use crate::writer::{table_columns, TableColumn};

/// Resolved application plus one serialized connection per database.
///
/// CRUD on a database is refused until it has been made ready with
/// [`OrmContext::ensure_ready`] or [`OrmContext::ensure_all_ready`].
pub struct OrmContext {
    application: ApplicationDescriptor,
    /// Parallel to `application.databases()`
    bundles: Vec<Mutex<DatabaseBundle>>,
    coordinator: LifecycleCoordinator,
}

impl OrmContext {
    pub fn new(application: ApplicationDescriptor, storage: Arc<dyn StorageProvider>) -> Result<Self> {
        let mut bundles = Vec::with_capacity(application.databases().len());
        for database in application.databases() {
            if database.dialect != DEFAULT_DIALECT {
                return Err(DatabaseError::Unknown {
                    kind: "dialect",
                    name: database.dialect.clone(),
                }
                .into());
            }
            bundles.push(Mutex::new(DatabaseBundle::sqlite()));
        }

        Ok(Self {
            application,
            bundles,
            coordinator: LifecycleCoordinator::new(storage),
        })
    }

    pub fn with_events(self, events: Arc<dyn DatabaseEvents>) -> Self {
        Self {
            coordinator: self.coordinator.with_events(events),
            ..self
        }
    }

    pub fn application(&self) -> &ApplicationDescriptor {
        &self.application
    }

    fn position(&self, database_name: &str) -> std::result::Result<usize, DatabaseError> {
        self.application
            .database_position(database_name)
            .ok_or_else(|| DatabaseError::Unknown {
                kind: "database",
                name: database_name.to_string(),
            })
    }

    fn slot(&self, position: usize) -> std::result::Result<(&DatabaseDescriptor, &Mutex<DatabaseBundle>), DatabaseError> {
        self.application
            .databases()
            .get(position)
            .zip(self.bundles.get(position))
            .ok_or_else(|| DatabaseError::Unknown {
                kind: "database",
                name: position.to_string(),
            })
    }

    pub fn state(&self, database_name: &str) -> Result<LifecycleState> {
        let (_, bundle) = self.slot(self.position(database_name)?)?;
        let state = bundle.lock().state();
        Ok(state)
    }

    /// Create or open one database; CRUD against it is allowed afterwards
    pub fn ensure_ready(&self, database_name: &str) -> Result<LifecycleState> {
        let (database, bundle) = self.slot(self.position(database_name)?)?;
        let mut bundle = bundle.lock();
        self.coordinator.ensure_ready(database, &mut bundle)
    }

    /// Make every database ready, one thread per database.
    /// All databases are attempted; the first failure is returned.
    pub fn ensure_all_ready(&self) -> Result<()> {
        let results: Vec<Result<LifecycleState>> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .application
                .databases()
                .iter()
                .zip(&self.bundles)
                .map(|(database, bundle)| {
                    let coordinator = &self.coordinator;
                    let handle =
                        scope.spawn(move || coordinator.ensure_ready(database, &mut bundle.lock()));
                    (database, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(database, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        Err(CriticalError::Panicked {
                            database: database.database_name.clone(),
                        }
                        .into())
                    })
                })
                .collect()
        });

        for result in results {
            result?;
        }
        Ok(())
    }

    fn session_at<T>(
        &self,
        position: usize,
        f: impl FnOnce(&mut Session<'_>) -> Result<T>,
    ) -> Result<T> {
        let (database, bundle) = self.slot(position)?;
        let mut bundle = bundle.lock();
        bundle.ensure_active(database)?;

        let mut session = Session {
            database,
            bundle: &mut bundle,
        };
        f(&mut session)
    }

    fn with_session<E: EntityAdapter, T>(
        &self,
        f: impl FnOnce(&mut Session<'_>) -> Result<T>,
    ) -> Result<T> {
        let (position, _, _) =
            self.application
                .entity(E::class_name())
                .ok_or_else(|| DatabaseError::Unknown {
                    kind: "entity",
                    name: E::class_name().to_string(),
                })?;
        self.session_at(position, f)
    }

    /// Run `f` inside a transaction on one database. An error rolls back every
    /// statement `f` issued.
    pub fn transaction<T>(
        &self,
        database_name: &str,
        f: impl FnOnce(&mut Session<'_>) -> Result<T>,
    ) -> Result<T> {
        let (database, bundle) = self.slot(self.position(database_name)?)?;
        let mut bundle = bundle.lock();
        bundle.ensure_active(database)?;

        bundle.transaction(database, |bundle| f(&mut Session { database, bundle }))
    }

    pub fn save<E: EntityAdapter>(&self, object: &E) -> Result<()> {
        self.with_session::<E, _>(|session| session.save(object))
    }

    pub fn update<E: EntityAdapter>(&self, object: &E) -> Result<usize> {
        self.with_session::<E, _>(|session| session.update(object))
    }

    pub fn delete<E: EntityAdapter>(&self, object: &E) -> Result<usize> {
        self.with_session::<E, _>(|session| session.delete(object))
    }

    pub fn fetch<E: EntityAdapter>(&self, where_clause: Option<&str>) -> Result<Vec<E>> {
        self.with_session::<E, _>(|session| session.fetch(where_clause))
    }

    pub fn query<E: EntityAdapter>(&self, query: SelectQuery) -> Result<Vec<E>> {
        self.with_session::<E, _>(|session| session.query(query))
    }

    pub fn aggregate<E: EntityAdapter>(&self, query: AggregateQuery) -> Result<SqlValue> {
        self.with_session::<E, _>(|session| session.aggregate::<E>(query))
    }

    pub fn count<E: EntityAdapter>(&self, where_clause: Option<&str>) -> Result<i64> {
        self.with_session::<E, _>(|session| session.count::<E>(where_clause))
    }

    pub fn avg<E: EntityAdapter>(&self, column: &str, where_clause: Option<&str>) -> Result<SqlValue> {
        self.aggregate::<E>(aggregate_on(AggregateFunction::Avg, column, where_clause))
    }

    pub fn sum<E: EntityAdapter>(&self, column: &str, where_clause: Option<&str>) -> Result<SqlValue> {
        self.aggregate::<E>(aggregate_on(AggregateFunction::Sum, column, where_clause))
    }

    pub fn total<E: EntityAdapter>(&self, column: &str, where_clause: Option<&str>) -> Result<SqlValue> {
        self.aggregate::<E>(aggregate_on(AggregateFunction::Total, column, where_clause))
    }

    pub fn max<E: EntityAdapter>(&self, column: &str, where_clause: Option<&str>) -> Result<SqlValue> {
        self.aggregate::<E>(aggregate_on(AggregateFunction::Max, column, where_clause))
    }

    pub fn min<E: EntityAdapter>(&self, column: &str, where_clause: Option<&str>) -> Result<SqlValue> {
        self.aggregate::<E>(aggregate_on(AggregateFunction::Min, column, where_clause))
    }

    pub fn group_concat<E: EntityAdapter>(
        &self,
        column: &str,
        delimiter: Option<&str>,
        where_clause: Option<&str>,
    ) -> Result<SqlValue> {
        let function = AggregateFunction::GroupConcat {
            delimiter: delimiter.map(str::to_string),
        };
        self.aggregate::<E>(aggregate_on(function, column, where_clause))
    }

    fn entity_slot(&self, class_name: &str) -> Result<(usize, &EntityDescriptor)> {
        let (position, _, entity) =
            self.application
                .entity(class_name)
                .ok_or_else(|| DatabaseError::Unknown {
                    kind: "entity",
                    name: class_name.to_string(),
                })?;
        Ok((position, entity))
    }

    /// Drop the table of the entity mapping `class_name`
    pub fn drop_table(&self, class_name: &str) -> Result<()> {
        let (position, entity) = self.entity_slot(class_name)?;
        let events = self.coordinator.events();

        self.session_at(position, |session| {
            let sql = session.bundle.query_builder.drop_table(&entity.table_name)?;
            session
                .bundle
                .driver
                .execute_query(session.database, Some(entity), &sql)?;
            events.on_table_dropped(session.database, entity);
            tracing::info!(table = %entity.table_name, "dropped table");
            Ok(())
        })
    }

    /// Create an additional index on the table of the entity mapping `class_name`
    pub fn create_index(&self, class_name: &str, index: &Index) -> Result<()> {
        index.validate(&format!("class {}", class_name))?;
        let (position, entity) = self.entity_slot(class_name)?;
        let events = self.coordinator.events();

        self.session_at(position, |session| {
            let request = crate::query::CreateIndex {
                name: index.name.clone(),
                table: entity.table_name.clone(),
                columns: index.columns.clone(),
                unique: index.unique,
            };
            let sql = session.bundle.query_builder.create_index(&request)?;
            session
                .bundle
                .driver
                .execute_query(session.database, Some(entity), &sql)?;
            events.on_index_created(session.database, entity, index);
            Ok(())
        })
    }

    /// Close every open connection. All databases are attempted.
    pub fn shutdown(&self) -> Result<()> {
        let mut failed = Vec::new();

        for (database, bundle) in self.application.databases().iter().zip(&self.bundles) {
            let mut bundle = bundle.lock();
            if !bundle.driver.is_open() {
                continue;
            }
            match bundle.driver.close(database) {
                Ok(()) => bundle.reset(),
                Err(err) => {
                    tracing::error!(database = %database.database_name, error = %err, "failed to close database");
                    failed.push(database.database_name.clone());
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(CriticalError::Shutdown { databases: failed }.into())
        }
    }
}

fn aggregate_on(function: AggregateFunction, column: &str, where_clause: Option<&str>) -> AggregateQuery {
    let query = AggregateQuery::new(function, String::new()).column(column);
    match where_clause {
        Some(clause) => query.filter(clause),
        None => query,
    }
}

/// CRUD on one ready database, holding its connection for the duration
pub struct Session<'a> {
    database: &'a DatabaseDescriptor,
    bundle: &'a mut DatabaseBundle,
}

impl<'a> Session<'a> {
    pub fn database(&self) -> &DatabaseDescriptor {
        self.database
    }

    fn entity<E: EntityAdapter>(&self) -> std::result::Result<&'a EntityDescriptor, DatabaseError> {
        self.database
            .entity_by_class_name(E::class_name())
            .ok_or_else(|| DatabaseError::Unknown {
                kind: "entity",
                name: format!("{} in database {}", E::class_name(), self.database.database_name),
            })
    }

    /// Table columns plus the primary-key subset, in table order
    fn columns(&self, entity: &EntityDescriptor) -> Result<(Vec<TableColumn>, Vec<TableColumn>)> {
        let columns = table_columns(self.database, entity)?;
        let keys: Vec<TableColumn> = columns
            .iter()
            .filter(|c| c.attribute.primary_key)
            .cloned()
            .collect();
        Ok((columns, keys))
    }

    fn key_filter(entity: &EntityDescriptor, keys: &[TableColumn]) -> Result<String> {
        if keys.is_empty() {
            return Err(DescriptorError::missing(entity.identity(), property::PRIMARY_KEY).into());
        }
        Ok(keys
            .iter()
            .map(|k| format!("{} = ?", k.attribute.column_name))
            .collect::<Vec<_>>()
            .join(" AND "))
    }

    fn names(columns: &[TableColumn]) -> Vec<String> {
        columns.iter().map(|c| c.attribute.column_name.clone()).collect()
    }

    fn accessors(columns: &[TableColumn]) -> Vec<&str> {
        columns.iter().map(|c| c.accessor.as_str()).collect()
    }

    /// Insert one object
    pub fn save<E: EntityAdapter>(&mut self, object: &E) -> Result<()> {
        let entity = self.entity::<E>()?;
        let (columns, _) = self.columns(entity)?;

        let values = object.values_for(&Self::accessors(&columns))?;
        let sql = self
            .bundle
            .query_builder
            .insert(&entity.table_name, &Self::names(&columns))?;
        self.bundle
            .driver
            .execute_parameterized(self.database, Some(entity), &sql, &values)?;
        Ok(())
    }

    /// Rewrite the row matching the object's primary key; returns rows changed
    pub fn update<E: EntityAdapter>(&mut self, object: &E) -> Result<usize> {
        let entity = self.entity::<E>()?;
        let (columns, keys) = self.columns(entity)?;
        let filter = Self::key_filter(entity, &keys)?;

        let mut values = object.values_for(&Self::accessors(&columns))?;
        values.extend(object.values_for(&Self::accessors(&keys))?);

        let sql = self.bundle.query_builder.update(
            &entity.table_name,
            &Self::names(&columns),
            Some(&filter),
        )?;
        Ok(self
            .bundle
            .driver
            .execute_parameterized(self.database, Some(entity), &sql, &values)?)
    }

    /// Delete the row matching the object's primary key; returns rows removed
    pub fn delete<E: EntityAdapter>(&mut self, object: &E) -> Result<usize> {
        let entity = self.entity::<E>()?;
        let (_, keys) = self.columns(entity)?;
        let filter = Self::key_filter(entity, &keys)?;

        let values = object.values_for(&Self::accessors(&keys))?;
        let sql = self
            .bundle
            .query_builder
            .delete(&entity.table_name, Some(&filter))?;
        Ok(self
            .bundle
            .driver
            .execute_parameterized(self.database, Some(entity), &sql, &values)?)
    }

    pub fn fetch<E: EntityAdapter>(&mut self, where_clause: Option<&str>) -> Result<Vec<E>> {
        let query = match where_clause {
            Some(clause) => SelectQuery::default().filter(clause),
            None => SelectQuery::default(),
        };
        self.query(query)
    }

    /// Run a SELECT against the entity's table and build one object per row
    pub fn query<E: EntityAdapter>(&mut self, query: SelectQuery) -> Result<Vec<E>> {
        let entity = self.entity::<E>()?;
        let query = SelectQuery {
            table: entity.table_name.clone(),
            ..query
        };

        let sql = self.bundle.query_builder.select(&query)?;
        let rows = self
            .bundle
            .driver
            .execute_select(self.database, Some(entity), &sql)?;

        let objects = rows
            .iter()
            .map(E::build)
            .collect::<std::result::Result<Vec<_>, CriticalError>>()?;
        Ok(objects)
    }

    /// Run an aggregate against the entity's table
    pub fn aggregate<E: EntityAdapter>(&mut self, query: AggregateQuery) -> Result<SqlValue> {
        let entity = self.entity::<E>()?;
        let query = AggregateQuery {
            table: entity.table_name.clone(),
            ..query
        };

        let sql = self.bundle.query_builder.aggregate(&query)?;
        self.bundle.scalar(self.database, &sql)
    }

    pub fn count<E: EntityAdapter>(&mut self, where_clause: Option<&str>) -> Result<i64> {
        let query = AggregateQuery::new(AggregateFunction::Count { distinct: false }, String::new());
        let query = match where_clause {
            Some(clause) => query.filter(clause),
            None => query,
        };
        Ok(self.aggregate::<E>(query)?.as_i64().unwrap_or(0))
    }
}
