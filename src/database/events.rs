use crate::schema::{DatabaseDescriptor, EntityDescriptor, Index};

/// Schema notifications. Every method defaults to doing nothing.
pub trait DatabaseEvents: Send + Sync {
    fn on_database_created(&self, _database: &DatabaseDescriptor) {}

    fn on_table_created(&self, _database: &DatabaseDescriptor, _entity: &EntityDescriptor) {}

    fn on_table_dropped(&self, _database: &DatabaseDescriptor, _entity: &EntityDescriptor) {}

    fn on_index_created(
        &self,
        _database: &DatabaseDescriptor,
        _entity: &EntityDescriptor,
        _index: &Index,
    ) {
    }

    fn on_index_dropped(
        &self,
        _database: &DatabaseDescriptor,
        _entity: &EntityDescriptor,
        _index: &Index,
    ) {
    }
}

/// Sink used when the application registers none
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEvents;

impl DatabaseEvents for NoEvents {}
