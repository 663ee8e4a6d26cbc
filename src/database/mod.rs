pub mod adapter;
pub mod context;
pub mod driver;
pub mod events;
pub mod lifecycle;
pub mod sqlite;
pub mod storage;
pub mod value;

pub use adapter::{column, unknown_accessor, EntityAdapter};
pub use context::{OrmContext, Session};
pub use driver::Driver;
pub use events::{DatabaseEvents, NoEvents};
pub use lifecycle::{DatabaseBundle, LifecycleCoordinator, LifecycleState};
pub use sqlite::SqliteDriver;
pub use storage::{FileStorage, StorageProvider};
pub use value::{Row, SqlValue};
