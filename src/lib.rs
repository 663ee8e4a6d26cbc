pub mod cli;
pub mod database;
pub mod error;
pub mod parser;
pub mod query;
pub mod schema;
pub mod writer;

pub use cli::{Cli, Commands};
pub use database::{EntityAdapter, LifecycleState, OrmContext, Session, SqlValue};
pub use error::{Error, Result};
pub use parser::{load_application, resolve_schema, DescriptorSource, DirectorySource, MemorySource};
pub use query::{generate_sql, QueryRequest};
