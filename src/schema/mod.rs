pub mod application;
pub mod database;
pub mod dependencies;
pub mod entity;
pub mod resolver;
pub mod types;

pub use application::*;
pub use database::*;
pub use dependencies::*;
pub use entity::*;
pub use resolver::*;
pub use types::*;
