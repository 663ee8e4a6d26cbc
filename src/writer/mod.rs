pub mod schema_gen;

pub use schema_gen::*;
