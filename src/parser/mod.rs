pub mod descriptor;
pub mod source;

pub use descriptor::{
    load_application, parse_application, parse_database, parse_entity, parse_library,
    resolve_schema,
};
pub use source::{DescriptorSource, DirectorySource, MemorySource};
