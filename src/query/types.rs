/// Storage classes of the SQLite dialect
pub const INTEGER: &str = "INTEGER";
pub const REAL: &str = "REAL";
pub const NUMERIC: &str = "NUMERIC";
pub const TEXT: &str = "TEXT";
pub const BLOB: &str = "BLOB";
pub const NONE: &str = "NONE";

/// Translates declared attribute types into dialect storage types
pub trait DataTypeHandler: Send + Sync {
    fn convert(&self, declared_type: &str) -> &'static str;

    /// Whether values of this declared type are decoded as booleans
    fn is_boolean(&self, declared_type: &str) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteTypeHandler;

fn normalize(declared_type: &str) -> String {
    declared_type
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}

impl DataTypeHandler for SqliteTypeHandler {
    fn convert(&self, declared_type: &str) -> &'static str {
        match normalize(declared_type).as_str() {
            "i8" | "i16" | "i32" | "i64" | "u8" | "u16" | "u32" | "u64" | "isize" | "usize"
            | "int" | "integer" | "long" | "short" => INTEGER,
            "f32" | "f64" | "float" | "double" => REAL,
            "bool" | "boolean" => NUMERIC,
            "string" | "str" | "&str" | "char" | "text" => TEXT,
            "vec<u8>" | "bytes" | "blob" => BLOB,
            _ => NONE,
        }
    }

    fn is_boolean(&self, declared_type: &str) -> bool {
        matches!(normalize(declared_type).as_str(), "bool" | "boolean")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert() {
        let handler = SqliteTypeHandler;
        assert_eq!(handler.convert("i64"), INTEGER);
        assert_eq!(handler.convert("Long"), INTEGER);
        assert_eq!(handler.convert("f32"), REAL);
        assert_eq!(handler.convert("Boolean"), NUMERIC);
        assert_eq!(handler.convert("String"), TEXT);
        assert_eq!(handler.convert("Vec<u8>"), BLOB);
        assert_eq!(handler.convert("Vec< u8 >"), BLOB);
        assert_eq!(handler.convert("Uuid"), NONE);
    }

    #[test]
    fn test_is_boolean() {
        assert!(SqliteTypeHandler.is_boolean("bool"));
        assert!(!SqliteTypeHandler.is_boolean("String"));
    }
}
