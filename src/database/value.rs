use rusqlite::types::{Null, ValueRef};
use std::collections::BTreeMap;
use std::fmt;

/// A column value moving between the driver and the entity adapter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
}

/// One result row, column name -> value
pub type Row = BTreeMap<String, SqlValue>;

impl SqlValue {
    pub fn bind_to(&self, idx: usize, stmt: &mut rusqlite::Statement) -> rusqlite::Result<()> {
        match self {
            SqlValue::Null => stmt.raw_bind_parameter(idx, Null)?,
            SqlValue::Integer(i) => stmt.raw_bind_parameter(idx, i)?,
            SqlValue::Real(f) => stmt.raw_bind_parameter(idx, f)?,
            SqlValue::Text(s) => stmt.raw_bind_parameter(idx, s.as_str())?,
            SqlValue::Blob(b) => stmt.raw_bind_parameter(idx, b.as_slice())?,
            SqlValue::Boolean(b) => stmt.raw_bind_parameter(idx, *b)?,
        }
        Ok(())
    }

    /// Decode a column; `boolean` turns integer and text values into `Boolean`
    pub fn from_column(value: ValueRef<'_>, boolean: bool) -> Self {
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(i) if boolean => SqlValue::Boolean(i != 0),
            ValueRef::Integer(i) => SqlValue::Integer(i),
            ValueRef::Real(f) => SqlValue::Real(f),
            ValueRef::Text(t) => {
                let text = String::from_utf8_lossy(t).into_owned();
                if boolean {
                    match text.trim().to_ascii_lowercase().as_str() {
                        "true" | "1" => return SqlValue::Boolean(true),
                        "false" | "0" => return SqlValue::Boolean(false),
                        _ => {}
                    }
                }
                SqlValue::Text(text)
            }
            ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            SqlValue::Boolean(b) => Some(i64::from(*b)),
            SqlValue::Real(f) if f.fract() == 0.0 => Some(*f as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Integer(i) => Some(*i as f64),
            SqlValue::Real(f) => Some(*f),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Boolean(b) => Some(*b),
            SqlValue::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Integer(i) => write!(f, "{}", i),
            SqlValue::Real(r) => write!(f, "{}", r),
            SqlValue::Text(s) => f.write_str(s),
            SqlValue::Blob(b) => write!(f, "<{} bytes>", b.len()),
            SqlValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Boolean(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Blob(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_coercion() {
        assert_eq!(
            SqlValue::from_column(ValueRef::Integer(1), true),
            SqlValue::Boolean(true)
        );
        assert_eq!(
            SqlValue::from_column(ValueRef::Text(b"false"), true),
            SqlValue::Boolean(false)
        );
        assert_eq!(
            SqlValue::from_column(ValueRef::Text(b"false"), false),
            SqlValue::Text("false".to_string())
        );
        assert_eq!(
            SqlValue::from_column(ValueRef::Integer(1), false),
            SqlValue::Integer(1)
        );
    }

    #[test]
    fn test_accessors() {
        assert_eq!(SqlValue::from("42").as_i64(), Some(42));
        assert_eq!(SqlValue::from(2.0).as_i64(), Some(2));
        assert_eq!(SqlValue::from(true).as_i64(), Some(1));
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert!(SqlValue::Null.is_null());
        assert_eq!(SqlValue::Integer(3).to_string(), "3");
    }
}
