use super::value::{Row, SqlValue};
use crate::error::CriticalError;

/// Moves values between an application type and table rows.
///
/// Implemented once per mapped type. Accessor names are attribute variable
/// names; columns carried in from a related entity use `<refer>.<variable>`.
pub trait EntityAdapter: Sized {
    /// Class identifier the type is mapped under
    fn class_name() -> &'static str;

    /// Value behind one accessor
    fn value_of(&self, accessor: &str) -> Result<SqlValue, CriticalError>;

    /// Values behind `accessors`, in the same order
    fn values_for(&self, accessors: &[&str]) -> Result<Vec<SqlValue>, CriticalError> {
        accessors.iter().map(|accessor| self.value_of(accessor)).collect()
    }

    /// Rebuild an instance from a row keyed by column name
    fn build(row: &Row) -> Result<Self, CriticalError>;
}

/// Error for an accessor the adapter does not know
pub fn unknown_accessor<E: EntityAdapter>(accessor: &str) -> CriticalError {
    CriticalError::adapter(E::class_name(), format!("no accessor named '{}'", accessor))
}

/// Column of `row`, failing when the row does not carry it
pub fn column<'r, E: EntityAdapter>(row: &'r Row, name: &str) -> Result<&'r SqlValue, CriticalError> {
    row.get(name)
        .ok_or_else(|| CriticalError::adapter(E::class_name(), format!("row has no column '{}'", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Tag {
        id: i64,
        label: Option<String>,
    }

    impl EntityAdapter for Tag {
        fn class_name() -> &'static str {
            "Tag"
        }

        fn value_of(&self, accessor: &str) -> Result<SqlValue, CriticalError> {
            match accessor {
                "id" => Ok(self.id.into()),
                "label" => Ok(self.label.clone().into()),
                other => Err(unknown_accessor::<Self>(other)),
            }
        }

        fn build(row: &Row) -> Result<Self, CriticalError> {
            Ok(Self {
                id: column::<Self>(row, "id")?
                    .as_i64()
                    .ok_or_else(|| CriticalError::adapter("Tag", "id is not an integer"))?,
                label: column::<Self>(row, "label")?.as_str().map(str::to_string),
            })
        }
    }

    #[test]
    fn test_values_for_keeps_order() {
        let tag = Tag {
            id: 7,
            label: None,
        };
        assert_eq!(
            tag.values_for(&["label", "id"]).unwrap(),
            vec![SqlValue::Null, SqlValue::Integer(7)]
        );
        assert!(tag.values_for(&["colour"]).is_err());
    }

    #[test]
    fn test_build() {
        let mut row = Row::new();
        row.insert("id".to_string(), SqlValue::Integer(3));
        row.insert("label".to_string(), SqlValue::from("red"));
        assert_eq!(
            Tag::build(&row).unwrap(),
            Tag {
                id: 3,
                label: Some("red".to_string())
            }
        );

        row.remove("label");
        let err = Tag::build(&row).unwrap_err();
        assert!(err.to_string().contains("label"));
    }
}
