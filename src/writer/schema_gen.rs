use crate::error::{ResolutionError, Result, SqlGenerationError};
use crate::query::{
    ColumnDefinition, CreateIndex, CreateTable, DataTypeHandler, ForeignKeyClause, QueryBuilder,
};
use crate::schema::{
    compute_foreign_keys, Attribute, DatabaseDescriptor, EntityDescriptor, Relationship,
    RelationshipKind,
};

/// Physical column of an entity's table
#[derive(Debug, Clone, PartialEq)]
pub struct TableColumn {
    /// Accessor the entity adapter reads and writes the value through.
    /// Propagated columns use `<refer>.<variable>`.
    pub accessor: String,
    pub attribute: Attribute,
    /// Carried in from a related entity rather than declared locally
    pub propagated: bool,
}

fn target_index(
    database: &DatabaseDescriptor,
    entity: &EntityDescriptor,
    relationship: &Relationship,
) -> std::result::Result<usize, ResolutionError> {
    relationship
        .referred_index()
        .or_else(|| database.position_of_class(&relationship.refer_to))
        .ok_or_else(|| ResolutionError::UnresolvedReference {
            entity: entity.class_name.clone(),
            class_name: relationship.refer_to.clone(),
        })
}

/// Resolved foreign-key set of the entity at `index`
fn foreign_keys_of(
    database: &DatabaseDescriptor,
    index: usize,
) -> std::result::Result<Vec<Attribute>, ResolutionError> {
    match database.entity_at(index).and_then(|e| e.foreign_keys()) {
        Some(keys) => Ok(keys.to_vec()),
        None => compute_foreign_keys(database, index),
    }
}

/// Columns of `entity`'s table: its own attributes, then the foreign-key set of
/// every many-to-one and many-to-many target as key columns, then the keys of
/// one-to-one targets as plain columns.
///
/// Key columns join the table's primary key, so the primary key always equals
/// the resolved foreign-key set a child references. Repeated column names keep
/// their first occurrence; a repeated key column marks the existing column as key.
pub fn table_columns(
    database: &DatabaseDescriptor,
    entity: &EntityDescriptor,
) -> std::result::Result<Vec<TableColumn>, ResolutionError> {
    let mut columns: Vec<TableColumn> = entity
        .attributes()
        .iter()
        .map(|attribute| TableColumn {
            accessor: attribute.getter_name().to_string(),
            attribute: attribute.clone(),
            propagated: false,
        })
        .collect();

    let mut push = |relationship: &Relationship, mut attribute: Attribute, key: bool| {
        if let Some(existing) = columns
            .iter_mut()
            .find(|c| c.attribute.column_name.eq_ignore_ascii_case(&attribute.column_name))
        {
            if key {
                existing.attribute.primary_key = true;
            }
            return;
        }
        attribute.primary_key = key;
        attribute.unique = false;
        columns.push(TableColumn {
            accessor: format!("{}.{}", relationship.getter_name(), attribute.getter_name()),
            attribute,
            propagated: true,
        });
    };

    for relationship in entity.relationships() {
        let carries_key = relationship
            .kind
            .map(|kind| kind.carries_foreign_key())
            .unwrap_or(false);
        if !carries_key {
            continue;
        }
        let target = target_index(database, entity, relationship)?;
        for attribute in foreign_keys_of(database, target)? {
            push(relationship, attribute, true);
        }
    }

    for relationship in entity.relationships_of(RelationshipKind::OneToOne) {
        let target = target_index(database, entity, relationship)?;
        for attribute in foreign_keys_of(database, target)? {
            push(relationship, attribute, false);
        }
    }

    for relationship in entity.relationships_of(RelationshipKind::ManyToMany) {
        let target_position = target_index(database, entity, relationship)?;
        let Some(target) = database.entity_at(target_position) else {
            continue;
        };
        for nested in target.relationships_of(RelationshipKind::OneToOne) {
            let nested_target = target_index(database, target, nested)?;
            for attribute in foreign_keys_of(database, nested_target)? {
                push(relationship, attribute, false);
            }
        }
    }

    Ok(columns)
}

/// One FOREIGN KEY clause per many-to-one and many-to-many relationship
pub fn foreign_key_clauses(
    database: &DatabaseDescriptor,
    entity: &EntityDescriptor,
) -> std::result::Result<Vec<ForeignKeyClause>, ResolutionError> {
    let mut clauses = Vec::new();

    for relationship in entity.relationships() {
        let carries_key = relationship
            .kind
            .map(|kind| kind.carries_foreign_key())
            .unwrap_or(false);
        if !carries_key {
            continue;
        }

        let target = target_index(database, entity, relationship)?;
        let Some(parent) = database.entity_at(target) else {
            continue;
        };
        let columns: Vec<String> = foreign_keys_of(database, target)?
            .into_iter()
            .map(|a| a.column_name)
            .collect();
        if columns.is_empty() {
            continue;
        }

        clauses.push(ForeignKeyClause {
            columns,
            parent_table: parent.table_name.clone(),
            on_delete: relationship.on_delete,
            on_update: relationship.on_update,
        });
    }

    Ok(clauses)
}

/// Build the CREATE TABLE request for a resolved entity
pub fn create_table_request(
    database: &DatabaseDescriptor,
    entity: &EntityDescriptor,
    types: &dyn DataTypeHandler,
) -> std::result::Result<CreateTable, ResolutionError> {
    let columns = table_columns(database, entity)?;

    let mut request = CreateTable {
        table: entity.table_name.clone(),
        ..CreateTable::default()
    };
    for column in &columns {
        let attribute = &column.attribute;
        request.columns.push(ColumnDefinition {
            name: attribute.column_name.clone(),
            sql_type: types.convert(&attribute.data_type).to_string(),
            not_null: attribute.not_null,
            default_value: attribute.default_value.clone(),
            check: attribute.check.clone(),
        });
        if attribute.primary_key {
            request.primary_keys.push(attribute.column_name.clone());
        }
        if attribute.unique {
            request.unique_columns.push(attribute.column_name.clone());
        }
    }
    request.foreign_keys = foreign_key_clauses(database, entity)?;

    Ok(request)
}

/// Generate CREATE TABLE SQL for an entity
pub fn generate_create_table(
    database: &DatabaseDescriptor,
    entity: &EntityDescriptor,
    builder: &dyn QueryBuilder,
    types: &dyn DataTypeHandler,
) -> Result<String> {
    let request = create_table_request(database, entity, types)?;
    Ok(builder.create_table(&request)?)
}

/// CREATE INDEX requests for every declared index, in declaration order
pub fn index_requests(entity: &EntityDescriptor) -> Vec<CreateIndex> {
    entity
        .indexes()
        .iter()
        .map(|index| CreateIndex {
            name: index.name.clone(),
            table: entity.table_name.clone(),
            columns: index.columns.clone(),
            unique: index.unique,
        })
        .collect()
}

/// Generate CREATE INDEX statements for an entity
pub fn generate_indexes(
    entity: &EntityDescriptor,
    builder: &dyn QueryBuilder,
) -> std::result::Result<Vec<String>, SqlGenerationError> {
    index_requests(entity)
        .iter()
        .map(|request| builder.create_index(request))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{SqliteQueryBuilder, SqliteTypeHandler};
    use crate::schema::{resolve, Index, ReferentialAction};

    fn shop() -> DatabaseDescriptor {
        let user = EntityDescriptor::new("User", "User")
            .with_attribute(Attribute::new("id", "id", "i64").primary())
            .with_attribute(Attribute::new("name", "name", "String"));
        let order = EntityDescriptor::new("Orders", "Order")
            .with_attribute(Attribute::new("id", "id", "i64").primary())
            .with_attribute(Attribute::new("total", "total", "f64").required().default_value("0"))
            .with_index(Index::on("idx_orders_total", &["total"]))
            .with_relationship(
                Relationship::new(RelationshipKind::ManyToOne, "user", "User")
                    .on_delete(ReferentialAction::Cascade),
            );

        let mut database = DatabaseDescriptor::new("shop")
            .with_entity(user)
            .with_entity(order);
        resolve(&mut database).unwrap();
        database
    }

    #[test]
    fn test_generate_create_table() {
        let database = shop();
        let order = database.entity_by_class_name("Order").unwrap();
        let sql =
            generate_create_table(&database, order, &SqliteQueryBuilder, &SqliteTypeHandler).unwrap();

        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS Orders (id INTEGER, total REAL NOT NULL DEFAULT '0', PRIMARY KEY(id), FOREIGN KEY(id) REFERENCES User(id) ON DELETE CASCADE)"
        );
    }

    #[test]
    fn test_propagated_columns() {
        let account = EntityDescriptor::new("Account", "Account")
            .with_attribute(Attribute::new("account_id", "id", "i64").primary());
        let profile = EntityDescriptor::new("Profile", "Profile")
            .with_attribute(Attribute::new("bio", "bio", "String"))
            .with_relationship(Relationship::new(RelationshipKind::OneToOne, "account", "Account"));
        let tag = EntityDescriptor::new("Tag", "Tag")
            .with_attribute(Attribute::new("tag_id", "id", "i64").primary())
            .with_relationship(Relationship::new(RelationshipKind::OneToOne, "owner", "Account"));
        let post = EntityDescriptor::new("Post", "Post")
            .with_attribute(Attribute::new("post_id", "id", "i64").primary())
            .with_relationship(Relationship::new(RelationshipKind::ManyToMany, "tags", "Tag"));

        let mut database = DatabaseDescriptor::new("blog")
            .with_entity(account)
            .with_entity(profile)
            .with_entity(tag)
            .with_entity(post);
        resolve(&mut database).unwrap();

        let profile = database.entity_by_class_name("Profile").unwrap();
        let columns = table_columns(&database, profile).unwrap();
        let accessors: Vec<_> = columns.iter().map(|c| c.accessor.as_str()).collect();
        assert_eq!(accessors, vec!["bio", "account.id"]);
        assert!(columns[1].propagated);

        let post = database.entity_by_class_name("Post").unwrap();
        let request = create_table_request(&database, post, &SqliteTypeHandler).unwrap();
        let names: Vec<_> = request.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["post_id", "tag_id", "account_id"]);
        assert_eq!(request.primary_keys, vec!["post_id", "tag_id"]);
        assert_eq!(request.foreign_keys.len(), 1);
        assert_eq!(request.foreign_keys[0].parent_table, "Tag");
        assert_eq!(request.foreign_keys[0].columns, vec!["tag_id"]);
    }

    /// Primary key of every table, as a set of lowercase column names
    fn key_set(database: &DatabaseDescriptor, class_name: &str) -> Vec<String> {
        let entity = database.entity_by_class_name(class_name).unwrap();
        let mut keys: Vec<String> = table_columns(database, entity)
            .unwrap()
            .into_iter()
            .filter(|c| c.attribute.primary_key)
            .map(|c| c.attribute.column_name.to_ascii_lowercase())
            .collect();
        keys.sort();
        keys
    }

    fn chain(parent_link: RelationshipKind, child_link: RelationshipKind) -> DatabaseDescriptor {
        let account = EntityDescriptor::new("Account", "Account")
            .with_attribute(Attribute::new("account_id", "id", "i64").primary());
        let tag = EntityDescriptor::new("Tag", "Tag")
            .with_attribute(Attribute::new("tag_id", "id", "i64").primary().unique())
            .with_relationship(Relationship::new(parent_link, "account", "Account"));
        let post = EntityDescriptor::new("Post", "Post")
            .with_attribute(Attribute::new("post_id", "id", "i64").primary())
            .with_relationship(Relationship::new(child_link, "tag", "Tag"));

        let mut database = DatabaseDescriptor::new("blog")
            .with_entity(account)
            .with_entity(tag)
            .with_entity(post);
        resolve(&mut database).unwrap();
        database
    }

    #[test]
    fn test_many_to_many_carries_transitive_keys() {
        let database = chain(RelationshipKind::ManyToOne, RelationshipKind::ManyToMany);
        let post = database.entity_by_class_name("Post").unwrap();
        let request = create_table_request(&database, post, &SqliteTypeHandler).unwrap();

        let names: Vec<_> = request.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["post_id", "tag_id", "account_id"]);
        assert_eq!(request.foreign_keys[0].columns, vec!["tag_id", "account_id"]);
        for column in &request.foreign_keys[0].columns {
            assert!(names.contains(&column.as_str()));
        }
        // a parent's unique flag does not follow its key into the child
        assert!(request.unique_columns.is_empty());
    }

    #[test]
    fn test_referenced_columns_match_parent_primary_key() {
        for parent_link in [RelationshipKind::OneToOne, RelationshipKind::ManyToOne] {
            for child_link in [RelationshipKind::ManyToOne, RelationshipKind::ManyToMany] {
                let database = chain(parent_link, child_link);
                let post = database.entity_by_class_name("Post").unwrap();
                let clauses = foreign_key_clauses(&database, post).unwrap();
                assert_eq!(clauses.len(), 1);

                let mut referenced: Vec<String> = clauses[0]
                    .columns
                    .iter()
                    .map(|c| c.to_ascii_lowercase())
                    .collect();
                referenced.sort();
                assert_eq!(referenced, key_set(&database, "Tag"), "{:?} / {:?}", parent_link, child_link);
            }
        }
    }

    #[test]
    fn test_one_to_one_columns_stay_out_of_primary_key() {
        let database = chain(RelationshipKind::OneToOne, RelationshipKind::ManyToOne);
        let tag = database.entity_by_class_name("Tag").unwrap();
        let columns = table_columns(&database, tag).unwrap();

        let account = columns
            .iter()
            .find(|c| c.attribute.column_name == "account_id")
            .unwrap();
        assert!(account.propagated);
        assert!(!account.attribute.primary_key);
        assert_eq!(key_set(&database, "Tag"), vec!["tag_id"]);
    }

    #[test]
    fn test_declared_column_joins_key_when_propagated() {
        let user = EntityDescriptor::new("User", "User")
            .with_attribute(Attribute::new("user_id", "id", "i64").primary());
        let order = EntityDescriptor::new("Orders", "Order")
            .with_attribute(Attribute::new("order_id", "id", "i64").primary())
            .with_attribute(Attribute::new("user_id", "user_id", "i64"))
            .with_relationship(Relationship::new(RelationshipKind::ManyToOne, "user", "User"));
        let mut database = DatabaseDescriptor::new("shop").with_entity(user).with_entity(order);
        resolve(&mut database).unwrap();

        let order = database.entity_by_class_name("Order").unwrap();
        let columns = table_columns(&database, order).unwrap();
        assert_eq!(columns.len(), 2);
        assert!(!columns[1].propagated);
        assert_eq!(key_set(&database, "Order"), vec!["order_id", "user_id"]);
    }

    #[test]
    fn test_generate_indexes() {
        let database = shop();
        let order = database.entity_by_class_name("Order").unwrap();
        let indexes = generate_indexes(order, &SqliteQueryBuilder).unwrap();
        assert_eq!(
            indexes,
            vec!["CREATE INDEX IF NOT EXISTS idx_orders_total ON Orders(total)"]
        );
    }
}
