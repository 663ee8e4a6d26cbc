use std::collections::HashMap;

use super::database::DatabaseDescriptor;
use super::types::Attribute;
use crate::error::ResolutionError;

/// Link every relationship to its target and store each entity's foreign-key set.
///
/// Running it again on an already resolved database recomputes the same links and
/// the same sets, so it is safe to call more than once.
pub fn resolve(database: &mut DatabaseDescriptor) -> Result<(), ResolutionError> {
    link_relationships(database)?;

    let mut resolver = ForeignKeyResolver::new(database);
    let mut resolved = Vec::with_capacity(database.entity_count());
    for index in 0..database.entity_count() {
        resolved.push(resolver.compute(index)?);
    }

    for (index, keys) in resolved.into_iter().enumerate() {
        if let Some(entity) = database.entity_at_mut(index) {
            entity.foreign_keys = Some(keys);
        }
    }

    tracing::debug!(
        database = %database.database_name,
        entities = database.entity_count(),
        "resolved relationships"
    );
    Ok(())
}

/// Foreign-key set of the entity at `index`: its primary keys first, then the
/// sets of every many-to-one and many-to-many target in declaration order,
/// collapsed by column name.
pub fn compute_foreign_keys(
    database: &DatabaseDescriptor,
    index: usize,
) -> Result<Vec<Attribute>, ResolutionError> {
    ForeignKeyResolver::new(database).compute(index)
}

/// Turn every `refer_to` into the position of the entity mapping that class.
fn link_relationships(database: &mut DatabaseDescriptor) -> Result<(), ResolutionError> {
    let mut links: Vec<Vec<usize>> = Vec::with_capacity(database.entity_count());

    for entity in database.entities() {
        let mut targets = Vec::with_capacity(entity.relationships().len());
        for relationship in entity.relationships() {
            let target = database
                .position_of_class(&relationship.refer_to)
                .ok_or_else(|| ResolutionError::UnresolvedReference {
                    entity: entity.class_name.clone(),
                    class_name: relationship.refer_to.clone(),
                })?;
            targets.push(target);
        }
        links.push(targets);
    }

    for (index, targets) in links.into_iter().enumerate() {
        if let Some(entity) = database.entity_at_mut(index) {
            for (relationship, target) in entity.relationships_mut().iter_mut().zip(targets) {
                relationship.referred = Some(target);
            }
        }
    }

    Ok(())
}

/// Memoized depth-first walk over the foreign-key edges of one database
struct ForeignKeyResolver<'a> {
    database: &'a DatabaseDescriptor,
    resolved: HashMap<usize, Vec<Attribute>>,
    /// Entities on the current path, outermost first
    visiting: Vec<usize>,
}

impl<'a> ForeignKeyResolver<'a> {
    fn new(database: &'a DatabaseDescriptor) -> Self {
        Self {
            database,
            resolved: HashMap::new(),
            visiting: Vec::new(),
        }
    }

    fn class_name(&self, index: usize) -> String {
        self.database
            .entity_at(index)
            .map(|e| e.class_name.clone())
            .unwrap_or_default()
    }

    fn compute(&mut self, index: usize) -> Result<Vec<Attribute>, ResolutionError> {
        if let Some(keys) = self.resolved.get(&index) {
            return Ok(keys.clone());
        }

        if let Some(start) = self.visiting.iter().position(|&i| i == index) {
            let mut cycle: Vec<String> = self.visiting[start..]
                .iter()
                .map(|&i| self.class_name(i))
                .collect();
            cycle.push(self.class_name(index));
            return Err(ResolutionError::Cycle { cycle });
        }

        let database = self.database;
        let Some(entity) = database.entity_at(index) else {
            return Ok(Vec::new());
        };

        self.visiting.push(index);

        let mut keys: Vec<Attribute> = entity.primary_keys().cloned().collect();

        for relationship in entity.relationships() {
            let carries_key = relationship
                .kind
                .map(|kind| kind.carries_foreign_key())
                .unwrap_or(false);
            if !carries_key {
                continue;
            }

            let target = relationship
                .referred_index()
                .or_else(|| database.position_of_class(&relationship.refer_to))
                .ok_or_else(|| ResolutionError::UnresolvedReference {
                    entity: entity.class_name.clone(),
                    class_name: relationship.refer_to.clone(),
                })?;

            // Self-references carry no extra columns
            if target == index {
                continue;
            }

            for attribute in self.compute(target)? {
                if !keys
                    .iter()
                    .any(|k| k.column_name.eq_ignore_ascii_case(&attribute.column_name))
                {
                    keys.push(attribute);
                }
            }
        }

        self.visiting.pop();
        self.resolved.insert(index, keys.clone());

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::entity::EntityDescriptor;
    use crate::schema::types::{Relationship, RelationshipKind};

    fn columns(keys: &[Attribute]) -> Vec<&str> {
        keys.iter().map(|a| a.column_name.as_str()).collect()
    }

    fn shop() -> DatabaseDescriptor {
        let user = EntityDescriptor::new("User", "User")
            .with_attribute(Attribute::new("id", "id", "i64").primary())
            .with_attribute(Attribute::new("name", "name", "String"));
        let order = EntityDescriptor::new("Orders", "Order")
            .with_attribute(Attribute::new("order_id", "order_id", "i64").primary())
            .with_relationship(Relationship::new(RelationshipKind::ManyToOne, "user", "User"))
            .with_relationship(Relationship::new(RelationshipKind::OneToMany, "lines", "Line"));
        let line = EntityDescriptor::new("Line", "Line")
            .with_attribute(Attribute::new("line_no", "line_no", "i64").primary())
            .with_relationship(Relationship::new(RelationshipKind::ManyToOne, "order", "Order"));

        DatabaseDescriptor::new("shop")
            .with_entity(line)
            .with_entity(order)
            .with_entity(user)
    }

    #[test]
    fn test_no_relationships_yields_primary_keys() {
        let database = DatabaseDescriptor::new("db").with_entity(
            EntityDescriptor::new("T", "T")
                .with_attribute(Attribute::new("b", "b", "i64").primary())
                .with_attribute(Attribute::new("x", "x", "String"))
                .with_attribute(Attribute::new("a", "a", "i64").primary()),
        );
        let keys = compute_foreign_keys(&database, 0).unwrap();
        assert_eq!(columns(&keys), vec!["b", "a"]);
    }

    #[test]
    fn test_transitive_keys() {
        let mut database = shop();
        resolve(&mut database).unwrap();

        let line = database.entity_by_class_name("Line").unwrap();
        assert_eq!(
            columns(line.foreign_keys().unwrap()),
            vec!["line_no", "order_id", "id"]
        );

        let order = database.entity_by_class_name("Order").unwrap();
        assert_eq!(columns(order.foreign_keys().unwrap()), vec!["order_id", "id"]);
        assert_eq!(
            order.relationships()[0].referred_index(),
            database.position_of_class("User")
        );
    }

    #[test]
    fn test_diamond_collapses_duplicates() {
        let root = EntityDescriptor::new("Root", "Root")
            .with_attribute(Attribute::new("root_id", "root_id", "i64").primary());
        let left = EntityDescriptor::new("Left", "Left")
            .with_attribute(Attribute::new("left_id", "left_id", "i64").primary())
            .with_relationship(Relationship::new(RelationshipKind::ManyToOne, "root", "Root"));
        let right = EntityDescriptor::new("Right", "Right")
            .with_attribute(Attribute::new("right_id", "right_id", "i64").primary())
            .with_relationship(Relationship::new(RelationshipKind::ManyToMany, "root", "Root"));
        let leaf = EntityDescriptor::new("Leaf", "Leaf")
            .with_relationship(Relationship::new(RelationshipKind::ManyToOne, "left", "Left"))
            .with_relationship(Relationship::new(RelationshipKind::ManyToOne, "right", "Right"));

        let database = DatabaseDescriptor::new("db")
            .with_entity(root)
            .with_entity(left)
            .with_entity(right)
            .with_entity(leaf);

        let keys = compute_foreign_keys(&database, 3).unwrap();
        assert_eq!(columns(&keys), vec!["left_id", "root_id", "right_id"]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let a = EntityDescriptor::new("A", "A")
            .with_attribute(Attribute::new("a", "a", "i64").primary())
            .with_relationship(Relationship::new(RelationshipKind::ManyToOne, "b", "B"));
        let b = EntityDescriptor::new("B", "B")
            .with_attribute(Attribute::new("b", "b", "i64").primary())
            .with_relationship(Relationship::new(RelationshipKind::ManyToOne, "a", "A"));
        let mut database = DatabaseDescriptor::new("db").with_entity(a).with_entity(b);

        match resolve(&mut database) {
            Err(ResolutionError::Cycle { cycle }) => assert_eq!(cycle, vec!["A", "B", "A"]),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_reference_is_skipped() {
        let node = EntityDescriptor::new("Node", "Node")
            .with_attribute(Attribute::new("id", "id", "i64").primary())
            .with_relationship(Relationship::new(RelationshipKind::ManyToOne, "parent", "Node"));
        let mut database = DatabaseDescriptor::new("db").with_entity(node);

        resolve(&mut database).unwrap();
        let node = database.entity_at(0).unwrap();
        assert_eq!(columns(node.foreign_keys().unwrap()), vec!["id"]);
    }

    #[test]
    fn test_unresolved_reference_names_both_sides() {
        let order = EntityDescriptor::new("Orders", "Order")
            .with_relationship(Relationship::new(RelationshipKind::OneToOne, "user", "Missing"));
        let mut database = DatabaseDescriptor::new("db").with_entity(order);

        let err = resolve(&mut database).unwrap_err();
        assert!(matches!(
            err,
            ResolutionError::UnresolvedReference { ref entity, ref class_name }
                if entity == "Order" && class_name == "Missing"
        ));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut database = shop();
        resolve(&mut database).unwrap();
        let first = database.clone();
        resolve(&mut database).unwrap();
        assert_eq!(first, database);
    }
}
