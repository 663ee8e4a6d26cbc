use super::database::DatabaseDescriptor;
use crate::error::ResolutionError;
use std::collections::{HashMap, HashSet};

/// Resolves entity dependencies for table creation
pub struct DependencyResolver<'a> {
    database: &'a DatabaseDescriptor,
    /// Map of entity index -> entities it references through a foreign key
    deps: HashMap<usize, Vec<usize>>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(database: &'a DatabaseDescriptor) -> Result<Self, ResolutionError> {
        let mut deps: HashMap<usize, Vec<usize>> = HashMap::new();

        for (index, entity) in database.entities().enumerate() {
            let mut entity_deps = Vec::new();
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
                if !entity_deps.contains(&target) {
                    entity_deps.push(target);
                }
            }
            deps.insert(index, entity_deps);
        }

        Ok(Self { database, deps })
    }

    /// Entity indexes in creation order (parents before children).
    /// Unrelated entities keep their declaration order.
    pub fn creation_order(&self) -> Result<Vec<usize>, ResolutionError> {
        let mut result = Vec::with_capacity(self.database.entity_count());
        let mut visited: HashSet<usize> = HashSet::new();
        let mut temp_visited: Vec<usize> = Vec::new();

        for index in 0..self.database.entity_count() {
            if !visited.contains(&index) {
                self.visit(index, &mut visited, &mut temp_visited, &mut result)?;
            }
        }

        Ok(result)
    }

    fn visit(
        &self,
        index: usize,
        visited: &mut HashSet<usize>,
        temp_visited: &mut Vec<usize>,
        result: &mut Vec<usize>,
    ) -> Result<(), ResolutionError> {
        if let Some(start) = temp_visited.iter().position(|&i| i == index) {
            let mut cycle: Vec<String> = temp_visited[start..]
                .iter()
                .map(|&i| self.class_name(i))
                .collect();
            cycle.push(self.class_name(index));
            return Err(ResolutionError::Cycle { cycle });
        }
        if visited.contains(&index) {
            return Ok(());
        }

        temp_visited.push(index);

        if let Some(deps) = self.deps.get(&index) {
            for &dep in deps {
                // Skip self-references (e.g. Node.parent -> Node)
                if dep != index {
                    self.visit(dep, visited, temp_visited, result)?;
                }
            }
        }

        temp_visited.pop();
        visited.insert(index);
        result.push(index);

        Ok(())
    }

    fn class_name(&self, index: usize) -> String {
        self.database
            .entity_at(index)
            .map(|e| e.class_name.clone())
            .unwrap_or_default()
    }
}

/// Shorthand for `DependencyResolver::new(database)?.creation_order()`
pub fn creation_order(database: &DatabaseDescriptor) -> Result<Vec<usize>, ResolutionError> {
    DependencyResolver::new(database)?.creation_order()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::entity::EntityDescriptor;
    use crate::schema::types::{Attribute, Relationship, RelationshipKind};

    fn entity(class_name: &str) -> EntityDescriptor {
        EntityDescriptor::new(class_name, class_name)
            .with_attribute(Attribute::new("id", "id", "i64").primary())
    }

    fn tables(database: &DatabaseDescriptor) -> Vec<&str> {
        creation_order(database)
            .unwrap()
            .into_iter()
            .map(|i| database.entity_at(i).unwrap().table_name.as_str())
            .collect()
    }

    #[test]
    fn test_parents_come_first() {
        let database = DatabaseDescriptor::new("shop")
            .with_entity(entity("Line").with_relationship(Relationship::new(
                RelationshipKind::ManyToOne,
                "order",
                "Order",
            )))
            .with_entity(entity("Order").with_relationship(Relationship::new(
                RelationshipKind::ManyToOne,
                "user",
                "User",
            )))
            .with_entity(entity("User"));

        assert_eq!(tables(&database), vec!["User", "Order", "Line"]);
    }

    #[test]
    fn test_unrelated_entities_keep_declaration_order() {
        let database = DatabaseDescriptor::new("db")
            .with_entity(entity("B"))
            .with_entity(entity("A").with_relationship(Relationship::new(
                RelationshipKind::OneToMany,
                "bs",
                "B",
            )))
            .with_entity(entity("C"));

        assert_eq!(tables(&database), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_self_reference_is_not_a_cycle() {
        let database = DatabaseDescriptor::new("db").with_entity(entity("Node").with_relationship(
            Relationship::new(RelationshipKind::ManyToOne, "parent", "Node"),
        ));
        assert_eq!(tables(&database), vec!["Node"]);
    }

    #[test]
    fn test_cycle_error() {
        let database = DatabaseDescriptor::new("db")
            .with_entity(entity("A").with_relationship(Relationship::new(
                RelationshipKind::ManyToMany,
                "b",
                "B",
            )))
            .with_entity(entity("B").with_relationship(Relationship::new(
                RelationshipKind::ManyToOne,
                "a",
                "A",
            )));

        let result = creation_order(&database);
        assert!(matches!(result, Err(ResolutionError::Cycle { .. })));
    }
}
