//! Metadata catalog contract and an in-memory implementation.
//!
//! The catalog resolves dotted names to typed column references and
//! registers ad-hoc temporary relations created during compilation
//! (staging, aliasing) so later lookups in the same compilation see
//! them.

use crate::{
    types::ColumnRef,
    value::FieldType,
};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// CatalogError
///

#[derive(Debug, ThisError)]
pub enum CatalogError {
    #[error("unknown relation '{name}'")]
    UnknownRelation { name: String },

    #[error("unknown column '{name}'")]
    UnknownColumn { name: String },

    #[error("relation '{name}' is already registered")]
    DuplicateRelation { name: String },
}

///
/// Catalog
///
/// Name resolution boundary. Implementations are synchronous; the
/// compiler treats every call as blocking.
///

pub trait Catalog {
    /// Resolve a dotted `relation.column` name to a typed reference.
    fn resolve_column(&self, name: &str) -> Result<ColumnRef, CatalogError>;

    /// All columns of a relation, in declaration order.
    fn relation_columns(&self, relation: &str) -> Result<Vec<ColumnRef>, CatalogError>;

    /// Whether the named relation is document-shaped (vs. an ordinary
    /// table).
    fn is_document_relation(&self, relation: &str) -> bool;

    /// Register an ad-hoc temporary relation (staged table, scope
    /// alias) for the remainder of this compilation.
    fn register_temp_relation(
        &mut self,
        relation: String,
        columns: Vec<ColumnRef>,
    ) -> Result<(), CatalogError>;
}

///
/// RelationEntry
///

#[derive(Clone, Debug)]
struct RelationEntry {
    columns: Vec<ColumnRef>,
    document_shaped: bool,
}

///
/// InMemoryCatalog
///
/// BTreeMap-backed catalog for embedding and tests. Lookup order is
/// deterministic by relation name.
///

#[derive(Clone, Debug, Default)]
pub struct InMemoryCatalog {
    relations: BTreeMap<String, RelationEntry>,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an ordinary table with the given typed columns.
    #[must_use]
    pub fn with_relation(
        mut self,
        name: impl Into<String>,
        columns: &[(&str, FieldType)],
    ) -> Self {
        self.insert(name.into(), columns, false);
        self
    }

    /// Add a document-shaped relation.
    #[must_use]
    pub fn with_document_relation(
        mut self,
        name: impl Into<String>,
        columns: &[(&str, FieldType)],
    ) -> Self {
        self.insert(name.into(), columns, true);
        self
    }

    fn insert(&mut self, name: String, columns: &[(&str, FieldType)], document_shaped: bool) {
        let columns = columns
            .iter()
            .map(|(column, field_type)| ColumnRef::new(name.clone(), *column, *field_type))
            .collect();
        self.relations.insert(
            name,
            RelationEntry {
                columns,
                document_shaped,
            },
        );
    }
}

impl Catalog for InMemoryCatalog {
    fn resolve_column(&self, name: &str) -> Result<ColumnRef, CatalogError> {
        let Some((relation, column)) = name.rsplit_once('.') else {
            return Err(CatalogError::UnknownColumn { name: name.into() });
        };

        let entry = self
            .relations
            .get(relation)
            .ok_or_else(|| CatalogError::UnknownRelation {
                name: relation.into(),
            })?;

        entry
            .columns
            .iter()
            .find(|candidate| candidate.column == column)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownColumn { name: name.into() })
    }

    fn relation_columns(&self, relation: &str) -> Result<Vec<ColumnRef>, CatalogError> {
        self.relations
            .get(relation)
            .map(|entry| entry.columns.clone())
            .ok_or_else(|| CatalogError::UnknownRelation {
                name: relation.into(),
            })
    }

    fn is_document_relation(&self, relation: &str) -> bool {
        self.relations
            .get(relation)
            .is_some_and(|entry| entry.document_shaped)
    }

    fn register_temp_relation(
        &mut self,
        relation: String,
        columns: Vec<ColumnRef>,
    ) -> Result<(), CatalogError> {
        if self.relations.contains_key(&relation) {
            return Err(CatalogError::DuplicateRelation { name: relation });
        }

        self.relations.insert(
            relation,
            RelationEntry {
                columns,
                document_shaped: false,
            },
        );

        Ok(())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new()
            .with_relation("orders", &[("id", FieldType::Int), ("note", FieldType::Text)])
            .with_document_relation("docs", &[("id", FieldType::Int)])
    }

    #[test]
    fn resolves_dotted_names() {
        let column = catalog().resolve_column("orders.note").expect("resolves");
        assert_eq!(column.relation, "orders");
        assert_eq!(column.field_type, FieldType::Text);
    }

    #[test]
    fn unknown_names_error() {
        assert!(matches!(
            catalog().resolve_column("orders.missing"),
            Err(CatalogError::UnknownColumn { .. })
        ));
        assert!(matches!(
            catalog().resolve_column("nope.id"),
            Err(CatalogError::UnknownRelation { .. })
        ));
    }

    #[test]
    fn temp_relations_are_visible_and_unique() {
        let mut catalog = catalog();
        let columns = vec![ColumnRef::new("#stg_1", "id", FieldType::Int)];
        catalog
            .register_temp_relation("#stg_1".into(), columns.clone())
            .expect("registers");

        assert!(catalog.resolve_column("#stg_1.id").is_ok());
        assert!(matches!(
            catalog.register_temp_relation("#stg_1".into(), columns),
            Err(CatalogError::DuplicateRelation { .. })
        ));
    }

    #[test]
    fn document_shape_flag() {
        let catalog = catalog();
        assert!(catalog.is_document_relation("docs"));
        assert!(!catalog.is_document_relation("orders"));
    }
}
