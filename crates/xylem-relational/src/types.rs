//! Shared reference types: typed column references, pre/post-resolution
//! field references, and ordering specifications.

use crate::value::FieldType;
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// ColumnRef
///
/// Fully-qualified, typed reference to one relational column.
///

#[derive(Clone, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ColumnRef {
    pub relation: String,
    pub column: String,
    pub field_type: FieldType,
}

impl ColumnRef {
    #[must_use]
    pub fn new(
        relation: impl Into<String>,
        column: impl Into<String>,
        field_type: FieldType,
    ) -> Self {
        Self {
            relation: relation.into(),
            column: column.into(),
            field_type,
        }
    }

    /// Same column re-homed onto another relation (aliasing, staging).
    #[must_use]
    pub fn with_relation(&self, relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            column: self.column.clone(),
            field_type: self.field_type,
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.relation, self.column)
    }
}

///
/// FieldRef
///
/// A field position in criteria and order specs. `Name` is the
/// document-local form as written by the user; binding resolution
/// rewrites it to a `Column`.
///

#[derive(Clone, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub enum FieldRef {
    Name(String),
    Column(ColumnRef),
}

impl FieldRef {
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Return the unresolved document name, if still unresolved.
    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            Self::Column(_) => None,
        }
    }

    /// Return the resolved column, if resolution has happened.
    #[must_use]
    pub const fn as_column(&self) -> Option<&ColumnRef> {
        match self {
            Self::Name(_) => None,
            Self::Column(column) => Some(column),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name}"),
            Self::Column(column) => write!(f, "{column}"),
        }
    }
}

impl From<ColumnRef> for FieldRef {
    fn from(column: ColumnRef) -> Self {
        Self::Column(column)
    }
}

///
/// OrderDirection
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "ASC"),
            Self::Desc => write!(f, "DESC"),
        }
    }
}

///
/// OrderEntry
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct OrderEntry {
    pub field: FieldRef,
    pub direction: OrderDirection,
}

///
/// OrderSpec
/// Ordered list of sort keys; user order is preserved.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct OrderSpec {
    pub entries: Vec<OrderEntry>,
}

impl OrderSpec {
    #[must_use]
    pub const fn new(entries: Vec<OrderEntry>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, field: FieldRef, direction: OrderDirection) {
        self.entries.push(OrderEntry { field, direction });
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate every field position for rewriting.
    pub fn fields_mut(&mut self) -> impl Iterator<Item = &mut FieldRef> {
        self.entries.iter_mut().map(|entry| &mut entry.field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldRef> {
        self.entries.iter().map(|entry| &entry.field)
    }
}
