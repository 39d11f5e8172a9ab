//! Declarative document query intent: which fields the caller wants,
//! filtered and ordered how. Schema-agnostic at construction; resolved
//! and validated only during compilation.

use xylem_relational::{Criteria, OrderDirection, OrderSpec};

///
/// RequestedFields
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RequestedFields {
    /// Produce the whole template (no exclusion).
    All,
    /// Produce only these dotted document paths (plus whatever their
    /// presence forces: ancestors and mandatory attributes).
    Named(Vec<String>),
}

impl RequestedFields {
    #[must_use]
    pub const fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

///
/// DocQuery
///

#[derive(Clone, Debug)]
pub struct DocQuery {
    pub criteria: Option<Criteria>,
    pub requested: RequestedFields,
    pub order_by: Option<OrderSpec>,
}

impl DocQuery {
    #[must_use]
    pub const fn select_all() -> Self {
        Self {
            criteria: None,
            requested: RequestedFields::All,
            order_by: None,
        }
    }

    #[must_use]
    pub fn with_criteria(mut self, criteria: Criteria) -> Self {
        self.criteria = Some(criteria);
        self
    }

    #[must_use]
    pub fn with_requested(mut self, paths: Vec<String>) -> Self {
        self.requested = RequestedFields::Named(paths);
        self
    }

    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        let mut order = self.order_by.take().unwrap_or_default();
        order.push(xylem_relational::FieldRef::name(field), direction);
        self.order_by = Some(order);
        self
    }
}
