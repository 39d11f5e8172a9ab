//! Single-block select AST exchanged with the relational front-end.

use crate::{
    criteria::Criteria,
    types::{ColumnRef, FieldRef, OrderSpec},
};
use serde::{Deserialize, Serialize};

///
/// Projection
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum Projection {
    /// Every column of the source relation.
    #[default]
    All,
    /// An explicit, ordered column list.
    Columns(Vec<ColumnRef>),
    /// A trivial constant; the scope is consulted only for row existence.
    Constant,
}

///
/// BindingParam
///
/// A correlated parameter: the query references `?param` in its filter,
/// bound per-row from an ancestor scope's field. `field` starts as the
/// ancestor's document-local name and is resolved to a column during
/// binding resolution.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BindingParam {
    pub param: String,
    pub field: FieldRef,
}

impl BindingParam {
    #[must_use]
    pub fn new(param: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            field: FieldRef::name(field),
        }
    }
}

///
/// QueryAst
///
/// One single-block select. This is the unit the compiler plans per
/// scope and the shape the front-end's parse/resolve/rewrite stages
/// exchange.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct QueryAst {
    pub from: String,
    pub distinct: bool,
    pub projection: Projection,
    pub filter: Option<Criteria>,
    pub group_by: Vec<FieldRef>,
    pub having: Option<Criteria>,
    pub order_by: Option<OrderSpec>,
    pub limit: Option<u32>,
    pub bindings: Vec<BindingParam>,
}

impl QueryAst {
    #[must_use]
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            distinct: false,
            projection: Projection::All,
            filter: None,
            group_by: Vec::new(),
            having: None,
            order_by: None,
            limit: None,
            bindings: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_binding(mut self, binding: BindingParam) -> Self {
        self.bindings.push(binding);
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Criteria) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub const fn with_distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// True when the query has no grouping, having, or limit clause:
    /// the shape into which a filter can be merged without changing
    /// semantics.
    #[must_use]
    pub const fn is_simple_block(&self) -> bool {
        self.group_by.is_empty() && self.having.is_none() && self.limit.is_none()
    }

    /// True when any clause other than the filter references the named
    /// binding placeholder.
    #[must_use]
    pub fn param_outside_filter(&self, param: &str) -> bool {
        let in_having = self
            .having
            .as_ref()
            .is_some_and(|having| having.references_param(param));
        // Order-by and group-by reference columns, not literals, so a
        // placeholder can only appear as a synthetic field name there.
        let param_field = |field: &FieldRef| field.as_name() == Some(param);
        let in_order = self
            .order_by
            .as_ref()
            .is_some_and(|order| order.fields().any(param_field));
        let in_group = self.group_by.iter().any(param_field);

        in_having || in_order || in_group
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn simple_block_detection() {
        let mut query = QueryAst::new("orders");
        assert!(query.is_simple_block());

        query.limit = Some(10);
        assert!(!query.is_simple_block());
    }

    #[test]
    fn param_outside_filter_checks_having() {
        let mut query = QueryAst::new("orders");
        query.having = Some(Criteria::compare(
            "total",
            crate::criteria::CompareOp::Gt,
            Value::Param("pid".into()),
        ));

        assert!(query.param_outside_filter("pid"));
        assert!(!query.param_outside_filter("other"));
    }
}
