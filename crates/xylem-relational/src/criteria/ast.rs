use crate::{
    types::{ColumnRef, FieldRef},
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// CompareOp
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[repr(u8)]
pub enum CompareOp {
    Eq = 0x01,
    Ne = 0x02,
    Lt = 0x03,
    Lte = 0x04,
    Gt = 0x05,
    Gte = 0x06,
    In = 0x07,
    NotIn = 0x08,
}

impl CompareOp {
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
        };
        write!(f, "{label}")
    }
}

///
/// CompareCriteria
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CompareCriteria {
    pub field: FieldRef,
    pub op: CompareOp,
    pub value: Value,
}

impl CompareCriteria {
    #[must_use]
    pub const fn new(field: FieldRef, op: CompareOp, value: Value) -> Self {
        Self { field, op, value }
    }
}

///
/// JoinCriteria
///
/// Column-to-column predicate produced when a correlated binding is
/// raised into an ordinary join.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct JoinCriteria {
    pub left: FieldRef,
    pub op: CompareOp,
    pub right: FieldRef,
}

///
/// RowLimitCriteria
///
/// Pseudo-predicate capping rows produced by the owning scope, with an
/// optional raise-on-exceed policy. Never evaluated as a predicate.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RowLimitCriteria {
    pub field: FieldRef,
    pub max: u32,
    pub error_on_exceed: bool,
}

///
/// Criteria
///
/// Pure predicate AST. Interpretation (scope placement, row limits,
/// join synthesis) happens in the compiler's passes.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Criteria {
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
    Compare(CompareCriteria),
    IsNull { field: FieldRef },
    Join(JoinCriteria),
    ScopeMarker { scope: String, inner: Box<Self> },
    RowLimit(RowLimitCriteria),
}

impl Criteria {
    #[must_use]
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    #[must_use]
    pub fn compare(field: impl Into<String>, op: CompareOp, value: Value) -> Self {
        Self::Compare(CompareCriteria::new(FieldRef::name(field), op, value))
    }

    #[must_use]
    pub fn scope_marker(scope: impl Into<String>, inner: Self) -> Self {
        Self::ScopeMarker {
            scope: scope.into(),
            inner: Box::new(inner),
        }
    }

    #[must_use]
    pub fn row_limit(field: impl Into<String>, max: u32, error_on_exceed: bool) -> Self {
        Self::RowLimit(RowLimitCriteria {
            field: FieldRef::name(field),
            max,
            error_on_exceed,
        })
    }

    #[must_use]
    pub fn join(left: FieldRef, op: CompareOp, right: FieldRef) -> Self {
        Self::Join(JoinCriteria { left, op, right })
    }

    #[must_use]
    pub const fn is_row_limit(&self) -> bool {
        matches!(self, Self::RowLimit(_))
    }

    /// Collect every field position, depth-first, in source order.
    #[must_use]
    pub fn fields(&self) -> Vec<&FieldRef> {
        let mut out = Vec::new();
        self.visit_fields(&mut |field| out.push(field));
        out
    }

    fn visit_fields<'a>(&'a self, visit: &mut impl FnMut(&'a FieldRef)) {
        match self {
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.visit_fields(visit);
                }
            }
            Self::Not(inner) => inner.visit_fields(visit),
            Self::Compare(cmp) => visit(&cmp.field),
            Self::IsNull { field } => visit(field),
            Self::Join(join) => {
                visit(&join.left);
                visit(&join.right);
            }
            Self::ScopeMarker { inner, .. } => inner.visit_fields(visit),
            Self::RowLimit(limit) => visit(&limit.field),
        }
    }

    /// Rewrite every field position in place. The callback may fail,
    /// aborting the rewrite at the first error.
    pub fn try_rewrite_fields<E>(
        &mut self,
        rewrite: &mut impl FnMut(&mut FieldRef) -> Result<(), E>,
    ) -> Result<(), E> {
        match self {
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.try_rewrite_fields(rewrite)?;
                }
            }
            Self::Not(inner) => inner.try_rewrite_fields(rewrite)?,
            Self::Compare(cmp) => rewrite(&mut cmp.field)?,
            Self::IsNull { field } => rewrite(field)?,
            Self::Join(join) => {
                rewrite(&mut join.left)?;
                rewrite(&mut join.right)?;
            }
            Self::ScopeMarker { inner, .. } => inner.try_rewrite_fields(rewrite)?,
            Self::RowLimit(limit) => rewrite(&mut limit.field)?,
        }

        Ok(())
    }

    /// Collect every resolved column referenced by this criteria.
    #[must_use]
    pub fn columns(&self) -> Vec<&ColumnRef> {
        self.fields()
            .into_iter()
            .filter_map(FieldRef::as_column)
            .collect()
    }

    /// True when any compare value is the named binding placeholder.
    #[must_use]
    pub fn references_param(&self, param: &str) -> bool {
        match self {
            Self::And(children) | Self::Or(children) => {
                children.iter().any(|child| child.references_param(param))
            }
            Self::Not(inner) | Self::ScopeMarker { inner, .. } => inner.references_param(param),
            Self::Compare(cmp) => cmp.value.as_param() == Some(param),
            Self::IsNull { .. } | Self::Join(_) | Self::RowLimit(_) => false,
        }
    }

    /// True when any compare value is a binding placeholder at all.
    #[must_use]
    pub fn references_any_param(&self) -> bool {
        match self {
            Self::And(children) | Self::Or(children) => {
                children.iter().any(Self::references_any_param)
            }
            Self::Not(inner) | Self::ScopeMarker { inner, .. } => inner.references_any_param(),
            Self::Compare(cmp) => matches!(cmp.value, Value::Param(_)),
            Self::IsNull { .. } | Self::Join(_) | Self::RowLimit(_) => false,
        }
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(children) => write_joined(f, children, " AND "),
            Self::Or(children) => write_joined(f, children, " OR "),
            Self::Not(inner) => write!(f, "NOT ({inner})"),
            Self::Compare(cmp) => write!(f, "{} {} {}", cmp.field, cmp.op, cmp.value),
            Self::IsNull { field } => write!(f, "{field} IS NULL"),
            Self::Join(join) => write!(f, "{} {} {}", join.left, join.op, join.right),
            Self::ScopeMarker { scope, inner } => write!(f, "context({scope}, {inner})"),
            Self::RowLimit(limit) => {
                let name = if limit.error_on_exceed {
                    "rowlimitexception"
                } else {
                    "rowlimit"
                };
                write!(f, "{name}({}, {})", limit.field, limit.max)
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[Criteria], sep: &str) -> fmt::Result {
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "({child})")?;
    }
    Ok(())
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_walk_in_source_order() {
        let criteria = Criteria::And(vec![
            Criteria::eq("a", Value::Int(1)),
            Criteria::Or(vec![
                Criteria::eq("b", Value::Int(2)),
                Criteria::IsNull {
                    field: FieldRef::name("c"),
                },
            ]),
        ]);

        let names: Vec<_> = criteria
            .fields()
            .into_iter()
            .filter_map(FieldRef::as_name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn display_renders_markers() {
        let criteria = Criteria::scope_marker("items", Criteria::eq("qty", Value::Int(3)));
        assert_eq!(criteria.to_string(), "context(items, qty = 3)");

        let limit = Criteria::row_limit("items.id", 10, true);
        assert_eq!(limit.to_string(), "rowlimitexception(items.id, 10)");
    }

    #[test]
    fn param_detection_sees_through_markers() {
        let criteria = Criteria::scope_marker(
            "s",
            Criteria::compare("col", CompareOp::Eq, Value::Param("pid".into())),
        );
        assert!(criteria.references_param("pid"));
        assert!(!criteria.references_param("other"));
    }

    #[test]
    fn criteria_round_trip_through_serde() {
        let criteria = Criteria::And(vec![
            Criteria::eq("a", Value::Int(1)),
            Criteria::row_limit("b", 10, false),
        ]);

        let json = serde_json::to_string(&criteria).expect("serializes");
        let back: Criteria = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(criteria, back);
    }
}
