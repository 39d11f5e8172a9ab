//! Criteria distribution: decompose the user's filter into conjuncts,
//! strip scope markers and row-limit markers, and assign each conjunct
//! to the nearest enclosing scope that can evaluate it.

use super::{PassContext, binding::resolve_in_named_scope};
use crate::{
    diagnostics::{CompilePhase, CompileTraceEvent},
    error::CompileError,
    query::DocQuery,
    scope::{RowLimit, ScopeKind},
    template::TemplateArena,
};
use thiserror::Error as ThisError;
use xylem_relational::{Criteria, FieldRef, RowLimitCriteria, split_conjuncts};

///
/// CriteriaError
///
/// Criteria-placement failures. Always fatal and reported with the
/// conjunct's original text.
///

#[derive(Debug, ThisError)]
pub enum CriteriaError {
    #[error("unresolved field '{field}' in criteria '{conjunct}'")]
    UnresolvedField { field: String, conjunct: String },

    #[error("field '{field}' is ambiguous across scopes in criteria '{conjunct}'")]
    AmbiguousField { field: String, conjunct: String },

    #[error("criteria '{conjunct}' names conflicting context scopes '{first}' and '{second}'")]
    ConflictingContexts {
        conjunct: String,
        first: String,
        second: String,
    },

    #[error("unknown context scope '{scope}' in criteria '{conjunct}'")]
    UnknownScope { scope: String, conjunct: String },

    #[error("conflicting row limits {first} and {second} on scope '{scope}'")]
    ConflictingRowLimits {
        scope: String,
        first: u32,
        second: u32,
    },

    #[error("row limit marker must be a top-level conjunct: '{conjunct}'")]
    NestedRowLimit { conjunct: String },

    #[error(
        "invalid context: field '{field}' of scope '{scope}' is outside context scope '{context}' in criteria '{conjunct}'"
    )]
    InvalidContext {
        field: String,
        scope: String,
        context: String,
        conjunct: String,
    },
}

pub(crate) fn distribute(
    arena: &TemplateArena,
    ctx: &mut PassContext<'_>,
    query: &DocQuery,
) -> Result<(), CompileError> {
    if let Some(criteria) = &query.criteria {
        for conjunct in split_conjuncts(criteria.clone()) {
            place_conjunct(arena, ctx, conjunct)?;
        }
    }

    if let Some(order) = &query.order_by {
        distribute_order(arena, ctx, order)?;
    }

    ctx.diagnostics.push(CompileTraceEvent::PhaseFinished {
        phase: CompilePhase::Criteria,
    });

    Ok(())
}

fn place_conjunct(
    arena: &TemplateArena,
    ctx: &mut PassContext<'_>,
    conjunct: Criteria,
) -> Result<(), CompileError> {
    let text = conjunct.to_string();

    // Staging shortcut: a conjunct living entirely in one declared
    // staging relation needs no scope matching.
    if let Some(staging) = staging_only_scope(ctx, &conjunct) {
        let mut rewritten = conjunct;
        rewrite_fields(arena, ctx, &staging, &mut rewritten, &text)?;
        if let Some(info) = ctx.scopes.get_mut(&staging) {
            info.add_criteria(rewritten);
        }
        ctx.diagnostics.push(CompileTraceEvent::ConjunctPlaced {
            scope: staging,
            conjunct: text,
        });
        return Ok(());
    }

    // Row-limit pseudo-predicate.
    if let Criteria::RowLimit(limit) = &conjunct {
        return place_row_limit(arena, ctx, limit, &text);
    }
    if contains_row_limit(&conjunct) {
        return Err(CriteriaError::NestedRowLimit { conjunct: text }.into());
    }

    // Scope markers must agree on one target.
    let (stripped, target) = strip_markers(conjunct, &text)?;
    if let Some(target) = &target
        && !ctx
            .scopes
            .get(target)
            .is_some_and(|info| info.kind == ScopeKind::Document)
    {
        return Err(CriteriaError::UnknownScope {
            scope: target.clone(),
            conjunct: text,
        }
        .into());
    }

    let Some(context) = target.or_else(|| ctx.root_scope.clone()) else {
        return Err(CriteriaError::UnknownScope {
            scope: "<document root>".into(),
            conjunct: text,
        }
        .into());
    };

    // Every touched scope must sit on the context's ancestor/descendant
    // chain; ancestors are visible by correlation and ignored for
    // placement.
    let mut descendants = Vec::new();
    for field in stripped.fields() {
        let Some(name) = field.as_name() else {
            continue;
        };
        let (owner, _) = resolve_user_field(arena, ctx, name, &text)?;

        if owner == context {
            continue;
        }
        if ctx.is_at_or_below(arena, &owner, &context) {
            descendants.push(owner);
        } else if !ctx.is_at_or_below(arena, &context, &owner) {
            return Err(CriteriaError::InvalidContext {
                field: name.to_string(),
                scope: owner,
                context,
                conjunct: text,
            }
            .into());
        }
    }

    let mut rewritten = stripped;
    rewrite_user_fields(arena, ctx, &mut rewritten, &text)?;

    if let Some(info) = ctx.scopes.get_mut(&context) {
        info.touched_descendants.extend(descendants);
        info.add_criteria(rewritten);
    }
    ctx.diagnostics.push(CompileTraceEvent::ConjunctPlaced {
        scope: context,
        conjunct: text,
    });

    Ok(())
}

fn place_row_limit(
    arena: &TemplateArena,
    ctx: &mut PassContext<'_>,
    limit: &RowLimitCriteria,
    text: &str,
) -> Result<(), CompileError> {
    let Some(field) = limit.field.as_name() else {
        return Err(CriteriaError::UnresolvedField {
            field: limit.field.to_string(),
            conjunct: text.to_string(),
        }
        .into());
    };
    let (owner, _) = resolve_user_field(arena, ctx, field, text)?;

    let Some(info) = ctx.scopes.get_mut(&owner) else {
        return Err(CriteriaError::UnknownScope {
            scope: owner,
            conjunct: text.to_string(),
        }
        .into());
    };

    let incoming = RowLimit {
        max: limit.max,
        error_on_exceed: limit.error_on_exceed,
    };
    match info.row_limit {
        // Identical limits are idempotent.
        Some(existing) if existing == incoming => {}
        Some(existing) => {
            return Err(CriteriaError::ConflictingRowLimits {
                scope: owner,
                first: existing.max,
                second: incoming.max,
            }
            .into());
        }
        None => {
            info.row_limit = Some(incoming);
            ctx.diagnostics.push(CompileTraceEvent::RowLimitSet {
                scope: owner,
                max: limit.max,
            });
        }
    }

    Ok(())
}

/// The single staging scope a conjunct lives in, when every referenced
/// field is qualified by that staging relation and none is
/// document-scoped.
fn staging_only_scope(ctx: &PassContext<'_>, conjunct: &Criteria) -> Option<String> {
    if conjunct.is_row_limit() || contains_row_limit(conjunct) {
        return None;
    }

    let mut staging: Option<String> = None;
    for field in conjunct.fields() {
        let name = field.as_name()?;
        let (prefix, _) = name.rsplit_once('.')?;
        let info = ctx.scopes.get(prefix)?;
        if info.kind != ScopeKind::Staging {
            return None;
        }
        match &staging {
            Some(existing) if existing != prefix => return None,
            Some(_) => {}
            None => staging = Some(prefix.to_string()),
        }
    }

    staging
}

fn contains_row_limit(criteria: &Criteria) -> bool {
    match criteria {
        Criteria::And(children) | Criteria::Or(children) => {
            children.iter().any(contains_row_limit)
        }
        Criteria::Not(inner) | Criteria::ScopeMarker { inner, .. } => contains_row_limit(inner),
        Criteria::RowLimit(_) => true,
        Criteria::Compare(_) | Criteria::IsNull { .. } | Criteria::Join(_) => false,
    }
}

/// Remove scope markers, collecting the (single) target scope.
fn strip_markers(
    criteria: Criteria,
    text: &str,
) -> Result<(Criteria, Option<String>), CompileError> {
    let mut target: Option<String> = None;
    let stripped = strip_markers_inner(criteria, &mut target, text)?;
    Ok((stripped, target))
}

fn strip_markers_inner(
    criteria: Criteria,
    target: &mut Option<String>,
    text: &str,
) -> Result<Criteria, CompileError> {
    match criteria {
        Criteria::ScopeMarker { scope, inner } => {
            match target {
                Some(existing) if *existing != scope => {
                    return Err(CriteriaError::ConflictingContexts {
                        conjunct: text.to_string(),
                        first: existing.clone(),
                        second: scope,
                    }
                    .into());
                }
                Some(_) => {}
                None => *target = Some(scope),
            }
            strip_markers_inner(*inner, target, text)
        }
        Criteria::And(children) => {
            let children = children
                .into_iter()
                .map(|child| strip_markers_inner(child, target, text))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Criteria::And(children))
        }
        Criteria::Or(children) => {
            let children = children
                .into_iter()
                .map(|child| strip_markers_inner(child, target, text))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Criteria::Or(children))
        }
        Criteria::Not(inner) => Ok(Criteria::Not(Box::new(strip_markers_inner(
            *inner, target, text,
        )?))),
        other => Ok(other),
    }
}

/// Resolve a user-written field to its owning scope and column. Names
/// qualified by a scope resolve there; bare names search every scope's
/// symbol map and must match exactly one.
fn resolve_user_field(
    arena: &TemplateArena,
    ctx: &PassContext<'_>,
    field: &str,
    conjunct: &str,
) -> Result<(String, xylem_relational::ColumnRef), CompileError> {
    if let Some((prefix, _)) = field.rsplit_once('.')
        && ctx.scopes.contains_key(prefix)
    {
        let at = ctx
            .scope_nodes
            .get(prefix)
            .copied()
            .unwrap_or_else(|| arena.root());
        let column =
            resolve_in_named_scope(arena, ctx, prefix, field, at).map_err(|_| {
                CompileError::from(CriteriaError::UnresolvedField {
                    field: field.to_string(),
                    conjunct: conjunct.to_string(),
                })
            })?;
        return Ok((prefix.to_string(), column));
    }

    let mut matches: Vec<(String, xylem_relational::ColumnRef)> = Vec::new();
    for (name, info) in &ctx.scopes {
        if info.is_aliased() {
            continue;
        }
        if let Some(column) = info.symbols.get(field) {
            matches.push((name.clone(), column.clone()));
        }
    }

    match matches.len() {
        0 => Err(CriteriaError::UnresolvedField {
            field: field.to_string(),
            conjunct: conjunct.to_string(),
        }
        .into()),
        1 => Ok(matches.remove(0)),
        _ => Err(CriteriaError::AmbiguousField {
            field: field.to_string(),
            conjunct: conjunct.to_string(),
        }
        .into()),
    }
}

fn rewrite_user_fields(
    arena: &TemplateArena,
    ctx: &PassContext<'_>,
    criteria: &mut Criteria,
    conjunct: &str,
) -> Result<(), CompileError> {
    let mut failure: Option<CompileError> = None;
    let _ = criteria.try_rewrite_fields(&mut |field: &mut FieldRef| {
        if let FieldRef::Name(name) = field {
            match resolve_user_field(arena, ctx, name, conjunct) {
                Ok((_, column)) => *field = FieldRef::Column(column),
                Err(err) => {
                    failure = Some(err);
                    return Err(());
                }
            }
        }
        Ok::<(), ()>(())
    });

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Rewrite a staging-shortcut conjunct within its staging scope.
fn rewrite_fields(
    arena: &TemplateArena,
    ctx: &PassContext<'_>,
    scope: &str,
    criteria: &mut Criteria,
    conjunct: &str,
) -> Result<(), CompileError> {
    let mut failure: Option<CompileError> = None;
    let _ = criteria.try_rewrite_fields(&mut |field: &mut FieldRef| {
        if let FieldRef::Name(name) = field {
            match resolve_in_named_scope(arena, ctx, scope, name, arena.root()) {
                Ok(column) => *field = FieldRef::Column(column),
                Err(_) => {
                    failure = Some(
                        CriteriaError::UnresolvedField {
                            field: name.clone(),
                            conjunct: conjunct.to_string(),
                        }
                        .into(),
                    );
                    return Err(());
                }
            }
        }
        Ok::<(), ()>(())
    });

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Distribute user order-by entries to the scopes owning their fields,
/// preserving per-scope entry order.
fn distribute_order(
    arena: &TemplateArena,
    ctx: &mut PassContext<'_>,
    order: &xylem_relational::OrderSpec,
) -> Result<(), CompileError> {
    for entry in &order.entries {
        let Some(name) = entry.field.as_name() else {
            continue;
        };
        let (owner, column) = resolve_user_field(arena, ctx, name, name)?;
        if let Some(info) = ctx.scopes.get_mut(&owner) {
            let mut scoped = info.order_by.take().unwrap_or_default();
            scoped.push(FieldRef::Column(column), entry.direction);
            info.order_by = Some(scoped);
        }
    }

    Ok(())
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::DocQuery;
    use crate::test_support::{invoice_template, run_through_criteria};
    use xylem_relational::Value;

    #[test]
    fn unmarked_conjuncts_land_on_the_root_context() {
        let query = DocQuery::select_all().with_criteria(Criteria::And(vec![
            Criteria::eq("customer", Value::Text("acme".into())),
            Criteria::eq("qty", Value::Int(5)),
        ]));

        let (scopes, _) = run_through_criteria(&invoice_template(), &query).expect("distributes");

        // Without a scope marker the context is the root scope; the qty
        // conjunct is recorded as touching the descendant items scope.
        let orders = &scopes["orders"];
        let placed = orders.criteria.as_ref().expect("criteria placed").to_string();
        assert!(placed.contains("orders.customer"));
        assert!(placed.contains("line_items.qty"));
        assert!(orders.touched_descendants.contains("items"));
        assert!(scopes["items"].criteria.is_none());
    }

    #[test]
    fn scope_marker_forces_context() {
        let query = DocQuery::select_all().with_criteria(Criteria::scope_marker(
            "items",
            Criteria::eq("qty", Value::Int(5)),
        ));

        let (scopes, _) = run_through_criteria(&invoice_template(), &query).expect("distributes");
        assert!(scopes["items"].criteria.is_some());
        assert!(scopes["orders"].criteria.is_none());
    }

    #[test]
    fn conflicting_markers_fail() {
        let conflicted = Criteria::scope_marker(
            "items",
            Criteria::scope_marker("orders", Criteria::eq("qty", Value::Int(5))),
        );
        let query = DocQuery::select_all().with_criteria(conflicted);

        let err = run_through_criteria(&invoice_template(), &query).expect_err("must fail");
        assert!(err.to_string().contains("conflicting context scopes"));
    }

    #[test]
    fn conflicting_row_limits_fail_identical_succeed() {
        let query = DocQuery::select_all().with_criteria(Criteria::And(vec![
            Criteria::row_limit("qty", 10, false),
            Criteria::row_limit("qty", 10, false),
        ]));
        let (scopes, _) = run_through_criteria(&invoice_template(), &query).expect("idempotent");
        assert_eq!(scopes["items"].row_limit.map(|limit| limit.max), Some(10));

        let query = DocQuery::select_all().with_criteria(Criteria::And(vec![
            Criteria::row_limit("qty", 10, false),
            Criteria::row_limit("qty", 20, false),
        ]));
        let err = run_through_criteria(&invoice_template(), &query).expect_err("must fail");
        assert!(err.to_string().contains("conflicting row limits"));
    }

    #[test]
    fn row_limit_under_or_is_rejected() {
        let query = DocQuery::select_all().with_criteria(Criteria::Or(vec![
            Criteria::row_limit("qty", 10, false),
            Criteria::eq("qty", Value::Int(1)),
        ]));

        let err = run_through_criteria(&invoice_template(), &query).expect_err("must fail");
        assert!(err.to_string().contains("top-level conjunct"));
    }
}
