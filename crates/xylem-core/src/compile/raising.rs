//! Correlation raising: rewrite a scope's parameter-bound query into an
//! execute-once query correlated through ordinary join predicates.
//!
//! Failures here are silent fallbacks to runtime-bound correlation,
//! except when a cross-scope predicate requires a join that cannot be
//! built, which is fatal.

use super::PassContext;
use crate::{
    diagnostics::{CompilePhase, CompileTraceEvent, RaiseSkipReason},
    error::CompileError,
    scope::ScopeKind,
    template::TemplateArena,
};
use thiserror::Error as ThisError;
use xylem_relational::{Criteria, FieldRef, and_combine, split_conjuncts};

///
/// RaiseError
///

#[derive(Debug, ThisError)]
pub enum RaiseError {
    #[error(
        "cannot plan: criteria on scope '{scope}' touches descendant scope '{descendant}', which cannot be joined"
    )]
    CannotPlan { scope: String, descendant: String },
}

pub(crate) fn raise(arena: &TemplateArena, ctx: &mut PassContext<'_>) -> Result<(), CompileError> {
    // Top-down template order: a scope's raise decision depends on its
    // ancestors' decisions.
    let order: Vec<String> = arena
        .walk()
        .into_iter()
        .filter_map(|id| arena.node(id).scope_name().map(ToString::to_string))
        .collect();

    for scope in order {
        try_raise(arena, ctx, &scope);
    }

    verify_cross_scope_placements(arena, ctx)?;

    ctx.diagnostics.push(CompileTraceEvent::PhaseFinished {
        phase: CompilePhase::Raising,
    });

    Ok(())
}

fn try_raise(arena: &TemplateArena, ctx: &mut PassContext<'_>, scope: &str) {
    let Some(info) = ctx.scopes.get(scope) else {
        return;
    };
    if info.kind != ScopeKind::Document || info.bindings.is_empty() {
        return;
    }

    if let Some(reason) = skip_reason(arena, ctx, scope) {
        ctx.diagnostics.push(CompileTraceEvent::RaiseSkipped {
            scope: scope.to_string(),
            reason,
        });
        return;
    }

    // Partition the filter: binding conjuncts become join predicates,
    // the rest stays as the scope's own filter. Nothing is mutated
    // until every binding conjunct is known to convert.
    let Some(info) = ctx.scopes.get_mut(scope) else {
        return;
    };
    let conjuncts = match &info.query.filter {
        Some(filter) => split_conjuncts(filter.clone()),
        None => Vec::new(),
    };

    let mut joins: Option<Criteria> = None;
    let mut rest: Option<Criteria> = None;
    for conjunct in conjuncts {
        if conjunct.references_any_param() {
            let Some(join) = to_join(&conjunct, info) else {
                ctx.diagnostics.push(CompileTraceEvent::RaiseSkipped {
                    scope: scope.to_string(),
                    reason: RaiseSkipReason::ComplexParamPredicate,
                });
                return;
            };
            joins = Some(and_combine(joins, join));
        } else {
            rest = Some(and_combine(rest, conjunct));
        }
    }

    // Merge the accumulated user criteria now; the simple-block
    // precondition guaranteed this is legal.
    if let Some(criteria) = info.criteria.take() {
        rest = Some(and_combine(rest, criteria));
        info.criteria_raised = true;
    }

    info.query.filter = rest;
    info.join_criteria = joins;
    info.input_set_raised = true;
    ctx.diagnostics.push(CompileTraceEvent::InputSetRaised {
        scope: scope.to_string(),
    });
}

fn skip_reason(
    arena: &TemplateArena,
    ctx: &PassContext<'_>,
    scope: &str,
) -> Option<RaiseSkipReason> {
    let info = &ctx.scopes[scope];

    let needs_merge = info.criteria.is_some();
    if needs_merge && !info.query.is_simple_block() {
        return Some(RaiseSkipReason::NotSimpleBlock);
    }

    for binding in &info.bindings {
        if info.query.param_outside_filter(&binding.param) {
            return Some(RaiseSkipReason::ParamOutsideFilter);
        }
    }

    // Multi-level chains require every intermediate scope raised.
    for binding in &info.bindings {
        let between = ctx.scopes_between(arena, scope, &binding.source_scope);
        let blocked = between.iter().any(|intermediate| {
            ctx.scopes
                .get(intermediate)
                .is_none_or(|info| !info.input_set_raised)
        });
        if blocked {
            return Some(RaiseSkipReason::ParentNotRaised);
        }
    }

    None
}

/// Convert one binding conjunct `col <op> ?param` into the join
/// predicate `col <op> source_col`.
fn to_join(conjunct: &Criteria, info: &crate::scope::ResultSetInfo) -> Option<Criteria> {
    let Criteria::Compare(cmp) = conjunct else {
        return None;
    };
    let param = cmp.value.as_param()?;
    let binding = info.binding(param)?;

    Some(Criteria::join(
        cmp.field.clone(),
        cmp.op,
        FieldRef::Column(binding.source_column.clone()),
    ))
}

/// Criteria placed on an ancestor that touch a descendant scope are
/// executable only when the descendant (and every scope between) was
/// raised into the join chain.
fn verify_cross_scope_placements(
    arena: &TemplateArena,
    ctx: &PassContext<'_>,
) -> Result<(), CompileError> {
    for (scope, info) in &ctx.scopes {
        for descendant in &info.touched_descendants {
            let mut chain = vec![descendant.clone()];
            chain.extend(ctx.scopes_between(arena, descendant, scope));

            let unraised = chain.iter().any(|candidate| {
                ctx.scopes
                    .get(candidate)
                    .is_none_or(|info| !info.input_set_raised)
            });
            if unraised {
                return Err(RaiseError::CannotPlan {
                    scope: scope.clone(),
                    descendant: descendant.clone(),
                }
                .into());
            }
        }
    }

    Ok(())
}

///
/// TESTS
///
