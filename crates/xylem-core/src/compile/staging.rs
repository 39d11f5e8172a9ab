//! Staging: materialize a scope's query into a temporary relation ahead
//! of the document walk, either by explicit declaration or by a
//! cardinality-gated heuristic.

use super::{DOC_BOUNDARY, PassContext};
use crate::{
    diagnostics::{CompilePhase, CompileTraceEvent, StagingSkipReason},
    error::CompileError,
    scope::ScopeKind,
    template::TemplateArena,
};
use thiserror::Error as ThisError;
use xylem_relational::{
    ColumnRef, Criteria, FrontendError, Projection, QueryAst, and_combine, split_conjuncts,
};

///
/// StagingError
///
/// Only explicit staging can fail compilation; automatic staging falls
/// back silently.
///

#[derive(Debug, ThisError)]
pub enum StagingError {
    #[error("explicit staging of scope '{scope}' was rejected by the planner: {source}")]
    ExplicitRejected {
        scope: String,
        source: FrontendError,
    },
}

pub(crate) fn plan(arena: &TemplateArena, ctx: &mut PassContext<'_>) -> Result<(), CompileError> {
    stage_declared(arena, ctx)?;
    stage_automatic(arena, ctx)?;

    ctx.diagnostics.push(CompileTraceEvent::PhaseFinished {
        phase: CompilePhase::Staging,
    });

    Ok(())
}

/// Explicitly declared staging relations always stage; a planner
/// rejection is fatal and surfaces the planner's error.
fn stage_declared(arena: &TemplateArena, ctx: &mut PassContext<'_>) -> Result<(), CompileError> {
    let declared: Vec<String> = ctx
        .scopes
        .iter()
        .filter(|(_, info)| info.kind == ScopeKind::Staging)
        .map(|(name, _)| name.clone())
        .collect();

    for scope in declared {
        let Some(anchor) = ctx.staging_anchor.get(&scope).cloned() else {
            // Declared in the template but never anchored to a surviving
            // node; nothing can reference it.
            ctx.scopes.remove(&scope);
            continue;
        };
        if anchor != DOC_BOUNDARY && !ctx.scopes.contains_key(&anchor) {
            // The declaring subtree was excluded.
            ctx.scopes.remove(&scope);
            continue;
        }

        let load = ctx.scopes[&scope].query.clone();
        let plan = match ctx.frontend.optimize(&load, ctx.catalog) {
            Ok(plan) => plan,
            Err(source) => {
                return Err(StagingError::ExplicitRejected { scope, source }.into());
            }
        };

        let staged = next_staged_name(ctx);
        let columns = load_columns(ctx, &load, &staged)?;
        ctx.catalog
            .register_temp_relation(staged.clone(), columns.clone())?;

        let boundary = usage_boundary(arena, ctx, &scope).unwrap_or(anchor);
        ctx.staging_bounds
            .entry(boundary)
            .or_default()
            .push(scope.clone());

        let Some(info) = ctx.scopes.get_mut(&scope) else {
            continue;
        };
        let mut runtime = QueryAst::new(staged.clone());
        runtime.projection = Projection::Columns(columns);
        info.staged_load = Some(load);
        info.staged_table = Some(staged.clone());
        info.query = runtime;

        ctx.diagnostics.push(CompileTraceEvent::Staged {
            scope,
            table: staged,
            estimated_rows: plan.estimated_rows(),
            explicit: true,
        });
    }

    Ok(())
}

/// Automatic staging targets scopes the runtime would otherwise
/// re-evaluate per parent row (unraised correlated scopes), plus raised
/// scopes whose composed query carries a row cap and must materialize
/// before join multiplication.
fn stage_automatic(arena: &TemplateArena, ctx: &mut PassContext<'_>) -> Result<(), CompileError> {
    let Some(root) = ctx.root_scope.clone() else {
        return Ok(());
    };

    let candidates: Vec<String> = ctx
        .scopes
        .iter()
        .filter(|(name, info)| {
            info.kind == ScopeKind::Document
                && **name != root
                && info.alias_of.is_none()
                && !info.no_cache
                && info.staged_table.is_none()
                && ctx.scope_nodes.contains_key(*name)
        })
        .map(|(name, _)| name.clone())
        .collect();

    for scope in candidates {
        let info = &ctx.scopes[&scope];
        let required = info.input_set_raised && info.query.limit.is_some();
        let correlated = !info.bindings.is_empty() && !info.input_set_raised;
        if !required && !correlated {
            continue;
        }

        // Split off conjuncts bound per parent row; only the invariant
        // part can load into a temporary relation.
        let (load, runtime_filter) = split_load_query(&info.query);

        let plan = match ctx.frontend.optimize(&load, ctx.catalog) {
            Ok(plan) => plan,
            Err(_) if required => {
                revert_raise(ctx, &scope);
                continue;
            }
            Err(_) => {
                ctx.diagnostics.push(CompileTraceEvent::StagingSkipped {
                    scope,
                    reason: StagingSkipReason::PlannerRejected,
                });
                continue;
            }
        };

        if !required {
            match plan.estimated_rows() {
                None => {
                    ctx.diagnostics.push(CompileTraceEvent::StagingSkipped {
                        scope,
                        reason: StagingSkipReason::UnknownCardinality,
                    });
                    continue;
                }
                Some(estimate) if estimate > ctx.config.auto_stage_row_threshold => {
                    ctx.diagnostics.push(CompileTraceEvent::StagingSkipped {
                        scope,
                        reason: StagingSkipReason::EstimateAboveThreshold,
                    });
                    continue;
                }
                Some(_) => {}
            }
        }

        let staged = next_staged_name(ctx);
        let columns = load_columns(ctx, &load, &staged)?;
        ctx.catalog
            .register_temp_relation(staged.clone(), columns.clone())?;

        let boundary = ctx
            .parent_scope(arena, &scope)
            .unwrap_or_else(|| DOC_BOUNDARY.to_string());
        ctx.staging_bounds
            .entry(boundary)
            .or_default()
            .push(scope.clone());

        let old_label = ctx.scopes[&scope].relation_label().to_string();
        let Some(info) = ctx.scopes.get_mut(&scope) else {
            continue;
        };
        let mut runtime = QueryAst::new(staged.clone());
        runtime.projection = Projection::Columns(columns);
        runtime.filter = runtime_filter.map(|mut filter| {
            rehome_columns(&mut filter, &old_label, &staged);
            filter
        });
        runtime.bindings = info.query.bindings.clone();
        info.staged_load = Some(load);
        info.staged_table = Some(staged.clone());
        info.auto_staged = true;
        info.query = runtime;

        ctx.diagnostics.push(CompileTraceEvent::Staged {
            scope,
            table: staged,
            estimated_rows: plan.estimated_rows(),
            explicit: false,
        });
    }

    Ok(())
}

fn next_staged_name(ctx: &mut PassContext<'_>) -> String {
    ctx.staged_seq += 1;
    format!("{}_{}", ctx.config.staged_prefix, ctx.staged_seq)
}

/// Columns the staged relation will expose, homed on the staged name.
fn load_columns(
    ctx: &PassContext<'_>,
    load: &QueryAst,
    staged: &str,
) -> Result<Vec<ColumnRef>, CompileError> {
    let columns = match &load.projection {
        Projection::Columns(columns) => columns.clone(),
        Projection::All => ctx.catalog.relation_columns(&load.from)?,
        Projection::Constant => Vec::new(),
    };

    Ok(columns
        .iter()
        .map(|column| column.with_relation(staged))
        .collect())
}

/// Partition a candidate's query into the invariant load query and the
/// per-parent-row filter that must stay behind.
fn split_load_query(query: &QueryAst) -> (QueryAst, Option<Criteria>) {
    let mut load = query.clone();
    load.bindings = Vec::new();

    let Some(filter) = load.filter.take() else {
        return (load, None);
    };

    let mut invariant: Option<Criteria> = None;
    let mut bound: Option<Criteria> = None;
    for conjunct in split_conjuncts(filter) {
        if conjunct.references_any_param() {
            bound = Some(and_combine(bound, conjunct));
        } else {
            invariant = Some(and_combine(invariant, conjunct));
        }
    }

    load.filter = invariant;
    (load, bound)
}

fn rehome_columns(criteria: &mut Criteria, from_label: &str, to_label: &str) {
    let _ = criteria.try_rewrite_fields(&mut |field: &mut xylem_relational::FieldRef| {
        if let xylem_relational::FieldRef::Column(column) = field
            && column.relation == from_label
        {
            *column = column.with_relation(to_label);
        }
        Ok::<(), ()>(())
    });
}

/// Undo a raise whose required staging could not be planned; the scope
/// falls back to runtime-bound correlation.
fn revert_raise(ctx: &mut PassContext<'_>, scope: &str) {
    let Some(info) = ctx.scopes.get_mut(scope) else {
        return;
    };

    let conjuncts = match info.query.filter.take() {
        Some(filter) => split_conjuncts(filter),
        None => Vec::new(),
    };

    let mut rebuilt: Option<Criteria> = None;
    for conjunct in conjuncts {
        let restored = match &conjunct {
            Criteria::Join(join) => {
                let matching = join.right.as_column().and_then(|column| {
                    info.bindings
                        .iter()
                        .find(|binding| binding.source_column == *column)
                });
                match matching {
                    Some(binding) => Criteria::Compare(xylem_relational::CompareCriteria::new(
                        join.left.clone(),
                        join.op,
                        xylem_relational::Value::Param(binding.param.clone()),
                    )),
                    None => conjunct,
                }
            }
            _ => conjunct,
        };
        rebuilt = Some(and_combine(rebuilt, restored));
    }

    info.query.filter = rebuilt;
    info.join_criteria = None;
    info.input_set_raised = false;
    ctx.diagnostics.push(CompileTraceEvent::RaiseReverted {
        scope: scope.to_string(),
    });
}

/// Nearest common ancestor scope bounding every scope whose composed
/// query references the staged relation.
fn usage_boundary(
    arena: &TemplateArena,
    ctx: &PassContext<'_>,
    staging: &str,
) -> Option<String> {
    let usages: Vec<String> = ctx
        .scopes
        .iter()
        .filter(|(_, info)| info.kind == ScopeKind::Document)
        .filter(|(_, info)| {
            let mut references = false;
            for criteria in [&info.query.filter, &info.join_criteria, &info.criteria] {
                if let Some(criteria) = criteria {
                    references |= criteria
                        .columns()
                        .iter()
                        .any(|column| column.relation == staging);
                }
            }
            references
        })
        .map(|(name, _)| name.clone())
        .collect();

    if usages.is_empty() {
        return None;
    }

    // Root-first chains; the deepest shared prefix element is the LCA.
    let chains: Vec<Vec<String>> = usages
        .iter()
        .map(|scope| {
            let mut chain = ctx.scope_chain(arena, scope);
            chain.reverse();
            chain.push(scope.clone());
            chain
        })
        .collect();

    let mut lca: Option<String> = None;
    let shortest = chains.iter().map(Vec::len).min().unwrap_or(0);
    for depth in 0..shortest {
        let candidate = &chains[0][depth];
        if chains.iter().all(|chain| chain[depth] == *candidate) {
            lca = Some(candidate.clone());
        } else {
            break;
        }
    }

    // A boundary must sit strictly above every usage, so an LCA that is
    // itself a usage moves up one scope.
    let lca = lca?;
    if usages.contains(&lca) {
        return Some(
            ctx.parent_scope(arena, &lca)
                .unwrap_or_else(|| DOC_BOUNDARY.to_string()),
        );
    }
    Some(lca)
}

///
/// TESTS
///
