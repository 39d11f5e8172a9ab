//! Projection minimization: two-sweep dataflow that narrows each
//! scope's SELECT list to the columns actually consumed downstream.

use super::PassContext;
use crate::{
    diagnostics::{CompilePhase, CompileTraceEvent},
    error::CompileError,
    scope::ScopeKind,
    template::{NodeKind, TemplateArena},
};
use std::collections::{BTreeMap, BTreeSet};
use xylem_relational::{ColumnRef, Projection};

pub(crate) fn minimize(
    arena: &TemplateArena,
    ctx: &mut PassContext<'_>,
) -> Result<(), CompileError> {
    let needed = collect_needed(arena, ctx);
    rewrite_projections(ctx, needed);

    ctx.diagnostics.push(CompileTraceEvent::PhaseFinished {
        phase: CompilePhase::Projection,
    });

    Ok(())
}

/// Bottom-up sweep: gather, per scope, every column consumed by
/// surviving nodes, branch criteria, scope criteria, join predicates,
/// ordering, and binding parameters.
fn collect_needed(
    arena: &TemplateArena,
    ctx: &PassContext<'_>,
) -> BTreeMap<String, BTreeSet<ColumnRef>> {
    // Columns are assigned to scopes by relation label. Two unaliased
    // scopes over one relation both collect a shared column, which
    // over-projects the twin but stays deterministic.
    let labels: Vec<(String, String)> = ctx
        .scopes
        .iter()
        .map(|(name, info)| (info.relation_label().to_string(), name.clone()))
        .collect();

    let mut needed: BTreeMap<String, BTreeSet<ColumnRef>> = BTreeMap::new();
    let mut assign = |column: &ColumnRef| {
        for (label, scope) in &labels {
            if *label == column.relation {
                needed
                    .entry(scope.clone())
                    .or_default()
                    .insert(column.clone());
            }
        }
    };

    for id in arena.walk() {
        let node = arena.node(id);
        if node.excluded {
            continue;
        }
        if let Some(column) = &node.resolved {
            assign(column);
        }
        if let Some(when) = &node.when {
            for column in when.columns() {
                assign(column);
            }
        }
        if let NodeKind::Recursive {
            stop: Some(stop), ..
        } = &node.kind
        {
            for column in stop.columns() {
                assign(column);
            }
        }
    }

    for info in ctx.scopes.values() {
        for criteria in [&info.criteria, &info.join_criteria, &info.query.filter] {
            if let Some(criteria) = criteria {
                for column in criteria.columns() {
                    assign(column);
                }
            }
        }
        if let Some(having) = &info.query.having {
            for column in having.columns() {
                assign(column);
            }
        }
        for order in [&info.order_by, &info.query.order_by] {
            if let Some(order) = order {
                for field in order.fields() {
                    if let Some(column) = field.as_column() {
                        assign(column);
                    }
                }
            }
        }
        for binding in &info.bindings {
            assign(&binding.source_column);
        }
    }

    needed
}

/// Top-down sweep: rewrite each scope's SELECT list to exactly its
/// needed set. Distinct queries are never narrowed; a scope nothing
/// projects from becomes a trivial constant existence check. Aliased
/// scopes map their needed set back onto the underlying relation
/// before rewriting.
fn rewrite_projections(ctx: &mut PassContext<'_>, needed: BTreeMap<String, BTreeSet<ColumnRef>>) {
    for (name, info) in &mut ctx.scopes {
        if info.query.distinct {
            continue;
        }

        let columns: Vec<ColumnRef> = needed
            .get(name)
            .map(|set| {
                set.iter()
                    .map(|column| {
                        if info.alias_of.is_some() {
                            column.with_relation(info.query.from.clone())
                        } else {
                            column.clone()
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        if columns.is_empty() {
            if info.kind == ScopeKind::Document {
                info.query.projection = Projection::Constant;
            }
        } else {
            info.query.projection = Projection::Columns(columns);
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use crate::query::{DocQuery, RequestedFields};
    use crate::test_support::{distinct_items_template, invoice_template, run_through_projection};
    use xylem_relational::Projection;

    #[test]
    fn single_consumer_scope_projects_exactly_needed() {
        let mut query = DocQuery::select_all();
        query.requested = RequestedFields::Named(vec!["invoice.item.qty".into()]);

        let (scopes, _) = run_through_projection(&invoice_template(), &query).expect("compiles");

        let Projection::Columns(columns) = &scopes["items"].query.projection else {
            panic!("expected narrowed projection");
        };
        let names: Vec<&str> = columns.iter().map(|column| column.column.as_str()).collect();
        // qty (requested), id (mandatory attribute), order_id (binding
        // filter), and nothing else.
        assert!(names.contains(&"qty"));
        assert!(names.contains(&"id"));
        assert!(names.contains(&"order_id"));
        assert!(!names.contains(&"note"));
    }

    #[test]
    fn distinct_queries_are_never_narrowed() {
        let (scopes, _) =
            run_through_projection(&distinct_items_template(), &DocQuery::select_all())
                .expect("compiles");

        assert_eq!(scopes["items"].query.projection, Projection::All);
    }

    #[test]
    fn existence_only_scope_gets_constant_projection() {
        let mut query = DocQuery::select_all();
        query.requested = RequestedFields::Named(vec!["invoice.customer".into()]);

        let (scopes, _) = run_through_projection(&invoice_template(), &query).expect("compiles");

        // The items scope disappeared with its subtree, but orders keeps
        // real columns.
        assert!(!scopes.contains_key("items"));
        assert!(matches!(
            scopes["orders"].query.projection,
            Projection::Columns(_)
        ));
    }
}
