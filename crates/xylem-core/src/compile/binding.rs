//! Binding resolution: document-local field names become fully-typed
//! column references, reused fragments get fresh aliased scopes, and
//! correlated binding parameters resolve against ancestor scopes.

use super::{DOC_BOUNDARY, PassContext};
use crate::{
    diagnostics::{CompilePhase, CompileTraceEvent},
    error::CompileError,
    scope::{Binding, ScopeKind},
    template::{NodeId, NodeKind, TemplateArena},
};
use thiserror::Error as ThisError;
use xylem_relational::{ColumnRef, FieldRef};

///
/// BindingError
///
/// Always fatal; compilation aborts at the first one.
///

#[derive(Debug, ThisError)]
pub enum BindingError {
    #[error("unresolved field '{field}' at {path}")]
    UnresolvedField { field: String, path: String },

    #[error("node at {path} is bound to a field but has no enclosing source node")]
    NoEnclosingScope { path: String },

    #[error("node at {path} references undeclared scope '{scope}'")]
    UnknownScope { scope: String, path: String },

    #[error("binding '{param}' of scope '{scope}' does not resolve against any ancestor scope")]
    UnresolvedBinding { param: String, scope: String },

    #[error("scope '{scope}' is bound to document-shaped relation '{relation}'")]
    DocumentRelationScope { scope: String, relation: String },
}

pub(crate) fn resolve(
    arena: &mut TemplateArena,
    ctx: &mut PassContext<'_>,
) -> Result<(), CompileError> {
    register_scopes(arena, ctx)?;
    resolve_nodes(arena, ctx)?;
    resolve_scope_queries(arena, ctx)?;

    ctx.diagnostics.push(CompileTraceEvent::PhaseFinished {
        phase: CompilePhase::Binding,
    });

    Ok(())
}

/// Walk source nodes in template order: the first occurrence of a scope
/// name claims it, later occurrences get fresh aliases so sibling
/// fragments sharing one query plan independently. Staging declarations
/// register their relations with the catalog and record the declaring
/// boundary.
fn register_scopes(arena: &mut TemplateArena, ctx: &mut PassContext<'_>) -> Result<(), CompileError> {
    for id in arena.walk() {
        if let Some(scope) = arena.node(id).scope_name().map(ToString::to_string) {
            if !ctx.scopes.contains_key(&scope) {
                return Err(BindingError::UnknownScope {
                    scope,
                    path: arena.path_of(id),
                }
                .into());
            }

            // Scopes bind ordinary relations; a document-shaped relation
            // cannot be re-planned as a row source.
            let relation = ctx.scopes[&scope].query.from.clone();
            if ctx.catalog.is_document_relation(&relation) {
                return Err(BindingError::DocumentRelationScope { scope, relation }.into());
            }

            if ctx.scope_nodes.contains_key(&scope) {
                alias_scope(arena, ctx, id, &scope)?;
            } else {
                ctx.scope_nodes.insert(scope.clone(), id);
                if ctx.root_scope.is_none() {
                    ctx.root_scope = Some(scope);
                }
            }
        }

        register_staging_declarations(arena, ctx, id)?;
    }

    Ok(())
}

fn alias_scope(
    arena: &mut TemplateArena,
    ctx: &mut PassContext<'_>,
    id: NodeId,
    scope: &str,
) -> Result<(), CompileError> {
    ctx.alias_seq += 1;
    let alias = format!("{scope}${}", ctx.alias_seq);

    let mut info = ctx.scopes[scope].clone();
    info.name = alias.clone();
    info.alias_of = Some(scope.to_string());

    // The alias gets its own relation label so the two instances end up
    // with disjoint column-reference names.
    let columns: Vec<ColumnRef> = ctx
        .catalog
        .relation_columns(&info.query.from)?
        .iter()
        .map(|column| column.with_relation(alias.clone()))
        .collect();
    ctx.catalog.register_temp_relation(alias.clone(), columns)?;

    arena.node_mut(id).kind = NodeKind::Scope {
        scope: alias.clone(),
    };
    ctx.scope_nodes.insert(alias.clone(), id);
    ctx.scopes.insert(alias.clone(), info);
    ctx.diagnostics.push(CompileTraceEvent::ScopeAliased {
        scope: scope.to_string(),
        alias,
    });

    Ok(())
}

fn register_staging_declarations(
    arena: &TemplateArena,
    ctx: &mut PassContext<'_>,
    id: NodeId,
) -> Result<(), CompileError> {
    let declared = arena.node(id).staging_tables.clone();
    for staging in declared {
        let Some(info) = ctx.scopes.get(&staging) else {
            return Err(BindingError::UnknownScope {
                scope: staging,
                path: arena.path_of(id),
            }
            .into());
        };
        if info.kind != ScopeKind::Staging || ctx.staging_anchor.contains_key(&staging) {
            continue;
        }

        let anchor = arena
            .enclosing_scope(id)
            .and_then(|scope_node| arena.node(scope_node).scope_name())
            .map_or_else(|| DOC_BOUNDARY.to_string(), ToString::to_string);

        // Staged relations are addressed by scope name everywhere else
        // in the compilation, so register that label.
        let columns: Vec<ColumnRef> = ctx
            .catalog
            .relation_columns(&info.query.from)?
            .iter()
            .map(|column| column.with_relation(staging.clone()))
            .collect();
        ctx.catalog
            .register_temp_relation(staging.clone(), columns)?;
        ctx.staging_anchor.insert(staging, anchor);
    }

    Ok(())
}

/// Resolve `name_in_source` bindings, choice-branch criteria, and
/// recursive stop criteria against each node's nearest enclosing scope.
fn resolve_nodes(arena: &mut TemplateArena, ctx: &mut PassContext<'_>) -> Result<(), CompileError> {
    for id in arena.walk() {
        if let Some(field) = arena.node(id).name_in_source.clone() {
            let Some(scope_node) = arena.enclosing_scope(id) else {
                return Err(BindingError::NoEnclosingScope {
                    path: arena.path_of(id),
                }
                .into());
            };
            let column = resolve_in_scope(arena, ctx, scope_node, &field, id)?;
            let scope = arena
                .node(scope_node)
                .scope_name()
                .map(ToString::to_string);
            if let Some(scope) = scope
                && let Some(info) = ctx.scopes.get_mut(&scope)
            {
                info.symbols.entry(field).or_insert_with(|| column.clone());
            }
            arena.node_mut(id).resolved = Some(column);
        }

        resolve_node_criteria(arena, ctx, id)?;
    }

    Ok(())
}

fn resolve_node_criteria(
    arena: &mut TemplateArena,
    ctx: &mut PassContext<'_>,
    id: NodeId,
) -> Result<(), CompileError> {
    let has_when = arena.node(id).when.is_some();
    let has_stop = matches!(&arena.node(id).kind, NodeKind::Recursive { stop: Some(_), .. });
    if !has_when && !has_stop {
        return Ok(());
    }

    let Some(scope_node) = arena.enclosing_scope(id) else {
        return Err(BindingError::NoEnclosingScope {
            path: arena.path_of(id),
        }
        .into());
    };

    if let Some(mut when) = arena.node_mut(id).when.take() {
        rewrite_criteria_fields(arena, ctx, scope_node, id, &mut when)?;
        arena.node_mut(id).when = Some(when);
    }

    let stop_criteria = match &arena.node(id).kind {
        NodeKind::Recursive { stop: Some(stop), .. } => Some(stop.clone()),
        _ => None,
    };
    if let Some(mut resolved) = stop_criteria {
        rewrite_criteria_fields(arena, ctx, scope_node, id, &mut resolved)?;
        if let NodeKind::Recursive { stop, .. } = &mut arena.node_mut(id).kind {
            *stop = Some(resolved);
        }
    }

    Ok(())
}

fn rewrite_criteria_fields(
    arena: &TemplateArena,
    ctx: &mut PassContext<'_>,
    scope_node: NodeId,
    at: NodeId,
    criteria: &mut xylem_relational::Criteria,
) -> Result<(), CompileError> {
    let mut failure: Option<CompileError> = None;
    let _ = criteria.try_rewrite_fields(&mut |field: &mut FieldRef| {
        if let FieldRef::Name(name) = field {
            match resolve_context_field(arena, ctx, scope_node, name, at) {
                Ok(column) => *field = FieldRef::Column(column),
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

/// Resolve a field written inside a scope's context: names qualified by
/// a staging scope resolve there, everything else resolves against the
/// enclosing scope's relation.
fn resolve_context_field(
    arena: &TemplateArena,
    ctx: &PassContext<'_>,
    scope_node: NodeId,
    field: &str,
    at: NodeId,
) -> Result<ColumnRef, CompileError> {
    if let Some((prefix, _)) = field.rsplit_once('.')
        && let Some(info) = ctx.scopes.get(prefix)
        && info.kind == ScopeKind::Staging
    {
        return resolve_in_named_scope(arena, ctx, prefix, field, at);
    }

    resolve_in_scope(arena, ctx, scope_node, field, at)
}

fn resolve_in_scope(
    arena: &TemplateArena,
    ctx: &PassContext<'_>,
    scope_node: NodeId,
    field: &str,
    at: NodeId,
) -> Result<ColumnRef, CompileError> {
    let scope = arena.node(scope_node).scope_name().unwrap_or_default();
    resolve_in_named_scope(arena, ctx, scope, field, at)
}

pub(crate) fn resolve_in_named_scope(
    arena: &TemplateArena,
    ctx: &PassContext<'_>,
    scope: &str,
    field: &str,
    at: NodeId,
) -> Result<ColumnRef, CompileError> {
    let Some(info) = ctx.scopes.get(scope) else {
        return Err(BindingError::UnknownScope {
            scope: scope.to_string(),
            path: arena.path_of(at),
        }
        .into());
    };

    if let Some(column) = info.symbols.get(field) {
        return Ok(column.clone());
    }

    let column_name = field.rsplit('.').next().unwrap_or(field);
    let qualified = format!("{}.{column_name}", info.query.from);
    let column = ctx.catalog.resolve_column(&qualified).map_err(|_| {
        CompileError::from(BindingError::UnresolvedField {
            field: field.to_string(),
            path: arena.path_of(at),
        })
    })?;

    // Aliased and staging scopes home their columns on the scope label.
    if info.is_aliased() || info.kind == ScopeKind::Staging {
        return Ok(column.with_relation(info.name.clone()));
    }

    Ok(column)
}

/// Resolve each scope's own query clauses: filter and order fields, and
/// correlated binding parameters against ancestor scopes.
fn resolve_scope_queries(
    arena: &TemplateArena,
    ctx: &mut PassContext<'_>,
) -> Result<(), CompileError> {
    let scope_names: Vec<String> = ctx.scopes.keys().cloned().collect();

    for scope in scope_names {
        let node = ctx.scope_nodes.get(&scope).copied();
        let mut query = ctx.scopes[&scope].query.clone();

        // Filter and order: staging-qualified names resolve in the
        // staging scope, bare names against this scope's relation.
        let at = node.unwrap_or_else(|| arena.root());
        if let Some(mut filter) = query.filter.take() {
            rewrite_query_fields(arena, ctx, &scope, at, &mut filter)?;
            query.filter = Some(filter);
        }
        if let Some(order) = query.order_by.as_mut() {
            for field in order.fields_mut() {
                if let FieldRef::Name(name) = field {
                    let column = resolve_named_or_staging(arena, ctx, &scope, name, at)?;
                    *field = FieldRef::Column(column);
                }
            }
        }

        // Binding parameters resolve against ancestor scopes, nearest
        // first.
        let mut bindings = Vec::new();
        for param in &mut query.bindings {
            if let FieldRef::Name(name) = &param.field {
                let (source_scope, column) =
                    resolve_binding_source(arena, ctx, &scope, &param.param, name)?;
                bindings.push(Binding {
                    param: param.param.clone(),
                    source_scope: source_scope.clone(),
                    source_column: column.clone(),
                });
                param.field = FieldRef::Column(column);
            }
        }

        let Some(info) = ctx.scopes.get_mut(&scope) else {
            continue;
        };
        for binding in &bindings {
            info.correlated.insert(binding.source_scope.clone());
        }
        info.bindings = bindings;
        info.query = query;
    }

    Ok(())
}

fn rewrite_query_fields(
    arena: &TemplateArena,
    ctx: &PassContext<'_>,
    scope: &str,
    at: NodeId,
    criteria: &mut xylem_relational::Criteria,
) -> Result<(), CompileError> {
    let mut failure: Option<CompileError> = None;
    let _ = criteria.try_rewrite_fields(&mut |field: &mut FieldRef| {
        if let FieldRef::Name(name) = field {
            match resolve_named_or_staging(arena, ctx, scope, name, at) {
                Ok(column) => *field = FieldRef::Column(column),
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

fn resolve_named_or_staging(
    arena: &TemplateArena,
    ctx: &PassContext<'_>,
    scope: &str,
    field: &str,
    at: NodeId,
) -> Result<ColumnRef, CompileError> {
    if let Some((prefix, _)) = field.rsplit_once('.')
        && ctx.scopes.contains_key(prefix)
    {
        return resolve_in_named_scope(arena, ctx, prefix, field, at);
    }

    resolve_in_named_scope(arena, ctx, scope, field, at)
}

fn resolve_binding_source(
    arena: &TemplateArena,
    ctx: &PassContext<'_>,
    scope: &str,
    param: &str,
    field: &str,
) -> Result<(String, ColumnRef), CompileError> {
    let qualified_scope = field.rsplit_once('.').map(|(prefix, _)| prefix);

    for ancestor in ctx.scope_chain(arena, scope) {
        if let Some(target) = qualified_scope
            && target != ancestor
        {
            continue;
        }

        let at = ctx.scope_nodes[&ancestor];
        if let Ok(column) = resolve_in_named_scope(arena, ctx, &ancestor, field, at) {
            return Ok((ancestor, column));
        }
    }

    Err(BindingError::UnresolvedBinding {
        param: param.to_string(),
        scope: scope.to_string(),
    }
    .into())
}

///
/// TESTS
///
