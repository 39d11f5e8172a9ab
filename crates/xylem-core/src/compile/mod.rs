//! The compilation pipeline.
//!
//! Passes run in a fixed sequence over a per-compilation clone of the
//! template: binding resolution, criteria distribution, correlation
//! raising, exclusion, projection minimization, query composition,
//! staging, and program lowering. Each pass takes the arena and the
//! shared `PassContext` and either mutates in place or fails the whole
//! compilation with the first fatal error.

pub mod binding;
pub mod criteria;
pub mod exclusion;
pub mod program;
pub mod projection;
pub mod raising;
pub mod staging;

use crate::{
    config::CompileConfig,
    diagnostics::CompileDiagnostics,
    error::CompileError,
    program::Program,
    query::DocQuery,
    scope::{Binding, ResultSetInfo, RowLimit},
    template::{DocumentTemplate, NodeId, TemplateArena},
};
use std::collections::BTreeMap;
use xylem_relational::{
    Catalog, ColumnRef, Projection, QueryAst, RelationalFrontend, and_combine,
};

/// Boundary key for staging scheduled at the document level rather than
/// at a source node.
pub(crate) const DOC_BOUNDARY: &str = "";

///
/// PassContext
///
/// All per-compilation state outside the tree itself: the scope side
/// table, alias/staging counters, staging schedule, collaborators, and
/// the diagnostics trace. Threaded explicitly through every pass; there
/// is no ambient state.
///

pub(crate) struct PassContext<'a> {
    pub(crate) scopes: BTreeMap<String, ResultSetInfo>,
    /// Scope name -> its source node, maintained by the binding pass
    /// and pruned by exclusion.
    pub(crate) scope_nodes: BTreeMap<String, NodeId>,
    /// Staging scope -> document scope whose node declared it
    /// (`DOC_BOUNDARY` when declared above the root scope).
    pub(crate) staging_anchor: BTreeMap<String, String>,
    pub(crate) root_scope: Option<String>,
    pub(crate) alias_seq: u32,
    pub(crate) staged_seq: u32,
    /// Boundary scope -> staging scopes loaded/unloaded there, in
    /// declaration order.
    pub(crate) staging_bounds: BTreeMap<String, Vec<String>>,
    pub(crate) config: &'a CompileConfig,
    pub(crate) catalog: &'a mut dyn Catalog,
    pub(crate) frontend: &'a dyn RelationalFrontend,
    pub(crate) diagnostics: CompileDiagnostics,
}

impl PassContext<'_> {
    /// Nearest scope strictly above the named scope's source node.
    pub(crate) fn parent_scope(&self, arena: &TemplateArena, scope: &str) -> Option<String> {
        let node = *self.scope_nodes.get(scope)?;
        let parent = arena.enclosing_scope_above(node)?;
        arena.node(parent).scope_name().map(ToString::to_string)
    }

    /// Ancestor scopes of `scope`, nearest first.
    pub(crate) fn scope_chain(&self, arena: &TemplateArena, scope: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut current = self.parent_scope(arena, scope);
        while let Some(ancestor) = current {
            current = self.parent_scope(arena, &ancestor);
            out.push(ancestor);
        }
        out
    }

    /// True when `scope` is `ancestor` or nested below it.
    pub(crate) fn is_at_or_below(
        &self,
        arena: &TemplateArena,
        scope: &str,
        ancestor: &str,
    ) -> bool {
        scope == ancestor
            || self
                .scope_chain(arena, scope)
                .iter()
                .any(|candidate| candidate == ancestor)
    }

    /// Scopes strictly between `scope` and `ancestor`, nearest first.
    /// Empty when `ancestor` is the direct parent.
    pub(crate) fn scopes_between(
        &self,
        arena: &TemplateArena,
        scope: &str,
        ancestor: &str,
    ) -> Vec<String> {
        self.scope_chain(arena, scope)
            .into_iter()
            .take_while(|candidate| candidate != ancestor)
            .collect()
    }
}

///
/// CompiledScope
///
/// Executor-facing record for one scope: the composed query, its
/// runtime bindings, row cap, and staging artifacts.
///

#[derive(Clone, Debug)]
pub struct CompiledScope {
    pub name: String,
    pub query: QueryAst,
    pub bindings: Vec<Binding>,
    pub row_limit: Option<RowLimit>,
    pub staged_table: Option<String>,
    pub staged_load: Option<QueryAst>,
}

///
/// Compilation
///
/// The compiled artifact: the program, the root scope's schema, the
/// per-scope queries the program's `ExecQuery`/`LoadStaging`
/// instructions refer to, and the diagnostics trace.
///

#[derive(Debug)]
pub struct Compilation {
    pub program: Program,
    pub root_schema: Vec<ColumnRef>,
    pub scopes: BTreeMap<String, CompiledScope>,
    pub diagnostics: CompileDiagnostics,
}

/// Compile a document template plus a user query into an executable
/// program. The template is deep-cloned; the caller's copy is never
/// touched.
pub fn compile(
    template: &DocumentTemplate,
    query: &DocQuery,
    catalog: &mut dyn Catalog,
    frontend: &dyn RelationalFrontend,
    config: &CompileConfig,
) -> Result<Compilation, CompileError> {
    let mut arena = template.arena.clone();
    let mut ctx = PassContext {
        scopes: template.scopes.clone(),
        scope_nodes: BTreeMap::new(),
        staging_anchor: BTreeMap::new(),
        root_scope: None,
        alias_seq: 0,
        staged_seq: 0,
        staging_bounds: BTreeMap::new(),
        config,
        catalog,
        frontend,
        diagnostics: CompileDiagnostics::new(),
    };

    binding::resolve(&mut arena, &mut ctx)?;
    criteria::distribute(&arena, &mut ctx, query)?;
    raising::raise(&arena, &mut ctx)?;
    exclusion::prune(&mut arena, &mut ctx, &query.requested)?;
    projection::minimize(&arena, &mut ctx)?;
    compose_queries(&mut ctx);
    staging::plan(&arena, &mut ctx)?;
    finalize_queries(&mut ctx)?;

    let compiled = program::lower(&arena, &mut ctx)?;
    let root_schema = root_schema(&ctx)?;

    let scopes = ctx
        .scopes
        .into_iter()
        .map(|(name, info)| {
            let compiled_scope = CompiledScope {
                name: info.name.clone(),
                query: info.query,
                bindings: info.bindings,
                row_limit: info.row_limit,
                staged_table: info.staged_table,
                staged_load: info.staged_load,
            };
            (name, compiled_scope)
        })
        .collect();

    Ok(Compilation {
        program: compiled,
        root_schema,
        scopes,
        diagnostics: ctx.diagnostics,
    })
}

/// Fold each scope's accumulated criteria, raised join predicate, and
/// distributed order-by into its query AST. Raised scopes already
/// merged their criteria during raising; everything left merges here.
fn compose_queries(ctx: &mut PassContext<'_>) {
    for info in ctx.scopes.values_mut() {
        if let Some(criteria) = info.criteria.take() {
            info.query.filter = Some(and_combine(info.query.filter.take(), criteria));
        }
        if let Some(join) = info.join_criteria.clone() {
            info.query.filter = Some(and_combine(info.query.filter.take(), join));
        }
        if let Some(order) = info.order_by.take() {
            let mut merged = info.query.order_by.take().unwrap_or_default();
            merged.entries.extend(order.entries);
            info.query.order_by = Some(merged);
        }
    }
}

/// Run every composed query (and staged load command) through the
/// front-end's resolve and rewrite stages. Front-end failures are fatal
/// and carry the owning scope's name.
fn finalize_queries(ctx: &mut PassContext<'_>) -> Result<(), CompileError> {
    let names: Vec<String> = ctx.scopes.keys().cloned().collect();

    for name in names {
        let Some(info) = ctx.scopes.get_mut(&name) else {
            continue;
        };

        let query = std::mem::replace(&mut info.query, QueryAst::new(String::new()));
        let query = match ctx.frontend.resolve(query, ctx.catalog) {
            Ok(query) => query,
            Err(source) => return Err(CompileError::Frontend { scope: name, source }),
        };
        info.query = ctx.frontend.rewrite(query, ctx.catalog);

        if let Some(load) = info.staged_load.take() {
            let load = match ctx.frontend.resolve(load, ctx.catalog) {
                Ok(load) => load,
                Err(source) => return Err(CompileError::Frontend { scope: name, source }),
            };
            info.staged_load = Some(ctx.frontend.rewrite(load, ctx.catalog));
        }
    }

    Ok(())
}

fn root_schema(ctx: &PassContext<'_>) -> Result<Vec<ColumnRef>, CompileError> {
    let Some(root) = &ctx.root_scope else {
        return Ok(Vec::new());
    };
    let Some(info) = ctx.scopes.get(root) else {
        return Ok(Vec::new());
    };

    match &info.query.projection {
        Projection::Columns(columns) => Ok(columns.clone()),
        Projection::All => Ok(ctx.catalog.relation_columns(&info.query.from)?),
        Projection::Constant => Ok(Vec::new()),
    }
}
