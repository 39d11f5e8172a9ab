//! Shared fixtures for pass-level tests: a small order/line-item
//! catalog, a stub relational front-end with a configurable cardinality
//! estimate, and canonical invoice templates.

use crate::{
    compile::{Compilation, PassContext, binding, compile, criteria, exclusion, projection, raising},
    config::CompileConfig,
    diagnostics::CompileDiagnostics,
    error::CompileError,
    query::DocQuery,
    scope::ResultSetInfo,
    template::{DocumentTemplate, TemplateArena, TemplateNode},
};
use std::collections::BTreeMap;
use xylem_relational::{
    BindingParam, Catalog, CompareOp, Criteria, FieldType, FrontendError, InMemoryCatalog,
    QueryAst, RelationalFrontend, RelationalPlan, Value,
};

///
/// StubFrontend
///

#[derive(Debug, Default)]
pub(crate) struct StubFrontend {
    pub(crate) estimate: Option<u64>,
    pub(crate) fail_optimize: bool,
}

impl RelationalFrontend for StubFrontend {
    fn parse(&self, text: &str) -> Result<QueryAst, FrontendError> {
        Ok(QueryAst::new(text))
    }

    fn resolve(&self, ast: QueryAst, _catalog: &dyn Catalog) -> Result<QueryAst, FrontendError> {
        Ok(ast)
    }

    fn rewrite(&self, ast: QueryAst, _catalog: &dyn Catalog) -> QueryAst {
        ast
    }

    fn optimize(
        &self,
        _ast: &QueryAst,
        _catalog: &dyn Catalog,
    ) -> Result<RelationalPlan, FrontendError> {
        if self.fail_optimize {
            return Err(FrontendError::Plan {
                message: "stub rejection".into(),
            });
        }
        Ok(RelationalPlan::new(self.estimate))
    }
}

pub(crate) fn order_catalog() -> InMemoryCatalog {
    InMemoryCatalog::new()
        .with_relation(
            "orders",
            &[
                ("id", FieldType::Int),
                ("customer", FieldType::Text),
                ("region", FieldType::Text),
            ],
        )
        .with_relation(
            "line_items",
            &[
                ("id", FieldType::Int),
                ("order_id", FieldType::Int),
                ("qty", FieldType::Int),
                ("note", FieldType::Text),
            ],
        )
}

fn items_query() -> QueryAst {
    QueryAst::new("line_items")
        .with_filter(Criteria::compare(
            "order_id",
            CompareOp::Eq,
            Value::Param("oid".into()),
        ))
        .with_binding(BindingParam::new("oid", "orders.id"))
}

/// `invoice` document: an orders scope wrapping a customer element and a
/// correlated line-items scope.
///
/// ```text
/// #source(orders)
///   invoice
///     customer        <- orders.customer
///     #source(items)
///       item
///         @id         <- line_items.id
///         qty         <- line_items.qty
///         note        <- line_items.note (optional)
/// ```
pub(crate) fn invoice_template() -> DocumentTemplate {
    let mut arena = TemplateArena::new(TemplateNode::scope("orders"));
    let root = arena.root();
    let invoice = arena.add_child(root, TemplateNode::element("invoice"));
    arena.add_child(invoice, TemplateNode::element("customer").bound_to("customer"));
    let items = arena.add_child(invoice, TemplateNode::scope("items"));
    let item = arena.add_child(items, TemplateNode::element("item"));
    arena.add_child(item, TemplateNode::attribute("id").bound_to("id"));
    arena.add_child(item, TemplateNode::element("qty").bound_to("qty"));
    arena.add_child(item, TemplateNode::element("note").bound_to("note").optional());

    DocumentTemplate::new(arena)
        .with_scope(ResultSetInfo::document("orders", QueryAst::new("orders")))
        .with_scope(ResultSetInfo::document("items", items_query()))
}

/// Invoice template whose items query carries a row cap, so a filter
/// can no longer merge into it.
pub(crate) fn invoice_template_with_items_limit() -> DocumentTemplate {
    let mut template = invoice_template();
    if let Some(info) = template.scopes.get_mut("items") {
        info.query.limit = Some(50);
    }
    template
}

/// Invoice template whose items query buries its binding inside an OR,
/// which cannot be rewritten into a join.
pub(crate) fn correlated_unraisable_template() -> DocumentTemplate {
    let mut template = invoice_template();
    if let Some(info) = template.scopes.get_mut("items") {
        info.query.filter = Some(Criteria::Or(vec![
            Criteria::compare("order_id", CompareOp::Eq, Value::Param("oid".into())),
            Criteria::compare("qty", CompareOp::Gt, Value::Int(1_000)),
        ]));
    }
    template
}

/// Invoice template whose items query is DISTINCT.
pub(crate) fn distinct_items_template() -> DocumentTemplate {
    let mut template = invoice_template();
    if let Some(info) = template.scopes.get_mut("items") {
        info.query.distinct = true;
    }
    template
}

fn fresh_ctx<'a>(
    template: &DocumentTemplate,
    config: &'a CompileConfig,
    catalog: &'a mut InMemoryCatalog,
    frontend: &'a StubFrontend,
) -> PassContext<'a> {
    PassContext {
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
    }
}

type ScopeTable = BTreeMap<String, ResultSetInfo>;

pub(crate) fn run_binding(
    template: &DocumentTemplate,
) -> (TemplateArena, ScopeTable, CompileDiagnostics) {
    let config = CompileConfig::default();
    let mut catalog = order_catalog();
    let frontend = StubFrontend::default();
    let mut arena = template.arena.clone();
    let mut ctx = fresh_ctx(template, &config, &mut catalog, &frontend);

    binding::resolve(&mut arena, &mut ctx).expect("binding resolves");
    (arena, ctx.scopes, ctx.diagnostics)
}

pub(crate) fn run_through_criteria(
    template: &DocumentTemplate,
    query: &DocQuery,
) -> Result<(ScopeTable, CompileDiagnostics), CompileError> {
    let config = CompileConfig::default();
    let mut catalog = order_catalog();
    let frontend = StubFrontend::default();
    let mut arena = template.arena.clone();
    let mut ctx = fresh_ctx(template, &config, &mut catalog, &frontend);

    binding::resolve(&mut arena, &mut ctx)?;
    criteria::distribute(&arena, &mut ctx, query)?;
    Ok((ctx.scopes, ctx.diagnostics))
}

pub(crate) fn run_through_raising(
    template: &DocumentTemplate,
    query: &DocQuery,
) -> Result<(ScopeTable, CompileDiagnostics), CompileError> {
    let config = CompileConfig::default();
    let mut catalog = order_catalog();
    let frontend = StubFrontend::default();
    let mut arena = template.arena.clone();
    let mut ctx = fresh_ctx(template, &config, &mut catalog, &frontend);

    binding::resolve(&mut arena, &mut ctx)?;
    criteria::distribute(&arena, &mut ctx, query)?;
    raising::raise(&arena, &mut ctx)?;
    Ok((ctx.scopes, ctx.diagnostics))
}

pub(crate) fn run_through_exclusion(
    template: &DocumentTemplate,
    query: &DocQuery,
) -> Result<(TemplateArena, ScopeTable), CompileError> {
    let config = CompileConfig::default();
    let mut catalog = order_catalog();
    let frontend = StubFrontend::default();
    let mut arena = template.arena.clone();
    let mut ctx = fresh_ctx(template, &config, &mut catalog, &frontend);

    binding::resolve(&mut arena, &mut ctx)?;
    criteria::distribute(&arena, &mut ctx, query)?;
    raising::raise(&arena, &mut ctx)?;
    exclusion::prune(&mut arena, &mut ctx, &query.requested)?;
    Ok((arena, ctx.scopes))
}

pub(crate) fn run_through_projection(
    template: &DocumentTemplate,
    query: &DocQuery,
) -> Result<(ScopeTable, CompileDiagnostics), CompileError> {
    let config = CompileConfig::default();
    let mut catalog = order_catalog();
    let frontend = StubFrontend::default();
    let mut arena = template.arena.clone();
    let mut ctx = fresh_ctx(template, &config, &mut catalog, &frontend);

    binding::resolve(&mut arena, &mut ctx)?;
    criteria::distribute(&arena, &mut ctx, query)?;
    raising::raise(&arena, &mut ctx)?;
    exclusion::prune(&mut arena, &mut ctx, &query.requested)?;
    projection::minimize(&arena, &mut ctx)?;
    Ok((ctx.scopes, ctx.diagnostics))
}

pub(crate) fn run_full_compile(
    template: &DocumentTemplate,
    query: &DocQuery,
) -> Result<Compilation, CompileError> {
    let config = CompileConfig::default();
    let mut catalog = order_catalog();
    let frontend = StubFrontend::default();
    compile(template, query, &mut catalog, &frontend, &config)
}

pub(crate) fn run_full_compile_with_estimate(
    template: &DocumentTemplate,
    query: &DocQuery,
    estimate: Option<u64>,
) -> Result<(Compilation, InMemoryCatalog), CompileError> {
    let config = CompileConfig::default();
    let mut catalog = order_catalog();
    let frontend = StubFrontend {
        estimate,
        ..StubFrontend::default()
    };
    let compilation = compile(template, query, &mut catalog, &frontend, &config)?;
    Ok((compilation, catalog))
}
