//! Shared fixtures for integration tests: a small catalog, a stub
//! relational front-end, and canonical templates.

use xylem_core::prelude::*;
use xylem_core::template::{NodeKind, RecursionGroupId};
use xylem_relational::{BindingParam, CompareOp, FieldType, FrontendError, RelationalPlan, Value};

///
/// StubFrontend
///

#[derive(Debug, Default)]
pub struct StubFrontend {
    pub estimate: Option<u64>,
    pub fail_optimize: bool,
}

impl RelationalFrontend for StubFrontend {
    fn parse(&self, text: &str) -> Result<QueryAst, FrontendError> {
        Ok(QueryAst::new(text))
    }

    fn resolve(
        &self,
        ast: QueryAst,
        _catalog: &dyn xylem_relational::Catalog,
    ) -> Result<QueryAst, FrontendError> {
        Ok(ast)
    }

    fn rewrite(&self, ast: QueryAst, _catalog: &dyn xylem_relational::Catalog) -> QueryAst {
        ast
    }

    fn optimize(
        &self,
        _ast: &QueryAst,
        _catalog: &dyn xylem_relational::Catalog,
    ) -> Result<RelationalPlan, FrontendError> {
        if self.fail_optimize {
            return Err(FrontendError::Plan {
                message: "stub rejection".into(),
            });
        }
        Ok(RelationalPlan::new(self.estimate))
    }
}

pub fn catalog() -> InMemoryCatalog {
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
        .with_relation(
            "prices",
            &[("sku", FieldType::Text), ("price", FieldType::Float)],
        )
        .with_relation(
            "staff",
            &[
                ("id", FieldType::Int),
                ("name", FieldType::Text),
                ("manager_id", FieldType::Int),
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

/// Orders wrapping correlated line items; see the unit fixtures for the
/// same shape.
pub fn invoice_template() -> DocumentTemplate {
    let mut arena = TemplateArena::new(TemplateNode::scope("orders"));
    let root = arena.root();
    let invoice = arena.add_child(root, TemplateNode::element("invoice"));
    arena.add_child(
        invoice,
        TemplateNode::element("customer").bound_to("customer"),
    );
    let items = arena.add_child(invoice, TemplateNode::scope("items"));
    let item = arena.add_child(items, TemplateNode::element("item"));
    arena.add_child(item, TemplateNode::attribute("id").bound_to("id"));
    arena.add_child(item, TemplateNode::element("qty").bound_to("qty"));
    arena.add_child(
        item,
        TemplateNode::element("note").bound_to("note").optional(),
    );

    DocumentTemplate::new(arena)
        .with_scope(ResultSetInfo::document("orders", QueryAst::new("orders")))
        .with_scope(ResultSetInfo::document("items", items_query()))
}

/// One product fragment reused by two sibling choice branches; binding
/// resolution must give the second branch a fresh aliased scope.
pub fn reused_fragment_template() -> DocumentTemplate {
    let mut arena = TemplateArena::new(TemplateNode::scope("orders"));
    let root = arena.root();
    let order = arena.add_child(root, TemplateNode::element("order"));
    let choice = arena.add_child(
        order,
        TemplateNode::new(NodeKind::Choice {
            abort_on_no_match: false,
        }),
    );

    for (branch, region) in [("domestic", "us"), ("overseas", "intl")] {
        let wrapper = arena.add_child(
            choice,
            TemplateNode::element(branch)
                .when(Criteria::eq("region", Value::Text(region.into()))),
        );
        let scope = arena.add_child(wrapper, TemplateNode::scope("items"));
        let item = arena.add_child(scope, TemplateNode::element("item"));
        arena.add_child(item, TemplateNode::element("qty").bound_to("qty"));
    }

    DocumentTemplate::new(arena)
        .with_scope(ResultSetInfo::document("orders", QueryAst::new("orders")))
        .with_scope(ResultSetInfo::document("items", items_query()))
}

/// Staff hierarchy with a self-recursive report element.
pub fn org_chart_template(depth_limit: u32, on_overflow: OverflowPolicy) -> DocumentTemplate {
    let group = RecursionGroupId(1);
    let mut arena = TemplateArena::new(TemplateNode::scope("staff"));
    let root = arena.root();

    let mut employee = TemplateNode::recursive("employee", group);
    if let NodeKind::Recursive {
        depth_limit: limit,
        on_overflow: policy,
        ..
    } = &mut employee.kind
    {
        *limit = depth_limit;
        *policy = on_overflow;
    }
    let employee = arena.add_child(root, employee);
    arena.add_child(employee, TemplateNode::attribute("name").bound_to("name"));
    // The recursion point: reports nest employees of the same group.
    let reports = arena.add_child(employee, TemplateNode::element("reports"));
    arena.add_child(reports, TemplateNode::recursive("employee", group));

    DocumentTemplate::new(arena)
        .with_scope(ResultSetInfo::document("staff", QueryAst::new("staff")))
}

pub use xylem_core::template::OverflowPolicy;

pub fn compile_invoice(query: &DocQuery) -> xylem_core::compile::Compilation {
    let mut catalog = catalog();
    let frontend = StubFrontend::default();
    let config = CompileConfig::default();
    compile(&invoice_template(), query, &mut catalog, &frontend, &config)
        .expect("invoice compiles")
}

/// Tag names emitted by the main program, in emission order.
pub fn emitted_tags(program: &Program) -> Vec<String> {
    program
        .instructions
        .iter()
        .filter_map(|instruction| match instruction {
            Instruction::AddTag { tag, .. } => Some(tag.name.clone()),
            _ => None,
        })
        .collect()
}
