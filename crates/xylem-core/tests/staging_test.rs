//! Explicit and automatic staging through the public surface.

mod common;

use common::{StubFrontend, catalog, invoice_template};
use xylem_core::prelude::*;
use xylem_relational::{CompareOp, FieldRef, Value};

/// Invoice template with a declared price-lookup staging relation that
/// the items query joins against.
fn staged_invoice_template() -> DocumentTemplate {
    let mut template = invoice_template();

    let items_node = template
        .arena
        .find_by_path("invoice.item")
        .and_then(|item| template.arena.ancestors(item).first().copied())
        .expect("items scope node");
    template
        .arena
        .node_mut(items_node)
        .staging_tables
        .push("price_lookup".into());

    if let Some(info) = template.scopes.get_mut("items") {
        let join = Criteria::join(
            FieldRef::name("note"),
            CompareOp::Eq,
            FieldRef::name("price_lookup.sku"),
        );
        info.query.filter = Some(match info.query.filter.take() {
            Some(filter) => Criteria::And(vec![filter, join]),
            None => join,
        });
    }

    template.with_scope(ResultSetInfo::staging(
        "price_lookup",
        QueryAst::new("prices"),
    ))
}

#[test]
fn declared_staging_loads_at_the_bounding_scope() {
    let mut catalog = catalog();
    let frontend = StubFrontend::default();
    let config = CompileConfig::default();
    let compilation = compile(
        &staged_invoice_template(),
        &DocQuery::select_all(),
        &mut catalog,
        &frontend,
        &config,
    )
    .expect("compiles");

    let staged = &compilation.scopes["price_lookup"];
    assert!(staged.staged_table.as_deref().is_some_and(|table| table.starts_with("#stg")));
    assert_eq!(
        staged.staged_load.as_ref().map(|load| load.from.as_str()),
        Some("prices")
    );

    // The only consumer is the items scope, so the load/unload pair
    // bounds at its parent: load before the orders loop opens, unload
    // after it closes.
    let instructions = &compilation.program.instructions;
    let load = instructions
        .iter()
        .position(|i| matches!(i, Instruction::LoadStaging { scope } if scope == "price_lookup"))
        .expect("load emitted");
    let exec_orders = instructions
        .iter()
        .position(|i| matches!(i, Instruction::ExecQuery { scope } if scope == "orders"))
        .expect("orders executes");
    let close_orders = instructions
        .iter()
        .position(|i| matches!(i, Instruction::CloseBlock { scope } if scope == "orders"))
        .expect("orders closes");
    let unload = instructions
        .iter()
        .position(|i| matches!(i, Instruction::UnloadStaging { scope } if scope == "price_lookup"))
        .expect("unload emitted");

    assert!(load < exec_orders);
    assert!(close_orders < unload);
}

#[test]
fn staging_shortcut_criteria_filter_the_load() {
    let mut catalog = catalog();
    let frontend = StubFrontend::default();
    let config = CompileConfig::default();

    let query = DocQuery::select_all().with_criteria(Criteria::compare(
        "price_lookup.price",
        CompareOp::Gt,
        Value::Float(0.0),
    ));
    let compilation = compile(
        &staged_invoice_template(),
        &query,
        &mut catalog,
        &frontend,
        &config,
    )
    .expect("compiles");

    let load = compilation.scopes["price_lookup"]
        .staged_load
        .as_ref()
        .expect("load query");
    assert!(
        load.filter
            .as_ref()
            .is_some_and(|filter| filter.to_string().contains("price_lookup.price > 0"))
    );
}

#[test]
fn rejected_explicit_staging_is_fatal_and_names_the_scope() {
    let mut catalog = catalog();
    let frontend = StubFrontend {
        fail_optimize: true,
        ..StubFrontend::default()
    };
    let config = CompileConfig::default();

    let err = compile(
        &staged_invoice_template(),
        &DocQuery::select_all(),
        &mut catalog,
        &frontend,
        &config,
    )
    .expect_err("must fail");

    let message = err.to_string();
    assert!(message.contains("price_lookup"));
    assert!(message.contains("stub rejection"));
}

#[test]
fn staging_decisions_are_idempotent_across_compilations() {
    let config = CompileConfig::default();
    let template = staged_invoice_template();

    let run = || {
        let mut catalog = catalog();
        let frontend = StubFrontend {
            estimate: Some(25),
            ..StubFrontend::default()
        };
        compile(
            &template,
            &DocQuery::select_all(),
            &mut catalog,
            &frontend,
            &config,
        )
        .expect("compiles")
    };

    let first = run();
    let second = run();

    assert_eq!(
        first.scopes["price_lookup"].staged_table,
        second.scopes["price_lookup"].staged_table
    );
    assert_eq!(first.program.fingerprint(), second.program.fingerprint());
}
