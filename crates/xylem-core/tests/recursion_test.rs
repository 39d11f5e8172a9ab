//! Recursion groups: first occurrence defines the bounded sub-program,
//! later occurrences recurse into it.

mod common;

use common::{StubFrontend, catalog, org_chart_template};
use xylem_core::prelude::*;
use xylem_core::template::{OverflowPolicy, RecursionGroupId};

fn compile_org_chart(depth_limit: u32, on_overflow: OverflowPolicy) -> xylem_core::compile::Compilation {
    let mut catalog = catalog();
    let frontend = StubFrontend::default();
    let config = CompileConfig::default();
    compile(
        &org_chart_template(depth_limit, on_overflow),
        &DocQuery::select_all(),
        &mut catalog,
        &frontend,
        &config,
    )
    .expect("compiles")
}

#[test]
fn first_occurrence_defines_group_later_occurrences_recurse() {
    let compilation = compile_org_chart(3, OverflowPolicy::Truncate);
    let group = RecursionGroupId(1);

    // The main program enters the group exactly once.
    let calls = compilation
        .program
        .instructions
        .iter()
        .filter(|instruction| matches!(instruction, Instruction::CallGroup { group: g } if *g == group))
        .count();
    assert_eq!(calls, 1);
    assert!(
        !compilation
            .program
            .instructions
            .iter()
            .any(|instruction| matches!(instruction, Instruction::Recurse { .. }))
    );

    // The recursion point lives inside the group body.
    let def = &compilation.program.groups[&group];
    assert!(
        def.body
            .iter()
            .any(|instruction| matches!(instruction, Instruction::Recurse { group: g } if *g == group))
    );
}

#[test]
fn depth_limit_and_overflow_policy_are_compiled_in() {
    let truncate = compile_org_chart(3, OverflowPolicy::Truncate);
    let def = &truncate.program.groups[&RecursionGroupId(1)];
    assert_eq!(def.depth_limit, 3);
    assert_eq!(def.on_overflow, OverflowPolicy::Truncate);

    let fail = compile_org_chart(3, OverflowPolicy::Fail);
    let def = &fail.program.groups[&RecursionGroupId(1)];
    assert_eq!(def.on_overflow, OverflowPolicy::Fail);
}

#[test]
fn group_body_emits_the_recursive_element_tag() {
    let compilation = compile_org_chart(2, OverflowPolicy::Truncate);
    let def = &compilation.program.groups[&RecursionGroupId(1)];

    // Each recursion level re-emits the element and its mandatory
    // attribute, so bounded data nests one tag per level.
    assert!(matches!(
        &def.body[0],
        Instruction::AddTag { tag, .. } if tag.name == "employee"
    ));
    assert!(
        def.body
            .iter()
            .any(|instruction| matches!(instruction, Instruction::AddTag { tag, .. } if tag.name == "name"))
    );
}

#[test]
fn recursive_children_survive_field_exclusion() {
    let mut catalog = catalog();
    let frontend = StubFrontend::default();
    let config = CompileConfig::default();

    // Requesting only the name attribute must not delete the recursion
    // point; depth is a runtime concern, not a shape concern.
    let query = DocQuery::select_all().with_requested(vec!["employee.name".into()]);
    let compilation = compile(
        &org_chart_template(3, OverflowPolicy::Truncate),
        &query,
        &mut catalog,
        &frontend,
        &config,
    )
    .expect("compiles");

    let def = &compilation.program.groups[&RecursionGroupId(1)];
    assert!(
        def.body
            .iter()
            .any(|instruction| matches!(instruction, Instruction::Recurse { .. }))
    );
}
