//! Deterministic, read-only explanation of programs; must not execute.

use super::{Program, RecursionGroupDef};
use crate::template::OverflowPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// ExplainGroup
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ExplainGroup {
    pub depth_limit: u32,
    pub on_overflow: String,
    pub stop: Option<String>,
    pub steps: Vec<String>,
}

///
/// ExplainProgram
///
/// Stable textual projection of a `Program`. Equivalent programs
/// explain identically; the fingerprint hashes this projection.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ExplainProgram {
    pub steps: Vec<String>,
    pub groups: BTreeMap<u32, ExplainGroup>,
}

pub(super) fn explain(program: &Program) -> ExplainProgram {
    let steps = program
        .instructions
        .iter()
        .map(ToString::to_string)
        .collect();

    let groups = program
        .groups
        .iter()
        .map(|(id, def)| (id.0, explain_group(def)))
        .collect();

    ExplainProgram { steps, groups }
}

fn explain_group(def: &RecursionGroupDef) -> ExplainGroup {
    let on_overflow = match def.on_overflow {
        OverflowPolicy::Truncate => "truncate".to_string(),
        OverflowPolicy::Fail => "fail".to_string(),
    };

    ExplainGroup {
        depth_limit: def.depth_limit,
        on_overflow,
        stop: def.stop.as_ref().map(ToString::to_string),
        steps: def.body.iter().map(ToString::to_string).collect(),
    }
}
