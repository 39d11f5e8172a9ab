//! Xylem core: compiles hierarchical document templates bound to
//! relational queries into flat, executable instruction programs.
//!
//! The pipeline is a fixed sequence of passes over a per-compilation
//! clone of the template tree: binding resolution, criteria
//! distribution, correlation raising, exclusion, projection
//! minimization, staging, and program lowering. See `compile`.
#![warn(unreachable_pub)]

pub use xylem_relational as relational;

pub mod compile;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod program;
pub mod query;
pub mod scope;
pub mod template;

#[cfg(test)]
pub(crate) mod test_support;

///
/// CONSTANTS
///

/// Default depth bound for recursive template elements when the
/// template does not declare one.
pub const DEFAULT_RECURSION_LIMIT: u32 = 10;

///
/// Prelude
///
/// Domain vocabulary only; no errors, passes, or builders.
///

pub mod prelude {
    pub use crate::{
        compile::{Compilation, CompiledScope, compile},
        config::CompileConfig,
        program::{Instruction, Program},
        query::{DocQuery, RequestedFields},
        scope::ResultSetInfo,
        template::{DocumentTemplate, NodeKind, TemplateArena, TemplateNode},
    };
    pub use xylem_relational::{
        Catalog, ColumnRef, Criteria, FieldType, InMemoryCatalog, QueryAst, RelationalFrontend,
        Value,
    };
}
