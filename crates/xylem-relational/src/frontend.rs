//! Relational front-end contract: parse, resolve, rewrite, optimize.
//!
//! The front-end is an external collaborator. The compiler only needs
//! the four pipeline stages and a cardinality estimate on the optimized
//! plan's root; everything else about the engine is opaque.

use crate::{catalog::Catalog, query::QueryAst};
use thiserror::Error as ThisError;

///
/// FrontendError
///

#[derive(Debug, ThisError)]
pub enum FrontendError {
    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("resolve error: {message}")]
    Resolve { message: String },

    #[error("planning error: {message}")]
    Plan { message: String },
}

///
/// RelationalPlan
///
/// Opaque handle to an optimized plan. The compiler reads only the
/// root cardinality estimate.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RelationalPlan {
    estimated_rows: Option<u64>,
}

impl RelationalPlan {
    #[must_use]
    pub const fn new(estimated_rows: Option<u64>) -> Self {
        Self { estimated_rows }
    }

    /// Estimated root cardinality, when the optimizer knows one.
    #[must_use]
    pub const fn estimated_rows(&self) -> Option<u64> {
        self.estimated_rows
    }
}

///
/// RelationalFrontend
///
/// Synchronous pipeline boundary. Each stage is fallible except
/// `rewrite`, which is semantics-preserving by contract.
///

pub trait RelationalFrontend {
    /// Parse query text into a single-block AST.
    fn parse(&self, text: &str) -> Result<QueryAst, FrontendError>;

    /// Resolve names and types against the catalog.
    fn resolve(&self, ast: QueryAst, catalog: &dyn Catalog) -> Result<QueryAst, FrontendError>;

    /// Apply semantics-preserving rewrites.
    fn rewrite(&self, ast: QueryAst, catalog: &dyn Catalog) -> QueryAst;

    /// Produce an optimized, executable plan with a cardinality
    /// estimate at its root.
    fn optimize(&self, ast: &QueryAst, catalog: &dyn Catalog)
    -> Result<RelationalPlan, FrontendError>;
}
