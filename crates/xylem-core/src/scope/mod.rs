//! Per-scope planning state: the `ResultSetInfo` side table mutated by
//! every pass.

use std::collections::{BTreeMap, BTreeSet};
use xylem_relational::{ColumnRef, Criteria, OrderSpec, QueryAst, and_combine};

///
/// RowLimit
///
/// Runtime row cap recorded from a row-limit pseudo-predicate.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RowLimit {
    pub max: u32,
    pub error_on_exceed: bool,
}

///
/// ScopeKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScopeKind {
    /// A source node in the document tree.
    Document,
    /// A staging relation declared on a node, materialized ahead of the
    /// document walk.
    Staging,
}

///
/// Binding
///
/// A resolved correlated parameter: `param` in the scope's query is
/// bound per-row from `source_scope`'s `source_column`.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Binding {
    pub param: String,
    pub source_scope: String,
    pub source_column: ColumnRef,
}

///
/// ResultSetInfo
///
/// The planning record for one scope. Created from the template's
/// declarations, then accumulated into by the passes: symbols and
/// bindings (binding resolution), criteria/order/limits (distribution),
/// raising flags and join criteria (raising), projection (minimizer),
/// staging results (staging planner).
///

#[derive(Clone, Debug)]
pub struct ResultSetInfo {
    pub name: String,
    pub kind: ScopeKind,
    /// Set when this scope is a fresh alias of a reused fragment.
    pub alias_of: Option<String>,
    pub query: QueryAst,
    /// Accumulated user criteria assigned to this scope.
    pub criteria: Option<Criteria>,
    pub order_by: Option<OrderSpec>,
    pub row_limit: Option<RowLimit>,
    /// Document-local field name -> resolved column. Keys are unique
    /// within the scope.
    pub symbols: BTreeMap<String, ColumnRef>,
    pub bindings: Vec<Binding>,
    /// Scopes this one correlates against (binding sources).
    pub correlated: BTreeSet<String>,
    /// Descendant scopes touched by criteria placed here; they must be
    /// joinable for the placement to be executable.
    pub touched_descendants: BTreeSet<String>,
    /// Binding conjuncts rewritten into join predicates by raising.
    pub join_criteria: Option<Criteria>,
    pub input_set_raised: bool,
    pub criteria_raised: bool,
    pub auto_staged: bool,
    /// Excluded from staging by declaration.
    pub no_cache: bool,
    pub staged_table: Option<String>,
    /// The load command materializing `staged_table`, once staged.
    pub staged_load: Option<QueryAst>,
}

impl ResultSetInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, query: QueryAst, kind: ScopeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            alias_of: None,
            query,
            criteria: None,
            order_by: None,
            row_limit: None,
            symbols: BTreeMap::new(),
            bindings: Vec::new(),
            correlated: BTreeSet::new(),
            touched_descendants: BTreeSet::new(),
            join_criteria: None,
            input_set_raised: false,
            criteria_raised: false,
            auto_staged: false,
            no_cache: false,
            staged_table: None,
            staged_load: None,
        }
    }

    #[must_use]
    pub fn document(name: impl Into<String>, query: QueryAst) -> Self {
        Self::new(name, query, ScopeKind::Document)
    }

    #[must_use]
    pub fn staging(name: impl Into<String>, query: QueryAst) -> Self {
        Self::new(name, query, ScopeKind::Staging)
    }

    #[must_use]
    pub fn no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }

    /// AND a conjunct into the accumulated criteria.
    pub fn add_criteria(&mut self, conjunct: Criteria) {
        self.criteria = Some(and_combine(self.criteria.take(), conjunct));
    }

    /// Resolved binding for a placeholder name.
    #[must_use]
    pub fn binding(&self, param: &str) -> Option<&Binding> {
        self.bindings.iter().find(|binding| binding.param == param)
    }

    #[must_use]
    pub const fn is_aliased(&self) -> bool {
        self.alias_of.is_some()
    }

    /// The relation label this scope's columns are homed on: the staged
    /// table once staged, the scope name for aliased and staging scopes
    /// (both are addressed by name), otherwise the source relation.
    #[must_use]
    pub fn relation_label(&self) -> &str {
        if let Some(staged) = &self.staged_table {
            staged
        } else if self.alias_of.is_some() || self.kind == ScopeKind::Staging {
            &self.name
        } else {
            &self.query.from
        }
    }
}

///
/// TESTS
///
