//! Document template tree: node kinds, the arena they live in, and the
//! template handle cloned per compilation.

mod arena;
mod node;

pub use arena::{NodeId, TemplateArena};
pub use node::{NodeKind, Occurs, OverflowPolicy, RecursionGroupId, TemplateNode};

use crate::scope::ResultSetInfo;
use std::collections::BTreeMap;

///
/// DocumentTemplate
///
/// The immutable-shape template built once from a stored document
/// description. Compilations deep-clone it, so concurrent compilations
/// never share mutable tree state.
///

#[derive(Clone, Debug)]
pub struct DocumentTemplate {
    pub arena: TemplateArena,
    pub scopes: BTreeMap<String, ResultSetInfo>,
}

impl DocumentTemplate {
    #[must_use]
    pub const fn new(arena: TemplateArena) -> Self {
        Self {
            arena,
            scopes: BTreeMap::new(),
        }
    }

    /// Register the relational binding for a scope name used by a
    /// `NodeKind::Scope` node or a staging declaration.
    #[must_use]
    pub fn with_scope(mut self, info: ResultSetInfo) -> Self {
        self.scopes.insert(info.name.clone(), info);
        self
    }
}
