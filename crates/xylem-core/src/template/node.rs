use super::NodeId;
use crate::DEFAULT_RECURSION_LIMIT;
use serde::{Deserialize, Serialize};
use xylem_relational::{ColumnRef, Criteria};

///
/// RecursionGroupId
///
/// Ties every occurrence of one recursive fragment together. The first
/// occurrence defines the group's body; later occurrences recurse into
/// it.
///

#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    derive_more::Display,
)]
pub struct RecursionGroupId(pub u32);

///
/// OverflowPolicy
/// What happens when recursion reaches its depth limit.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum OverflowPolicy {
    /// Stop descending; no error.
    Truncate,
    /// Abort document production.
    Fail,
}

///
/// Occurs
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Occurs {
    Bounded(u32),
    Unbounded,
}

///
/// NodeKind
///
/// Closed sum of template node kinds. Every pass matches exhaustively,
/// so adding a kind is a compile error until each pass handles it.
///

#[derive(Clone, Debug)]
pub enum NodeKind {
    Element {
        tag: String,
    },
    Attribute {
        name: String,
    },
    Comment {
        text: String,
    },
    /// Ordered criteria branches; children carry `when` criteria, a
    /// child without one is the default.
    Choice {
        abort_on_no_match: bool,
    },
    Sequence,
    All,
    /// Boundary of a relational binding (a "source node").
    Scope {
        scope: String,
    },
    /// Recursive element; re-enters its group's body up to the depth
    /// limit.
    Recursive {
        tag: String,
        group: RecursionGroupId,
        depth_limit: u32,
        on_overflow: OverflowPolicy,
        stop: Option<Criteria>,
    },
}

///
/// TemplateNode
///
/// One arena slot. Parent/children are arena indices; annotations are
/// mutated in place by the passes.
///

#[derive(Clone, Debug)]
pub struct TemplateNode {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub excluded: bool,
    /// Document-local field name bound to this node's content, resolved
    /// by the binding pass into `resolved`.
    pub name_in_source: Option<String>,
    /// Staging relations declared at this node.
    pub staging_tables: Vec<String>,
    pub min_occurs: u32,
    pub max_occurs: Occurs,
    /// Branch criteria when the parent is a `Choice`.
    pub when: Option<Criteria>,
    /// Typed column reference filled in by binding resolution.
    pub resolved: Option<ColumnRef>,
}

impl TemplateNode {
    #[must_use]
    pub const fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            excluded: false,
            name_in_source: None,
            staging_tables: Vec::new(),
            min_occurs: 1,
            max_occurs: Occurs::Bounded(1),
            when: None,
            resolved: None,
        }
    }

    #[must_use]
    pub fn element(tag: impl Into<String>) -> Self {
        Self::new(NodeKind::Element { tag: tag.into() })
    }

    #[must_use]
    pub fn attribute(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Attribute { name: name.into() })
    }

    #[must_use]
    pub fn comment(text: impl Into<String>) -> Self {
        Self::new(NodeKind::Comment { text: text.into() })
    }

    #[must_use]
    pub fn scope(scope: impl Into<String>) -> Self {
        Self::new(NodeKind::Scope {
            scope: scope.into(),
        })
    }

    #[must_use]
    pub fn recursive(tag: impl Into<String>, group: RecursionGroupId) -> Self {
        Self::new(NodeKind::Recursive {
            tag: tag.into(),
            group,
            depth_limit: DEFAULT_RECURSION_LIMIT,
            on_overflow: OverflowPolicy::Truncate,
            stop: None,
        })
    }

    #[must_use]
    pub fn bound_to(mut self, field: impl Into<String>) -> Self {
        self.name_in_source = Some(field.into());
        self
    }

    #[must_use]
    pub fn when(mut self, criteria: Criteria) -> Self {
        self.when = Some(criteria);
        self
    }

    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.min_occurs = 0;
        self
    }

    #[must_use]
    pub const fn is_scope(&self) -> bool {
        matches!(self.kind, NodeKind::Scope { .. })
    }

    /// Scope name when this node is a source node.
    #[must_use]
    pub fn scope_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Scope { scope } => Some(scope),
            _ => None,
        }
    }

    /// Label used in error paths and explain output.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.kind {
            NodeKind::Element { tag } => tag.clone(),
            NodeKind::Attribute { name } => format!("@{name}"),
            NodeKind::Comment { .. } => "#comment".into(),
            NodeKind::Choice { .. } => "#choice".into(),
            NodeKind::Sequence => "#sequence".into(),
            NodeKind::All => "#all".into(),
            NodeKind::Scope { scope } => format!("#source({scope})"),
            NodeKind::Recursive { tag, .. } => format!("{tag}*"),
        }
    }

    /// Name segment this node contributes to a requested-field path;
    /// structural nodes are transparent.
    #[must_use]
    pub fn path_segment(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { tag } | NodeKind::Recursive { tag, .. } => Some(tag),
            NodeKind::Attribute { name } => Some(name),
            NodeKind::Comment { .. }
            | NodeKind::Choice { .. }
            | NodeKind::Sequence
            | NodeKind::All
            | NodeKind::Scope { .. } => None,
        }
    }
}
