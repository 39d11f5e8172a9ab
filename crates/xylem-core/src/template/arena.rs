use super::node::{NodeKind, TemplateNode};
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// NodeId
///
/// Stable arena index. Ids stay valid across subtree removal because
/// removal only detaches child links; slots are never reused within one
/// compilation.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct NodeId(u32);

impl NodeId {
    #[must_use]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

///
/// TemplateArena
///
/// Flat node storage addressed by `NodeId`. Passes take `&mut Self`
/// and mutate annotations in place; traversal always starts from the
/// root and follows child links, so detached subtrees are simply
/// unreachable.
///

#[derive(Clone, Debug)]
pub struct TemplateArena {
    nodes: Vec<TemplateNode>,
    root: NodeId,
}

impl TemplateArena {
    /// Create an arena with the given root node.
    #[must_use]
    pub fn new(root: TemplateNode) -> Self {
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &TemplateNode {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut TemplateNode {
        &mut self.nodes[id.index()]
    }

    /// Append a child under `parent`, returning the new node's id.
    pub fn add_child(&mut self, parent: NodeId, mut node: TemplateNode) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        node.parent = Some(parent);
        self.nodes.push(node);
        self.nodes[parent.index()].children.push(id);
        id
    }

    /// Detach `id` from its parent. The subtree stays in storage but is
    /// no longer reachable from the root.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.index()].parent {
            self.nodes[parent.index()]
                .children
                .retain(|child| *child != id);
        }
        self.nodes[id.index()].parent = None;
    }

    /// Preorder walk of the whole reachable tree, in template order.
    #[must_use]
    pub fn walk(&self) -> Vec<NodeId> {
        self.walk_from(self.root)
    }

    /// Preorder walk of the subtree rooted at `id`.
    #[must_use]
    pub fn walk_from(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            // Reverse push keeps left-to-right template order.
            for child in self.node(current).children.iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// Ancestors of `id`, nearest first, excluding `id` itself.
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.node(id).parent;
        while let Some(ancestor) = current {
            out.push(ancestor);
            current = self.node(ancestor).parent;
        }
        out
    }

    /// Nearest enclosing source node, including `id` itself.
    #[must_use]
    pub fn enclosing_scope(&self, id: NodeId) -> Option<NodeId> {
        if self.node(id).is_scope() {
            return Some(id);
        }
        self.enclosing_scope_above(id)
    }

    /// Nearest source node strictly above `id`.
    #[must_use]
    pub fn enclosing_scope_above(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id)
            .into_iter()
            .find(|ancestor| self.node(*ancestor).is_scope())
    }

    /// True when `id` is still reachable from the root.
    #[must_use]
    pub fn is_attached(&self, id: NodeId) -> bool {
        id == self.root || {
            let mut current = self.node(id).parent;
            while let Some(ancestor) = current {
                if ancestor == self.root {
                    return true;
                }
                current = self.node(ancestor).parent;
            }
            false
        }
    }

    /// Slash-joined label path from the root, for error reporting.
    #[must_use]
    pub fn path_of(&self, id: NodeId) -> String {
        let mut labels: Vec<String> = self
            .ancestors(id)
            .into_iter()
            .rev()
            .map(|ancestor| self.node(ancestor).label())
            .collect();
        labels.push(self.node(id).label());
        labels.join("/")
    }

    /// Find the node matching a dotted requested-field path. Structural
    /// nodes (sequence, choice, source, ...) are transparent; element
    /// tags and attribute names are the path segments.
    #[must_use]
    pub fn find_by_path(&self, path: &str) -> Option<NodeId> {
        let segments: Vec<&str> = path.split('.').collect();
        self.find_segments(self.root, &segments)
    }

    fn find_segments(&self, id: NodeId, segments: &[&str]) -> Option<NodeId> {
        let node = self.node(id);
        match node.path_segment() {
            Some(segment) => {
                let (first, rest) = segments.split_first()?;
                if segment != *first {
                    return None;
                }
                if rest.is_empty() {
                    return Some(id);
                }
                self.find_in_children(id, rest)
            }
            None => self.find_in_children(id, segments),
        }
    }

    fn find_in_children(&self, id: NodeId, segments: &[&str]) -> Option<NodeId> {
        self.node(id)
            .children
            .iter()
            .find_map(|child| self.find_segments(*child, segments))
    }

    /// Whether any ancestor of `id` (inclusive) is a recursive element.
    #[must_use]
    pub fn under_recursive(&self, id: NodeId) -> bool {
        if matches!(self.node(id).kind, NodeKind::Recursive { .. }) {
            return true;
        }
        self.ancestors(id)
            .into_iter()
            .any(|ancestor| matches!(self.node(ancestor).kind, NodeKind::Recursive { .. }))
    }
}

///
/// TESTS
///
