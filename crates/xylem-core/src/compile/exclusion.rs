//! Exclusion: when the caller requests a subset of the document, mark
//! everything else excluded and remove it from the tree.

use super::PassContext;
use crate::{
    diagnostics::{CompilePhase, CompileTraceEvent},
    error::CompileError,
    query::RequestedFields,
    template::{NodeId, NodeKind, TemplateArena},
};
use std::collections::BTreeSet;
use thiserror::Error as ThisError;

///
/// ExclusionError
///

#[derive(Debug, ThisError)]
pub enum ExclusionError {
    #[error("requested path '{path}' does not match any template node")]
    UnknownRequestedPath { path: String },
}

pub(crate) fn prune(
    arena: &mut TemplateArena,
    ctx: &mut PassContext<'_>,
    requested: &RequestedFields,
) -> Result<(), CompileError> {
    if let RequestedFields::Named(paths) = requested {
        let keep = mark_keep(arena, paths)?;
        sweep(arena, &keep);
        prune_scope_table(arena, ctx);
    }

    ctx.diagnostics.push(CompileTraceEvent::PhaseFinished {
        phase: CompilePhase::Exclusion,
    });

    Ok(())
}

/// Requested nodes keep their subtrees; keeping propagates to
/// ancestors, to mandatory attributes of kept elements, and to all
/// branches of a kept choice with no kept branch.
fn mark_keep(
    arena: &TemplateArena,
    paths: &[String],
) -> Result<BTreeSet<NodeId>, CompileError> {
    let mut keep = BTreeSet::new();

    for path in paths {
        let Some(node) = arena.find_by_path(path) else {
            return Err(ExclusionError::UnknownRequestedPath { path: path.clone() }.into());
        };
        keep.extend(arena.walk_from(node));
        keep.extend(arena.ancestors(node));
    }

    // Force-keep rules can cascade (a forced attribute may sit under a
    // forced choice branch), so iterate to a fixpoint.
    loop {
        let mut grew = false;

        for id in arena.walk() {
            if !keep.contains(&id) {
                continue;
            }
            let node = arena.node(id);

            match &node.kind {
                NodeKind::Element { .. } | NodeKind::Recursive { .. } => {
                    for child in &node.children {
                        let child_node = arena.node(*child);
                        let mandatory = matches!(child_node.kind, NodeKind::Attribute { .. })
                            && child_node.min_occurs >= 1;
                        if mandatory && keep.insert(*child) {
                            grew = true;
                        }
                    }
                }
                NodeKind::Choice { .. } => {
                    let any_kept = node.children.iter().any(|child| keep.contains(child));
                    if !any_kept {
                        for child in &node.children {
                            for kept in arena.walk_from(*child) {
                                if keep.insert(kept) {
                                    grew = true;
                                }
                            }
                        }
                    }
                }
                NodeKind::Attribute { .. }
                | NodeKind::Comment { .. }
                | NodeKind::Sequence
                | NodeKind::All
                | NodeKind::Scope { .. } => {}
            }
        }

        if !grew {
            break;
        }
    }

    Ok(keep)
}

/// Mark and detach excluded subtrees. Children of a recursive element
/// are never deleted; recursion depth is a runtime concern, not a shape
/// concern.
fn sweep(arena: &mut TemplateArena, keep: &BTreeSet<NodeId>) {
    let all = arena.walk();

    for id in &all {
        let spared = keep.contains(id) || arena.under_recursive(*id);
        arena.node_mut(*id).excluded = !spared;
    }

    // Detach only the top-most excluded nodes; their subtrees go with
    // them.
    for id in all {
        let node = arena.node(id);
        if !node.excluded {
            continue;
        }
        let parent_excluded = node
            .parent
            .is_some_and(|parent| arena.node(parent).excluded);
        if !parent_excluded {
            arena.detach(id);
        }
    }
}

/// Drop side-table entries for scopes whose source node went away.
fn prune_scope_table(arena: &TemplateArena, ctx: &mut PassContext<'_>) {
    let detached: Vec<String> = ctx
        .scope_nodes
        .iter()
        .filter(|(_, node)| !arena.is_attached(**node))
        .map(|(scope, _)| scope.clone())
        .collect();

    for scope in detached {
        ctx.scope_nodes.remove(&scope);
        ctx.scopes.remove(&scope);
    }
}

///
/// TESTS
///
