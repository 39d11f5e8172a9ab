//! Program lowering: walk the fully planned tree and emit the flat
//! instruction sequence, with loops for scopes, branch chains for
//! choices, and bounded sub-programs for recursion groups.

use super::{DOC_BOUNDARY, PassContext};
use crate::{
    diagnostics::{CompilePhase, CompileTraceEvent},
    error::CompileError,
    program::{Instruction, Program, ProgramBuilder, RecursionGroupDef, TagSpec},
    template::{NodeId, NodeKind, RecursionGroupId, TemplateArena},
};
use std::collections::{BTreeMap, BTreeSet};
use std::mem;
use thiserror::Error as ThisError;

///
/// ProgramError
///

#[derive(Debug, ThisError)]
pub enum ProgramError {
    #[error(
        "scope '{scope}' binds to '{source_scope}', which is not on its lexical ancestor chain (non-simple relationship)"
    )]
    NonSimpleRelationship { scope: String, source_scope: String },

    #[error("choice at {path} has multiple default branches")]
    MultipleDefaultBranches { path: String },

    #[error("source node at {path} references unknown scope '{scope}'")]
    UnknownScope { scope: String, path: String },
}

pub(crate) fn lower(
    arena: &TemplateArena,
    ctx: &mut PassContext<'_>,
) -> Result<Program, CompileError> {
    let mut lowering = Lowering {
        arena,
        ctx,
        current: ProgramBuilder::new(),
        suspended: Vec::new(),
        groups: BTreeMap::new(),
        in_progress: BTreeSet::new(),
    };

    lowering.current.emit(Instruction::InitDocument);
    lowering.emit_loads(DOC_BOUNDARY);
    lowering.compile_node(arena.root())?;
    lowering.emit_unloads(DOC_BOUNDARY);
    lowering.current.emit(Instruction::EndDocument);

    let program = Program {
        instructions: lowering.current.into_instructions(),
        groups: lowering.groups,
    };

    ctx.diagnostics.push(CompileTraceEvent::PhaseFinished {
        phase: CompilePhase::Program,
    });

    Ok(program)
}

///
/// Lowering
///
/// Walk state: the active builder plus an explicit stack of suspended
/// builders, one per recursion-group body being compiled.
///

struct Lowering<'a, 'b> {
    arena: &'a TemplateArena,
    ctx: &'a PassContext<'b>,
    current: ProgramBuilder,
    suspended: Vec<ProgramBuilder>,
    groups: BTreeMap<RecursionGroupId, RecursionGroupDef>,
    in_progress: BTreeSet<RecursionGroupId>,
}

impl Lowering<'_, '_> {
    fn compile_node(&mut self, id: NodeId) -> Result<(), CompileError> {
        let node = self.arena.node(id);
        if node.excluded {
            return Ok(());
        }

        match node.kind.clone() {
            NodeKind::Element { tag } => {
                self.current.emit(Instruction::AddTag {
                    tag: TagSpec::element(tag),
                    bound: node.resolved.clone(),
                });
                self.compile_children(id)?;
            }
            NodeKind::Attribute { name } => {
                self.current.emit(Instruction::AddTag {
                    tag: TagSpec::attribute(name),
                    bound: node.resolved.clone(),
                });
            }
            NodeKind::Comment { text } => {
                self.current.emit(Instruction::AddComment { text });
            }
            NodeKind::Sequence | NodeKind::All => {
                for child in node.children.clone() {
                    self.compile_node(child)?;
                }
            }
            NodeKind::Choice { abort_on_no_match } => {
                self.compile_choice(id, abort_on_no_match)?;
            }
            NodeKind::Scope { scope } => {
                self.compile_scope(id, &scope)?;
            }
            NodeKind::Recursive {
                tag,
                group,
                depth_limit,
                on_overflow,
                stop,
            } => {
                self.compile_recursive(id, &tag, group, depth_limit, on_overflow, stop)?;
            }
        }

        Ok(())
    }

    fn compile_children(&mut self, id: NodeId) -> Result<(), CompileError> {
        let children = self.arena.node(id).children.clone();
        if children.is_empty() {
            return Ok(());
        }

        self.current.emit(Instruction::MoveDown);
        for child in children {
            self.compile_node(child)?;
        }
        self.current.emit(Instruction::MoveUp);

        Ok(())
    }

    /// Scope lowering: staging loads at this boundary, then open query,
    /// open block, fetch the first row, loop the child program while
    /// rows remain, close, and unload.
    fn compile_scope(&mut self, id: NodeId, scope: &str) -> Result<(), CompileError> {
        let Some(info) = self.ctx.scopes.get(scope) else {
            return Err(ProgramError::UnknownScope {
                scope: scope.to_string(),
                path: self.arena.path_of(id),
            }
            .into());
        };

        // A correlated predicate must bind only to the current lexical
        // ancestor chain; anything else cannot execute.
        let chain = self.ctx.scope_chain(self.arena, scope);
        for binding in &info.bindings {
            if !chain.contains(&binding.source_scope) {
                return Err(ProgramError::NonSimpleRelationship {
                    scope: scope.to_string(),
                    source_scope: binding.source_scope.clone(),
                }
                .into());
            }
        }

        self.emit_loads(scope);

        self.current.emit(Instruction::ExecQuery {
            scope: scope.to_string(),
        });
        self.current.emit(Instruction::OpenBlock {
            scope: scope.to_string(),
        });
        self.current.emit(Instruction::FetchNext {
            scope: scope.to_string(),
        });

        let head = self.current.emit(Instruction::WhileHasRows {
            scope: scope.to_string(),
            exit: 0,
        });
        for child in self.arena.node(id).children.clone() {
            self.compile_node(child)?;
        }
        self.current.emit(Instruction::FetchNext {
            scope: scope.to_string(),
        });
        self.current.emit(Instruction::Jump { target: head });
        let exit = self.current.next_index();
        self.current.patch_while_exit(head, exit);

        self.current.emit(Instruction::CloseBlock {
            scope: scope.to_string(),
        });

        self.emit_unloads(scope);

        Ok(())
    }

    /// Choice lowering: a branch chain in template order, default branch
    /// last, or an abort when exhaustiveness is required.
    fn compile_choice(&mut self, id: NodeId, abort_on_no_match: bool) -> Result<(), CompileError> {
        let children = self.arena.node(id).children.clone();
        let mut default: Option<NodeId> = None;
        let mut branches: Vec<(NodeId, xylem_relational::Criteria)> = Vec::new();

        for child in children {
            match self.arena.node(child).when.clone() {
                Some(condition) => branches.push((child, condition)),
                None if default.is_some() => {
                    return Err(ProgramError::MultipleDefaultBranches {
                        path: self.arena.path_of(id),
                    }
                    .into());
                }
                None => default = Some(child),
            }
        }

        let mut exits = Vec::new();
        for (child, condition) in branches {
            let branch = self.current.emit(Instruction::Branch {
                condition,
                on_false: 0,
            });
            self.compile_node(child)?;
            exits.push(self.current.emit(Instruction::Jump { target: 0 }));
            let next = self.current.next_index();
            self.current.patch_branch(branch, next);
        }

        if let Some(child) = default {
            self.compile_node(child)?;
        } else if abort_on_no_match {
            self.current.emit(Instruction::Abort {
                message: format!(
                    "no choice branch matched at {}",
                    self.arena.path_of(id)
                ),
            });
        }

        let end = self.current.next_index();
        for exit in exits {
            self.current.patch_jump(exit, end);
        }

        Ok(())
    }

    /// The first occurrence of a recursion group compiles its subtree
    /// into the group's sub-program and enters it; later occurrences
    /// re-enter the group one level deeper.
    fn compile_recursive(
        &mut self,
        id: NodeId,
        tag: &str,
        group: RecursionGroupId,
        depth_limit: u32,
        on_overflow: crate::template::OverflowPolicy,
        stop: Option<xylem_relational::Criteria>,
    ) -> Result<(), CompileError> {
        if self.in_progress.contains(&group) || self.groups.contains_key(&group) {
            self.current.emit(Instruction::Recurse { group });
            return Ok(());
        }

        self.in_progress.insert(group);
        self.suspended.push(mem::take(&mut self.current));

        self.current.emit(Instruction::AddTag {
            tag: TagSpec::element(tag),
            bound: self.arena.node(id).resolved.clone(),
        });
        self.compile_children(id)?;

        let body = match self.suspended.pop() {
            Some(previous) => mem::replace(&mut self.current, previous),
            None => mem::take(&mut self.current),
        };
        self.groups.insert(
            group,
            RecursionGroupDef {
                body: body.into_instructions(),
                depth_limit,
                on_overflow,
                stop,
            },
        );
        self.in_progress.remove(&group);

        self.current.emit(Instruction::CallGroup { group });

        Ok(())
    }

    fn emit_loads(&mut self, boundary: &str) {
        if let Some(stagings) = self.ctx.staging_bounds.get(boundary) {
            for staging in stagings {
                self.current.emit(Instruction::LoadStaging {
                    scope: staging.clone(),
                });
            }
        }
    }

    /// Two companion unload instructions per staged relation, in
    /// reverse load order: close pinned cursors, then drop.
    fn emit_unloads(&mut self, boundary: &str) {
        if let Some(stagings) = self.ctx.staging_bounds.get(boundary) {
            for staging in stagings.iter().rev() {
                self.current.emit(Instruction::CloseStaging {
                    scope: staging.clone(),
                });
                self.current.emit(Instruction::UnloadStaging {
                    scope: staging.clone(),
                });
            }
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use crate::program::Instruction;
    use crate::query::DocQuery;
    use crate::test_support::{invoice_template, run_full_compile};

    #[test]
    fn scope_lowering_has_canonical_loop_shape() {
        let compilation = run_full_compile(&invoice_template(), &DocQuery::select_all())
            .expect("compiles");
        let program = &compilation.program;

        let exec_at = program
            .instructions
            .iter()
            .position(|instruction| {
                matches!(instruction, Instruction::ExecQuery { scope } if scope == "orders")
            })
            .expect("orders scope executes");

        assert!(matches!(
            &program.instructions[exec_at + 1],
            Instruction::OpenBlock { scope } if scope == "orders"
        ));
        assert!(matches!(
            &program.instructions[exec_at + 2],
            Instruction::FetchNext { scope } if scope == "orders"
        ));
        let Instruction::WhileHasRows { exit, .. } = &program.instructions[exec_at + 3] else {
            panic!("expected loop head");
        };
        assert!(matches!(
            &program.instructions[*exit],
            Instruction::CloseBlock { scope } if scope == "orders"
        ));
        // The back-edge sits immediately before the exit target.
        assert!(matches!(
            &program.instructions[exit - 1],
            Instruction::Jump { target } if *target == exec_at + 3
        ));
    }

    #[test]
    fn programs_begin_and_end_document() {
        let compilation = run_full_compile(&invoice_template(), &DocQuery::select_all())
            .expect("compiles");

        assert_eq!(
            compilation.program.instructions.first(),
            Some(&Instruction::InitDocument)
        );
        assert_eq!(
            compilation.program.instructions.last(),
            Some(&Instruction::EndDocument)
        );
    }
}
