//! Owned program builder with jump patching.
//!
//! The compiler keeps an explicit stack of these, one per recursion
//! group body being compiled, instead of any shared "current program"
//! context.

use super::Instruction;

///
/// ProgramBuilder
///

#[derive(Debug, Default)]
pub(crate) struct ProgramBuilder {
    instructions: Vec<Instruction>,
}

impl ProgramBuilder {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append an instruction, returning its index for later patching.
    pub(crate) fn emit(&mut self, instruction: Instruction) -> usize {
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    /// Index the next emitted instruction will receive.
    #[must_use]
    pub(crate) fn next_index(&self) -> usize {
        self.instructions.len()
    }

    /// Patch a `WhileHasRows` loop head's exit target.
    pub(crate) fn patch_while_exit(&mut self, at: usize, target: usize) {
        if let Some(Instruction::WhileHasRows { exit, .. }) = self.instructions.get_mut(at) {
            *exit = target;
        } else {
            debug_assert!(false, "patch_while_exit target must be a WhileHasRows");
        }
    }

    /// Patch a `Branch`'s false-edge target.
    pub(crate) fn patch_branch(&mut self, at: usize, target: usize) {
        if let Some(Instruction::Branch { on_false, .. }) = self.instructions.get_mut(at) {
            *on_false = target;
        } else {
            debug_assert!(false, "patch_branch target must be a Branch");
        }
    }

    /// Patch a `Jump`'s target.
    pub(crate) fn patch_jump(&mut self, at: usize, new_target: usize) {
        if let Some(Instruction::Jump { target }) = self.instructions.get_mut(at) {
            *target = new_target;
        } else {
            debug_assert!(false, "patch_jump target must be a Jump");
        }
    }

    #[must_use]
    pub(crate) fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }
}

///
/// TESTS
///
