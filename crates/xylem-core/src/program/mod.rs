//! Compiled output: a flat instruction sequence with explicit jump
//! targets, plus recursion-group sub-programs. Immutable once produced;
//! interpreted by a document-cursor runtime against a relational
//! engine.

mod builder;
mod explain;
mod fingerprint;

pub(crate) use builder::ProgramBuilder;
pub use explain::{ExplainGroup, ExplainProgram};
pub use fingerprint::ProgramFingerprint;

use crate::template::{OverflowPolicy, RecursionGroupId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use xylem_relational::{ColumnRef, Criteria};

///
/// TagKind
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum TagKind {
    Element,
    Attribute,
}

///
/// TagSpec
///
/// Descriptor for one emitted tag. `bound` names the result-set column
/// whose current value becomes the tag's content.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TagSpec {
    pub name: String,
    pub kind: TagKind,
}

impl TagSpec {
    #[must_use]
    pub fn element(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TagKind::Element,
        }
    }

    #[must_use]
    pub fn attribute(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TagKind::Attribute,
        }
    }
}

///
/// Instruction
///
/// The runtime drives two cursors: a relational result cursor per open
/// scope and a document-output cursor. Jump targets are absolute
/// indices within the owning instruction sequence.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Instruction {
    InitDocument,
    EndDocument,
    AddTag {
        tag: TagSpec,
        bound: Option<ColumnRef>,
    },
    AddComment {
        text: String,
    },
    MoveDown,
    MoveUp,
    /// Execute the scope's (possibly correlated) query.
    ExecQuery {
        scope: String,
    },
    OpenBlock {
        scope: String,
    },
    CloseBlock {
        scope: String,
    },
    FetchNext {
        scope: String,
    },
    /// Loop head: jump to `exit` when the scope's cursor is exhausted.
    WhileHasRows {
        scope: String,
        exit: usize,
    },
    Jump {
        target: usize,
    },
    /// Conditional: fall through when `condition` holds for the current
    /// rows, otherwise jump to `on_false`.
    Branch {
        condition: Criteria,
        on_false: usize,
    },
    /// Enter a recursion group's body at depth one.
    CallGroup {
        group: RecursionGroupId,
    },
    /// Re-enter the enclosing group's body one level deeper, subject to
    /// the group's stop criteria and depth limit.
    Recurse {
        group: RecursionGroupId,
    },
    Abort {
        message: String,
    },
    /// Materialize the staging scope's load query into its temporary
    /// relation.
    LoadStaging {
        scope: String,
    },
    /// Release cursors pinned on the staged relation.
    CloseStaging {
        scope: String,
    },
    /// Drop the staged temporary relation.
    UnloadStaging {
        scope: String,
    },
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitDocument => write!(f, "INIT DOCUMENT"),
            Self::EndDocument => write!(f, "END DOCUMENT"),
            Self::AddTag { tag, bound } => {
                let kind = match tag.kind {
                    TagKind::Element => "TAG",
                    TagKind::Attribute => "ATTR",
                };
                match bound {
                    Some(column) => write!(f, "ADD {kind} {} <- {column}", tag.name),
                    None => write!(f, "ADD {kind} {}", tag.name),
                }
            }
            Self::AddComment { text } => write!(f, "ADD COMMENT {text:?}"),
            Self::MoveDown => write!(f, "DOWN"),
            Self::MoveUp => write!(f, "UP"),
            Self::ExecQuery { scope } => write!(f, "EXEC {scope}"),
            Self::OpenBlock { scope } => write!(f, "BLOCK OPEN {scope}"),
            Self::CloseBlock { scope } => write!(f, "BLOCK CLOSE {scope}"),
            Self::FetchNext { scope } => write!(f, "FETCH {scope}"),
            Self::WhileHasRows { scope, exit } => write!(f, "WHILE {scope} ELSE -> {exit}"),
            Self::Jump { target } => write!(f, "JUMP -> {target}"),
            Self::Branch {
                condition,
                on_false,
            } => write!(f, "IF {condition} ELSE -> {on_false}"),
            Self::CallGroup { group } => write!(f, "CALL GROUP {group}"),
            Self::Recurse { group } => write!(f, "RECURSE GROUP {group}"),
            Self::Abort { message } => write!(f, "ABORT {message:?}"),
            Self::LoadStaging { scope } => write!(f, "STAGE LOAD {scope}"),
            Self::CloseStaging { scope } => write!(f, "STAGE CLOSE {scope}"),
            Self::UnloadStaging { scope } => write!(f, "STAGE UNLOAD {scope}"),
        }
    }
}

///
/// RecursionGroupDef
///
/// One recursion group's body plus its runtime bounds. The body is a
/// plain instruction sequence; `Recurse` inside it re-enters the same
/// body one depth level down until the stop criteria holds or the depth
/// limit is reached, at which point the overflow policy applies.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RecursionGroupDef {
    pub body: Vec<Instruction>,
    pub depth_limit: u32,
    pub on_overflow: OverflowPolicy,
    pub stop: Option<Criteria>,
}

///
/// Program
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub groups: BTreeMap<RecursionGroupId, RecursionGroupDef>,
}

impl Program {
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Deterministic, read-only listing of this program.
    #[must_use]
    pub fn explain(&self) -> ExplainProgram {
        explain::explain(self)
    }

    /// Stable fingerprint derived from the explain projection.
    #[must_use]
    pub fn fingerprint(&self) -> ProgramFingerprint {
        fingerprint::fingerprint(&self.explain())
    }
}
