//! Read-only compilation diagnostics.
//!
//! Diagnostics contract:
//! - events are best-effort, observational only, and may evolve;
//! - events never affect compilation output;
//! - event order follows pass order and, within a pass, template order,
//!   so two compilations of the same inputs trace identically.

use std::fmt;

///
/// CompilePhase
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompilePhase {
    Binding,
    Criteria,
    Raising,
    Exclusion,
    Projection,
    Staging,
    Program,
}

impl fmt::Display for CompilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Binding => "binding",
            Self::Criteria => "criteria",
            Self::Raising => "raising",
            Self::Exclusion => "exclusion",
            Self::Projection => "projection",
            Self::Staging => "staging",
            Self::Program => "program",
        };
        write!(f, "{label}")
    }
}

///
/// RaiseSkipReason
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RaiseSkipReason {
    /// The query carries group-by/having/limit and a filter must merge in.
    NotSimpleBlock,
    /// A binding placeholder is referenced outside the filter.
    ParamOutsideFilter,
    /// The predicate shape around a placeholder cannot become a join.
    ComplexParamPredicate,
    /// An intermediate scope between this scope and its binding source
    /// was not raised, so the join chain cannot be built.
    ParentNotRaised,
}

///
/// StagingSkipReason
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StagingSkipReason {
    /// The optimizer reported no cardinality estimate.
    UnknownCardinality,
    /// The estimate exceeded the configured threshold.
    EstimateAboveThreshold,
    /// The optimizer rejected the load plan (automatic staging only).
    PlannerRejected,
}

///
/// CompileTraceEvent
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CompileTraceEvent {
    PhaseFinished {
        phase: CompilePhase,
    },
    ScopeAliased {
        scope: String,
        alias: String,
    },
    ConjunctPlaced {
        scope: String,
        conjunct: String,
    },
    RowLimitSet {
        scope: String,
        max: u32,
    },
    InputSetRaised {
        scope: String,
    },
    RaiseSkipped {
        scope: String,
        reason: RaiseSkipReason,
    },
    RaiseReverted {
        scope: String,
    },
    Staged {
        scope: String,
        table: String,
        estimated_rows: Option<u64>,
        explicit: bool,
    },
    StagingSkipped {
        scope: String,
        reason: StagingSkipReason,
    },
}

///
/// CompileDiagnostics
///
/// Append-only trace accumulated across the pipeline and returned with
/// the compiled program.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CompileDiagnostics {
    events: Vec<CompileTraceEvent>,
}

impl CompileDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, event: CompileTraceEvent) {
        self.events.push(event);
    }

    #[must_use]
    pub fn events(&self) -> &[CompileTraceEvent] {
        &self.events
    }
}
