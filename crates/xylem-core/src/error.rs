use crate::compile::{
    binding::BindingError, criteria::CriteriaError, exclusion::ExclusionError,
    program::ProgramError, raising::RaiseError, staging::StagingError,
};
use thiserror::Error as ThisError;
use xylem_relational::{CatalogError, FrontendError};

///
/// CompileError
///
/// First fatal error of a compilation. There is no partial or degraded
/// mode: any error here means no program was produced.
///

#[derive(Debug, ThisError)]
pub enum CompileError {
    #[error("{0}")]
    Binding(Box<BindingError>),

    #[error("{0}")]
    Criteria(Box<CriteriaError>),

    #[error("{0}")]
    Exclusion(Box<ExclusionError>),

    #[error("{0}")]
    Raise(Box<RaiseError>),

    #[error("{0}")]
    Staging(Box<StagingError>),

    #[error("{0}")]
    Program(Box<ProgramError>),

    /// Relational front-end failure, wrapped with the owning scope.
    #[error("scope '{scope}': {source}")]
    Frontend {
        scope: String,
        source: FrontendError,
    },

    #[error("{0}")]
    Catalog(Box<CatalogError>),
}

impl From<BindingError> for CompileError {
    fn from(err: BindingError) -> Self {
        Self::Binding(Box::new(err))
    }
}

impl From<CriteriaError> for CompileError {
    fn from(err: CriteriaError) -> Self {
        Self::Criteria(Box::new(err))
    }
}

impl From<ExclusionError> for CompileError {
    fn from(err: ExclusionError) -> Self {
        Self::Exclusion(Box::new(err))
    }
}

impl From<RaiseError> for CompileError {
    fn from(err: RaiseError) -> Self {
        Self::Raise(Box::new(err))
    }
}

impl From<StagingError> for CompileError {
    fn from(err: StagingError) -> Self {
        Self::Staging(Box::new(err))
    }
}

impl From<ProgramError> for CompileError {
    fn from(err: ProgramError) -> Self {
        Self::Program(Box::new(err))
    }
}

impl From<CatalogError> for CompileError {
    fn from(err: CatalogError) -> Self {
        Self::Catalog(Box::new(err))
    }
}
