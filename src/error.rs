use crate::constraint::ConstraintKind;
use crate::model::{DemandId, StaffId};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Entrée mal formée ou contradictoire, détectée avant toute allocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("duplicate staff id: {0}")]
    DuplicateStaff(StaffId),
    #[error("duplicate demand id: {0}")]
    DuplicateDemand(DemandId),
    #[error("empty identity for {0}")]
    EmptyIdentity(&'static str),
    #[error("malformed interval on {entity}: end ({end}) must be after start ({start})")]
    MalformedInterval {
        entity: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("demand {0} must require a headcount of at least 1")]
    ZeroHeadcount(DemandId),
    #[error("{constraint} penalty {value} outside 0..={max}")]
    PenaltyOutOfRange {
        constraint: ConstraintKind,
        value: i64,
        max: i64,
    },
}

#[derive(Error, Debug)]
pub enum AllocError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("infeasible input: {0}")]
    InfeasibleInput(String),
    #[error("unknown staff: {0}")]
    UnknownStaff(String),
    #[error("unknown demand: {0}")]
    UnknownDemand(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
