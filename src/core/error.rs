use crate::core::{ConsultantId, RequestId, ServiceId};
use crate::model::RequestStatus;
use std::fmt;
use thiserror::Error;

/// One consultant whose stored workload counter disagrees with the number of
/// requests actually assigned to them in an active status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadMismatch {
    pub consultant: ConsultantId,
    pub stored: u32,
    pub actual: u32,
}

impl fmt::Display for WorkloadMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} stores {} active clients but has {}",
            self.consultant, self.stored, self.actual
        )
    }
}

fn join_mismatches(mismatches: &[WorkloadMismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum DeskError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("No eligible consultant with spare capacity for {service}")]
    NoEligibleConsultant { service: ServiceId },

    #[error("Workload invariant violated: {}", join_mismatches(.0))]
    InvariantViolation(Vec<WorkloadMismatch>),

    #[error("Invalid transition for {request}: {from} -> {to}")]
    InvalidTransition {
        request: RequestId,
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("Write-write conflict: {0}")]
    WriteConflict(String),

    #[error("Transaction still conflicting after {attempts} attempts: {last}")]
    TransientFailure { attempts: usize, last: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DeskError {
    pub fn not_found(entity: &'static str, id: impl Into<u64>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Only write-write conflicts are worth another attempt; everything else
    /// is a business outcome or a hard failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WriteConflict(_))
    }
}

pub type Result<T> = std::result::Result<T, DeskError>;

impl From<std::io::Error> for DeskError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}
