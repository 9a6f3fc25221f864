use crate::model::RequestStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the resolver picks among eligible consultants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    /// Lowest current workload, ties by lowest consultant id.
    #[default]
    LeastLoaded,
    /// A consultant who recently served the same client, if one is
    /// eligible; otherwise `LeastLoaded`.
    FamiliarFirst,
}

impl fmt::Display for AssignmentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentStrategy::LeastLoaded => f.write_str("least_loaded"),
            AssignmentStrategy::FamiliarFirst => f.write_str("familiar_first"),
        }
    }
}

impl FromStr for AssignmentStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "least_loaded" => Ok(AssignmentStrategy::LeastLoaded),
            "familiar_first" => Ok(AssignmentStrategy::FamiliarFirst),
            other => Err(format!("unknown assignment strategy '{}'", other)),
        }
    }
}

/// Why a request stops occupying its consultant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    /// Work finished; the consultant stays on record.
    Completed,
    /// Client or admin cancelled; the consultant stays on record.
    Cancelled,
    /// Back to the queue; the consultant reference is cleared.
    Unassigned,
}

impl ReleaseReason {
    pub fn target_status(&self) -> RequestStatus {
        match self {
            ReleaseReason::Completed => RequestStatus::Completed,
            ReleaseReason::Cancelled => RequestStatus::Cancelled,
            ReleaseReason::Unassigned => RequestStatus::Pending,
        }
    }

    pub fn keeps_consultant(&self) -> bool {
        !matches!(self, ReleaseReason::Unassigned)
    }
}

impl FromStr for ReleaseReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" | "complete" => Ok(ReleaseReason::Completed),
            "cancelled" | "cancel" => Ok(ReleaseReason::Cancelled),
            "unassigned" | "unassign" => Ok(ReleaseReason::Unassigned),
            other => Err(format!("unknown release reason '{}'", other)),
        }
    }
}
