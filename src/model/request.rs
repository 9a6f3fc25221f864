use crate::core::{ConsultantId, OrderItemId, RequestId, ServiceId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle of a client service request.
///
/// ```text
/// pending ──assign──> assigned <──> doc_pending / under_review / wip /
///    │                   │          under_query / final_review / filed /
///    │                   │          revision_pending
///    │                   └──release──> completed | cancelled | pending
///    └──cancel──> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Assigned,
    DocPending,
    UnderReview,
    Wip,
    UnderQuery,
    FinalReview,
    Filed,
    RevisionPending,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 11] = [
        RequestStatus::Pending,
        RequestStatus::Assigned,
        RequestStatus::DocPending,
        RequestStatus::UnderReview,
        RequestStatus::Wip,
        RequestStatus::UnderQuery,
        RequestStatus::FinalReview,
        RequestStatus::Filed,
        RequestStatus::RevisionPending,
        RequestStatus::Completed,
        RequestStatus::Cancelled,
    ];

    /// Statuses in which a request occupies a slot of its consultant's capacity
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            RequestStatus::Pending | RequestStatus::Completed | RequestStatus::Cancelled
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Cancelled)
    }

    /// Moves that do not touch workload bookkeeping: between two different
    /// active statuses. Everything else goes through assign or release.
    pub fn can_advance_to(&self, next: RequestStatus) -> bool {
        self.is_active() && next.is_active() && *self != next
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Assigned => "assigned",
            RequestStatus::DocPending => "doc_pending",
            RequestStatus::UnderReview => "under_review",
            RequestStatus::Wip => "wip",
            RequestStatus::UnderQuery => "under_query",
            RequestStatus::FinalReview => "final_review",
            RequestStatus::Filed => "filed",
            RequestStatus::RevisionPending => "revision_pending",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown request status '{}'", s))
    }
}

/// A client's ask for one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientServiceRequest {
    pub id: RequestId,
    pub client: UserId,
    pub service: ServiceId,
    pub status: RequestStatus,
    pub assigned_consultant: Option<ConsultantId>,
    pub assigned_at: Option<DateTime<Utc>>,
    /// Higher is more urgent
    pub priority: i32,
    pub notes: String,
    /// Caller-supplied key that makes creation idempotent
    pub request_key: Option<Uuid>,
    pub order_item: Option<OrderItemId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ClientServiceRequest {
    /// Whether this request currently counts against `consultant`'s workload
    pub fn occupies(&self, consultant: ConsultantId) -> bool {
        self.status.is_active() && self.assigned_consultant == Some(consultant)
    }
}

/// Input for creating a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRequest {
    pub client: UserId,
    pub service: ServiceId,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub request_key: Option<Uuid>,
}

impl NewRequest {
    pub fn new(client: UserId, service: ServiceId) -> Self {
        Self {
            client,
            service,
            priority: None,
            notes: String::new(),
            request_key: None,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn request_key(mut self, key: Uuid) -> Self {
        self.request_key = Some(key);
        self
    }
}
