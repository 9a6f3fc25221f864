// ============================================================================
// Consultant Assignment Resolver
// ============================================================================
//
// All workload bookkeeping lives here. Each operation reads and writes
// through one Transaction, so the request row and the consultant counter
// change together or not at all.
//
// ============================================================================

use super::eligibility::{eligible_consultants, familiar_pick};
use super::policy::{AssignmentStrategy, ReleaseReason};
use crate::config::DeskConfig;
use crate::core::{ConsultantId, DeskError, RequestId, Result};
use crate::model::{ClientProfile, ClientServiceRequest, ConsultantProfile, RequestStatus};
use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{Level, event};

/// A request bound to a consultant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub request: ClientServiceRequest,
    pub consultant: ConsultantProfile,
}

#[derive(Debug, Clone)]
pub struct AssignmentResolver {
    strategy: AssignmentStrategy,
    familiar_window: usize,
}

impl Default for AssignmentResolver {
    fn default() -> Self {
        Self::new(AssignmentStrategy::LeastLoaded, 5)
    }
}

impl AssignmentResolver {
    pub fn new(strategy: AssignmentStrategy, familiar_window: usize) -> Self {
        Self {
            strategy,
            familiar_window,
        }
    }

    pub fn from_config(config: &DeskConfig) -> Self {
        Self::new(config.strategy, config.familiar_window)
    }

    pub fn strategy(&self) -> AssignmentStrategy {
        self.strategy
    }

    /// Bind a pending request to the best eligible consultant.
    ///
    /// Nothing is written when no consultant qualifies.
    pub fn assign(
        &self,
        txn: &mut Transaction,
        request: RequestId,
        now: DateTime<Utc>,
    ) -> Result<Assignment> {
        self.assign_excluding(txn, request, None, now)
    }

    fn assign_excluding(
        &self,
        txn: &mut Transaction,
        request_id: RequestId,
        exclude: Option<ConsultantId>,
        now: DateTime<Utc>,
    ) -> Result<Assignment> {
        let request = txn.request(request_id)?;
        if request.status != RequestStatus::Pending {
            return Err(DeskError::InvalidTransition {
                request: request_id,
                from: request.status,
                to: RequestStatus::Assigned,
            });
        }
        let service = txn.service(request.service)?;

        let candidates = eligible_consultants(txn, service.id, exclude);
        let chosen = match self.strategy {
            AssignmentStrategy::LeastLoaded => None,
            AssignmentStrategy::FamiliarFirst => {
                familiar_pick(txn, request.client, &candidates, self.familiar_window)
            }
        }
        .and_then(|id| candidates.iter().find(|candidate| candidate.id == id))
        .or_else(|| candidates.first());

        let Some(consultant) = chosen.cloned() else {
            event!(
                Level::DEBUG,
                request = %request_id,
                service = %service.id,
                "no eligible consultant"
            );
            return Err(DeskError::NoEligibleConsultant {
                service: service.id,
            });
        };

        self.bind(txn, request, consultant, now)
    }

    fn bind(
        &self,
        txn: &mut Transaction,
        mut request: ClientServiceRequest,
        mut consultant: ConsultantProfile,
        now: DateTime<Utc>,
    ) -> Result<Assignment> {
        request.assigned_consultant = Some(consultant.id);
        request.status = RequestStatus::Assigned;
        request.assigned_at = Some(now);
        request.updated_at = now;

        consultant.current_client_count += 1;
        consultant.last_assigned_at = Some(now);
        consultant.updated_at = now;

        let client = match txn.client(request.client) {
            Some(mut profile) => {
                profile.primary_consultant = Some(consultant.id);
                profile.updated_at = now;
                profile
            }
            None => ClientProfile {
                user: request.client,
                primary_consultant: Some(consultant.id),
                updated_at: now,
            },
        };

        txn.put_request(request.clone())?;
        txn.put_consultant(consultant.clone())?;
        txn.put_client(client)?;

        event!(
            Level::INFO,
            request = %request.id,
            consultant = %consultant.id,
            load = consultant.current_client_count,
            capacity = consultant.max_concurrent_clients,
            "request assigned"
        );

        Ok(Assignment {
            request,
            consultant,
        })
    }

    /// Take an active request off its consultant's workload.
    pub fn release(
        &self,
        txn: &mut Transaction,
        request_id: RequestId,
        reason: ReleaseReason,
        now: DateTime<Utc>,
    ) -> Result<ClientServiceRequest> {
        let mut request = txn.request(request_id)?;
        let consultant_id = match request.assigned_consultant {
            Some(id) if request.status.is_active() => id,
            _ => {
                return Err(DeskError::InvalidTransition {
                    request: request_id,
                    from: request.status,
                    to: reason.target_status(),
                });
            }
        };

        let mut consultant = txn.consultant(consultant_id)?;
        if consultant.current_client_count == 0 {
            event!(
                Level::WARN,
                consultant = %consultant.id,
                request = %request_id,
                "workload counter already at zero on release"
            );
        } else {
            consultant.current_client_count -= 1;
        }
        consultant.updated_at = now;

        request.status = reason.target_status();
        request.updated_at = now;
        match reason {
            ReleaseReason::Completed => request.completed_at = Some(now),
            ReleaseReason::Cancelled => {}
            ReleaseReason::Unassigned => {
                request.assigned_consultant = None;
                request.assigned_at = None;
            }
        }

        txn.put_consultant(consultant.clone())?;
        txn.put_request(request.clone())?;

        event!(
            Level::INFO,
            request = %request_id,
            consultant = %consultant.id,
            status = %request.status,
            load = consultant.current_client_count,
            "request released"
        );

        Ok(request)
    }

    /// Move an active request to a different consultant.
    ///
    /// The previous consultant is never chosen again. When nobody else
    /// qualifies the error propagates and the caller must abandon the
    /// transaction, which undoes the release as well.
    pub fn reassign(
        &self,
        txn: &mut Transaction,
        request_id: RequestId,
        now: DateTime<Utc>,
    ) -> Result<Assignment> {
        let request = txn.request(request_id)?;
        let previous = match request.assigned_consultant {
            Some(id) if request.status.is_active() => id,
            _ => {
                return Err(DeskError::InvalidTransition {
                    request: request_id,
                    from: request.status,
                    to: RequestStatus::Assigned,
                });
            }
        };

        if eligible_consultants(txn, request.service, Some(previous)).is_empty() {
            return Err(DeskError::NoEligibleConsultant {
                service: request.service,
            });
        }

        self.release(txn, request_id, ReleaseReason::Unassigned, now)?;
        self.assign_excluding(txn, request_id, Some(previous), now)
    }

    /// Cancel a pending request outright, or release an active one.
    pub fn cancel(
        &self,
        txn: &mut Transaction,
        request_id: RequestId,
        now: DateTime<Utc>,
    ) -> Result<ClientServiceRequest> {
        let mut request = txn.request(request_id)?;
        match request.status {
            RequestStatus::Pending => {
                request.status = RequestStatus::Cancelled;
                request.updated_at = now;
                txn.put_request(request.clone())?;
                Ok(request)
            }
            status if status.is_active() => {
                self.release(txn, request_id, ReleaseReason::Cancelled, now)
            }
            status => Err(DeskError::InvalidTransition {
                request: request_id,
                from: status,
                to: RequestStatus::Cancelled,
            }),
        }
    }

    /// Move between active statuses. Workload is unaffected.
    pub fn advance(
        &self,
        txn: &mut Transaction,
        request_id: RequestId,
        next: RequestStatus,
        now: DateTime<Utc>,
    ) -> Result<ClientServiceRequest> {
        let mut request = txn.request(request_id)?;
        if !request.status.can_advance_to(next) {
            return Err(DeskError::InvalidTransition {
                request: request_id,
                from: request.status,
                to: next,
            });
        }

        request.status = next;
        request.updated_at = now;
        txn.put_request(request.clone())?;
        Ok(request)
    }
}
