use crate::assignment::{Assignment, ReconciliationReport, ReleaseReason, WorkloadReport};
use crate::core::{OrderId, RequestId, Result};
use crate::facade::ConsultDesk;
use crate::model::ClientServiceRequest;
use async_trait::async_trait;

/// The assignment operations other services depend on.
///
/// This trait allows writing callers that are agnostic to where workload
/// state lives. `ConsultDesk` implements it over its own store; a wrapper
/// around a relational database can implement it for production use.
#[async_trait]
pub trait AssignmentGateway: Send + Sync {
    /// Bind a pending request to the least-loaded eligible consultant.
    async fn assign(&self, request: RequestId) -> Result<Assignment>;

    /// Take a request off its consultant's workload.
    async fn release(
        &self,
        request: RequestId,
        reason: ReleaseReason,
    ) -> Result<ClientServiceRequest>;

    /// Create and assign requests for a paid order. Safe to call repeatedly.
    async fn reconcile(&self, order: OrderId) -> Result<ReconciliationReport>;

    /// Check that every workload counter matches the active requests.
    async fn verify(&self) -> Result<WorkloadReport>;
}

#[async_trait]
impl AssignmentGateway for ConsultDesk {
    async fn assign(&self, request: RequestId) -> Result<Assignment> {
        ConsultDesk::assign(self, request).await
    }

    async fn release(
        &self,
        request: RequestId,
        reason: ReleaseReason,
    ) -> Result<ClientServiceRequest> {
        ConsultDesk::release(self, request, reason).await
    }

    async fn reconcile(&self, order: OrderId) -> Result<ReconciliationReport> {
        self.reconcile_paid_order(order).await
    }

    async fn verify(&self) -> Result<WorkloadReport> {
        self.verify_workload().await
    }
}
