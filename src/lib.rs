// ============================================================================
// Caseload Library
// ============================================================================
//
// Capacity-aware assignment of client service requests to consultants, with
// the workload counters kept exact by serializable transactions.
//
// ============================================================================

pub mod assignment;
pub mod config;
pub mod core;
pub mod facade;
pub mod interface;
pub mod model;
pub mod storage;
pub mod transaction;

// Re-export main types for convenience
pub use assignment::{
    Assignment, AssignmentResolver, AssignmentStrategy, ItemOutcome, ItemReconciliation,
    ReconciliationReport, ReleaseReason, Submission, WorkloadEntry, WorkloadReport,
};
pub use config::{DeskConfig, RetryPolicy};
pub use self::core::{
    CategoryId, ConsultantId, DeskError, OrderId, OrderItemId, RequestId, Result, ServiceId,
    UserId, WorkloadMismatch,
};
pub use facade::{ConsultDesk, ExpertiseGrant, QueueAssignment};
pub use interface::AssignmentGateway;
pub use model::{
    ClientProfile, ClientServiceRequest, ConsultantProfile, NewConsultant, NewOrder,
    NewOrderItem, NewRequest, OrderItem, OrderStatus, PaymentConfirmation, RequestStatus,
    Service, ServiceCategory, ServiceOrder,
};
pub use storage::DurabilityMode;

// ============================================================================
// Quick start
// ============================================================================

/// Open an in-memory desk, register a consultant and assign a request.
///
/// # Examples
///
/// ```
/// use caseload::{NewConsultant, NewRequest, UserId};
///
/// # #[tokio::main]
/// # async fn main() -> caseload::Result<()> {
/// let desk = caseload::in_memory();
///
/// let gst = desk.create_category("GST", "Goods and Services Tax").await?;
/// let service = desk.create_service(gst.id, "GST Return", None, "3 days").await?;
/// let asha = desk
///     .register_consultant(NewConsultant::new(UserId(10), "Asha").capacity(2))
///     .await?;
/// desk.grant_expertise(asha.id, service.id).await?;
///
/// let submission = desk.submit_request(NewRequest::new(UserId(1), service.id)).await?;
/// let assignment = desk.assign(submission.request.id).await?;
/// assert_eq!(assignment.consultant.id, asha.id);
///
/// desk.verify_workload().await?;
/// # Ok(())
/// # }
/// ```
pub fn in_memory() -> ConsultDesk {
    ConsultDesk::new()
}
