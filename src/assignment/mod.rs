// ============================================================================
// Assignment Domain
// ============================================================================
//
// Capacity-aware consultant assignment: who is eligible, who gets picked,
// how workload counters move on release, how paid orders become requests,
// and how the workload invariant is audited.
//
// Every function here takes a `&mut Transaction`; retries and commits are
// the facade's job.
//
// ============================================================================

pub mod audit;
pub mod eligibility;
pub mod intake;
pub mod policy;
pub mod reconcile;
pub mod resolver;

pub use audit::{WorkloadEntry, WorkloadReport};
pub use intake::{Submission, create_request};
pub use policy::{AssignmentStrategy, ReleaseReason};
pub use reconcile::{
    ItemOutcome, ItemReconciliation, ReconciliationReport, Reconciler, request_key_for_item,
};
pub use resolver::{Assignment, AssignmentResolver};
