// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Serializable transactions over the assignment store using optimistic
// concurrency control: copy-on-write snapshots for reads, version checks on
// every observed row at commit.
//
// ============================================================================

pub mod change;
pub mod manager;
pub mod state;

pub use change::Change;
pub use manager::{CommitInfo, TransactionManager, TransactionStats};
pub use state::{Transaction, TransactionId, TransactionState};
