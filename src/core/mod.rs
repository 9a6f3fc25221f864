pub mod error;
pub mod types;

pub use error::{DeskError, Result, WorkloadMismatch};
pub use types::{CategoryId, ConsultantId, OrderId, OrderItemId, RequestId, ServiceId, UserId};
