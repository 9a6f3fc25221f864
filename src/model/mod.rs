// ============================================================================
// Domain Records
// ============================================================================
//
// Catalog (categories, services, expertise), consultant and client profiles,
// service requests, and payment-side orders. Plain serde structs: every
// mutation goes through a Transaction.
//
// ============================================================================

pub mod catalog;
pub mod consultant;
pub mod order;
pub mod request;

pub use catalog::{Expertise, ExpertiseKey, Service, ServiceCategory, name_key};
pub use consultant::{ClientProfile, ConsultantProfile, NewConsultant};
pub use order::{NewOrder, NewOrderItem, OrderItem, OrderStatus, PaymentConfirmation, ServiceOrder};
pub use request::{ClientServiceRequest, NewRequest, RequestStatus};
