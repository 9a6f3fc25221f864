pub mod desk;

pub use desk::{ConsultDesk, ExpertiseGrant, QueueAssignment};
