use crate::core::{CategoryId, ConsultantId, ServiceId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Uniqueness key of a category name or service title: trimmed, lowercase.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Top-level grouping of services (Income Tax, GST, Registration, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCategory {
    pub id: CategoryId,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A purchasable service. Reference data: the resolver only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub category: CategoryId,
    pub title: String,
    pub price: Option<Decimal>,
    /// Turnaround time as shown to clients, e.g. "3-5 working days"
    pub tat: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Service {
    /// Case-insensitive title comparison used when an order item carries only
    /// a free-text title.
    pub fn title_matches(&self, title: &str) -> bool {
        self.title.trim().eq_ignore_ascii_case(title.trim())
    }
}

/// Key of the consultant/service association table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExpertiseKey {
    pub consultant: ConsultantId,
    pub service: ServiceId,
}

/// Declares that a consultant may serve a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expertise {
    pub consultant: ConsultantId,
    pub service: ServiceId,
    pub added_at: DateTime<Utc>,
}

impl Expertise {
    pub fn key(&self) -> ExpertiseKey {
        ExpertiseKey {
            consultant: self.consultant,
            service: self.service,
        }
    }
}
