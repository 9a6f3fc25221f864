use crate::core::{ConsultantId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Service-side profile of a consultant, including the live workload counter.
///
/// `current_client_count` is owned by the assignment resolver: it is only
/// changed in the same transaction that binds or releases a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultantProfile {
    pub id: ConsultantId,
    pub user: UserId,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub qualification: String,
    pub experience_years: u32,
    pub is_active: bool,
    pub max_concurrent_clients: u32,
    pub current_client_count: u32,
    pub last_assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConsultantProfile {
    pub fn has_capacity(&self) -> bool {
        self.current_client_count < self.max_concurrent_clients
    }

    /// Active and below the capacity ceiling. Expertise is checked separately.
    pub fn is_available(&self) -> bool {
        self.is_active && self.has_capacity()
    }

    pub fn spare_capacity(&self) -> u32 {
        self.max_concurrent_clients
            .saturating_sub(self.current_client_count)
    }
}

/// Registration payload for a consultant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConsultant {
    pub user: UserId,
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub qualification: String,
    #[serde(default)]
    pub experience_years: u32,
    /// Falls back to the configured default capacity
    #[serde(default)]
    pub max_concurrent_clients: Option<u32>,
}

impl NewConsultant {
    pub fn new(user: UserId, full_name: impl Into<String>) -> Self {
        Self {
            user,
            full_name: full_name.into(),
            email: String::new(),
            phone: String::new(),
            qualification: String::new(),
            experience_years: 0,
            max_concurrent_clients: None,
        }
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn qualification(mut self, qualification: impl Into<String>, years: u32) -> Self {
        self.qualification = qualification.into();
        self.experience_years = years;
        self
    }

    pub fn capacity(mut self, max_concurrent_clients: u32) -> Self {
        self.max_concurrent_clients = Some(max_concurrent_clients);
        self
    }
}

/// Client-side record: tracks who the client's primary consultant is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientProfile {
    pub user: UserId,
    /// Most recently assigned consultant
    pub primary_consultant: Option<ConsultantId>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(current: u32, max: u32, active: bool) -> ConsultantProfile {
        let now = Utc::now();
        ConsultantProfile {
            id: ConsultantId(1),
            user: UserId(10),
            full_name: "Ritesh".into(),
            email: "ritesh@example.com".into(),
            phone: String::new(),
            qualification: "CA".into(),
            experience_years: 4,
            is_active: active,
            max_concurrent_clients: max,
            current_client_count: current,
            last_assigned_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_availability() {
        assert!(profile(0, 2, true).is_available());
        assert!(!profile(2, 2, true).is_available());
        assert!(!profile(0, 2, false).is_available());
    }

    #[test]
    fn test_spare_capacity_saturates_when_over_ceiling() {
        // capacity can be lowered below the live count by an admin
        assert_eq!(profile(4, 2, true).spare_capacity(), 0);
        assert_eq!(profile(1, 5, true).spare_capacity(), 4);
    }
}
