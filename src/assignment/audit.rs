use crate::core::{ConsultantId, DeskError, Result, WorkloadMismatch};
use crate::storage::InMemoryStorage;
use serde::Serialize;
use std::collections::BTreeMap;

/// One consultant's stored counter next to the recomputed one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadEntry {
    pub consultant: ConsultantId,
    pub full_name: String,
    pub is_active: bool,
    pub max_concurrent_clients: u32,
    pub current_client_count: u32,
    /// Requests actually assigned to this consultant in an active status
    pub active_requests: u32,
}

impl WorkloadEntry {
    pub fn is_consistent(&self) -> bool {
        self.current_client_count == self.active_requests
    }

    pub fn spare_capacity(&self) -> u32 {
        self.max_concurrent_clients
            .saturating_sub(self.current_client_count)
    }
}

/// Workload of every consultant as of one committed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadReport {
    pub commit_version: u64,
    pub entries: Vec<WorkloadEntry>,
}

impl WorkloadReport {
    pub fn from_storage(storage: &InMemoryStorage) -> Self {
        let mut active: BTreeMap<ConsultantId, u32> = BTreeMap::new();
        for request in storage.requests().values() {
            if let Some(consultant) = request.assigned_consultant
                && request.status.is_active()
            {
                *active.entry(consultant).or_default() += 1;
            }
        }

        let entries = storage
            .consultants()
            .values()
            .map(|consultant| WorkloadEntry {
                consultant: consultant.id,
                full_name: consultant.full_name.clone(),
                is_active: consultant.is_active,
                max_concurrent_clients: consultant.max_concurrent_clients,
                current_client_count: consultant.current_client_count,
                active_requests: active.get(&consultant.id).copied().unwrap_or(0),
            })
            .collect();

        Self {
            commit_version: storage.commit_version(),
            entries,
        }
    }

    pub fn mismatches(&self) -> Vec<WorkloadMismatch> {
        self.entries
            .iter()
            .filter(|entry| !entry.is_consistent())
            .map(|entry| WorkloadMismatch {
                consultant: entry.consultant,
                stored: entry.current_client_count,
                actual: entry.active_requests,
            })
            .collect()
    }

    /// `InvariantViolation` listing every inconsistent consultant. Nothing is
    /// corrected.
    pub fn verify(&self) -> Result<()> {
        let mismatches = self.mismatches();
        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(DeskError::InvariantViolation(mismatches))
        }
    }
}
