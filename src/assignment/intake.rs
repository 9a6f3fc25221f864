use crate::core::{DeskError, Result};
use crate::model::{ClientServiceRequest, NewRequest, RequestStatus};
use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Result of submitting a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub request: ClientServiceRequest,
    /// `false` when the request key matched an earlier submission
    pub created: bool,
}

/// Create a pending request, or return the one already stored under the
/// same request key.
pub fn create_request(
    txn: &mut Transaction,
    new: NewRequest,
    default_priority: i32,
    now: DateTime<Utc>,
) -> Result<Submission> {
    if let Some(key) = new.request_key
        && let Some(existing) = txn.request_by_key(key)
    {
        return Ok(Submission {
            request: txn.request(existing)?,
            created: false,
        });
    }

    let service = txn.service(new.service)?;
    if !service.is_active {
        return Err(DeskError::Validation(format!(
            "{} '{}' is not active",
            service.id, service.title
        )));
    }

    let request = ClientServiceRequest {
        id: txn.sequences().next_request(),
        client: new.client,
        service: service.id,
        status: RequestStatus::Pending,
        assigned_consultant: None,
        assigned_at: None,
        priority: new.priority.unwrap_or(default_priority),
        notes: new.notes,
        request_key: new.request_key,
        order_item: None,
        created_at: now,
        updated_at: now,
        completed_at: None,
    };

    txn.put_request(request.clone())?;
    if let Some(key) = request.request_key {
        txn.put_request_key(key, request.id)?;
    }

    Ok(Submission {
        request,
        created: true,
    })
}
