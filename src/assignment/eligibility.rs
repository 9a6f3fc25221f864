use crate::core::{ConsultantId, ServiceId, UserId};
use crate::model::{ClientServiceRequest, ConsultantProfile, RequestStatus};
use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;

/// Consultants that may take a new request for `service`: expertise held,
/// active, below capacity. Sorted least-loaded first, ties by lowest id.
///
/// Every candidate's consultant row lands in the read set, so a concurrent
/// assignment to any of them invalidates this transaction at commit.
pub fn eligible_consultants(
    txn: &mut Transaction,
    service: ServiceId,
    exclude: Option<ConsultantId>,
) -> Vec<ConsultantProfile> {
    let mut candidates: Vec<ConsultantProfile> = txn
        .experts_for(service)
        .into_iter()
        .filter(ConsultantProfile::is_available)
        .filter(|consultant| Some(consultant.id) != exclude)
        .collect();
    sort_least_loaded(&mut candidates);
    candidates
}

fn sort_least_loaded(candidates: &mut [ConsultantProfile]) {
    candidates.sort_by_key(|consultant| (consultant.current_client_count, consultant.id));
}

/// Most recent interaction of each consultant with one client, newest first,
/// truncated to `window` consultants.
pub fn recent_consultants(
    history: &[ClientServiceRequest],
    window: usize,
) -> Vec<(ConsultantId, DateTime<Utc>)> {
    let mut interactions: Vec<(ConsultantId, DateTime<Utc>)> = history
        .iter()
        .filter(|request| request.status.is_active() || request.status == RequestStatus::Completed)
        .filter_map(|request| {
            let consultant = request.assigned_consultant?;
            let at = request.assigned_at.unwrap_or(request.created_at);
            Some((consultant, at))
        })
        .collect();
    interactions.sort_by_key(|(consultant, at)| (Reverse(*at), *consultant));

    let mut recent: Vec<(ConsultantId, DateTime<Utc>)> = Vec::new();
    for (consultant, at) in interactions {
        if recent.len() == window {
            break;
        }
        if !recent.iter().any(|(seen, _)| *seen == consultant) {
            recent.push((consultant, at));
        }
    }
    recent
}

/// Eligible consultant who most recently served `client`, if any. Ties on
/// recency fall back to load, then id.
pub fn familiar_pick(
    txn: &mut Transaction,
    client: UserId,
    eligible: &[ConsultantProfile],
    window: usize,
) -> Option<ConsultantId> {
    let history = txn.requests_of_client(client);
    recent_consultants(&history, window)
        .into_iter()
        .filter_map(|(consultant, at)| {
            eligible
                .iter()
                .find(|candidate| candidate.id == consultant)
                .map(|candidate| (at, candidate))
        })
        .min_by_key(|(at, candidate)| {
            (
                Reverse(*at),
                candidate.current_client_count,
                candidate.id,
            )
        })
        .map(|(_, candidate)| candidate.id)
}
