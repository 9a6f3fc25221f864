//! End-to-end assignment scenarios against an in-memory desk
//!
//! Run with: cargo test --test assignment_tests

use caseload::{
    AssignmentStrategy, ConsultDesk, ConsultantId, DeskConfig, DeskError, NewConsultant,
    NewRequest, ReleaseReason, RequestId, RequestStatus, ServiceId, UserId,
};
use uuid::Uuid;

async fn desk() -> ConsultDesk {
    ConsultDesk::open(DeskConfig::default()).await.unwrap()
}

async fn expert(desk: &ConsultDesk, name: &str, capacity: u32, services: &[ServiceId]) -> ConsultantId {
    let consultant = desk
        .register_consultant(NewConsultant::new(UserId(1000), name).capacity(capacity))
        .await
        .unwrap();
    for service in services {
        desk.grant_expertise(consultant.id, *service).await.unwrap();
    }
    consultant.id
}

async fn submit(desk: &ConsultDesk, client: u64, service: ServiceId) -> RequestId {
    desk.submit_request(NewRequest::new(UserId(client), service))
        .await
        .unwrap()
        .request
        .id
}

async fn load(desk: &ConsultDesk, consultant: ConsultantId) -> u32 {
    desk.consultant(consultant).await.unwrap().current_client_count
}

#[tokio::test]
async fn test_least_loaded_with_id_tiebreak() {
    let desk = desk().await;
    let category = desk.create_category("Income Tax", "").await.unwrap();
    let shared = desk
        .create_service(category.id, "ITR Filing", None, "")
        .await
        .unwrap()
        .id;
    let only_a = desk
        .create_service(category.id, "Tax Audit", None, "")
        .await
        .unwrap()
        .id;
    let only_b = desk
        .create_service(category.id, "Advance Tax", None, "")
        .await
        .unwrap()
        .id;
    let only_c = desk
        .create_service(category.id, "TDS Return", None, "")
        .await
        .unwrap()
        .id;

    let a = expert(&desk, "A", 5, &[shared, only_a]).await;
    let b = expert(&desk, "B", 5, &[shared, only_b]).await;
    let c = expert(&desk, "C", 5, &[shared, only_c]).await;

    for client in 0..3 {
        let request = submit(&desk, client, only_a).await;
        desk.assign(request).await.unwrap();
    }
    let request = submit(&desk, 10, only_b).await;
    desk.assign(request).await.unwrap();
    let request = submit(&desk, 11, only_c).await;
    desk.assign(request).await.unwrap();

    assert_eq!(load(&desk, a).await, 3);
    assert_eq!(load(&desk, b).await, 1);
    assert_eq!(load(&desk, c).await, 1);

    let request = submit(&desk, 20, shared).await;
    let assignment = desk.assign(request).await.unwrap();
    assert_eq!(assignment.consultant.id, b);
    assert_eq!(load(&desk, b).await, 2);
    desk.verify_workload().await.unwrap();
}

#[tokio::test]
async fn test_capacity_two_consultant_with_service_38() {
    let desk = desk().await;
    let category = desk.create_category("GST", "").await.unwrap();
    let mut service = ServiceId(0);
    for n in 1..=38 {
        service = desk
            .create_service(category.id, &format!("GST Service {}", n), None, "")
            .await
            .unwrap()
            .id;
    }
    assert_eq!(service, ServiceId(38));

    let x = expert(&desk, "X", 2, &[service]).await;
    let r1 = submit(&desk, 1, service).await;
    let r2 = submit(&desk, 2, service).await;
    let r3 = submit(&desk, 3, service).await;

    assert_eq!(desk.assign(r1).await.unwrap().consultant.id, x);
    assert_eq!(desk.assign(r2).await.unwrap().consultant.id, x);
    let err = desk.assign(r3).await.unwrap_err();
    assert!(matches!(
        err,
        DeskError::NoEligibleConsultant { service: s } if s == ServiceId(38)
    ));

    let r3 = desk.request(r3).await.unwrap();
    assert_eq!(r3.status, RequestStatus::Pending);
    assert_eq!(r3.assigned_consultant, None);
    assert_eq!(load(&desk, x).await, 2);
    desk.verify_workload().await.unwrap();
}

#[tokio::test]
async fn test_never_assigns_inactive_non_expert_or_full() {
    let desk = desk().await;
    let category = desk.create_category("Registration", "").await.unwrap();
    let service = desk
        .create_service(category.id, "Company Incorporation", None, "")
        .await
        .unwrap()
        .id;
    let other = desk
        .create_service(category.id, "LLP Incorporation", None, "")
        .await
        .unwrap()
        .id;

    let inactive = expert(&desk, "Inactive", 5, &[service]).await;
    desk.set_consultant_active(inactive, false).await.unwrap();
    let _non_expert = expert(&desk, "Elsewhere", 5, &[other]).await;
    let full = expert(&desk, "Full", 1, &[service]).await;
    let busy = submit(&desk, 1, service).await;
    assert_eq!(desk.assign(busy).await.unwrap().consultant.id, full);

    let request = submit(&desk, 2, service).await;
    assert!(matches!(
        desk.assign(request).await,
        Err(DeskError::NoEligibleConsultant { .. })
    ));

    desk.set_consultant_active(inactive, true).await.unwrap();
    assert_eq!(desk.assign(request).await.unwrap().consultant.id, inactive);
}

#[tokio::test]
async fn test_release_after_assign_restores_count() {
    let desk = desk().await;
    let category = desk.create_category("GST", "").await.unwrap();
    let service = desk
        .create_service(category.id, "GST Return", None, "")
        .await
        .unwrap()
        .id;
    let consultant = expert(&desk, "Asha", 3, &[service]).await;

    for reason in [
        ReleaseReason::Completed,
        ReleaseReason::Cancelled,
        ReleaseReason::Unassigned,
    ] {
        let before = load(&desk, consultant).await;
        let request = submit(&desk, 5, service).await;
        desk.assign(request).await.unwrap();
        assert_eq!(load(&desk, consultant).await, before + 1);

        let released = desk.release(request, reason).await.unwrap();
        assert_eq!(released.status, reason.target_status());
        assert_eq!(load(&desk, consultant).await, before);
    }

    desk.verify_workload().await.unwrap();
}

#[tokio::test]
async fn test_invariant_holds_after_every_operation() {
    let desk = desk().await;
    let category = desk.create_category("Income Tax", "").await.unwrap();
    let service = desk
        .create_service(category.id, "ITR Filing", None, "")
        .await
        .unwrap()
        .id;
    let first = expert(&desk, "First", 2, &[service]).await;
    let _second = expert(&desk, "Second", 2, &[service]).await;

    let requests = [
        submit(&desk, 1, service).await,
        submit(&desk, 2, service).await,
        submit(&desk, 3, service).await,
    ];
    desk.verify_workload().await.unwrap();

    for request in requests {
        desk.assign(request).await.unwrap();
        desk.verify_workload().await.unwrap();
    }

    desk.advance(requests[0], RequestStatus::DocPending)
        .await
        .unwrap();
    desk.advance(requests[0], RequestStatus::Wip).await.unwrap();
    desk.verify_workload().await.unwrap();

    // the third request sits with First; Second still has room
    let moved = desk.reassign(requests[2]).await.unwrap();
    assert_ne!(moved.consultant.id, first);
    desk.verify_workload().await.unwrap();

    desk.complete(requests[0]).await.unwrap();
    desk.cancel(requests[1]).await.unwrap();
    desk.unassign(requests[2]).await.unwrap();
    desk.verify_workload().await.unwrap();

    desk.set_capacity(first, 1).await.unwrap();
    desk.assign(requests[2]).await.unwrap();
    let report = desk.verify_workload().await.unwrap();
    assert!(report.entries.iter().all(|entry| entry.is_consistent()));
}

#[tokio::test]
async fn test_invalid_transitions_are_rejected() {
    let desk = desk().await;
    let category = desk.create_category("GST", "").await.unwrap();
    let service = desk
        .create_service(category.id, "GST Return", None, "")
        .await
        .unwrap()
        .id;
    expert(&desk, "Asha", 3, &[service]).await;
    let request = submit(&desk, 1, service).await;

    assert!(matches!(
        desk.complete(request).await,
        Err(DeskError::InvalidTransition {
            from: RequestStatus::Pending,
            to: RequestStatus::Completed,
            ..
        })
    ));

    desk.assign(request).await.unwrap();
    desk.complete(request).await.unwrap();
    assert!(matches!(
        desk.advance(request, RequestStatus::Wip).await,
        Err(DeskError::InvalidTransition { .. })
    ));
    assert!(matches!(
        desk.assign(request).await,
        Err(DeskError::InvalidTransition { .. })
    ));
    assert!(matches!(
        desk.assign(RequestId(999)).await,
        Err(DeskError::NotFound { entity: "request", id: 999 })
    ));
}

#[tokio::test]
async fn test_reassign_excludes_previous_and_is_atomic() {
    let desk = desk().await;
    let category = desk.create_category("GST", "").await.unwrap();
    let service = desk
        .create_service(category.id, "GST Return", None, "")
        .await
        .unwrap()
        .id;
    let first = expert(&desk, "First", 3, &[service]).await;
    let request = submit(&desk, 1, service).await;
    desk.assign(request).await.unwrap();

    // nobody else qualifies yet
    let err = desk.reassign(request).await.unwrap_err();
    assert!(matches!(err, DeskError::NoEligibleConsultant { .. }));
    let unchanged = desk.request(request).await.unwrap();
    assert_eq!(unchanged.status, RequestStatus::Assigned);
    assert_eq!(unchanged.assigned_consultant, Some(first));
    assert_eq!(load(&desk, first).await, 1);

    let second = expert(&desk, "Second", 3, &[service]).await;
    let moved = desk.reassign(request).await.unwrap();
    assert_eq!(moved.consultant.id, second);
    assert_eq!(load(&desk, first).await, 0);
    assert_eq!(load(&desk, second).await, 1);
    desk.verify_workload().await.unwrap();
}

#[tokio::test]
async fn test_familiar_first_prefers_previous_consultant() {
    let desk = ConsultDesk::open(DeskConfig::new().strategy(AssignmentStrategy::FamiliarFirst))
        .await
        .unwrap();
    let category = desk.create_category("Income Tax", "").await.unwrap();
    let service = desk
        .create_service(category.id, "ITR Filing", None, "")
        .await
        .unwrap()
        .id;
    let early = expert(&desk, "Early", 5, &[service]).await;
    let late = expert(&desk, "Late", 5, &[service]).await;

    // client 7 is served by Late while Early is busy elsewhere
    let filler = submit(&desk, 50, service).await;
    desk.assign(filler).await.unwrap();
    let first_visit = submit(&desk, 7, service).await;
    assert_eq!(desk.assign(first_visit).await.unwrap().consultant.id, late);
    desk.complete(first_visit).await.unwrap();
    desk.complete(filler).await.unwrap();

    // both idle now; least-loaded alone would pick Early
    let second_visit = submit(&desk, 7, service).await;
    assert_eq!(desk.assign(second_visit).await.unwrap().consultant.id, late);
    assert_eq!(
        desk.client_profile(UserId(7))
            .await
            .unwrap()
            .primary_consultant,
        Some(late)
    );

    let newcomer = submit(&desk, 8, service).await;
    assert_eq!(desk.assign(newcomer).await.unwrap().consultant.id, early);
}

#[tokio::test]
async fn test_submit_request_key_is_idempotent() {
    let desk = desk().await;
    let category = desk.create_category("GST", "").await.unwrap();
    let service = desk
        .create_service(category.id, "GST Return", None, "")
        .await
        .unwrap()
        .id;
    let key = Uuid::new_v4();

    let first = desk
        .submit_request(NewRequest::new(UserId(1), service).request_key(key))
        .await
        .unwrap();
    let again = desk
        .submit_request(NewRequest::new(UserId(1), service).request_key(key))
        .await
        .unwrap();

    assert!(first.created);
    assert!(!again.created);
    assert_eq!(first.request.id, again.request.id);
    assert_eq!(desk.requests_of_client(UserId(1)).await.len(), 1);
}

#[tokio::test]
async fn test_lowered_capacity_blocks_new_work_only() {
    let desk = desk().await;
    let category = desk.create_category("GST", "").await.unwrap();
    let service = desk
        .create_service(category.id, "GST Return", None, "")
        .await
        .unwrap()
        .id;
    let consultant = expert(&desk, "Asha", 3, &[service]).await;
    let a = submit(&desk, 1, service).await;
    let b = submit(&desk, 2, service).await;
    desk.assign(a).await.unwrap();
    desk.assign(b).await.unwrap();

    desk.set_capacity(consultant, 1).await.unwrap();
    assert_eq!(load(&desk, consultant).await, 2);
    let c = submit(&desk, 3, service).await;
    assert!(desk.assign(c).await.is_err());

    desk.complete(a).await.unwrap();
    desk.complete(b).await.unwrap();
    assert_eq!(desk.assign(c).await.unwrap().consultant.id, consultant);
    assert!(desk.set_capacity(consultant, 0).await.is_err());
}
