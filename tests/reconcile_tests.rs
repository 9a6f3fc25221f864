//! Paid-order reconciliation tests
//!
//! Run with: cargo test --test reconcile_tests

use caseload::{
    ConsultDesk, ConsultantId, DeskError, ItemOutcome, NewConsultant, NewOrder, NewOrderItem,
    OrderId, OrderStatus, PaymentConfirmation, RequestStatus, ServiceId, UserId,
};
use rust_decimal::Decimal;

struct Catalog {
    desk: ConsultDesk,
    itr: ServiceId,
    gst: ServiceId,
    consultant: ConsultantId,
}

async fn catalog(capacity: u32) -> Catalog {
    let desk = ConsultDesk::new();
    let tax = desk.create_category("Income Tax", "").await.unwrap();
    let itr = desk
        .create_service(tax.id, "ITR Filing", Some(Decimal::new(99_900, 2)), "2 days")
        .await
        .unwrap()
        .id;
    let gst = desk
        .create_service(tax.id, "GST Return", Some(Decimal::new(49_900, 2)), "3 days")
        .await
        .unwrap()
        .id;
    let consultant = desk
        .register_consultant(NewConsultant::new(UserId(500), "Ravi").capacity(capacity))
        .await
        .unwrap()
        .id;
    let grant = desk
        .grant_category_expertise(consultant, &["income tax".to_string()])
        .await
        .unwrap();
    assert_eq!(grant.granted.len(), 2);

    Catalog {
        desk,
        itr,
        gst,
        consultant,
    }
}

fn item(service: Option<ServiceId>, title: &str, price: i64) -> NewOrderItem {
    NewOrderItem {
        service,
        category: "Income Tax".into(),
        title: title.into(),
        variant_name: None,
        price: Decimal::new(price, 2),
        quantity: 1,
    }
}

async fn paid_order(desk: &ConsultDesk, user: u64, items: Vec<NewOrderItem>) -> OrderId {
    let order = desk
        .create_order(NewOrder {
            user: UserId(user),
            gateway_order_id: Some("order_gw_1".into()),
            items,
        })
        .await
        .unwrap();
    order.id
}

#[tokio::test]
async fn test_double_reconcile_creates_one_request_per_item() {
    let c = catalog(5).await;
    let order = paid_order(
        &c.desk,
        42,
        vec![item(Some(c.itr), "ITR Filing", 99_900), item(Some(c.gst), "GST Return", 49_900)],
    )
    .await;

    let first = c
        .desk
        .mark_order_paid(
            order,
            PaymentConfirmation {
                gateway_payment_id: Some("pay_1".into()),
                gateway_signature: Some("sig".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(first.created(), 2);
    assert_eq!(first.assigned(), 2);

    let second = c.desk.reconcile_paid_order(order).await.unwrap();
    assert!(second.is_noop());
    assert_eq!(second.already_linked(), 2);

    let requests = c.desk.requests_of_client(UserId(42)).await;
    assert_eq!(requests.len(), 2);
    for request in &requests {
        assert_eq!(request.priority, 5);
        assert_eq!(request.notes, format!("Payment completed for order #{}", order.as_u64()));
        assert_eq!(request.assigned_consultant, Some(c.consultant));
    }
    assert_eq!(
        c.desk.consultant(c.consultant).await.unwrap().current_client_count,
        2
    );
    c.desk.verify_workload().await.unwrap();

    let paid = c.desk.order(order).await.unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);
    assert_eq!(paid.gateway_payment_id.as_deref(), Some("pay_1"));
}

#[tokio::test]
async fn test_title_fallback_and_skipped_items() {
    let c = catalog(5).await;
    let order = paid_order(
        &c.desk,
        7,
        vec![
            item(None, "ITR Filing (Salaried)", 99_900),
            item(None, "Trademark Filing", 150_000),
        ],
    )
    .await;

    let report = c
        .desk
        .mark_order_paid(order, PaymentConfirmation::default())
        .await
        .unwrap();
    assert_eq!(report.items.len(), 2);
    assert!(matches!(
        report.items[0].outcome,
        ItemOutcome::Assigned { consultant, .. } if consultant == c.consultant
    ));
    assert!(matches!(report.items[1].outcome, ItemOutcome::Skipped { .. }));

    let requests = c.desk.requests_of_client(UserId(7)).await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].service, c.itr);
}

#[tokio::test]
async fn test_no_capacity_leaves_request_pending() {
    let c = catalog(1).await;
    let order = paid_order(
        &c.desk,
        9,
        vec![item(Some(c.itr), "ITR Filing", 99_900), item(Some(c.gst), "GST Return", 49_900)],
    )
    .await;

    let report = c
        .desk
        .mark_order_paid(order, PaymentConfirmation::default())
        .await
        .unwrap();
    assert_eq!(report.assigned(), 1);
    assert_eq!(report.pending(), 1);
    c.desk.verify_workload().await.unwrap();

    let ItemOutcome::Assigned { request: busy, .. } = report.items[0].outcome else {
        panic!("first item should be assigned");
    };
    let ItemOutcome::Pending { request: waiting } = report.items[1].outcome else {
        panic!("second item should be pending");
    };
    assert_eq!(
        c.desk.request(waiting).await.unwrap().status,
        RequestStatus::Pending
    );

    // reconciling again does not retry the pending assignment
    let again = c.desk.reconcile_paid_order(order).await.unwrap();
    assert_eq!(again.already_linked(), 2);

    c.desk.complete(busy).await.unwrap();
    let drained = c.desk.assign_pending().await.unwrap();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].request, waiting);
    assert_eq!(drained[0].consultant, Some(c.consultant));
    c.desk.verify_workload().await.unwrap();
}

#[tokio::test]
async fn test_only_paid_orders_are_reconciled() {
    let c = catalog(5).await;
    let order = paid_order(&c.desk, 3, vec![item(Some(c.gst), "GST Return", 49_900)]).await;

    assert!(matches!(
        c.desk.reconcile_paid_order(order).await,
        Err(DeskError::Validation(_))
    ));
    assert!(c.desk.requests_of_client(UserId(3)).await.is_empty());

    let failed = c.desk.mark_order_failed(order).await.unwrap();
    assert_eq!(failed.status, OrderStatus::Failed);
    assert!(matches!(
        c.desk
            .mark_order_paid(order, PaymentConfirmation::default())
            .await,
        Err(DeskError::Validation(_))
    ));
    assert!(matches!(
        c.desk.reconcile_paid_order(OrderId(404)).await,
        Err(DeskError::NotFound { entity: "order", .. })
    ));
}

#[tokio::test]
async fn test_repeated_payment_callback_is_harmless() {
    let c = catalog(5).await;
    let order = paid_order(&c.desk, 4, vec![item(Some(c.itr), "ITR Filing", 99_900)]).await;

    let first = c
        .desk
        .mark_order_paid(order, PaymentConfirmation::default())
        .await
        .unwrap();
    let second = c
        .desk
        .mark_order_paid(order, PaymentConfirmation::default())
        .await
        .unwrap();

    assert_eq!(first.created(), 1);
    assert!(second.is_noop());
    assert_eq!(c.desk.requests_of_client(UserId(4)).await.len(), 1);
}

#[tokio::test]
async fn test_reconcile_all_paid_orders() {
    let c = catalog(10).await;
    let a = paid_order(&c.desk, 1, vec![item(Some(c.itr), "ITR Filing", 99_900)]).await;
    let b = paid_order(&c.desk, 2, vec![item(Some(c.gst), "GST Return", 49_900)]).await;
    let unpaid = paid_order(&c.desk, 3, vec![item(Some(c.gst), "GST Return", 49_900)]).await;
    c.desk
        .mark_order_paid(a, PaymentConfirmation::default())
        .await
        .unwrap();
    c.desk
        .mark_order_paid(b, PaymentConfirmation::default())
        .await
        .unwrap();

    let reports = c.desk.reconcile_all_paid().await.unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|report| report.is_noop()));
    assert!(reports.iter().all(|report| report.order != Some(unpaid)));
    assert_eq!(
        c.desk.consultant(c.consultant).await.unwrap().current_client_count,
        2
    );
}
