// ============================================================================
// Paid-Order Reconciliation
// ============================================================================
//
// Turns the items of a paid order into service requests. Each item is
// handled in its own transaction: create the request, link the item, try to
// assign. The item link makes the whole thing idempotent.
//
// ============================================================================

use super::resolver::AssignmentResolver;
use crate::core::{ConsultantId, DeskError, OrderId, OrderItemId, RequestId, Result, ServiceId};
use crate::model::{ClientServiceRequest, OrderItem, OrderStatus, RequestStatus, ServiceOrder};
use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{Level, event};
use uuid::Uuid;

/// Namespace for request keys derived from order items.
const ORDER_ITEM_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b0e_93d4_4a57_b1c8_0e7d_5a92_c3f4);

/// Stable request key for the request generated from `item`.
pub fn request_key_for_item(item: OrderItemId) -> Uuid {
    Uuid::new_v5(
        &ORDER_ITEM_NAMESPACE,
        format!("order_item:{}", item.as_u64()).as_bytes(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Request created and bound to a consultant
    Assigned {
        request: RequestId,
        consultant: ConsultantId,
    },
    /// Request created; nobody had capacity, so it waits in the queue
    Pending { request: RequestId },
    /// An earlier reconciliation already handled this item
    AlreadyLinked { request: RequestId },
    /// No service could be resolved for the item
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReconciliation {
    pub item: OrderItemId,
    pub title: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub order: Option<OrderId>,
    pub items: Vec<ItemReconciliation>,
}

impl ReconciliationReport {
    pub fn new(order: OrderId) -> Self {
        Self {
            order: Some(order),
            items: Vec::new(),
        }
    }

    fn count(&self, matches: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|item| matches(&item.outcome)).count()
    }

    /// Requests created by this run.
    pub fn created(&self) -> usize {
        self.assigned() + self.pending()
    }

    pub fn assigned(&self) -> usize {
        self.count(|outcome| matches!(outcome, ItemOutcome::Assigned { .. }))
    }

    pub fn pending(&self) -> usize {
        self.count(|outcome| matches!(outcome, ItemOutcome::Pending { .. }))
    }

    pub fn already_linked(&self) -> usize {
        self.count(|outcome| matches!(outcome, ItemOutcome::AlreadyLinked { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, ItemOutcome::Skipped { .. }))
    }

    pub fn is_noop(&self) -> bool {
        self.created() == 0
    }
}

pub struct Reconciler<'a> {
    resolver: &'a AssignmentResolver,
    paid_priority: i32,
}

impl<'a> Reconciler<'a> {
    pub fn new(resolver: &'a AssignmentResolver, paid_priority: i32) -> Self {
        Self {
            resolver,
            paid_priority,
        }
    }

    /// The order, provided it has been paid.
    pub fn paid_order(txn: &mut Transaction, order_id: OrderId) -> Result<ServiceOrder> {
        let order = txn.order(order_id)?;
        if order.status != OrderStatus::Paid {
            return Err(DeskError::Validation(format!(
                "{} is {}, only paid orders are reconciled",
                order_id, order.status
            )));
        }
        Ok(order)
    }

    /// Reconcile one item of a paid order.
    pub fn reconcile_item(
        &self,
        txn: &mut Transaction,
        order_id: OrderId,
        item_id: OrderItemId,
        now: DateTime<Utc>,
    ) -> Result<ItemReconciliation> {
        let order = Self::paid_order(txn, order_id)?;
        let item = txn.order_item(item_id)?;
        if item.order != order.id {
            return Err(DeskError::Validation(format!(
                "{} does not belong to {}",
                item_id, order_id
            )));
        }

        let outcome = self.reconcile_linked(txn, &order, &item, now)?;
        Ok(ItemReconciliation {
            item: item.id,
            title: item.service_title,
            outcome,
        })
    }

    fn reconcile_linked(
        &self,
        txn: &mut Transaction,
        order: &ServiceOrder,
        item: &OrderItem,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome> {
        if let Some(request) = txn.item_link(item.id) {
            event!(
                Level::DEBUG,
                item = %item.id,
                request = %request,
                "order item already reconciled"
            );
            return Ok(ItemOutcome::AlreadyLinked { request });
        }

        let Some(service) = Self::resolve_service(txn, item)? else {
            event!(
                Level::WARN,
                order = %order.id,
                item = %item.id,
                title = %item.service_title,
                "no service matches order item"
            );
            return Ok(ItemOutcome::Skipped {
                reason: format!("no service matches '{}'", item.service_title),
            });
        };

        let key = request_key_for_item(item.id);
        let request = match txn.request_by_key(key) {
            Some(existing) => {
                let existing = txn.request(existing)?;
                txn.link_order_item(item.id, existing.id)?;
                if existing.status != RequestStatus::Pending {
                    return Ok(match existing.assigned_consultant {
                        Some(consultant) => ItemOutcome::Assigned {
                            request: existing.id,
                            consultant,
                        },
                        None => ItemOutcome::Pending {
                            request: existing.id,
                        },
                    });
                }
                existing.id
            }
            None => {
                let request = ClientServiceRequest {
                    id: txn.sequences().next_request(),
                    client: order.user,
                    service,
                    status: RequestStatus::Pending,
                    assigned_consultant: None,
                    assigned_at: None,
                    priority: self.paid_priority,
                    notes: format!("Payment completed for order #{}", order.id.as_u64()),
                    request_key: Some(key),
                    order_item: Some(item.id),
                    created_at: now,
                    updated_at: now,
                    completed_at: None,
                };
                txn.put_request(request.clone())?;
                txn.put_request_key(key, request.id)?;
                txn.link_order_item(item.id, request.id)?;
                request.id
            }
        };

        match self.resolver.assign(txn, request, now) {
            Ok(assignment) => Ok(ItemOutcome::Assigned {
                request,
                consultant: assignment.consultant.id,
            }),
            Err(DeskError::NoEligibleConsultant { service }) => {
                event!(
                    Level::INFO,
                    request = %request,
                    service = %service,
                    "paid request left pending, no consultant available"
                );
                Ok(ItemOutcome::Pending { request })
            }
            Err(err) => Err(err),
        }
    }

    /// The item's own service reference, or an active service whose title
    /// matches the item title without its variant suffix.
    fn resolve_service(txn: &mut Transaction, item: &OrderItem) -> Result<Option<ServiceId>> {
        if let Some(service) = item.service {
            return match txn.service(service) {
                Ok(service) => Ok(Some(service.id)),
                Err(DeskError::NotFound { .. }) => Ok(None),
                Err(err) => Err(err),
            };
        }

        let matched = txn
            .view()
            .find_service_by_title(item.base_title())
            .map(|service| service.id);
        match matched {
            Some(id) => Ok(Some(txn.service(id)?.id)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(item: u64, outcome: ItemOutcome) -> ItemReconciliation {
        ItemReconciliation {
            item: OrderItemId(item),
            title: String::new(),
            outcome,
        }
    }

    #[test]
    fn test_request_key_is_stable_per_item() {
        assert_eq!(
            request_key_for_item(OrderItemId(12)),
            request_key_for_item(OrderItemId(12))
        );
        assert_ne!(
            request_key_for_item(OrderItemId(12)),
            request_key_for_item(OrderItemId(13))
        );
    }

    #[test]
    fn test_report_counts() {
        let mut report = ReconciliationReport::new(OrderId(4));
        report.items.push(entry(
            1,
            ItemOutcome::Assigned {
                request: RequestId(1),
                consultant: ConsultantId(2),
            },
        ));
        report.items.push(entry(2, ItemOutcome::Pending { request: RequestId(2) }));
        report.items.push(entry(
            3,
            ItemOutcome::Skipped {
                reason: "no service".into(),
            },
        ));
        assert_eq!(report.created(), 2);
        assert_eq!(report.skipped(), 1);
        assert!(!report.is_noop());

        let mut again = ReconciliationReport::new(OrderId(4));
        again
            .items
            .push(entry(1, ItemOutcome::AlreadyLinked { request: RequestId(1) }));
        assert!(again.is_noop());
        assert_eq!(again.already_linked(), 1);
    }
}
