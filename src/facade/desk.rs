use crate::assignment::{
    Assignment, AssignmentResolver, ReconciliationReport, Reconciler, ReleaseReason, Submission,
    WorkloadReport, create_request,
};
use crate::config::DeskConfig;
use crate::core::{
    CategoryId, ConsultantId, DeskError, OrderId, RequestId, Result, ServiceId, UserId,
};
use crate::model::{
    ClientProfile, ClientServiceRequest, ConsultantProfile, Expertise, ExpertiseKey,
    NewConsultant, NewOrder, NewRequest, OrderItem, OrderStatus, PaymentConfirmation,
    RequestStatus, Service, ServiceCategory, ServiceOrder,
};
use crate::storage::{InMemoryStorage, PersistenceManager};
use crate::transaction::{Transaction, TransactionManager, TransactionStats};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use tracing::{Instrument, Level, event, info_span};

/// Outcome of a bulk expertise grant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpertiseGrant {
    pub granted: Vec<ServiceId>,
    pub already_present: Vec<ServiceId>,
    pub unknown_categories: Vec<String>,
}

/// Result of one attempt to drain the pending queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueAssignment {
    pub request: RequestId,
    pub consultant: Option<ConsultantId>,
}

/// The consultation desk: catalog, roster, requests and orders behind one
/// async API.
///
/// Every operation runs as a serializable transaction; write-write conflicts
/// are retried with exponential backoff according to `DeskConfig::retry`.
pub struct ConsultDesk {
    config: DeskConfig,
    manager: TransactionManager,
    resolver: AssignmentResolver,
}

impl Default for ConsultDesk {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsultDesk {
    /// In-memory desk with default configuration.
    pub fn new() -> Self {
        let config = DeskConfig::default();
        Self {
            resolver: AssignmentResolver::from_config(&config),
            manager: TransactionManager::new(InMemoryStorage::new()),
            config,
        }
    }

    /// Open a desk. With a data directory the store is recovered from its
    /// snapshot and journal, and every commit is journaled.
    pub async fn open(config: DeskConfig) -> Result<Self> {
        config.validate()?;

        let manager = match &config.data_dir {
            Some(dir) => {
                let mut persistence =
                    PersistenceManager::new(dir, config.durability, config.checkpoint_every)?;
                let storage = persistence.recover()?;
                event!(
                    Level::INFO,
                    data_dir = %dir.display(),
                    durability = ?config.durability,
                    consultants = storage.consultants().len(),
                    requests = storage.requests().len(),
                    "desk opened"
                );
                TransactionManager::with_persistence(storage, persistence)
            }
            None => TransactionManager::new(InMemoryStorage::new()),
        };

        Ok(Self {
            resolver: AssignmentResolver::from_config(&config),
            manager,
            config,
        })
    }

    pub fn config(&self) -> &DeskConfig {
        &self.config
    }

    pub fn is_persistent(&self) -> bool {
        self.manager.is_persistent()
    }

    /// Run `body` in a transaction and commit it.
    ///
    /// The body may run several times: only `WriteConflict` is retried, up to
    /// `retry.max_attempts`, after which `TransientFailure` is returned. Any
    /// other error rolls the transaction back and is returned as is.
    pub async fn transaction<T, F>(&self, name: &'static str, mut body: F) -> Result<T>
    where
        F: FnMut(&mut Transaction) -> Result<T> + Send,
        T: Send,
    {
        let retry = &self.config.retry;
        let span = info_span!("transaction", name);

        async move {
            let mut attempt = 1usize;
            loop {
                let mut txn = self.manager.begin().await;
                let result = match body(&mut txn) {
                    Ok(value) => self.manager.commit(txn).await.map(|_| value),
                    Err(err) => {
                        self.manager.rollback(txn)?;
                        Err(err)
                    }
                };

                match result {
                    Err(err) if err.is_retryable() => {
                        if attempt >= retry.max_attempts.max(1) {
                            event!(
                                Level::WARN,
                                attempts = attempt,
                                error = %err,
                                "giving up after repeated conflicts"
                            );
                            return Err(DeskError::TransientFailure {
                                attempts: attempt,
                                last: err.to_string(),
                            });
                        }

                        let backoff_ms = retry.backoff_ms(attempt);
                        event!(
                            Level::WARN,
                            attempt,
                            max_attempts = retry.max_attempts,
                            backoff_ms,
                            error = %err,
                            "retrying transaction on conflict"
                        );
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                        attempt += 1;
                    }
                    other => return other,
                }
            }
        }
        .instrument(span)
        .await
    }

    // ------------------------------------------------------------------------
    // Catalog and roster administration
    // ------------------------------------------------------------------------

    pub async fn create_category(
        &self,
        name: &str,
        description: &str,
    ) -> Result<ServiceCategory> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DeskError::Validation("category name is empty".into()));
        }

        self.transaction("create_category", |txn| {
            if txn.category_named(name).is_some() {
                return Err(DeskError::Validation(format!(
                    "category '{}' already exists",
                    name
                )));
            }
            let category = ServiceCategory {
                id: txn.sequences().next_category(),
                name: name.to_string(),
                description: description.to_string(),
                is_active: true,
                created_at: Utc::now(),
            };
            txn.put_category(category.clone())?;
            Ok(category)
        })
        .await
    }

    pub async fn create_service(
        &self,
        category: CategoryId,
        title: &str,
        price: Option<Decimal>,
        tat: &str,
    ) -> Result<Service> {
        let title = title.trim();
        if title.is_empty() {
            return Err(DeskError::Validation("service title is empty".into()));
        }
        if price.is_some_and(|price| price.is_sign_negative()) {
            return Err(DeskError::Validation(format!(
                "price of '{}' is negative",
                title
            )));
        }

        self.transaction("create_service", |txn| {
            let category = txn.category(category)?;
            if txn.service_titled(category.id, title).is_some() {
                return Err(DeskError::Validation(format!(
                    "service '{}' already exists in '{}'",
                    title, category.name
                )));
            }

            let service = Service {
                id: txn.sequences().next_service(),
                category: category.id,
                title: title.to_string(),
                price,
                tat: tat.to_string(),
                is_active: true,
                created_at: Utc::now(),
            };
            txn.put_service(service.clone())?;
            Ok(service)
        })
        .await
    }

    pub async fn register_consultant(&self, new: NewConsultant) -> Result<ConsultantProfile> {
        let capacity = new
            .max_concurrent_clients
            .unwrap_or(self.config.default_max_concurrent_clients);
        if capacity == 0 {
            return Err(DeskError::Validation(
                "max_concurrent_clients must be > 0".into(),
            ));
        }

        let consultant = self
            .transaction("register_consultant", |txn| {
                let now = Utc::now();
                let consultant = ConsultantProfile {
                    id: txn.sequences().next_consultant(),
                    user: new.user,
                    full_name: new.full_name.clone(),
                    email: new.email.clone(),
                    phone: new.phone.clone(),
                    qualification: new.qualification.clone(),
                    experience_years: new.experience_years,
                    is_active: true,
                    max_concurrent_clients: capacity,
                    current_client_count: 0,
                    last_assigned_at: None,
                    created_at: now,
                    updated_at: now,
                };
                txn.put_consultant(consultant.clone())?;
                Ok(consultant)
            })
            .await?;

        event!(
            Level::INFO,
            consultant = %consultant.id,
            capacity,
            "consultant registered"
        );
        Ok(consultant)
    }

    /// Inactive consultants keep their current requests but get no new ones.
    pub async fn set_consultant_active(
        &self,
        consultant: ConsultantId,
        active: bool,
    ) -> Result<ConsultantProfile> {
        self.transaction("set_consultant_active", |txn| {
            let mut profile = txn.consultant(consultant)?;
            profile.is_active = active;
            profile.updated_at = Utc::now();
            txn.put_consultant(profile.clone())?;
            Ok(profile)
        })
        .await
    }

    /// Change the capacity ceiling. Lowering it below the current workload is
    /// allowed; the consultant simply gets nothing new until below it again.
    pub async fn set_capacity(
        &self,
        consultant: ConsultantId,
        max_concurrent_clients: u32,
    ) -> Result<ConsultantProfile> {
        if max_concurrent_clients == 0 {
            return Err(DeskError::Validation(
                "max_concurrent_clients must be > 0".into(),
            ));
        }

        self.transaction("set_capacity", |txn| {
            let mut profile = txn.consultant(consultant)?;
            profile.max_concurrent_clients = max_concurrent_clients;
            profile.updated_at = Utc::now();
            txn.put_consultant(profile.clone())?;
            Ok(profile)
        })
        .await
    }

    /// Returns `false` when the consultant already held the expertise.
    pub async fn grant_expertise(
        &self,
        consultant: ConsultantId,
        service: ServiceId,
    ) -> Result<bool> {
        self.transaction("grant_expertise", |txn| {
            txn.consultant(consultant)?;
            txn.service(service)?;
            Self::grant(txn, ExpertiseKey { consultant, service })
        })
        .await
    }

    /// Grant every active service of the named categories. Names match
    /// case-insensitively; unknown names are reported, not rejected.
    pub async fn grant_category_expertise(
        &self,
        consultant: ConsultantId,
        categories: &[String],
    ) -> Result<ExpertiseGrant> {
        self.transaction("grant_category_expertise", |txn| {
            txn.consultant(consultant)?;

            let mut outcome = ExpertiseGrant::default();
            let mut services = Vec::new();
            for name in categories {
                let Some(category) = txn.category_named(name) else {
                    outcome.unknown_categories.push(name.clone());
                    continue;
                };
                services.extend(
                    txn.view()
                        .services()
                        .values()
                        .filter(|service| service.category == category && service.is_active)
                        .map(|service| service.id),
                );
            }

            for service in services {
                txn.service(service)?;
                if Self::grant(txn, ExpertiseKey { consultant, service })? {
                    outcome.granted.push(service);
                } else {
                    outcome.already_present.push(service);
                }
            }
            Ok(outcome)
        })
        .await
    }

    /// Returns `false` when there was nothing to revoke. Requests already
    /// assigned are not touched.
    pub async fn revoke_expertise(
        &self,
        consultant: ConsultantId,
        service: ServiceId,
    ) -> Result<bool> {
        self.transaction("revoke_expertise", |txn| {
            let key = ExpertiseKey { consultant, service };
            if txn.expertise(key).is_none() {
                return Ok(false);
            }
            txn.remove_expertise(key)?;
            Ok(true)
        })
        .await
    }

    fn grant(txn: &mut Transaction, key: ExpertiseKey) -> Result<bool> {
        if txn.expertise(key).is_some() {
            return Ok(false);
        }
        txn.put_expertise(Expertise {
            consultant: key.consultant,
            service: key.service,
            added_at: Utc::now(),
        })?;
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    /// Create a pending request. A repeated `request_key` returns the
    /// request created the first time.
    pub async fn submit_request(&self, new: NewRequest) -> Result<Submission> {
        let default_priority = self.config.default_priority;
        self.transaction("submit_request", |txn| {
            create_request(txn, new.clone(), default_priority, Utc::now())
        })
        .await
    }

    pub async fn assign(&self, request: RequestId) -> Result<Assignment> {
        self.transaction("assign", |txn| {
            self.resolver.assign(txn, request, Utc::now())
        })
        .await
    }

    pub async fn release(
        &self,
        request: RequestId,
        reason: ReleaseReason,
    ) -> Result<ClientServiceRequest> {
        self.transaction("release", |txn| {
            self.resolver.release(txn, request, reason, Utc::now())
        })
        .await
    }

    pub async fn complete(&self, request: RequestId) -> Result<ClientServiceRequest> {
        self.release(request, ReleaseReason::Completed).await
    }

    /// Put an active request back in the queue.
    pub async fn unassign(&self, request: RequestId) -> Result<ClientServiceRequest> {
        self.release(request, ReleaseReason::Unassigned).await
    }

    pub async fn cancel(&self, request: RequestId) -> Result<ClientServiceRequest> {
        self.transaction("cancel", |txn| {
            self.resolver.cancel(txn, request, Utc::now())
        })
        .await
    }

    /// Hand an active request to a different consultant, or change nothing.
    pub async fn reassign(&self, request: RequestId) -> Result<Assignment> {
        self.transaction("reassign", |txn| {
            self.resolver.reassign(txn, request, Utc::now())
        })
        .await
    }

    pub async fn advance(
        &self,
        request: RequestId,
        status: RequestStatus,
    ) -> Result<ClientServiceRequest> {
        self.transaction("advance", |txn| {
            self.resolver.advance(txn, request, status, Utc::now())
        })
        .await
    }

    /// Try to assign every pending request, most urgent first. Requests for
    /// which nobody has capacity stay pending.
    pub async fn assign_pending(&self) -> Result<Vec<QueueAssignment>> {
        let queue: Vec<RequestId> = self
            .pending_requests()
            .await
            .into_iter()
            .map(|request| request.id)
            .collect();

        let mut outcomes = Vec::with_capacity(queue.len());
        for request in queue {
            let consultant = match self.assign(request).await {
                Ok(assignment) => Some(assignment.consultant.id),
                // picked up or cancelled since the queue was read
                Err(DeskError::NoEligibleConsultant { .. })
                | Err(DeskError::InvalidTransition { .. }) => None,
                Err(err) => return Err(err),
            };
            outcomes.push(QueueAssignment {
                request,
                consultant,
            });
        }
        Ok(outcomes)
    }

    // ------------------------------------------------------------------------
    // Orders and reconciliation
    // ------------------------------------------------------------------------

    /// Record a checkout. The order starts `pending`.
    pub async fn create_order(&self, new: NewOrder) -> Result<ServiceOrder> {
        if new.items.is_empty() {
            return Err(DeskError::Validation("order has no items".into()));
        }
        if let Some(item) = new
            .items
            .iter()
            .find(|item| item.quantity == 0 || item.price.is_sign_negative())
        {
            return Err(DeskError::Validation(format!(
                "item '{}' needs a positive quantity and a non-negative price",
                item.title
            )));
        }
        let total: Decimal = new.items.iter().map(|item| item.line_total()).sum();
        if total <= Decimal::ZERO {
            return Err(DeskError::Validation(format!(
                "order total must be positive, got {}",
                total
            )));
        }

        let order = self
            .transaction("create_order", |txn| {
                let now = Utc::now();
                let order_id = txn.sequences().next_order();
                let mut item_ids = Vec::with_capacity(new.items.len());

                for item in &new.items {
                    if let Some(service) = item.service {
                        txn.service(service)?;
                    }
                    let order_item = OrderItem {
                        id: txn.sequences().next_order_item(),
                        order: order_id,
                        service: item.service,
                        category: item.category.clone(),
                        service_title: item.title.clone(),
                        variant_name: item.variant_name.clone(),
                        price: item.price,
                        quantity: item.quantity,
                    };
                    item_ids.push(order_item.id);
                    txn.put_order_item(order_item)?;
                }

                let order = ServiceOrder {
                    id: order_id,
                    user: new.user,
                    total_amount: total,
                    status: OrderStatus::Pending,
                    gateway_order_id: new.gateway_order_id.clone(),
                    gateway_payment_id: None,
                    gateway_signature: None,
                    items: item_ids,
                    created_at: now,
                    updated_at: now,
                };
                txn.put_order(order.clone())?;
                Ok(order)
            })
            .await?;

        event!(
            Level::INFO,
            order = %order.id,
            items = order.items.len(),
            total = %order.total_amount,
            "order created"
        );
        Ok(order)
    }

    /// Record payment and reconcile the order.
    ///
    /// Calling it again for an order that is already paid only reconciles,
    /// so a redelivered payment callback is harmless.
    pub async fn mark_order_paid(
        &self,
        order: OrderId,
        payment: PaymentConfirmation,
    ) -> Result<ReconciliationReport> {
        self.transaction("mark_order_paid", |txn| {
            let mut record = txn.order(order)?;
            match record.status {
                OrderStatus::Paid => return Ok(()),
                OrderStatus::Pending => {}
                status => {
                    return Err(DeskError::Validation(format!(
                        "{} is {} and cannot be paid",
                        order, status
                    )));
                }
            }
            record.status = OrderStatus::Paid;
            record.gateway_payment_id = payment.gateway_payment_id.clone();
            record.gateway_signature = payment.gateway_signature.clone();
            record.updated_at = Utc::now();
            txn.put_order(record)?;
            Ok(())
        })
        .await?;

        self.reconcile_paid_order(order).await
    }

    pub async fn mark_order_failed(&self, order: OrderId) -> Result<ServiceOrder> {
        self.transaction("mark_order_failed", |txn| {
            let mut record = txn.order(order)?;
            if record.status != OrderStatus::Pending {
                return Err(DeskError::Validation(format!(
                    "{} is {}, only pending orders can fail",
                    order, record.status
                )));
            }
            record.status = OrderStatus::Failed;
            record.updated_at = Utc::now();
            txn.put_order(record.clone())?;
            Ok(record)
        })
        .await
    }

    /// Create, link and assign a request for every item of a paid order that
    /// has none yet.
    ///
    /// Items are committed one at a time. If a later item fails, the earlier
    /// ones stay reconciled and a rerun picks up where this one stopped.
    pub async fn reconcile_paid_order(&self, order: OrderId) -> Result<ReconciliationReport> {
        let span = info_span!("reconcile", order = %order);
        async move {
            let items = self
                .transaction("reconcile.load", |txn| {
                    Ok(Reconciler::paid_order(txn, order)?.items)
                })
                .await?;

            let reconciler = Reconciler::new(&self.resolver, self.config.paid_priority);
            let mut report = ReconciliationReport::new(order);
            for item in items {
                let outcome = self
                    .transaction("reconcile.item", |txn| {
                        reconciler.reconcile_item(txn, order, item, Utc::now())
                    })
                    .await?;
                report.items.push(outcome);
            }

            event!(
                Level::INFO,
                assigned = report.assigned(),
                pending = report.pending(),
                already_linked = report.already_linked(),
                skipped = report.skipped(),
                "order reconciled"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Reconcile every paid order concurrently.
    pub async fn reconcile_all_paid(&self) -> Result<Vec<ReconciliationReport>> {
        let paid: Vec<OrderId> = self
            .manager
            .snapshot()
            .await
            .orders()
            .values()
            .filter(|order| order.status == OrderStatus::Paid)
            .map(|order| order.id)
            .collect();

        futures::future::join_all(paid.into_iter().map(|order| self.reconcile_paid_order(order)))
            .await
            .into_iter()
            .collect()
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn request(&self, id: RequestId) -> Result<ClientServiceRequest> {
        self.manager
            .snapshot()
            .await
            .requests()
            .get(&id)
            .cloned()
            .ok_or_else(|| DeskError::not_found("request", id))
    }

    pub async fn consultant(&self, id: ConsultantId) -> Result<ConsultantProfile> {
        self.manager
            .snapshot()
            .await
            .consultants()
            .get(&id)
            .cloned()
            .ok_or_else(|| DeskError::not_found("consultant", id))
    }

    pub async fn consultants(&self) -> Vec<ConsultantProfile> {
        self.manager
            .snapshot()
            .await
            .consultants()
            .values()
            .cloned()
            .collect()
    }

    pub async fn order(&self, id: OrderId) -> Result<ServiceOrder> {
        self.manager
            .snapshot()
            .await
            .orders()
            .get(&id)
            .cloned()
            .ok_or_else(|| DeskError::not_found("order", id))
    }

    pub async fn order_items(&self, id: OrderId) -> Result<Vec<OrderItem>> {
        let snapshot = self.manager.snapshot().await;
        let order = snapshot
            .orders()
            .get(&id)
            .ok_or_else(|| DeskError::not_found("order", id))?;
        Ok(order
            .items
            .iter()
            .filter_map(|item| snapshot.order_items().get(item).cloned())
            .collect())
    }

    pub async fn client_profile(&self, user: UserId) -> Option<ClientProfile> {
        self.manager.snapshot().await.clients().get(&user).cloned()
    }

    pub async fn requests_of_client(&self, user: UserId) -> Vec<ClientServiceRequest> {
        self.manager
            .snapshot()
            .await
            .requests_of_client(user)
            .cloned()
            .collect()
    }

    /// Pending requests, highest priority first, then oldest.
    pub async fn pending_requests(&self) -> Vec<ClientServiceRequest> {
        let mut pending: Vec<ClientServiceRequest> = self
            .manager
            .snapshot()
            .await
            .requests()
            .values()
            .filter(|request| request.status == RequestStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|request| {
            (
                std::cmp::Reverse(request.priority),
                request.created_at,
                request.id,
            )
        });
        pending
    }

    pub async fn workload_report(&self) -> WorkloadReport {
        WorkloadReport::from_storage(&self.manager.snapshot().await)
    }

    /// Check the workload invariant against one consistent snapshot.
    pub async fn verify_workload(&self) -> Result<WorkloadReport> {
        let report = self.workload_report().await;
        if let Err(err) = report.verify() {
            event!(Level::ERROR, error = %err, "workload invariant violated");
            return Err(err);
        }
        Ok(report)
    }

    pub async fn checkpoint(&self) -> Result<()> {
        self.manager.checkpoint().await
    }

    pub fn stats(&self) -> TransactionStats {
        self.manager.stats()
    }
}
