// ============================================================================
// Transaction State Management
// ============================================================================
//
// A transaction moves through Active -> Committed/Aborted.
//
// Optimistic concurrency with serializable validation:
// - begin takes a copy-on-write snapshot of the whole store
// - every row read or written records the version it had in that snapshot
// - writes are buffered as Changes and applied to the private snapshot, so
//   the transaction reads its own writes
// - commit succeeds only if every recorded version is still current
//
// ============================================================================

use super::Change;
use crate::core::{
    CategoryId, ConsultantId, DeskError, OrderId, OrderItemId, RequestId, Result, ServiceId,
    UserId,
};
use crate::model::{
    ClientProfile, ClientServiceRequest, ConsultantProfile, Expertise, ExpertiseKey, OrderItem,
    Service, ServiceCategory, ServiceOrder, name_key,
};
use crate::storage::{IdSequences, InMemoryStorage, RowKey};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction state
///
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::Aborted
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// A unit of work against one snapshot of the store.
///
/// Not shared between tasks; the `TransactionManager` serializes commits.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    /// Commit version of the store when the snapshot was taken
    base_version: u64,
    snapshot: InMemoryStorage,
    /// Version of every row this transaction depends on, as of the snapshot
    read_set: BTreeMap<RowKey, u64>,
    changes: Vec<Change>,
}

impl Transaction {
    pub fn new(id: TransactionId, snapshot: InMemoryStorage) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            base_version: snapshot.commit_version(),
            snapshot,
            read_set: BTreeMap::new(),
            changes: Vec::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    pub fn read_set(&self) -> &BTreeMap<RowKey, u64> {
        &self.read_set
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    /// Unobserved view of the snapshot, including this transaction's own
    /// writes. Reads through it are not validated at commit.
    pub fn view(&self) -> &InMemoryStorage {
        &self.snapshot
    }

    pub fn sequences(&self) -> &IdSequences {
        self.snapshot.sequences()
    }

    /// Record the snapshot version of `key` unless already recorded. The first
    /// observation wins, so a row written earlier in this transaction keeps
    /// its pre-write version.
    pub fn observe(&mut self, key: RowKey) {
        let version = self.snapshot.version_of(&key);
        self.read_set.entry(key).or_insert(version);
    }

    // ------------------------------------------------------------------------
    // Observed reads
    // ------------------------------------------------------------------------

    pub fn category(&mut self, id: CategoryId) -> Result<ServiceCategory> {
        self.observe(RowKey::Category(id));
        self.snapshot
            .categories()
            .get(&id)
            .cloned()
            .ok_or_else(|| DeskError::not_found("category", id))
    }

    /// Category registered under `name`, compared case-insensitively. An
    /// absent name is observed too, so a racing insert of it conflicts.
    pub fn category_named(&mut self, name: &str) -> Option<CategoryId> {
        let name = name_key(name);
        self.observe(RowKey::CategoryName(name.clone()));
        self.snapshot.category_names().get(&name).copied()
    }

    pub fn service(&mut self, id: ServiceId) -> Result<Service> {
        self.observe(RowKey::Service(id));
        self.snapshot
            .services()
            .get(&id)
            .cloned()
            .ok_or_else(|| DeskError::not_found("service", id))
    }

    /// Service of `category` with this title, compared case-insensitively.
    pub fn service_titled(&mut self, category: CategoryId, title: &str) -> Option<ServiceId> {
        let title = name_key(title);
        self.observe(RowKey::ServiceTitle(category, title.clone()));
        self.snapshot
            .service_titles()
            .get(&(category, title))
            .copied()
    }

    pub fn consultant(&mut self, id: ConsultantId) -> Result<ConsultantProfile> {
        self.observe(RowKey::Consultant(id));
        self.snapshot
            .consultants()
            .get(&id)
            .cloned()
            .ok_or_else(|| DeskError::not_found("consultant", id))
    }

    pub fn request(&mut self, id: RequestId) -> Result<ClientServiceRequest> {
        self.observe(RowKey::Request(id));
        self.snapshot
            .requests()
            .get(&id)
            .cloned()
            .ok_or_else(|| DeskError::not_found("request", id))
    }

    pub fn order(&mut self, id: OrderId) -> Result<ServiceOrder> {
        self.observe(RowKey::Order(id));
        self.snapshot
            .orders()
            .get(&id)
            .cloned()
            .ok_or_else(|| DeskError::not_found("order", id))
    }

    pub fn order_item(&mut self, id: OrderItemId) -> Result<OrderItem> {
        self.observe(RowKey::OrderItem(id));
        self.snapshot
            .order_items()
            .get(&id)
            .cloned()
            .ok_or_else(|| DeskError::not_found("order item", id))
    }

    pub fn client(&mut self, user: UserId) -> Option<ClientProfile> {
        self.observe(RowKey::Client(user));
        self.snapshot.clients().get(&user).cloned()
    }

    pub fn expertise(&mut self, key: ExpertiseKey) -> Option<Expertise> {
        self.observe(RowKey::Expertise(key));
        self.snapshot.expertise().get(&key).cloned()
    }

    /// Request previously created under `key`, if any.
    pub fn request_by_key(&mut self, key: Uuid) -> Option<RequestId> {
        self.observe(RowKey::RequestKey(key));
        self.snapshot.request_keys().get(&key).copied()
    }

    /// Request already generated for an order item, if any.
    pub fn item_link(&mut self, item: OrderItemId) -> Option<RequestId> {
        self.observe(RowKey::ItemLink(item));
        self.snapshot.item_links().get(&item).copied()
    }

    /// Every consultant holding expertise for `service`, expertise rows and
    /// consultant rows both observed.
    pub fn experts_for(&mut self, service: ServiceId) -> Vec<ConsultantProfile> {
        let keys: Vec<ExpertiseKey> = self
            .snapshot
            .experts_for(service)
            .map(Expertise::key)
            .collect();

        let mut experts = Vec::with_capacity(keys.len());
        for key in keys {
            self.observe(RowKey::Expertise(key));
            self.observe(RowKey::Consultant(key.consultant));
            if let Some(consultant) = self.snapshot.consultants().get(&key.consultant) {
                experts.push(consultant.clone());
            }
        }
        experts
    }

    /// Every request of one client, observed.
    pub fn requests_of_client(&mut self, client: UserId) -> Vec<ClientServiceRequest> {
        let requests: Vec<ClientServiceRequest> =
            self.snapshot.requests_of_client(client).cloned().collect();
        for request in &requests {
            self.observe(RowKey::Request(request.id));
        }
        requests
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Buffer a change and apply it to the private snapshot
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn record_change(&mut self, change: Change) -> Result<()> {
        if !self.state.is_active() {
            return Err(DeskError::ExecutionError(format!(
                "Cannot record change: transaction {} is {}",
                self.id, self.state
            )));
        }

        self.observe(change.row_key());
        change.apply_to(&mut self.snapshot);
        self.changes.push(change);
        Ok(())
    }

    /// Insert or replace a category together with its name index row. A
    /// renamed category keeps its old name reserved.
    pub fn put_category(&mut self, category: ServiceCategory) -> Result<()> {
        let name = name_key(&category.name);
        let id = category.id;
        self.record_change(Change::PutCategory(category))?;
        self.record_change(Change::IndexCategoryName { name, category: id })
    }

    /// Insert or replace a service together with its title index row.
    pub fn put_service(&mut self, service: Service) -> Result<()> {
        let title = name_key(&service.title);
        let (category, id) = (service.category, service.id);
        self.record_change(Change::PutService(service))?;
        self.record_change(Change::IndexServiceTitle {
            category,
            title,
            service: id,
        })
    }

    pub fn put_consultant(&mut self, consultant: ConsultantProfile) -> Result<()> {
        self.record_change(Change::PutConsultant(consultant))
    }

    pub fn put_expertise(&mut self, expertise: Expertise) -> Result<()> {
        self.record_change(Change::PutExpertise(expertise))
    }

    pub fn remove_expertise(&mut self, key: ExpertiseKey) -> Result<()> {
        self.record_change(Change::RemoveExpertise(key))
    }

    pub fn put_request(&mut self, request: ClientServiceRequest) -> Result<()> {
        self.record_change(Change::PutRequest(request))
    }

    pub fn put_request_key(&mut self, key: Uuid, request: RequestId) -> Result<()> {
        self.record_change(Change::PutRequestKey { key, request })
    }

    pub fn put_order(&mut self, order: ServiceOrder) -> Result<()> {
        self.record_change(Change::PutOrder(order))
    }

    pub fn put_order_item(&mut self, item: OrderItem) -> Result<()> {
        self.record_change(Change::PutOrderItem(item))
    }

    pub fn link_order_item(&mut self, item: OrderItemId, request: RequestId) -> Result<()> {
        self.record_change(Change::LinkOrderItem { item, request })
    }

    pub fn put_client(&mut self, client: ClientProfile) -> Result<()> {
        self.record_change(Change::PutClient(client))
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Mark transaction as committed
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn commit(&mut self) -> Result<()> {
        if !self.state.is_active() {
            return Err(DeskError::ExecutionError(format!(
                "Cannot commit: transaction {} is already {}",
                self.id, self.state
            )));
        }

        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Mark transaction as aborted and discard changes
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn rollback(&mut self) -> Result<()> {
        if !self.state.is_active() {
            return Err(DeskError::ExecutionError(format!(
                "Cannot rollback: transaction {} is already {}",
                self.id, self.state
            )));
        }

        self.changes.clear();
        self.state = TransactionState::Aborted;
        Ok(())
    }
}
