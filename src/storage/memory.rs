use super::Table;
use crate::core::{
    CategoryId, ConsultantId, OrderId, OrderItemId, RequestId, ServiceId, UserId,
};
use crate::model::{
    ClientProfile, ClientServiceRequest, ConsultantProfile, Expertise, ExpertiseKey, OrderItem,
    Service, ServiceCategory, ServiceOrder,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Address of a single row, used for read-set validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RowKey {
    Category(CategoryId),
    /// Normalised category name
    CategoryName(String),
    Service(ServiceId),
    /// Normalised service title within a category
    ServiceTitle(CategoryId, String),
    Consultant(ConsultantId),
    Expertise(ExpertiseKey),
    Request(RequestId),
    RequestKey(Uuid),
    Order(OrderId),
    OrderItem(OrderItemId),
    ItemLink(OrderItemId),
    Client(UserId),
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Category(id) => write!(f, "{}", id),
            RowKey::CategoryName(name) => write!(f, "category_name({})", name),
            RowKey::Service(id) => write!(f, "{}", id),
            RowKey::ServiceTitle(category, title) => {
                write!(f, "service_title({}, {})", category, title)
            }
            RowKey::Consultant(id) => write!(f, "{}", id),
            RowKey::Expertise(key) => write!(f, "expertise({}, {})", key.consultant, key.service),
            RowKey::Request(id) => write!(f, "{}", id),
            RowKey::RequestKey(key) => write!(f, "request_key({})", key),
            RowKey::Order(id) => write!(f, "{}", id),
            RowKey::OrderItem(id) => write!(f, "{}", id),
            RowKey::ItemLink(id) => write!(f, "link({})", id),
            RowKey::Client(id) => write!(f, "client({})", id),
        }
    }
}

/// Identifier sequences. Shared by every snapshot of a store and not rolled
/// back on abort, so ids may have gaps.
#[derive(Debug, Default)]
pub struct IdSequences {
    category: AtomicU64,
    service: AtomicU64,
    consultant: AtomicU64,
    request: AtomicU64,
    order: AtomicU64,
    order_item: AtomicU64,
}

impl IdSequences {
    fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn next_category(&self) -> CategoryId {
        CategoryId(Self::bump(&self.category))
    }

    pub fn next_service(&self) -> ServiceId {
        ServiceId(Self::bump(&self.service))
    }

    pub fn next_consultant(&self) -> ConsultantId {
        ConsultantId(Self::bump(&self.consultant))
    }

    pub fn next_request(&self) -> RequestId {
        RequestId(Self::bump(&self.request))
    }

    pub fn next_order(&self) -> OrderId {
        OrderId(Self::bump(&self.order))
    }

    pub fn next_order_item(&self) -> OrderItemId {
        OrderItemId(Self::bump(&self.order_item))
    }

    /// Raise every counter to at least the largest id present in `storage`.
    fn catch_up(&self, storage: &InMemoryStorage) {
        let raise = |counter: &AtomicU64, max: Option<u64>| {
            if let Some(max) = max {
                counter.fetch_max(max, Ordering::SeqCst);
            }
        };
        raise(&self.category, storage.categories.max_key().map(|id| id.0));
        raise(&self.service, storage.services.max_key().map(|id| id.0));
        raise(&self.consultant, storage.consultants.max_key().map(|id| id.0));
        raise(&self.request, storage.requests.max_key().map(|id| id.0));
        raise(&self.order, storage.orders.max_key().map(|id| id.0));
        raise(&self.order_item, storage.order_items.max_key().map(|id| id.0));
    }
}

/// All tables of the assignment store.
///
/// Cloning is cheap: each table is a persistent map, so a clone is a
/// consistent snapshot that later writes to the original never touch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryStorage {
    categories: Table<CategoryId, ServiceCategory>,
    category_names: Table<String, CategoryId>,
    services: Table<ServiceId, Service>,
    service_titles: Table<(CategoryId, String), ServiceId>,
    consultants: Table<ConsultantId, ConsultantProfile>,
    expertise: Table<ExpertiseKey, Expertise>,
    requests: Table<RequestId, ClientServiceRequest>,
    request_keys: Table<Uuid, RequestId>,
    orders: Table<OrderId, ServiceOrder>,
    order_items: Table<OrderItemId, OrderItem>,
    item_links: Table<OrderItemId, RequestId>,
    clients: Table<UserId, ClientProfile>,
    /// Number of committed write transactions
    commit_version: u64,
    #[serde(skip)]
    sequences: Arc<IdSequences>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commit_version(&self) -> u64 {
        self.commit_version
    }

    pub(crate) fn set_commit_version(&mut self, version: u64) {
        self.commit_version = version;
    }

    pub fn sequences(&self) -> &Arc<IdSequences> {
        &self.sequences
    }

    /// Re-derive sequence positions after loading tables from disk.
    pub(crate) fn rebuild_sequences(&mut self) {
        let sequences = IdSequences::default();
        sequences.catch_up(self);
        self.sequences = Arc::new(sequences);
    }

    pub fn version_of(&self, key: &RowKey) -> u64 {
        match key {
            RowKey::Category(id) => self.categories.version(id),
            RowKey::CategoryName(name) => self.category_names.version(name),
            RowKey::Service(id) => self.services.version(id),
            RowKey::ServiceTitle(category, title) => {
                self.service_titles.version(&(*category, title.clone()))
            }
            RowKey::Consultant(id) => self.consultants.version(id),
            RowKey::Expertise(key) => self.expertise.version(key),
            RowKey::Request(id) => self.requests.version(id),
            RowKey::RequestKey(key) => self.request_keys.version(key),
            RowKey::Order(id) => self.orders.version(id),
            RowKey::OrderItem(id) => self.order_items.version(id),
            RowKey::ItemLink(id) => self.item_links.version(id),
            RowKey::Client(id) => self.clients.version(id),
        }
    }

    pub fn categories(&self) -> &Table<CategoryId, ServiceCategory> {
        &self.categories
    }

    pub fn category_names(&self) -> &Table<String, CategoryId> {
        &self.category_names
    }

    pub fn services(&self) -> &Table<ServiceId, Service> {
        &self.services
    }

    pub fn service_titles(&self) -> &Table<(CategoryId, String), ServiceId> {
        &self.service_titles
    }

    pub fn consultants(&self) -> &Table<ConsultantId, ConsultantProfile> {
        &self.consultants
    }

    pub fn expertise(&self) -> &Table<ExpertiseKey, Expertise> {
        &self.expertise
    }

    pub fn requests(&self) -> &Table<RequestId, ClientServiceRequest> {
        &self.requests
    }

    pub fn request_keys(&self) -> &Table<Uuid, RequestId> {
        &self.request_keys
    }

    pub fn orders(&self) -> &Table<OrderId, ServiceOrder> {
        &self.orders
    }

    pub fn order_items(&self) -> &Table<OrderItemId, OrderItem> {
        &self.order_items
    }

    pub fn item_links(&self) -> &Table<OrderItemId, RequestId> {
        &self.item_links
    }

    pub fn clients(&self) -> &Table<UserId, ClientProfile> {
        &self.clients
    }

    pub(crate) fn categories_mut(&mut self) -> &mut Table<CategoryId, ServiceCategory> {
        &mut self.categories
    }

    pub(crate) fn category_names_mut(&mut self) -> &mut Table<String, CategoryId> {
        &mut self.category_names
    }

    pub(crate) fn services_mut(&mut self) -> &mut Table<ServiceId, Service> {
        &mut self.services
    }

    pub(crate) fn service_titles_mut(&mut self) -> &mut Table<(CategoryId, String), ServiceId> {
        &mut self.service_titles
    }

    pub(crate) fn consultants_mut(&mut self) -> &mut Table<ConsultantId, ConsultantProfile> {
        &mut self.consultants
    }

    pub(crate) fn expertise_mut(&mut self) -> &mut Table<ExpertiseKey, Expertise> {
        &mut self.expertise
    }

    pub(crate) fn requests_mut(&mut self) -> &mut Table<RequestId, ClientServiceRequest> {
        &mut self.requests
    }

    pub(crate) fn request_keys_mut(&mut self) -> &mut Table<Uuid, RequestId> {
        &mut self.request_keys
    }

    pub(crate) fn orders_mut(&mut self) -> &mut Table<OrderId, ServiceOrder> {
        &mut self.orders
    }

    pub(crate) fn order_items_mut(&mut self) -> &mut Table<OrderItemId, OrderItem> {
        &mut self.order_items
    }

    pub(crate) fn item_links_mut(&mut self) -> &mut Table<OrderItemId, RequestId> {
        &mut self.item_links
    }

    pub(crate) fn clients_mut(&mut self) -> &mut Table<UserId, ClientProfile> {
        &mut self.clients
    }

    /// Expertise rows for one service, in consultant order.
    pub fn experts_for(&self, service: ServiceId) -> impl Iterator<Item = &Expertise> {
        self.expertise
            .values()
            .filter(move |expertise| expertise.service == service)
    }

    pub fn requests_of_client(&self, client: UserId) -> impl Iterator<Item = &ClientServiceRequest> {
        self.requests
            .values()
            .filter(move |request| request.client == client)
    }

    /// Active service whose title matches, ignoring case.
    pub fn find_service_by_title(&self, title: &str) -> Option<&Service> {
        self.services
            .values()
            .find(|service| service.is_active && service.title_matches(title))
    }
}
