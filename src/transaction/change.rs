// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Each Change is a full row image (or a removal). A transaction applies its
// changes to its private snapshot as it goes, and the manager re-applies the
// same list to the shared store at commit. The journal stores the list too.
//
// ============================================================================

use crate::core::{CategoryId, OrderItemId, RequestId, ServiceId};
use crate::model::{
    ClientProfile, ClientServiceRequest, ConsultantProfile, Expertise, ExpertiseKey, OrderItem,
    Service, ServiceCategory, ServiceOrder,
};
use crate::storage::{InMemoryStorage, RowKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Change {
    PutCategory(ServiceCategory),
    /// `name` is already normalised
    IndexCategoryName { name: String, category: CategoryId },
    PutService(Service),
    IndexServiceTitle {
        category: CategoryId,
        title: String,
        service: ServiceId,
    },
    PutConsultant(ConsultantProfile),
    PutExpertise(Expertise),
    RemoveExpertise(ExpertiseKey),
    PutRequest(ClientServiceRequest),
    PutRequestKey { key: Uuid, request: RequestId },
    PutOrder(ServiceOrder),
    PutOrderItem(OrderItem),
    LinkOrderItem { item: OrderItemId, request: RequestId },
    PutClient(ClientProfile),
}

impl Change {
    /// The row this change writes
    pub fn row_key(&self) -> RowKey {
        match self {
            Change::PutCategory(category) => RowKey::Category(category.id),
            Change::IndexCategoryName { name, .. } => RowKey::CategoryName(name.clone()),
            Change::PutService(service) => RowKey::Service(service.id),
            Change::IndexServiceTitle { category, title, .. } => {
                RowKey::ServiceTitle(*category, title.clone())
            }
            Change::PutConsultant(consultant) => RowKey::Consultant(consultant.id),
            Change::PutExpertise(expertise) => RowKey::Expertise(expertise.key()),
            Change::RemoveExpertise(key) => RowKey::Expertise(*key),
            Change::PutRequest(request) => RowKey::Request(request.id),
            Change::PutRequestKey { key, .. } => RowKey::RequestKey(*key),
            Change::PutOrder(order) => RowKey::Order(order.id),
            Change::PutOrderItem(item) => RowKey::OrderItem(item.id),
            Change::LinkOrderItem { item, .. } => RowKey::ItemLink(*item),
            Change::PutClient(client) => RowKey::Client(client.user),
        }
    }

    pub fn apply_to(&self, storage: &mut InMemoryStorage) {
        match self {
            Change::PutCategory(category) => {
                storage.categories_mut().put(category.id, category.clone());
            }
            Change::IndexCategoryName { name, category } => {
                storage.category_names_mut().put(name.clone(), *category);
            }
            Change::PutService(service) => {
                storage.services_mut().put(service.id, service.clone());
            }
            Change::IndexServiceTitle {
                category,
                title,
                service,
            } => {
                storage
                    .service_titles_mut()
                    .put((*category, title.clone()), *service);
            }
            Change::PutConsultant(consultant) => {
                storage
                    .consultants_mut()
                    .put(consultant.id, consultant.clone());
            }
            Change::PutExpertise(expertise) => {
                storage.expertise_mut().put(expertise.key(), expertise.clone());
            }
            Change::RemoveExpertise(key) => {
                storage.expertise_mut().remove(key);
            }
            Change::PutRequest(request) => {
                storage.requests_mut().put(request.id, request.clone());
            }
            Change::PutRequestKey { key, request } => {
                storage.request_keys_mut().put(*key, *request);
            }
            Change::PutOrder(order) => {
                storage.orders_mut().put(order.id, order.clone());
            }
            Change::PutOrderItem(item) => {
                storage.order_items_mut().put(item.id, item.clone());
            }
            Change::LinkOrderItem { item, request } => {
                storage.item_links_mut().put(*item, *request);
            }
            Change::PutClient(client) => {
                storage.clients_mut().put(client.user, client.clone());
            }
        }
    }
}
