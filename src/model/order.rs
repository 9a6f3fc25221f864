use crate::core::{OrderId, OrderItemId, ServiceId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Payment-side record created by checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceOrder {
    pub id: OrderId,
    pub user: UserId,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
    pub items: Vec<OrderItemId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order: OrderId,
    /// Missing on items created before the catalog link existed
    pub service: Option<ServiceId>,
    pub category: String,
    pub service_title: String,
    pub variant_name: Option<String>,
    pub price: Decimal,
    pub quantity: u32,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }

    /// Title without a trailing variant such as "ITR Filing (Salaried)".
    pub fn base_title(&self) -> &str {
        self.service_title
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
    }
}

/// Checkout payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub user: UserId,
    #[serde(default)]
    pub gateway_order_id: Option<String>,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderItem {
    #[serde(default)]
    pub service: Option<ServiceId>,
    #[serde(default)]
    pub category: String,
    pub title: String,
    #[serde(default)]
    pub variant_name: Option<String>,
    pub price: Decimal,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl NewOrderItem {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Gateway identifiers recorded when payment completes. Signature checks
/// happen upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn item(title: &str, price: i64, quantity: u32) -> OrderItem {
        OrderItem {
            id: OrderItemId(1),
            order: OrderId(1),
            service: None,
            category: "Income Tax".into(),
            service_title: title.into(),
            variant_name: None,
            price: Decimal::new(price, 2),
            quantity,
        }
    }

    #[test]
    fn test_base_title_strips_variant() {
        assert_eq!(item("ITR Filing (Salaried)", 0, 1).base_title(), "ITR Filing");
        assert_eq!(item("GST Return", 0, 1).base_title(), "GST Return");
    }

    #[test]
    fn test_line_total() {
        assert_eq!(item("x", 49_900, 2).line_total(), Decimal::new(99_800, 2));
    }
}
