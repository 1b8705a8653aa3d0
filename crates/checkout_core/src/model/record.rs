//! Flat record projections of the order aggregate.
//!
//! `OrderRecord` mirrors one `orders` row plus its nested `order_items` rows
//! and is also the external representation returned by repository reads:
//!
//! ```json
//! { "id": "...", "customer_id": "...", "total": 2000,
//!   "items": [{ "id": "...", "name": "...", "price": 1000, "quantity": 2,
//!               "order_id": "...", "product_id": "..." }] }
//! ```

use crate::model::order::{Money, Order, OrderId, OrderItem, OrderItemId, OrderValidationError};
use serde::{Deserialize, Serialize};

/// Projection of one `order_items` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemRecord {
    pub id: OrderItemId,
    pub name: String,
    pub price: Money,
    pub quantity: u32,
    pub order_id: OrderId,
    pub product_id: String,
}

/// Projection of one `orders` row with its items in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub customer_id: String,
    /// Redundant copy of the item total, written on every create/update.
    pub total: Money,
    pub items: Vec<OrderItemRecord>,
}

impl OrderItemRecord {
    pub fn from_item(order_id: &str, item: &OrderItem) -> Self {
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            price: item.price,
            quantity: item.quantity,
            order_id: order_id.to_string(),
            product_id: item.product_id.clone(),
        }
    }
}

impl OrderRecord {
    /// Flattens an aggregate into its persisted shape.
    pub fn from_order(order: &Order) -> Self {
        Self {
            id: order.id.clone(),
            customer_id: order.customer_id.clone(),
            total: order.total(),
            items: order
                .items
                .iter()
                .map(|item| OrderItemRecord::from_item(&order.id, item))
                .collect(),
        }
    }
}

impl From<OrderItemRecord> for OrderItem {
    fn from(value: OrderItemRecord) -> Self {
        Self {
            id: value.id,
            name: value.name,
            price: value.price,
            product_id: value.product_id,
            quantity: value.quantity,
        }
    }
}

impl TryFrom<OrderRecord> for Order {
    type Error = OrderValidationError;

    /// Rebuilds the aggregate and checks the stored total against the items.
    fn try_from(value: OrderRecord) -> Result<Self, Self::Error> {
        let stored = value.total;
        let order = Order::with_id(
            value.id,
            value.customer_id,
            value.items.into_iter().map(OrderItem::from).collect(),
        )?;

        let computed = order.total();
        if stored != computed {
            return Err(OrderValidationError::TotalMismatch { stored, computed });
        }
        Ok(order)
    }
}
