//! Order aggregate model.
//!
//! # Responsibility
//! - Define the `Order` root and its exclusively owned `OrderItem`s.
//! - Provide total computation and validation used before persistence.
//!
//! # Invariants
//! - Item ids are unique within one order.
//! - `quantity` is strictly positive and `price` is never negative.
//! - Zero-item orders are valid; they simply total zero.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Identifier of an order header row.
pub type OrderId = String;

/// Identifier of an order item row.
pub type OrderItemId = String;

/// Monetary amount in minor currency units (e.g. cents).
pub type Money = i64;

/// Validation errors for the order aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderValidationError {
    EmptyOrderId,
    EmptyCustomerId,
    EmptyItemId,
    EmptyItemName(OrderItemId),
    EmptyProductId(OrderItemId),
    NegativePrice { item_id: OrderItemId, price: Money },
    NonPositiveQuantity { item_id: OrderItemId, quantity: i64 },
    DuplicateItemId(OrderItemId),
    /// Stored total disagrees with the total recomputed from item rows.
    TotalMismatch { stored: Money, computed: Money },
    /// Line or order total does not fit in `Money`.
    TotalOverflow,
}

impl Display for OrderValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyOrderId => write!(f, "order id must not be empty"),
            Self::EmptyCustomerId => write!(f, "customer id must not be empty"),
            Self::EmptyItemId => write!(f, "order item id must not be empty"),
            Self::EmptyItemName(id) => write!(f, "order item `{id}` has an empty name"),
            Self::EmptyProductId(id) => write!(f, "order item `{id}` has an empty product id"),
            Self::NegativePrice { item_id, price } => {
                write!(f, "order item `{item_id}` has negative price {price}")
            }
            Self::NonPositiveQuantity { item_id, quantity } => write!(
                f,
                "order item `{item_id}` quantity must be greater than zero, got {quantity}"
            ),
            Self::DuplicateItemId(id) => write!(f, "order item id `{id}` appears more than once"),
            Self::TotalMismatch { stored, computed } => write!(
                f,
                "stored order total {stored} does not match item total {computed}"
            ),
            Self::TotalOverflow => write!(f, "order total exceeds the supported money range"),
        }
    }
}

impl Error for OrderValidationError {}

/// One line of an order.
///
/// `name` and `price` are snapshots of the product at ordering time; later
/// product changes never flow back into existing orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub name: String,
    pub price: Money,
    pub product_id: String,
    pub quantity: u32,
}

impl OrderItem {
    /// Creates a validated order item.
    pub fn new(
        id: impl Into<OrderItemId>,
        name: impl Into<String>,
        price: Money,
        product_id: impl Into<String>,
        quantity: u32,
    ) -> Result<Self, OrderValidationError> {
        let item = Self {
            id: id.into(),
            name: name.into(),
            price,
            product_id: product_id.into(),
            quantity,
        };
        item.validate()?;
        Ok(item)
    }

    /// Line total: `price * quantity`, or `None` on overflow.
    pub fn checked_total(&self) -> Option<Money> {
        self.price.checked_mul(Money::from(self.quantity))
    }

    /// Line total, saturating at `Money::MAX`.
    ///
    /// Never saturates for an item that passed `validate()`.
    pub fn total(&self) -> Money {
        self.checked_total().unwrap_or(Money::MAX)
    }

    pub fn validate(&self) -> Result<(), OrderValidationError> {
        if self.id.trim().is_empty() {
            return Err(OrderValidationError::EmptyItemId);
        }
        if self.name.trim().is_empty() {
            return Err(OrderValidationError::EmptyItemName(self.id.clone()));
        }
        if self.product_id.trim().is_empty() {
            return Err(OrderValidationError::EmptyProductId(self.id.clone()));
        }
        if self.price < 0 {
            return Err(OrderValidationError::NegativePrice {
                item_id: self.id.clone(),
                price: self.price,
            });
        }
        if self.quantity == 0 {
            return Err(OrderValidationError::NonPositiveQuantity {
                item_id: self.id.clone(),
                quantity: 0,
            });
        }
        if self.checked_total().is_none() {
            return Err(OrderValidationError::TotalOverflow);
        }
        Ok(())
    }
}

/// Order aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: String,
    /// Insertion order is preserved through persistence.
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Creates a new order with a generated id.
    pub fn new(
        customer_id: impl Into<String>,
        items: Vec<OrderItem>,
    ) -> Result<Self, OrderValidationError> {
        Self::with_id(Uuid::new_v4().to_string(), customer_id, items)
    }

    /// Creates an order with a caller-provided id.
    ///
    /// Used by import paths and tests where identity already exists.
    pub fn with_id(
        id: impl Into<OrderId>,
        customer_id: impl Into<String>,
        items: Vec<OrderItem>,
    ) -> Result<Self, OrderValidationError> {
        let order = Self {
            id: id.into(),
            customer_id: customer_id.into(),
            items,
        };
        order.validate()?;
        Ok(order)
    }

    /// Sum of every item's `price * quantity`, or `None` on overflow.
    pub fn checked_total(&self) -> Option<Money> {
        self.items.iter().try_fold(0, |sum: Money, item| {
            sum.checked_add(item.checked_total()?)
        })
    }

    /// Order total, saturating at `Money::MAX`.
    ///
    /// Never saturates for an order that passed `validate()`; repositories
    /// validate before projecting the total into a row.
    pub fn total(&self) -> Money {
        self.checked_total().unwrap_or(Money::MAX)
    }

    /// Appends an item, rejecting duplicate ids and totals that overflow.
    pub fn add_item(&mut self, item: OrderItem) -> Result<(), OrderValidationError> {
        item.validate()?;
        if self.items.iter().any(|existing| existing.id == item.id) {
            return Err(OrderValidationError::DuplicateItemId(item.id));
        }
        let line_total = item.checked_total().ok_or(OrderValidationError::TotalOverflow)?;
        if self
            .checked_total()
            .and_then(|sum| sum.checked_add(line_total))
            .is_none()
        {
            return Err(OrderValidationError::TotalOverflow);
        }
        self.items.push(item);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), OrderValidationError> {
        if self.id.trim().is_empty() {
            return Err(OrderValidationError::EmptyOrderId);
        }
        if self.customer_id.trim().is_empty() {
            return Err(OrderValidationError::EmptyCustomerId);
        }

        for (index, item) in self.items.iter().enumerate() {
            item.validate()?;
            if self.items[..index].iter().any(|prior| prior.id == item.id) {
                return Err(OrderValidationError::DuplicateItemId(item.id.clone()));
            }
        }
        if self.checked_total().is_none() {
            return Err(OrderValidationError::TotalOverflow);
        }
        Ok(())
    }
}
