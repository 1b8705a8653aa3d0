//! Order use-case service.
//!
//! # Responsibility
//! - Place orders, append items, and read orders back as domain aggregates.
//! - Delegate persistence to `OrderRepository` implementations.
//!
//! # Invariants
//! - Service APIs never bypass repository validation/persistence contracts.
//! - Aggregates handed back to callers are rebuilt from storage, so their
//!   stored total has been checked against their items.

use crate::model::order::{Money, Order, OrderItem, OrderValidationError};
use crate::model::record::OrderRecord;
use crate::repo::order_repo::{OrderRepository, RepoError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors from order service operations.
#[derive(Debug)]
pub enum ServiceError {
    /// Input or reconstructed aggregate violates order invariants.
    InvalidOrder(OrderValidationError),
    /// Repository-level failure, including `NotFound`.
    Repo(RepoError),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Repo(err) if err.is_not_found())
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidOrder(err) => write!(f, "invalid order: {err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidOrder(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<OrderValidationError> for ServiceError {
    fn from(value: OrderValidationError) -> Self {
        Self::InvalidOrder(value)
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::InvalidOrder(err),
            other => Self::Repo(other),
        }
    }
}

/// Use-case service wrapper for order persistence.
pub struct OrderService<R: OrderRepository> {
    repo: R,
}

impl<R: OrderRepository> OrderService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Builds an order with a fresh id and persists it.
    pub fn place_order(
        &self,
        customer_id: impl Into<String>,
        items: Vec<OrderItem>,
    ) -> ServiceResult<Order> {
        let order = Order::new(customer_id, items)?;
        self.repo.create(&order)?;
        Ok(order)
    }

    /// Appends one item to a stored order and persists the result.
    pub fn add_item(&self, order_id: &str, item: OrderItem) -> ServiceResult<Order> {
        let mut order = self.get_order(order_id)?;
        order.add_item(item)?;
        self.repo.update(&order)?;
        Ok(order)
    }

    /// Loads one order and rebuilds the aggregate.
    pub fn get_order(&self, order_id: &str) -> ServiceResult<Order> {
        let record = self.repo.find(order_id)?;
        Ok(Order::try_from(record)?)
    }

    /// Lists every order in its external representation.
    pub fn list_orders(&self) -> ServiceResult<Vec<OrderRecord>> {
        Ok(self.repo.find_all()?)
    }
}

/// Sum of totals across orders, saturating at `Money::MAX`.
pub fn orders_total(orders: &[Order]) -> Money {
    orders
        .iter()
        .fold(0, |sum: Money, order| sum.saturating_add(order.total()))
}
