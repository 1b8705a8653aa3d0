//! Core persistence for the checkout `Order` aggregate.
//! This crate owns the mapping between orders and their relational rows.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::order::{Money, Order, OrderId, OrderItem, OrderItemId, OrderValidationError};
pub use model::record::{OrderItemRecord, OrderRecord};
pub use repo::order_repo::{
    OrderRepository, RepoError, RepoResult, SqliteOrderRepository, StorageFault,
};
pub use service::order_service::{orders_total, OrderService, ServiceError, ServiceResult};

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
