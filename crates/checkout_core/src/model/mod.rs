//! Order aggregate and its relational projections.
//!
//! # Responsibility
//! - Define the in-memory `Order` aggregate owned by the domain layer.
//! - Define flat record shapes mirroring `orders` and `order_items` rows.
//!
//! # Invariants
//! - `Order::total()` is always derived from items, never trusted from storage.
//! - Item rows carry snapshots of name/price taken when the order was built.

pub mod order;
pub mod record;
