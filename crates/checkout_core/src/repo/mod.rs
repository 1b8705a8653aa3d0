//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the order persistence contract used by services.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository writes call `Order::validate()` before any SQL mutation.
//! - Repository APIs report `NotFound` separately from storage faults.

pub mod order_repo;
