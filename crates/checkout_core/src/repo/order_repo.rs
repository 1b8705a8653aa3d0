//! Order repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Flatten the `Order` aggregate into `orders` + `order_items` rows.
//! - Rebuild nested `OrderRecord`s from joined flat rows on read.
//!
//! # Invariants
//! - `create` writes the header and every item in one transaction.
//! - `update` rewrites the header and upserts every current item by id in
//!   one transaction. Item rows missing from the aggregate are kept.
//! - An item id owned by another order is never re-parented.
//! - Reads return headers and items in insertion (`rowid`) order.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::order::{Order, OrderId, OrderItemId, OrderValidationError};
use crate::model::record::{OrderItemRecord, OrderRecord};
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

const ORDER_JOIN_SELECT_SQL: &str = "SELECT
    o.id AS order_id,
    o.customer_id AS customer_id,
    o.total AS total,
    i.id AS item_id,
    i.name AS item_name,
    i.price AS item_price,
    i.quantity AS item_quantity,
    i.product_id AS item_product_id
FROM orders o
LEFT JOIN order_items i ON i.order_id = o.id";

const ORDER_JOIN_ORDER_BY_SQL: &str = "ORDER BY o.rowid ASC, i.rowid ASC";

pub type RepoResult<T> = Result<T, RepoError>;

/// Underlying cause carried by repository failure kinds.
#[derive(Debug)]
pub enum StorageFault {
    /// SQLite or bootstrap failure, including busy timeouts.
    Db(DbError),
    /// Update target has no header row.
    OrderMissing(OrderId),
    /// Item id already belongs to a different order.
    ItemOwnedByOtherOrder {
        item_id: OrderItemId,
        owner_id: OrderId,
    },
    /// Persisted rows cannot be mapped back to a valid record.
    InvalidData(String),
}

impl Display for StorageFault {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::OrderMissing(id) => write!(f, "order `{id}` does not exist"),
            Self::ItemOwnedByOtherOrder { item_id, owner_id } => write!(
                f,
                "order item `{item_id}` already belongs to order `{owner_id}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted order data: {message}"),
        }
    }
}

impl Error for StorageFault {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::OrderMissing(_) | Self::ItemOwnedByOtherOrder { .. } | Self::InvalidData(_) => {
                None
            }
        }
    }
}

impl From<DbError> for StorageFault {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StorageFault {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Errors from order repository operations.
#[derive(Debug)]
pub enum RepoError {
    /// Aggregate failed validation; nothing was written.
    Validation(OrderValidationError),
    CreationFailed {
        order_id: OrderId,
        fault: StorageFault,
    },
    UpdateFailed {
        order_id: OrderId,
        fault: StorageFault,
    },
    /// No header row matches the requested id.
    NotFound(OrderId),
    FindFailed {
        order_id: OrderId,
        fault: StorageFault,
    },
    ListFailed(StorageFault),
    /// Readiness probe could not inspect the connection.
    ConnectionCheckFailed(StorageFault),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl RepoError {
    /// Returns whether this error means "the order does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns the storage cause, when there is one.
    pub fn fault(&self) -> Option<&StorageFault> {
        match self {
            Self::CreationFailed { fault, .. }
            | Self::UpdateFailed { fault, .. }
            | Self::FindFailed { fault, .. }
            | Self::ListFailed(fault)
            | Self::ConnectionCheckFailed(fault) => Some(fault),
            _ => None,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::CreationFailed { order_id, fault } => {
                write!(f, "failed to create order `{order_id}`: {fault}")
            }
            Self::UpdateFailed { order_id, fault } => {
                write!(f, "failed to update order `{order_id}`: {fault}")
            }
            Self::NotFound(id) => write!(f, "order not found: {id}"),
            Self::FindFailed { order_id, fault } => {
                write!(f, "failed to load order `{order_id}`: {fault}")
            }
            Self::ListFailed(fault) => write!(f, "failed to list orders: {fault}"),
            Self::ConnectionCheckFailed(fault) => {
                write!(f, "failed to inspect order storage: {fault}")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "order repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "order repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "order repository requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            _ => self.fault().map(|fault| fault as &(dyn Error + 'static)),
        }
    }
}

impl From<OrderValidationError> for RepoError {
    fn from(value: OrderValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Repository interface for the order aggregate.
pub trait OrderRepository {
    /// Inserts the header and all items atomically.
    fn create(&self, order: &Order) -> RepoResult<()>;
    /// Rewrites the header and upserts every current item.
    fn update(&self, order: &Order) -> RepoResult<()>;
    /// Loads one order with its items.
    fn find(&self, id: &str) -> RepoResult<OrderRecord>;
    /// Loads every order with its items in insertion order.
    fn find_all(&self) -> RepoResult<Vec<OrderRecord>>;
}

/// SQLite-backed order repository.
pub struct SqliteOrderRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteOrderRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_order_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl OrderRepository for SqliteOrderRepository<'_> {
    fn create(&self, order: &Order) -> RepoResult<()> {
        order.validate()?;
        let started_at = Instant::now();
        let record = OrderRecord::from_order(order);

        match insert_order(self.conn, &record) {
            Ok(()) => {
                info!(
                    "event=order_create module=repo status=ok order_id={} item_count={} duration_ms={}",
                    record.id,
                    record.items.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(fault) => {
                error!(
                    "event=order_create module=repo status=error order_id={} duration_ms={} error_code=order_create_failed error={}",
                    record.id,
                    started_at.elapsed().as_millis(),
                    fault
                );
                Err(RepoError::CreationFailed {
                    order_id: record.id,
                    fault,
                })
            }
        }
    }

    fn update(&self, order: &Order) -> RepoResult<()> {
        order.validate()?;
        let started_at = Instant::now();
        let record = OrderRecord::from_order(order);

        match upsert_order(self.conn, &record) {
            Ok(()) => {
                info!(
                    "event=order_update module=repo status=ok order_id={} item_count={} duration_ms={}",
                    record.id,
                    record.items.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(fault) => {
                error!(
                    "event=order_update module=repo status=error order_id={} duration_ms={} error_code=order_update_failed error={}",
                    record.id,
                    started_at.elapsed().as_millis(),
                    fault
                );
                Err(RepoError::UpdateFailed {
                    order_id: record.id,
                    fault,
                })
            }
        }
    }

    fn find(&self, id: &str) -> RepoResult<OrderRecord> {
        let records = select_orders(self.conn, Some(id)).map_err(|fault| {
            RepoError::FindFailed {
                order_id: id.to_string(),
                fault,
            }
        })?;

        records
            .into_iter()
            .next()
            .ok_or_else(|| RepoError::NotFound(id.to_string()))
    }

    fn find_all(&self) -> RepoResult<Vec<OrderRecord>> {
        select_orders(self.conn, None).map_err(RepoError::ListFailed)
    }
}

fn insert_order(conn: &Connection, record: &OrderRecord) -> Result<(), StorageFault> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    tx.execute(
        "INSERT INTO orders (id, customer_id, total) VALUES (?1, ?2, ?3);",
        params![record.id, record.customer_id, record.total],
    )?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO order_items (
                id,
                name,
                price,
                quantity,
                order_id,
                product_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        )?;
        for item in &record.items {
            stmt.execute(params![
                item.id,
                item.name,
                item.price,
                item.quantity,
                item.order_id,
                item.product_id,
            ])?;
        }
    }

    tx.commit()?;
    Ok(())
}

fn upsert_order(conn: &Connection, record: &OrderRecord) -> Result<(), StorageFault> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    let changed = tx.execute(
        "UPDATE orders
         SET
            customer_id = ?2,
            total = ?3
         WHERE id = ?1;",
        params![record.id, record.customer_id, record.total],
    )?;
    if changed == 0 {
        return Err(StorageFault::OrderMissing(record.id.clone()));
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO order_items (
                id,
                name,
                price,
                quantity,
                order_id,
                product_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                price = excluded.price,
                quantity = excluded.quantity,
                product_id = excluded.product_id
            WHERE order_items.order_id = excluded.order_id;",
        )?;
        for item in &record.items {
            let changed = stmt.execute(params![
                item.id,
                item.name,
                item.price,
                item.quantity,
                item.order_id,
                item.product_id,
            ])?;
            if changed == 0 {
                let owner_id = item_owner(&tx, &item.id)?.unwrap_or_default();
                return Err(StorageFault::ItemOwnedByOtherOrder {
                    item_id: item.id.clone(),
                    owner_id,
                });
            }
        }
    }

    tx.commit()?;
    Ok(())
}

fn item_owner(tx: &Transaction<'_>, item_id: &str) -> Result<Option<OrderId>, StorageFault> {
    let owner = tx
        .query_row(
            "SELECT order_id FROM order_items WHERE id = ?1;",
            [item_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(owner)
}

/// Runs the header/item join and folds consecutive rows of the same order
/// into one nested record.
fn select_orders(
    conn: &Connection,
    order_id: Option<&str>,
) -> Result<Vec<OrderRecord>, StorageFault> {
    let mut records: Vec<OrderRecord> = Vec::new();

    let sql = match order_id {
        Some(_) => format!("{ORDER_JOIN_SELECT_SQL} WHERE o.id = ?1 {ORDER_JOIN_ORDER_BY_SQL};"),
        None => format!("{ORDER_JOIN_SELECT_SQL} {ORDER_JOIN_ORDER_BY_SQL};"),
    };
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = match order_id {
        Some(id) => stmt.query([id])?,
        None => stmt.query([])?,
    };

    while let Some(row) = rows.next()? {
        let header_id: String = row.get("order_id")?;
        let starts_new_order = records
            .last()
            .map_or(true, |current| current.id != header_id);
        if starts_new_order {
            records.push(OrderRecord {
                id: header_id.clone(),
                customer_id: row.get("customer_id")?,
                total: row.get("total")?,
                items: Vec::new(),
            });
        }

        if let Some(item) = parse_item_columns(row, &header_id)? {
            if let Some(current) = records.last_mut() {
                current.items.push(item);
            }
        }
    }

    Ok(records)
}

fn parse_item_columns(
    row: &Row<'_>,
    order_id: &str,
) -> Result<Option<OrderItemRecord>, StorageFault> {
    // LEFT JOIN yields one all-NULL item row for orders without items.
    let Some(item_id) = row.get::<_, Option<String>>("item_id")? else {
        return Ok(None);
    };

    let quantity_raw: i64 = row.get("item_quantity")?;
    let quantity = u32::try_from(quantity_raw)
        .ok()
        .filter(|value| *value > 0)
        .ok_or_else(|| {
            StorageFault::InvalidData(format!(
                "invalid quantity `{quantity_raw}` in order_items.quantity for item `{item_id}`"
            ))
        })?;

    Ok(Some(OrderItemRecord {
        id: item_id,
        name: row.get("item_name")?,
        price: row.get("item_price")?,
        quantity,
        order_id: order_id.to_string(),
        product_id: row.get("item_product_id")?,
    }))
}

fn ensure_order_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .map_err(|err| RepoError::ConnectionCheckFailed(err.into()))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let required: [(&'static str, &[&'static str]); 2] = [
        ("orders", &["id", "customer_id", "total"]),
        (
            "order_items",
            &["id", "name", "price", "quantity", "order_id", "product_id"],
        ),
    ];

    for (table, columns) in required {
        if !table_exists(conn, table).map_err(RepoError::ConnectionCheckFailed)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column).map_err(RepoError::ConnectionCheckFailed)? {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, StorageFault> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, StorageFault> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
