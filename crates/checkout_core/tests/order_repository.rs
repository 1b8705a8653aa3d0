use checkout_core::db::migrations::latest_version;
use checkout_core::db::{open_db, open_db_in_memory};
use checkout_core::{
    Order, OrderItem, OrderRecord, OrderRepository, OrderValidationError, RepoError,
    SqliteOrderRepository, StorageFault,
};
use rusqlite::Connection;
use serde_json::json;

fn product_item(id: &str) -> OrderItem {
    OrderItem::new(id, "Product 1", 1000, "123", 2).unwrap()
}

fn make_order(id: &str, items: Vec<OrderItem>) -> Order {
    Order::with_id(id, "123", items).unwrap()
}

#[test]
fn create_then_find_returns_persisted_projection() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteOrderRepository::try_new(&conn).unwrap();

    let order = make_order("123", vec![product_item("1")]);
    repo.create(&order).unwrap();

    let found = repo.find("123").unwrap();
    assert_eq!(
        serde_json::to_value(&found).unwrap(),
        json!({
            "id": "123",
            "customer_id": "123",
            "total": order.total(),
            "items": [
                {
                    "id": "1",
                    "name": "Product 1",
                    "price": 1000,
                    "quantity": 2,
                    "order_id": "123",
                    "product_id": "123",
                }
            ],
        })
    );
}

#[test]
fn create_roundtrip_preserves_every_item_field_and_order() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteOrderRepository::try_new(&conn).unwrap();

    let order = make_order(
        "o-1",
        vec![
            OrderItem::new("z", "Zeta", 125, "p-9", 4).unwrap(),
            OrderItem::new("a", "Alpha", 0, "p-1", 1).unwrap(),
            OrderItem::new("m", "Mid", 99_999, "p-5", 3).unwrap(),
        ],
    );
    repo.create(&order).unwrap();

    let found = repo.find("o-1").unwrap();
    assert_eq!(found, OrderRecord::from_order(&order));
    assert_eq!(found.total, 125 * 4 + 99_999 * 3);
    assert_eq!(Order::try_from(found).unwrap(), order);
}

#[test]
fn order_without_items_roundtrips_as_empty_list() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteOrderRepository::try_new(&conn).unwrap();

    let order = make_order("empty", Vec::new());
    repo.create(&order).unwrap();

    let found = repo.find("empty").unwrap();
    assert_eq!(found.total, 0);
    assert!(found.items.is_empty());
}

#[test]
fn create_duplicate_order_id_fails_with_creation_failed() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteOrderRepository::try_new(&conn).unwrap();

    repo.create(&make_order("123", vec![product_item("1")]))
        .unwrap();
    let err = repo
        .create(&make_order("123", vec![product_item("2")]))
        .unwrap_err();

    assert!(matches!(
        err,
        RepoError::CreationFailed {
            ref order_id,
            fault: StorageFault::Db(_),
        } if order_id == "123"
    ));
}

#[test]
fn failed_create_leaves_no_header_or_items() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteOrderRepository::try_new(&conn).unwrap();

    repo.create(&make_order("first", vec![product_item("shared")]))
        .unwrap();

    // Second item collides with an item row owned by `first`.
    let clashing = make_order("second", vec![product_item("fresh"), product_item("shared")]);
    let err = repo.create(&clashing).unwrap_err();
    assert!(matches!(err, RepoError::CreationFailed { .. }));

    assert!(repo.find("second").unwrap_err().is_not_found());
    let fresh_rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM order_items WHERE id = 'fresh';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(fresh_rows, 0);
}

#[test]
fn update_reflects_added_items_and_keeps_prior_ones() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteOrderRepository::try_new(&conn).unwrap();

    let mut order = make_order("123", vec![product_item("1")]);
    repo.create(&order).unwrap();

    order
        .add_item(OrderItem::new("2", "Product 2", 450, "456", 3).unwrap())
        .unwrap();
    repo.update(&order).unwrap();

    let found = repo.find("123").unwrap();
    assert_eq!(found.total, 1000 * 2 + 450 * 3);
    assert_eq!(found.items.len(), 2);
    assert_eq!(found.items[0], OrderRecord::from_order(&order).items[0]);
    assert_eq!(found.items[1].id, "2");
    assert_eq!(found.items[1].name, "Product 2");
    assert_eq!(found.items[1].price, 450);
    assert_eq!(found.items[1].quantity, 3);
    assert_eq!(found.items[1].order_id, "123");
    assert_eq!(found.items[1].product_id, "456");
}

#[test]
fn update_overwrites_header_and_existing_item_fields() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteOrderRepository::try_new(&conn).unwrap();

    let mut order = make_order("123", vec![product_item("1")]);
    repo.create(&order).unwrap();

    order.customer_id = "999".to_string();
    order.items[0].quantity = 5;
    repo.update(&order).unwrap();

    let found = repo.find("123").unwrap();
    assert_eq!(found.customer_id, "999");
    assert_eq!(found.items[0].quantity, 5);
    assert_eq!(found.total, 5000);
}

#[test]
fn update_twice_is_idempotent() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteOrderRepository::try_new(&conn).unwrap();

    let mut order = make_order("123", vec![product_item("1")]);
    repo.create(&order).unwrap();
    order.add_item(product_item("2")).unwrap();

    repo.update(&order).unwrap();
    let after_first = repo.find_all().unwrap();
    repo.update(&order).unwrap();
    let after_second = repo.find_all().unwrap();

    assert_eq!(after_first, after_second);
    assert_eq!(after_second[0].items.len(), 2);
}

#[test]
fn update_keeps_item_rows_missing_from_aggregate() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteOrderRepository::try_new(&conn).unwrap();

    let mut order = make_order("123", vec![product_item("1"), product_item("2")]);
    repo.create(&order).unwrap();

    order.items.pop();
    repo.update(&order).unwrap();

    let found = repo.find("123").unwrap();
    let ids: Vec<&str> = found.items.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
    assert_eq!(found.total, order.total());
}

#[test]
fn update_missing_order_fails_with_update_failed() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteOrderRepository::try_new(&conn).unwrap();

    let err = repo
        .update(&make_order("ghost", vec![product_item("1")]))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::UpdateFailed {
            fault: StorageFault::OrderMissing(ref id),
            ..
        } if id == "ghost"
    ));
    assert!(repo.find_all().unwrap().is_empty());
}

#[test]
fn update_never_moves_items_between_orders() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteOrderRepository::try_new(&conn).unwrap();

    repo.create(&make_order("a", vec![product_item("a-1")]))
        .unwrap();
    let mut order_b = make_order("b", vec![product_item("b-1")]);
    repo.create(&order_b).unwrap();

    order_b.customer_id = "changed".to_string();
    order_b.add_item(product_item("a-1")).unwrap();
    let err = repo.update(&order_b).unwrap_err();
    match err {
        RepoError::UpdateFailed {
            fault: StorageFault::ItemOwnedByOtherOrder { item_id, owner_id },
            ..
        } => {
            assert_eq!(item_id, "a-1");
            assert_eq!(owner_id, "a");
        }
        other => panic!("unexpected error: {other}"),
    }

    let stored_b = repo.find("b").unwrap();
    assert_eq!(stored_b.customer_id, "123");
    assert_eq!(stored_b.items.len(), 1);
    assert_eq!(repo.find("a").unwrap().items[0].order_id, "a");
}

#[test]
fn invalid_aggregate_is_rejected_before_any_write() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteOrderRepository::try_new(&conn).unwrap();

    let mut order = make_order("123", vec![product_item("1")]);
    order.items[0].quantity = 0;

    assert!(matches!(
        repo.create(&order).unwrap_err(),
        RepoError::Validation(_)
    ));
    assert!(repo.find("123").unwrap_err().is_not_found());
}

#[test]
fn overflowing_total_is_rejected_before_any_write() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteOrderRepository::try_new(&conn).unwrap();

    let mut order = make_order("123", vec![product_item("1")]);
    repo.create(&order).unwrap();

    let half = i64::MAX / 2 + 1;
    order.items[0].price = half;
    assert!(matches!(
        repo.update(&order).unwrap_err(),
        RepoError::Validation(OrderValidationError::TotalOverflow)
    ));
    assert_eq!(repo.find("123").unwrap().total, 2000);

    let mut big = make_order("big", vec![product_item("b-1")]);
    big.items[0].price = half;
    assert!(matches!(
        repo.create(&big).unwrap_err(),
        RepoError::Validation(OrderValidationError::TotalOverflow)
    ));
    assert!(repo.find("big").unwrap_err().is_not_found());
}

#[test]
fn find_missing_order_returns_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteOrderRepository::try_new(&conn).unwrap();

    let err = repo.find("nonexistent-id").unwrap_err();
    assert!(matches!(err, RepoError::NotFound(ref id) if id == "nonexistent-id"));
    assert!(err.fault().is_none());
}

#[test]
fn find_reports_unreadable_rows_as_find_failed() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteOrderRepository::try_new(&conn).unwrap();
    repo.create(&make_order("123", vec![product_item("1")]))
        .unwrap();

    conn.execute(
        "UPDATE order_items SET quantity = 5000000000 WHERE id = '1';",
        [],
    )
    .unwrap();

    let err = repo.find("123").unwrap_err();
    assert!(matches!(
        err,
        RepoError::FindFailed {
            fault: StorageFault::InvalidData(_),
            ..
        }
    ));
    assert!(matches!(
        repo.find_all().unwrap_err(),
        RepoError::ListFailed(StorageFault::InvalidData(_))
    ));
}

#[test]
fn find_all_on_empty_store_returns_empty_list() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteOrderRepository::try_new(&conn).unwrap();

    assert!(repo.find_all().unwrap().is_empty());
}

#[test]
fn find_all_returns_orders_in_creation_order_with_scoped_items() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteOrderRepository::try_new(&conn).unwrap();

    let second_by_id = make_order("b", vec![product_item("b-1"), product_item("b-2")]);
    let first_by_id = make_order("a", vec![product_item("a-1")]);
    let empty = make_order("c", Vec::new());
    repo.create(&second_by_id).unwrap();
    repo.create(&first_by_id).unwrap();
    repo.create(&empty).unwrap();

    let all = repo.find_all().unwrap();
    assert_eq!(
        all,
        vec![
            OrderRecord::from_order(&second_by_id),
            OrderRecord::from_order(&first_by_id),
            OrderRecord::from_order(&empty),
        ]
    );
    assert_eq!(repo.find_all().unwrap(), all);
}

#[test]
fn concurrent_creates_on_different_orders_do_not_interfere() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkout.db");
    drop(open_db(&path).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let path = path.clone();
            std::thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let repo = SqliteOrderRepository::try_new(&conn).unwrap();
                for index in 0..5 {
                    let order_id = format!("order-{worker}-{index}");
                    let item_id = format!("item-{worker}-{index}");
                    repo.create(&make_order(&order_id, vec![product_item(&item_id)]))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let conn = open_db(&path).unwrap();
    let repo = SqliteOrderRepository::try_new(&conn).unwrap();
    let all = repo.find_all().unwrap();
    assert_eq!(all.len(), 20);
    for record in &all {
        assert_eq!(record.items.len(), 1);
        assert_eq!(record.items[0].order_id, record.id);
        assert_eq!(record.items[0].id, record.id.replace("order", "item"));
    }
}

#[test]
fn repository_rejects_uninitialized_connection() {
    let conn = Connection::open_in_memory().unwrap();

    match SqliteOrderRepository::try_new(&conn) {
        Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version: 0,
        }) => assert_eq!(expected_version, latest_version()),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected uninitialized connection error"),
    }
}

#[test]
fn repository_rejects_connection_without_order_items_table() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE orders (
            id TEXT PRIMARY KEY NOT NULL,
            customer_id TEXT NOT NULL,
            total INTEGER NOT NULL
        );",
    )
    .unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    assert!(matches!(
        SqliteOrderRepository::try_new(&conn),
        Err(RepoError::MissingRequiredTable("order_items"))
    ));
}

#[test]
fn repository_rejects_connection_missing_required_column() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE orders (
            id TEXT PRIMARY KEY NOT NULL,
            customer_id TEXT NOT NULL
        );",
    )
    .unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    assert!(matches!(
        SqliteOrderRepository::try_new(&conn),
        Err(RepoError::MissingRequiredColumn {
            table: "orders",
            column: "total"
        })
    ));
}
