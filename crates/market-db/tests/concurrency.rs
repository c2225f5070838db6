//! Concurrent checkouts, transitions and settlement runs against a
//! file-backed pool.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Datelike, Utc};
use proptest::prelude::*;

use market_core::cart::CheckoutLine;
use market_core::payment::PaymentPlanRequest;
use market_core::types::Rate;
use market_core::{
    CoreError, ItemPaymentMode, OrderStatus, PaymentMethod, PaymentMode, SettlementBasis, Store,
    StoreItem, StoreType,
};
use market_db::{
    CheckoutRequest, CheckoutService, Database, DbConfig, FixedAcademicCalendar,
    FixedPlatformSettings, NewStore, NewStoreItem, OrderService, ServiceError, SettlementEngine,
};

/// Temp database file removed on drop, WAL sidecars included.
struct TempDb {
    path: PathBuf,
}

impl TempDb {
    fn new() -> Self {
        TempDb {
            path: std::env::temp_dir().join(format!("market-{}.db", uuid::Uuid::new_v4())),
        }
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", self.path.display()));
        }
    }
}

struct Outcome {
    sold: usize,
    rejected: usize,
    stock_left: Option<i64>,
    order_numbers: HashSet<String>,
}

async fn open(file: &TempDb) -> Database {
    Database::new(DbConfig::new(&file.path).max_connections(4))
        .await
        .unwrap()
}

async fn seed(db: &Database, stock: i64) -> (Store, StoreItem) {
    let store = db
        .catalog()
        .insert_store(NewStore {
            school_id: "school-1".to_string(),
            name: "Papelaria".to_string(),
            store_type: StoreType::ThirdParty,
            owner_id: Some("owner-1".to_string()),
            commission_bps: 1000,
            settlement_basis: SettlementBasis::Delivered,
        })
        .await
        .unwrap();
    let item = db
        .catalog()
        .insert_item(NewStoreItem {
            store_id: store.id.clone(),
            name: "Calculadora".to_string(),
            category: "Eletrônicos".to_string(),
            price_cents: 8900,
            total_stock: Some(stock),
            payment_mode: ItemPaymentMode::MoneyOnly,
        })
        .await
        .unwrap();
    (store, item)
}

fn paid_with_balance(student_id: String, store: &Store, item: &StoreItem, quantity: i64) -> CheckoutRequest {
    CheckoutRequest {
        student_id,
        store_id: store.id.clone(),
        items: vec![CheckoutLine::new(&item.id, quantity)],
        payment_plan: PaymentPlanRequest {
            payment_mode: PaymentMode::Immediate,
            payment_method: Some(PaymentMethod::Balance),
            installments: None,
            spread_across_period: false,
        },
        notes: None,
    }
}

async fn stock_of(db: &Database, item: &StoreItem) -> Option<i64> {
    db.catalog().get_item(&item.id).await.unwrap().unwrap().total_stock
}

async fn race(stock: i64, buyers: usize) -> Outcome {
    let file = TempDb::new();
    let db = open(&file).await;
    let (store, item) = seed(&db, stock).await;
    let checkout = CheckoutService::new(&db, Arc::new(FixedAcademicCalendar::default()));

    let mut handles = Vec::with_capacity(buyers);
    for buyer in 0..buyers {
        let checkout = checkout.clone();
        let request = paid_with_balance(format!("student-{buyer}"), &store, &item, 1);
        handles.push(tokio::spawn(async move { checkout.checkout(request).await }));
    }

    let mut outcome = Outcome {
        sold: 0,
        rejected: 0,
        stock_left: None,
        order_numbers: HashSet::new(),
    };
    for handle in handles {
        match handle.await.unwrap() {
            Ok(order) => {
                outcome.sold += 1;
                outcome.order_numbers.insert(order.order_number);
            }
            Err(ServiceError::Core(CoreError::InsufficientStock { .. })) => outcome.rejected += 1,
            Err(other) => panic!("unexpected checkout error: {other}"),
        }
    }

    outcome.stock_left = stock_of(&db, &item).await;
    db.close().await;
    outcome
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_units_are_never_oversold() {
    let outcome = race(3, 12).await;

    assert_eq!(outcome.sold, 3);
    assert_eq!(outcome.rejected, 9);
    assert_eq!(outcome.stock_left, Some(0));
    assert_eq!(outcome.order_numbers.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn approval_and_rejections_settle_on_one_outcome() {
    let file = TempDb::new();
    let db = open(&file).await;
    let (store, item) = seed(&db, 5).await;
    let checkout = CheckoutService::new(&db, Arc::new(FixedAcademicCalendar::default()));
    let orders = OrderService::new(&db);

    let order = checkout
        .checkout(paid_with_balance("student-1".to_string(), &store, &item, 2))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::PendingApproval);
    assert_eq!(stock_of(&db, &item).await, Some(3));

    let mut handles = Vec::new();
    {
        let orders = orders.clone();
        let order_id = order.id.clone();
        handles.push(tokio::spawn(async move { orders.approve(&order_id).await }));
    }
    for _ in 0..3 {
        let orders = orders.clone();
        let order_id = order.id.clone();
        handles.push(tokio::spawn(async move { orders.reject(&order_id, "sem estoque").await }));
    }

    let mut winners = Vec::new();
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(order) => winners.push(order.status),
            Err(ServiceError::Core(CoreError::InvalidTransition { .. })) => refused += 1,
            Err(other) => panic!("unexpected transition error: {other}"),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(refused, 3);

    // Stock comes back exactly once, and only if a rejection won
    let expected_stock = match winners[0] {
        OrderStatus::Rejected => 5,
        OrderStatus::Approved => 3,
        other => panic!("unexpected winning status: {other}"),
    };
    assert_eq!(stock_of(&db, &item).await, Some(expected_stock));
    assert_eq!(orders.get_order(&order.id).await.unwrap().status, winners[0]);

    db.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_settle_a_period_once() {
    let file = TempDb::new();
    let db = open(&file).await;
    let (store, item) = seed(&db, 5).await;
    let checkout = CheckoutService::new(&db, Arc::new(FixedAcademicCalendar::default()));
    let orders = OrderService::new(&db);

    let order = checkout
        .checkout(paid_with_balance("student-1".to_string(), &store, &item, 1))
        .await
        .unwrap();
    orders.approve(&order.id).await.unwrap();
    orders.deliver(&order.id, None).await.unwrap();

    let engine = SettlementEngine::new(
        &db,
        Arc::new(FixedPlatformSettings::new(Rate::from_bps(500))),
    );
    let now = Utc::now();
    let (year, month) = (now.year(), now.month());

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        let store_id = store.id.clone();
        handles.push(tokio::spawn(async move { engine.generate(&store_id, year, month).await }));
    }

    let mut generated = Vec::new();
    let mut already_settled = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(settlement) => generated.push(settlement),
            Err(ServiceError::Core(CoreError::AlreadySettled { .. })) => already_settled += 1,
            Err(other) => panic!("unexpected settlement error: {other}"),
        }
    }

    assert_eq!(generated.len(), 1);
    assert_eq!(already_settled, 3);
    assert_eq!(generated[0].order_count, 1);
    assert_eq!(generated[0].total_sales_cents, 8900);

    let stored = engine.list_for_store(&store.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, generated[0].id);

    db.close().await;
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(6))]

    #[test]
    fn sales_never_exceed_stock(stock in 0i64..5, buyers in 1usize..9) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        let outcome = runtime.block_on(race(stock, buyers));

        let expected = buyers.min(stock as usize);
        prop_assert_eq!(outcome.sold, expected);
        prop_assert_eq!(outcome.sold + outcome.rejected, buyers);
        prop_assert_eq!(outcome.stock_left, Some(stock - expected as i64));
        prop_assert_eq!(outcome.order_numbers.len(), expected);
    }
}
