//! # Seed Data Generator
//!
//! Populates the database with a demo school marketplace for development.
//!
//! ## Usage
//! ```bash
//! # Seed the database from MARKET_DATABASE_PATH (default ./market.db)
//! cargo run -p market-db --bin seed
//!
//! # Specify database path
//! cargo run -p market-db --bin seed -- --db ./data/market.db
//! ```
//!
//! ## Generated Data
//! - One INTERNAL store (canteen) with unlimited snacks
//! - One THIRD_PARTY store (stationery) at 10% commission, with limited
//!   stock and installment tiers `{0: 1, 10000: 6, 50000: 10}`

use std::env;

use tracing::info;
use tracing_subscriber::EnvFilter;

use market_core::{ItemPaymentMode, SettlementBasis, StoreType};
use market_db::{Database, MarketConfig, NewStore, NewStoreItem};

const SCHOOL_ID: &str = "demo-school";

/// Canteen items: (name, category, price in cents)
const CANTEEN_ITEMS: &[(&str, &str, i64)] = &[
    ("Pão de queijo", "Lanches", 450),
    ("Suco de laranja", "Bebidas", 600),
    ("Sanduíche natural", "Lanches", 1200),
    ("Água mineral", "Bebidas", 300),
];

/// Stationery items: (name, category, price in cents, stock)
const STATIONERY_ITEMS: &[(&str, &str, i64, i64)] = &[
    ("Caderno universitário", "Papelaria", 5000, 40),
    ("Kit de canetas", "Papelaria", 2500, 100),
    ("Mochila escolar", "Acessórios", 18900, 15),
    ("Calculadora científica", "Eletrônicos", 8900, 20),
    ("Uniforme completo", "Vestuário", 45000, 10),
];

/// Installment tiers: (min amount in cents, max installments)
const TIERS: &[(i64, u32)] = &[(0, 1), (10000, 6), (50000, 10)];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut config = MarketConfig::from_env()?;

    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    config.database_path = args[i + 1].clone().into();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Campus Market Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: $MARKET_DATABASE_PATH or ./market.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let db = Database::new(config.db_config()).await?;
    let catalog = db.catalog();

    if !catalog.list_active_third_party_stores().await?.is_empty() {
        info!("Database already has stores, skipping seed");
        return Ok(());
    }

    let canteen = catalog
        .insert_store(NewStore {
            school_id: SCHOOL_ID.to_string(),
            name: "Cantina".to_string(),
            store_type: StoreType::Internal,
            owner_id: None,
            // Internal stores never settle; the column still needs a valid rate
            commission_bps: 10_000,
            settlement_basis: SettlementBasis::Delivered,
        })
        .await?;

    for (name, category, price_cents) in CANTEEN_ITEMS {
        catalog
            .insert_item(NewStoreItem {
                store_id: canteen.id.clone(),
                name: name.to_string(),
                category: category.to_string(),
                price_cents: *price_cents,
                total_stock: None,
                payment_mode: ItemPaymentMode::MoneyOnly,
            })
            .await?;
    }

    let stationery = catalog
        .insert_store(NewStore {
            school_id: SCHOOL_ID.to_string(),
            name: "Papelaria do Campus".to_string(),
            store_type: StoreType::ThirdParty,
            owner_id: Some("owner-papelaria".to_string()),
            commission_bps: 1_000,
            settlement_basis: SettlementBasis::Delivered,
        })
        .await?;

    for (name, category, price_cents, stock) in STATIONERY_ITEMS {
        catalog
            .insert_item(NewStoreItem {
                store_id: stationery.id.clone(),
                name: name.to_string(),
                category: category.to_string(),
                price_cents: *price_cents,
                total_stock: Some(*stock),
                payment_mode: ItemPaymentMode::MoneyOnly,
            })
            .await?;
    }

    for (min_amount_cents, max_installments) in TIERS {
        catalog
            .insert_rule(&stationery.id, *min_amount_cents, *max_installments)
            .await?;
    }

    info!(
        canteen_id = %canteen.id,
        stationery_id = %stationery.id,
        items = CANTEEN_ITEMS.len() + STATIONERY_ITEMS.len(),
        tiers = TIERS.len(),
        "Seed complete"
    );

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,market=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
