//! # Settlement Trigger
//!
//! Periodic entry point for the settlement engine, meant to run from cron at
//! the start of each month.
//!
//! ## Usage
//! ```bash
//! # Settle the previous calendar month
//! cargo run -p market-db --bin settle
//!
//! # Settle a specific month
//! cargo run -p market-db --bin settle -- --year 2026 --month 9
//! ```
//!
//! After generating, pending outbox events are drained to the log. Entries a
//! sink refused stay parked and are reported, not retried.
//! Exits non-zero when any store failed to settle.

use std::env;
use std::sync::Arc;

use chrono::{Datelike, Utc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use market_db::{
    Database, FixedPlatformSettings, LoggingSink, MarketConfig, OutboxDispatcher, SettlementEngine,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let (mut year, mut month) = previous_month();

    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--year" | "-y" => {
                if i + 1 < args.len() {
                    year = args[i + 1].parse()?;
                    i += 1;
                }
            }
            "--month" | "-m" => {
                if i + 1 < args.len() {
                    month = args[i + 1].parse()?;
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Campus Market Settlement Trigger");
                println!();
                println!("Usage: settle [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -y, --year <YYYY>   Period year (default: previous month's)");
                println!("  -m, --month <M>     Period month 1-12 (default: previous month)");
                println!("  -h, --help          Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let config = MarketConfig::from_env()?;
    let db = Database::new(config.db_config()).await?;

    let engine = SettlementEngine::new(&db, Arc::new(FixedPlatformSettings::from_config(&config)));
    let run = engine.generate_for_period(year, month).await?;

    for settlement in &run.generated {
        info!(
            store_id = %settlement.store_id,
            total_sales_cents = settlement.total_sales_cents,
            commission_cents = settlement.commission_cents,
            platform_fee_cents = settlement.platform_fee_cents,
            transfer_cents = settlement.transfer_cents,
            "Settled"
        );
    }

    let dispatcher = OutboxDispatcher::new(db.outbox(), config.outbox_batch_size);
    loop {
        let report = dispatcher.dispatch_pending(&LoggingSink).await?;
        if report.dispatched + report.failed == 0 {
            break;
        }
    }

    let failed = db.outbox().count_failed().await?;
    if failed > 0 {
        warn!(failed, "Outbox entries parked after failed delivery");
    }

    db.close().await;

    if !run.failed.is_empty() {
        return Err(format!("{} store(s) failed to settle for {year}-{month:02}", run.failed.len()).into());
    }
    Ok(())
}

/// The calendar month before today (UTC).
fn previous_month() -> (i32, u32) {
    let today = Utc::now().date_naive();
    if today.month() == 1 {
        (today.year() - 1, 12)
    } else {
        (today.year(), today.month() - 1)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,market=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
