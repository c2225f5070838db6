//! # Settlement Math
//!
//! Pure pieces of the monthly settlement engine: the payout status machine,
//! the commission/fee breakdown and the period bounds.
//!
//! ## Breakdown
//! ```text
//! total_sales   = Σ order totals in the period        10000
//! combined      = round(total × (c + f) / 10000)       1500   (c=1000, f=500)
//! commission    = round(total × c / 10000)             1000
//! platform_fee  = combined − commission                 500
//! transfer      = total − combined                     8500
//! ```
//!
//! Rounding the combined deduction once keeps
//! `commission + platform_fee + transfer == total_sales` exact, and the
//! transfer can only go negative when `c + f` exceeds 100%.
//!
//! ## Status Machine
//! ```text
//!  PENDING ──approve──► APPROVED ──start_processing──► PROCESSING ──mark_transferred──► TRANSFERRED ■
//!     │                    │                               │
//!     └────────────────────┴───────────┬───────────────────┘
//!                                      │ fail / cancel
//!                                      ▼
//!                           FAILED ■ / CANCELLED ■
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Rate, SettlementStatus};

// =============================================================================
// Status Machine
// =============================================================================

/// A status-changing command on a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementAction {
    Approve,
    StartProcessing,
    MarkTransferred,
    /// Payout attempt failed; requires a reason.
    Fail,
    Cancel,
}

impl SettlementAction {
    pub const ALL: [SettlementAction; 5] = [
        SettlementAction::Approve,
        SettlementAction::StartProcessing,
        SettlementAction::MarkTransferred,
        SettlementAction::Fail,
        SettlementAction::Cancel,
    ];

    pub const fn sources(&self) -> &'static [SettlementStatus] {
        use SettlementStatus::*;
        match self {
            SettlementAction::Approve => &[Pending],
            SettlementAction::StartProcessing => &[Approved],
            SettlementAction::MarkTransferred => &[Processing],
            SettlementAction::Fail | SettlementAction::Cancel => &[Pending, Approved, Processing],
        }
    }

    pub const fn target(&self) -> SettlementStatus {
        match self {
            SettlementAction::Approve => SettlementStatus::Approved,
            SettlementAction::StartProcessing => SettlementStatus::Processing,
            SettlementAction::MarkTransferred => SettlementStatus::Transferred,
            SettlementAction::Fail => SettlementStatus::Failed,
            SettlementAction::Cancel => SettlementStatus::Cancelled,
        }
    }

    pub fn is_allowed_from(&self, current: SettlementStatus) -> bool {
        self.sources().contains(&current)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            SettlementAction::Approve => "approve",
            SettlementAction::StartProcessing => "start_processing",
            SettlementAction::MarkTransferred => "mark_transferred",
            SettlementAction::Fail => "fail",
            SettlementAction::Cancel => "cancel",
        }
    }
}

impl fmt::Display for SettlementAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applies `action` to a settlement currently in `current`.
pub fn transition_settlement(
    settlement_id: &str,
    current: SettlementStatus,
    action: SettlementAction,
) -> CoreResult<SettlementStatus> {
    if action.is_allowed_from(current) {
        Ok(action.target())
    } else {
        Err(CoreError::InvalidSettlementTransition {
            settlement_id: settlement_id.to_string(),
            current,
            attempted: action,
        })
    }
}

/// SQL fragment listing the source statuses of a settlement action.
pub fn settlement_sources_sql_list(action: SettlementAction) -> String {
    action
        .sources()
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Breakdown
// =============================================================================

/// Money split of one settlement period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SettlementBreakdown {
    pub total_sales: Money,
    pub commission: Money,
    pub platform_fee: Money,
    pub transfer: Money,
}

/// Computes the commission, platform fee and transfer for `total_sales`.
///
/// ## Errors
/// [`CoreError::NegativeTransfer`] when the combined rate exceeds 100% or the
/// deductions would exceed the total.
///
/// ## Example
/// ```rust
/// use market_core::money::Money;
/// use market_core::settlement::compute_settlement;
/// use market_core::types::Rate;
///
/// let b = compute_settlement(Money::from_cents(10000), Rate::from_bps(1000), Rate::from_bps(500)).unwrap();
/// assert_eq!(b.commission.cents(), 1000);
/// assert_eq!(b.platform_fee.cents(), 500);
/// assert_eq!(b.transfer.cents(), 8500);
/// ```
pub fn compute_settlement(
    total_sales: Money,
    commission_rate: Rate,
    platform_fee_rate: Rate,
) -> CoreResult<SettlementBreakdown> {
    let negative = || CoreError::NegativeTransfer {
        total_sales_cents: total_sales.cents(),
        commission_bps: commission_rate.bps(),
        platform_fee_bps: platform_fee_rate.bps(),
    };

    if total_sales.is_negative() {
        return Err(negative());
    }

    let combined_rate = commission_rate.combined(platform_fee_rate);
    if combined_rate.exceeds_full() {
        return Err(negative());
    }

    let combined = total_sales.apply_rate(combined_rate);
    if combined > total_sales {
        return Err(negative());
    }

    let commission = total_sales.apply_rate(commission_rate);
    Ok(SettlementBreakdown {
        total_sales,
        commission,
        platform_fee: combined - commission,
        transfer: total_sales - combined,
    })
}

// =============================================================================
// Period Bounds
// =============================================================================

/// Half-open UTC range `[first day of month, first day of next month)`.
///
/// Rejects months outside 1..=12 and years chrono cannot represent.
pub fn month_bounds(year: i32, month: u32) -> Result<(DateTime<Utc>, DateTime<Utc>), ValidationError> {
    if !(1..=12).contains(&month) {
        return Err(ValidationError::OutOfRange {
            field: "month".to_string(),
            min: 1,
            max: 12,
        });
    }
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };

    let start = first_instant(year, month)?;
    let end = first_instant(next_year, next_month)?;
    Ok((start, end))
}

fn first_instant(year: i32, month: u32) -> Result<DateTime<Utc>, ValidationError> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ValidationError::invalid("year", format!("{year} is not a valid year")))
}

// =============================================================================
// Unit Tests
// =============================================================================
