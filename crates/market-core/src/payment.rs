//! # Payment Plans
//!
//! Resolves how a buyer pays for an order.
//!
//! ## Plan Shapes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  IMMEDIATE ── method ──┬── PIX / CARD ──► PENDING_PAYMENT               │
//! │                        └── BALANCE / CASH ──► PENDING_APPROVAL          │
//! │                                                                         │
//! │  DEFERRED ──┬── Installments { count }  (count ≤ store tier maximum)    │
//! │             │                              ──► PENDING_APPROVAL          │
//! │             └── SpreadAcrossPeriod     (months left in the academic     │
//! │                                         period, minimum 1)               │
//! │                                            ──► PENDING_APPROVAL          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The two deferred shapes are mutually exclusive variants; a request that
//! sets both (or neither) is a [`ValidationError`].

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{OrderStatus, PaymentMethod, PaymentMode};

/// A validated payment plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentPlan {
    Immediate { method: PaymentMethod },
    /// Deferred, split into a fixed number of invoice lines.
    Installments { count: u32 },
    /// Deferred, one invoice line per remaining month of the academic period.
    SpreadAcrossPeriod,
}

impl PaymentPlan {
    pub const fn mode(&self) -> PaymentMode {
        match self {
            PaymentPlan::Immediate { .. } => PaymentMode::Immediate,
            _ => PaymentMode::Deferred,
        }
    }

    pub const fn method(&self) -> Option<PaymentMethod> {
        match self {
            PaymentPlan::Immediate { method } => Some(*method),
            _ => None,
        }
    }

    /// Status a freshly created order starts in.
    pub const fn initial_status(&self) -> OrderStatus {
        match self {
            PaymentPlan::Immediate { method } if method.requires_external_confirmation() => {
                OrderStatus::PendingPayment
            }
            _ => OrderStatus::PendingApproval,
        }
    }
}

/// Raw plan fields as they arrive from the client.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPlanRequest {
    pub payment_mode: PaymentMode,
    pub payment_method: Option<PaymentMethod>,
    pub installments: Option<u32>,
    #[serde(default)]
    pub spread_across_period: bool,
}

impl TryFrom<PaymentPlanRequest> for PaymentPlan {
    type Error = ValidationError;

    fn try_from(req: PaymentPlanRequest) -> Result<Self, Self::Error> {
        match req.payment_mode {
            PaymentMode::Immediate => {
                if req.installments.is_some() || req.spread_across_period {
                    return Err(ValidationError::invalid(
                        "payment_plan",
                        "immediate payment cannot be split",
                    ));
                }
                let method = req
                    .payment_method
                    .ok_or_else(|| ValidationError::required("payment_method"))?;
                Ok(PaymentPlan::Immediate { method })
            }
            PaymentMode::Deferred => {
                if req.payment_method.is_some() {
                    return Err(ValidationError::invalid(
                        "payment_method",
                        "deferred orders are billed by invoice",
                    ));
                }
                match (req.installments, req.spread_across_period) {
                    (Some(count), false) => Ok(PaymentPlan::Installments { count }),
                    (None, true) => Ok(PaymentPlan::SpreadAcrossPeriod),
                    (Some(_), true) => Err(ValidationError::invalid(
                        "payment_plan",
                        "choose either installments or spread across period, not both",
                    )),
                    (None, false) => Err(ValidationError::invalid(
                        "payment_plan",
                        "deferred payment needs installments or spread across period",
                    )),
                }
            }
        }
    }
}

/// Checks a requested installment count against the store's tier maximum.
///
/// ## Returns
/// * `Ok(count)` - `2 <= count <= max`
/// * `Err(CoreError::InstallmentsNotAllowed)` - otherwise
pub fn check_installments(requested: u32, max: u32) -> CoreResult<u32> {
    if requested < 2 || requested > max {
        return Err(CoreError::InstallmentsNotAllowed { requested, max });
    }
    Ok(requested)
}

/// Whole calendar months from `today` until `period_end`, minimum 1.
///
/// Counted by calendar month: from any day in October to any day in
/// December is 2. A period that already ended still yields 1 so the charge
/// lands on the next invoice.
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use market_core::payment::months_until_period_end;
///
/// let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
/// let end = NaiveDate::from_ymd_opt(2026, 12, 15).unwrap();
/// assert_eq!(months_until_period_end(today, end), 2);
/// ```
pub fn months_until_period_end(today: NaiveDate, period_end: NaiveDate) -> u32 {
    let months = (period_end.year() - today.year()) * 12 + period_end.month() as i32
        - today.month() as i32;
    months.max(1) as u32
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn request(
        mode: PaymentMode,
        method: Option<PaymentMethod>,
        installments: Option<u32>,
        spread: bool,
    ) -> PaymentPlanRequest {
        PaymentPlanRequest {
            payment_mode: mode,
            payment_method: method,
            installments,
            spread_across_period: spread,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_immediate_initial_status_depends_on_method() {
        let pix = PaymentPlan::Immediate { method: PaymentMethod::Pix };
        let cash = PaymentPlan::Immediate { method: PaymentMethod::Cash };
        assert_eq!(pix.initial_status(), OrderStatus::PendingPayment);
        assert_eq!(cash.initial_status(), OrderStatus::PendingApproval);
        assert_eq!(
            PaymentPlan::Installments { count: 3 }.initial_status(),
            OrderStatus::PendingApproval
        );
        assert_eq!(PaymentPlan::SpreadAcrossPeriod.mode(), PaymentMode::Deferred);
    }

    #[test]
    fn test_request_conversion() {
        let plan = PaymentPlan::try_from(request(
            PaymentMode::Immediate,
            Some(PaymentMethod::Balance),
            None,
            false,
        ))
        .unwrap();
        assert_eq!(plan.method(), Some(PaymentMethod::Balance));

        let plan =
            PaymentPlan::try_from(request(PaymentMode::Deferred, None, Some(4), false)).unwrap();
        assert_eq!(plan, PaymentPlan::Installments { count: 4 });

        let plan = PaymentPlan::try_from(request(PaymentMode::Deferred, None, None, true)).unwrap();
        assert_eq!(plan, PaymentPlan::SpreadAcrossPeriod);
    }

    #[test]
    fn test_malformed_requests_are_validation_errors() {
        assert!(matches!(
            PaymentPlan::try_from(request(PaymentMode::Immediate, None, None, false)),
            Err(ValidationError::Required { .. })
        ));
        assert!(PaymentPlan::try_from(request(
            PaymentMode::Immediate,
            Some(PaymentMethod::Pix),
            Some(2),
            false
        ))
        .is_err());
        assert!(PaymentPlan::try_from(request(PaymentMode::Deferred, None, Some(2), true)).is_err());
        assert!(PaymentPlan::try_from(request(PaymentMode::Deferred, None, None, false)).is_err());
        assert!(PaymentPlan::try_from(request(
            PaymentMode::Deferred,
            Some(PaymentMethod::Cash),
            Some(2),
            false
        ))
        .is_err());
    }

    #[test]
    fn test_check_installments() {
        assert_eq!(check_installments(6, 6).unwrap(), 6);
        assert!(matches!(
            check_installments(7, 6),
            Err(CoreError::InstallmentsNotAllowed { requested: 7, max: 6 })
        ));
        assert!(check_installments(1, 6).is_err());
        assert!(check_installments(2, 1).is_err());
    }

    #[test]
    fn test_months_until_period_end() {
        assert_eq!(months_until_period_end(date(2026, 10, 18), date(2026, 12, 15)), 2);
        assert_eq!(months_until_period_end(date(2026, 10, 18), date(2027, 6, 30)), 8);
        assert_eq!(months_until_period_end(date(2026, 10, 18), date(2026, 10, 31)), 1);
        assert_eq!(months_until_period_end(date(2026, 10, 18), date(2026, 3, 1)), 1);
    }
}
