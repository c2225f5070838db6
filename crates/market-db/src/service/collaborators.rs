//! Collaborator seams.
//!
//! The platform fee and the academic calendar are owned by other systems.
//! Services reach them through these traits; the `Fixed*` implementations are
//! backed by [`MarketConfig`](crate::config::MarketConfig).

use chrono::NaiveDate;

use market_core::types::Rate;

use crate::config::MarketConfig;

/// Platform-wide settings.
pub trait PlatformSettings: Send + Sync {
    /// Fee retained by the platform on third-party sales.
    fn platform_fee(&self) -> Rate;
}

/// Academic calendar of a school.
pub trait AcademicCalendar: Send + Sync {
    /// Last day of the active academic period, if one is configured.
    fn active_period_end(&self, school_id: &str) -> Option<NaiveDate>;
}

/// Fee taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct FixedPlatformSettings {
    fee: Rate,
}

impl FixedPlatformSettings {
    pub fn new(fee: Rate) -> Self {
        FixedPlatformSettings { fee }
    }

    pub fn from_config(config: &MarketConfig) -> Self {
        Self::new(Rate::from_bps(config.platform_fee_bps))
    }
}

impl PlatformSettings for FixedPlatformSettings {
    fn platform_fee(&self) -> Rate {
        self.fee
    }
}

/// Same period end for every school.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedAcademicCalendar {
    period_end: Option<NaiveDate>,
}

impl FixedAcademicCalendar {
    pub fn new(period_end: Option<NaiveDate>) -> Self {
        FixedAcademicCalendar { period_end }
    }

    pub fn from_config(config: &MarketConfig) -> Self {
        Self::new(config.academic_period_end)
    }
}

impl AcademicCalendar for FixedAcademicCalendar {
    fn active_period_end(&self, _school_id: &str) -> Option<NaiveDate> {
        self.period_end
    }
}
