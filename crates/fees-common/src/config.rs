//! Platform configuration

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::error::{FeeError, FeeResult};

/// Platform-wide settings with sensible defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// ISO currency code for wallet amounts
    pub currency: String,
    /// Country dialing prefix used to normalize local numbers
    pub country_prefix: String,
    /// Minimum wallet top-up amount
    pub min_topup: Decimal,
    /// Minimum SMS units per purchase
    pub min_sms_purchase: u32,
    /// Per-unit SMS cost when no pricing row is active
    pub fallback_sms_cost: Decimal,
    /// SMS units granted to new schools on the free trial
    pub free_trial_sms: i64,
    /// Free trial duration in days
    pub free_trial_days: i64,
    /// Monthly price of the basic plan
    pub basic_plan_price: Decimal,
    /// Monthly price of the premium plan
    pub premium_plan_price: Decimal,
    /// Monthly SMS allowance on the basic plan
    pub basic_plan_sms_limit: i64,
    /// Monthly SMS allowance on the premium plan
    pub premium_plan_sms_limit: i64,
    /// Default SMS sender id for new schools
    pub default_sender_id: String,
    /// Reset code time-to-live in seconds
    pub reset_code_ttl_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            currency: "GHS".into(),
            country_prefix: "+233".into(),
            min_topup: dec!(5.00),
            min_sms_purchase: 10,
            fallback_sms_cost: dec!(0.20),
            free_trial_sms: 50,
            free_trial_days: 14,
            basic_plan_price: dec!(29.99),
            premium_plan_price: dec!(79.99),
            basic_plan_sms_limit: 500,
            premium_plan_sms_limit: 2000,
            default_sender_id: "SchoolFees".into(),
            reset_code_ttl_secs: 900,
        }
    }
}

impl PlatformConfig {
    /// Load settings from the environment, falling back to defaults
    /// for anything unset. Set values must parse.
    pub fn from_env() -> FeeResult<Self> {
        let mut cfg = Self::default();

        if let Ok(v) = env::var("FEES_CURRENCY") {
            cfg.currency = v;
        }
        if let Ok(v) = env::var("FEES_COUNTRY_PREFIX") {
            cfg.country_prefix = v;
        }
        if let Ok(v) = env::var("FEES_MIN_TOPUP") {
            cfg.min_topup = parse_decimal("FEES_MIN_TOPUP", &v)?;
        }
        if let Ok(v) = env::var("FEES_MIN_SMS_PURCHASE") {
            cfg.min_sms_purchase = parse_num("FEES_MIN_SMS_PURCHASE", &v)?;
        }
        if let Ok(v) = env::var("FEES_SMS_COST_PER_UNIT") {
            cfg.fallback_sms_cost = parse_decimal("FEES_SMS_COST_PER_UNIT", &v)?;
        }
        if let Ok(v) = env::var("FEES_FREE_TRIAL_SMS") {
            cfg.free_trial_sms = parse_num("FEES_FREE_TRIAL_SMS", &v)?;
        }
        if let Ok(v) = env::var("FEES_FREE_TRIAL_DAYS") {
            cfg.free_trial_days = parse_num("FEES_FREE_TRIAL_DAYS", &v)?;
        }
        if let Ok(v) = env::var("FEES_SENDER_ID") {
            cfg.default_sender_id = v;
        }

        Ok(cfg)
    }

    /// Reset code lifetime as a duration
    pub fn reset_code_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reset_code_ttl_secs)
    }
}

fn parse_decimal(key: &str, value: &str) -> FeeResult<Decimal> {
    Decimal::from_str(value)
        .map_err(|e| FeeError::Config(format!("{key}: {e}")))
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> FeeResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| FeeError::Config(format!("{key}: {e}")))
}
