//! SMS pricing book and cost calculator

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use fees_common::{FeeError, FeeResult, PlatformConfig};

use crate::model::SmsPricing;

/// Details for a new pricing row
#[derive(Debug, Clone)]
pub struct NewSmsPricing {
    /// Price per SMS unit
    pub price_per_sms: Decimal,
    /// Minimum units for the bulk discount
    pub bulk_discount_threshold: u32,
    /// Discount percentage at or above the threshold
    pub bulk_discount_percentage: Decimal,
}

/// Quoted cost of a unit purchase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsQuote {
    /// Units quoted
    pub units: u32,
    /// units × price_per_sms, full precision
    pub base_cost: Decimal,
    /// Discount percentage applied, zero below the threshold
    pub discount_percentage: Decimal,
    /// base_cost × pct / 100
    pub discount_amount: Decimal,
    /// base_cost − discount_amount
    pub final_cost: Decimal,
}

/// Pricing rows with at most one active at any time
pub struct SmsPricingBook {
    rows: Arc<RwLock<Vec<SmsPricing>>>,
    fallback_unit_cost: Decimal,
}

impl SmsPricingBook {
    /// Create an empty book; quotes fall back to the configured unit cost
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            rows: Arc::new(RwLock::new(Vec::new())),
            fallback_unit_cost: config.fallback_sms_cost,
        }
    }

    /// Insert a new active row, deactivating every other row in the
    /// same write. There is never a window with zero or two active rows.
    pub fn activate(&self, details: NewSmsPricing) -> FeeResult<SmsPricing> {
        if details.price_per_sms <= Decimal::ZERO {
            return Err(FeeError::Validation("price_per_sms must be positive".into()));
        }
        if details.bulk_discount_percentage < Decimal::ZERO
            || details.bulk_discount_percentage > dec!(100)
        {
            return Err(FeeError::Validation(
                "bulk_discount_percentage must be between 0 and 100".into(),
            ));
        }

        let row = SmsPricing {
            id: Uuid::new_v4(),
            price_per_sms: details.price_per_sms,
            bulk_discount_threshold: details.bulk_discount_threshold,
            bulk_discount_percentage: details.bulk_discount_percentage,
            effective_from: Utc::now(),
            is_active: true,
        };

        let mut rows = self.rows.write();
        for existing in rows.iter_mut() {
            existing.is_active = false;
        }
        rows.push(row.clone());

        info!(pricing = %row.id, price = %row.price_per_sms, "sms pricing activated");
        Ok(row)
    }

    /// Mark an existing row active, deactivating the others atomically
    pub fn reactivate(&self, id: Uuid) -> FeeResult<SmsPricing> {
        let mut rows = self.rows.write();
        let target = rows
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| FeeError::NotFound(format!("sms pricing {id}")))?;
        for row in rows.iter_mut() {
            row.is_active = row.id == id;
        }
        Ok(rows[target].clone())
    }

    /// The row currently in force
    pub fn active(&self) -> Option<SmsPricing> {
        self.rows.read().iter().find(|r| r.is_active).cloned()
    }

    /// All rows, newest first
    pub fn history(&self) -> Vec<SmsPricing> {
        let mut rows = self.rows.read().clone();
        rows.sort_by(|a, b| b.effective_from.cmp(&a.effective_from));
        rows
    }

    /// Quote the cost of `units`. Callers reject zero-unit requests
    /// before quoting; internal arithmetic keeps full precision and
    /// rounding happens only at display time.
    pub fn quote(&self, units: u32) -> SmsQuote {
        debug_assert!(units > 0, "unit counts are validated by callers");

        match self.active() {
            None => {
                let base = self.fallback_unit_cost * Decimal::from(units);
                SmsQuote {
                    units,
                    base_cost: base,
                    discount_percentage: Decimal::ZERO,
                    discount_amount: Decimal::ZERO,
                    final_cost: base,
                }
            }
            Some(pricing) => {
                let base_cost = pricing.price_per_sms * Decimal::from(units);
                let (pct, discount_amount) = if units >= pricing.bulk_discount_threshold {
                    (
                        pricing.bulk_discount_percentage,
                        base_cost * pricing.bulk_discount_percentage / dec!(100),
                    )
                } else {
                    (Decimal::ZERO, Decimal::ZERO)
                };
                SmsQuote {
                    units,
                    base_cost,
                    discount_percentage: pct,
                    discount_amount,
                    final_cost: base_cost - discount_amount,
                }
            }
        }
    }
}
