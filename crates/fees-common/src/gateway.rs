//! Gateway ports - outbound provider abstraction
//!
//! The SMS and payment providers are black-box HTTP services. Workflows
//! depend on these traits; `fees-gateway` supplies the HTTP clients and
//! tests supply in-memory doubles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::FeeResult;

/// Outcome of one SMS delivery attempt.
///
/// Provider failure is data, not an error: the dispatch workflow logs
/// failed attempts and moves on without retrying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsDelivery {
    /// Whether the provider accepted the message
    pub success: bool,
    /// Provider status text or failure reason
    pub detail: String,
    /// Raw provider payload, kept for the audit log
    pub raw: Option<serde_json::Value>,
}

impl SmsDelivery {
    /// Accepted delivery
    pub fn sent(detail: impl Into<String>, raw: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
            raw,
        }
    }

    /// Rejected or errored delivery
    pub fn failed(detail: impl Into<String>, raw: Option<serde_json::Value>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
            raw,
        }
    }
}

/// SMS gateway port
#[async_trait]
pub trait SmsGateway: Send + Sync {
    /// Send one message to one recipient. One bounded-timeout attempt,
    /// no retries; a transport error surfaces as a failed delivery.
    async fn send(&self, recipient: &str, message: &str) -> SmsDelivery;
}

/// Hosted checkout session returned by transaction initialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// URL the customer completes payment at
    pub authorization_url: String,
    /// Provider access code for the session
    pub access_code: String,
    /// Transaction reference echoed back by the provider
    pub reference: String,
}

/// Verified state of a previously initialized transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentVerification {
    /// Provider status, e.g. `success`, `failed`, `abandoned`
    pub status: String,
    /// Amount in currency units (converted back from subunits)
    pub amount: Decimal,
    /// When the customer paid, if they did
    pub paid_at: Option<DateTime<Utc>>,
    /// Payment channel, e.g. `card`, `mobile_money`
    pub channel: Option<String>,
}

impl PaymentVerification {
    /// Whether the provider settled this transaction successfully
    pub fn is_successful(&self) -> bool {
        self.status == "success"
    }
}

/// Payment gateway port
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Initialize a hosted checkout for the given amount
    async fn initialize(
        &self,
        email: &str,
        amount: Decimal,
        reference: &str,
        callback_url: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> FeeResult<CheckoutSession>;

    /// Verify the state of a transaction by reference
    async fn verify(&self, reference: &str) -> FeeResult<PaymentVerification>;
}
