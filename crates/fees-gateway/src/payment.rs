//! Paystack payment client
//!
//! Hosted checkout initialization and transaction verification. The
//! provider deals in currency subunits, so amounts convert by a factor
//! of 100 at the wire boundary and nowhere else.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use tracing::{debug, error};

use fees_common::{
    CheckoutSession, FeeError, FeeResult, PaymentGateway, PaymentVerification,
};

const DEFAULT_BASE_URL: &str = "https://api.paystack.co";

/// Paystack gateway client
pub struct PaystackClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
    currency: String,
}

#[derive(Deserialize)]
struct ApiEnvelope<T> {
    status: bool,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Deserialize)]
struct InitData {
    authorization_url: String,
    access_code: String,
    reference: String,
}

#[derive(Deserialize)]
struct VerifyData {
    status: String,
    amount: i64,
    paid_at: Option<String>,
    channel: Option<String>,
}

impl PaystackClient {
    /// Build a client for the given secret key and settlement currency
    pub fn new(secret_key: impl Into<String>, currency: impl Into<String>) -> FeeResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| FeeError::Config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.into(),
            secret_key: secret_key.into(),
            currency: currency.into(),
        })
    }

    /// Build a client from `PAYSTACK_SECRET_KEY`
    pub fn from_env(currency: impl Into<String>) -> FeeResult<Self> {
        let secret_key = env::var("PAYSTACK_SECRET_KEY")
            .map_err(|_| FeeError::Config("PAYSTACK_SECRET_KEY is not set".into()))?;
        Self::new(secret_key, currency)
    }

    /// Override the API endpoint, mainly for tests against a local stub
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Currency units to provider subunits, truncating sub-subunit dust
    pub fn to_subunits(amount: Decimal) -> FeeResult<i64> {
        (amount * dec!(100))
            .trunc()
            .to_i64()
            .ok_or_else(|| FeeError::Validation(format!("amount out of range: {amount}")))
    }

    /// Provider subunits back to currency units
    pub fn from_subunits(subunits: i64) -> Decimal {
        Decimal::from(subunits) / dec!(100)
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize(
        &self,
        email: &str,
        amount: Decimal,
        reference: &str,
        callback_url: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> FeeResult<CheckoutSession> {
        let payload = serde_json::json!({
            "email": email,
            "amount": Self::to_subunits(amount)?,
            "reference": reference,
            "currency": self.currency,
            "callback_url": callback_url,
            "metadata": metadata.unwrap_or_else(|| serde_json::json!({})),
        });
        debug!(reference, amount = %amount, "initializing checkout");

        let envelope: ApiEnvelope<InitData> = self
            .http
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| FeeError::Gateway(e.to_string()))?
            .json()
            .await
            .map_err(|e| FeeError::Gateway(format!("malformed response: {e}")))?;

        let data = match (envelope.status, envelope.data) {
            (true, Some(data)) => data,
            _ => {
                let detail = envelope
                    .message
                    .unwrap_or_else(|| "transaction initialization failed".into());
                error!(reference, detail = %detail, "checkout initialization rejected");
                return Err(FeeError::Gateway(detail));
            }
        };

        Ok(CheckoutSession {
            authorization_url: data.authorization_url,
            access_code: data.access_code,
            reference: data.reference,
        })
    }

    async fn verify(&self, reference: &str) -> FeeResult<PaymentVerification> {
        let envelope: ApiEnvelope<VerifyData> = self
            .http
            .get(format!("{}/transaction/verify/{reference}", self.base_url))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| FeeError::Gateway(e.to_string()))?
            .json()
            .await
            .map_err(|e| FeeError::Gateway(format!("malformed response: {e}")))?;

        let data = match (envelope.status, envelope.data) {
            (true, Some(data)) => data,
            _ => {
                let detail = envelope
                    .message
                    .unwrap_or_else(|| "verification failed".into());
                return Err(FeeError::Gateway(detail));
            }
        };

        let paid_at = data
            .paid_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));

        Ok(PaymentVerification {
            status: data.status,
            amount: Self::from_subunits(data.amount),
            paid_at,
            channel: data.channel,
        })
    }
}
