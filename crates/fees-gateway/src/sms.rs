//! Arkesel SMS client
//!
//! Single GET per send, bounded by a 30s timeout. The provider signals
//! success with response code `0000`; anything else, transport errors
//! included, comes back as a failed delivery rather than an `Err`.

use async_trait::async_trait;
use serde_json::Value;
use std::env;
use std::time::Duration;
use tracing::{debug, error};

use fees_common::{FeeError, FeeResult, SmsDelivery, SmsGateway};

const DEFAULT_API_URL: &str = "https://sms.arkesel.com/sms/api";
const SUCCESS_CODE: &str = "0000";
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Arkesel SMS gateway client
pub struct ArkeselClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    sender_id: String,
    country_prefix: String,
}

impl ArkeselClient {
    /// Build a client for the given credentials and sender id
    pub fn new(
        api_key: impl Into<String>,
        sender_id: impl Into<String>,
        country_prefix: impl Into<String>,
    ) -> FeeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| FeeError::Config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            api_url: DEFAULT_API_URL.into(),
            api_key: api_key.into(),
            sender_id: sender_id.into(),
            country_prefix: country_prefix.into(),
        })
    }

    /// Build a client from `ARKESEL_API_KEY`, `ARKESEL_SENDER_ID`, and
    /// optionally `ARKESEL_API_URL`
    pub fn from_env(country_prefix: impl Into<String>) -> FeeResult<Self> {
        let api_key = env::var("ARKESEL_API_KEY")
            .map_err(|_| FeeError::Config("ARKESEL_API_KEY is not set".into()))?;
        let sender_id = env::var("ARKESEL_SENDER_ID")
            .map_err(|_| FeeError::Config("ARKESEL_SENDER_ID is not set".into()))?;

        let mut client = Self::new(api_key, sender_id, country_prefix)?;
        if let Ok(url) = env::var("ARKESEL_API_URL") {
            client.api_url = url;
        }
        Ok(client)
    }

    /// Override the API endpoint, mainly for tests against a local stub
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Normalize a local number into international form: a leading `0`
    /// is swapped for the country prefix, and a bare number gets the
    /// prefix prepended. Numbers already in `+...` form pass through.
    pub fn normalize_recipient(prefix: &str, recipient: &str) -> String {
        if let Some(rest) = recipient.strip_prefix('0') {
            format!("{prefix}{rest}")
        } else if recipient.starts_with('+') {
            recipient.to_string()
        } else {
            format!("{prefix}{recipient}")
        }
    }
}

#[async_trait]
impl SmsGateway for ArkeselClient {
    async fn send(&self, recipient: &str, message: &str) -> SmsDelivery {
        let to = Self::normalize_recipient(&self.country_prefix, recipient);
        debug!(to = %to, "sending sms");

        let response = self
            .http
            .get(&self.api_url)
            .query(&[
                ("action", "send-sms"),
                ("api_key", self.api_key.as_str()),
                ("to", to.as_str()),
                ("from", self.sender_id.as_str()),
                ("sms", message),
            ])
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                error!(to = %to, error = %e, "sms request failed");
                return SmsDelivery::failed(e.to_string(), None);
            }
        };

        let status = response.status();
        if !status.is_success() {
            return SmsDelivery::failed(format!("HTTP {status} error"), None);
        }

        let body: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => return SmsDelivery::failed(format!("malformed response: {e}"), None),
        };

        if body.get("code").and_then(Value::as_str) == Some(SUCCESS_CODE) {
            SmsDelivery::sent("SMS sent successfully", Some(body))
        } else {
            let detail = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Failed to send SMS")
                .to_string();
            error!(to = %to, detail = %detail, "provider rejected sms");
            SmsDelivery::failed(detail, Some(body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_local_number() {
        assert_eq!(
            ArkeselClient::normalize_recipient("+233", "0244123456"),
            "+233244123456"
        );
    }

    #[test]
    fn test_normalize_bare_number() {
        assert_eq!(
            ArkeselClient::normalize_recipient("+233", "244123456"),
            "+233244123456"
        );
    }

    #[test]
    fn test_international_passes_through() {
        assert_eq!(
            ArkeselClient::normalize_recipient("+233", "+447911123456"),
            "+447911123456"
        );
    }

    #[test]
    fn test_missing_env_is_config_error() {
        std::env::remove_var("ARKESEL_API_KEY");
        assert!(matches!(
            ArkeselClient::from_env("+233"),
            Err(FeeError::Config(_))
        ));
    }
}
