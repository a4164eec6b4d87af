//! Payment processor port
//!
//! The processor hosts checkout: we open a session and later pull its
//! authoritative payment state. Calls are blocking from the caller's
//! perspective, carry a bounded timeout, and are retried exactly once on
//! transient transport failure (timeout, connect, 5xx). A definitive answer
//! (declined, not found) is never retried.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_BACKOFF: Duration = Duration::from_millis(400);

/// Everything the processor needs to open a hosted checkout session. The
/// order id and appliance metadata travel as session metadata for later
/// correlation; the amount is in minor currency units.
#[derive(Clone, Debug, Serialize)]
pub struct CheckoutRequest {
    pub order_id: Uuid,
    pub product_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub appliance_type: String,
    pub arch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub redirect_url: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPaymentStatus {
    Paid,
    Unpaid,
    Failed,
}

/// Current state of a checkout session as reported by the processor.
#[derive(Clone, Debug, Deserialize)]
pub struct SessionState {
    pub payment_status: SessionPaymentStatus,
    pub payment_reference: Option<String>,
    pub amount_total: i64,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Opens a checkout session and returns the hosted-checkout redirect.
    async fn create_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession>;

    /// Looks up the session correlated with an order, failing with `NotFound`
    /// when no session exists for it.
    async fn find_session(&self, order_id: Uuid) -> Result<SessionState>;
}

pub struct HttpPaymentProcessor {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ApiError {
    error: String,
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
}

fn is_transient_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

impl HttpPaymentProcessor {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Configuration(format!("payment processor client: {e}")))?;
        Ok(Self { client, base_url: base_url.into(), api_key: api_key.into() })
    }

    /// Sends a request, retrying once after a short backoff when the failure
    /// class is transient.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let retry = request.try_clone();
        let first = request.send().await;
        let transient = match &first {
            Ok(response) => is_transient_status(response.status()),
            Err(err) => is_transient_transport(err),
        };
        if transient {
            if let Some(retry) = retry {
                tokio::time::sleep(RETRY_BACKOFF).await;
                return retry
                    .send()
                    .await
                    .map_err(|e| Error::Processor(format!("transport failure after retry: {e}")));
            }
        }
        first.map_err(|e| Error::Processor(format!("transport failure: {e}")))
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound("payment session".into()));
        }
        if !status.is_success() {
            let message = response
                .json::<ApiError>()
                .await
                .map(|e| e.error)
                .unwrap_or_else(|_| format!("HTTP {status}"));
            return Err(Error::Processor(message));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| Error::Processor(format!("malformed processor response: {e}")))
    }
}

#[async_trait]
impl PaymentProcessor for HttpPaymentProcessor {
    async fn create_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let response = self
            .send(
                self.client
                    .post(format!("{}/v1/checkout/sessions", self.base_url))
                    .bearer_auth(&self.api_key)
                    .json(request),
            )
            .await?;
        Self::decode(response).await
    }

    async fn find_session(&self, order_id: Uuid) -> Result<SessionState> {
        let response = self
            .send(
                self.client
                    .get(format!("{}/v1/checkout/sessions/lookup", self.base_url))
                    .bearer_auth(&self.api_key)
                    .query(&[("order_id", order_id.to_string())]),
            )
            .await?;
        Self::decode(response).await
    }
}
