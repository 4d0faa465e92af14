//! Stripe Checkout over its REST API.
//!
//! Only the three calls the paywall needs: create a one-off payment
//! session, retrieve it, and expire it. Requests are form-encoded with a
//! bearer secret key, as Stripe expects.

use crate::error::TaxShieldError;
use crate::paywall::gateway::{CheckoutRequest, CheckoutSession, PaymentGateway};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Metadata key holding the payment fingerprint.
pub const FINGERPRINT_KEY: &str = "fingerprint";

/// [`PaymentGateway`] backed by Stripe Checkout.
pub struct StripeGateway {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl StripeGateway {
    pub fn new(api_key: impl Into<String>, timeout_secs: u64) -> Result<Self, TaxShieldError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(TaxShieldError::InvalidConfig(
                "Stripe API key is missing. Set STRIPE_API_KEY.".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TaxShieldError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            base_url: STRIPE_API_BASE.to_string(),
        })
    }

    /// Point the gateway at another API root (stripe-mock, a proxy).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn sessions_url(&self) -> String {
        format!("{}/checkout/sessions", self.base_url)
    }

    /// Read a Stripe response body, turning non-2xx into the API's message.
    async fn read_session(response: reqwest::Response) -> Result<CheckoutSession, String> {
        let status = response.status();
        let text = response.text().await.map_err(|e| e.to_string())?;
        if !status.is_success() {
            return Err(stripe_error_message(status.as_u16(), &text));
        }
        let raw: StripeCheckoutSession = serde_json::from_str(&text).map_err(|e| e.to_string())?;
        Ok(raw.into())
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create(&self, request: &CheckoutRequest) -> Result<CheckoutSession, TaxShieldError> {
        let form = checkout_form(request);
        let response = self
            .client
            .post(self.sessions_url())
            .bearer_auth(&self.api_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| TaxShieldError::PaymentSessionFailed(e.to_string()))?;

        let session = Self::read_session(response)
            .await
            .map_err(TaxShieldError::PaymentSessionFailed)?;
        info!("Created checkout session {}", session.id);
        Ok(session)
    }

    async fn retrieve(&self, session_id: &str) -> Result<CheckoutSession, TaxShieldError> {
        let lookup_failed = |reason: String| TaxShieldError::PaymentLookupFailed {
            session_id: session_id.to_string(),
            reason,
        };
        if session_id.is_empty() || session_id.contains('/') {
            return Err(lookup_failed("invalid session id".into()));
        }

        let response = self
            .client
            .get(format!("{}/{}", self.sessions_url(), session_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| lookup_failed(e.to_string()))?;

        let session = Self::read_session(response).await.map_err(lookup_failed)?;
        debug!(
            "Checkout session {} status {}",
            session.id, session.payment_status
        );
        Ok(session)
    }

    async fn expire(&self, session_id: &str) -> Result<(), TaxShieldError> {
        let response = self
            .client
            .post(format!("{}/{}/expire", self.sessions_url(), session_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| TaxShieldError::PaymentSessionFailed(e.to_string()))?;

        Self::read_session(response)
            .await
            .map(|_| ())
            .map_err(TaxShieldError::PaymentSessionFailed)
    }
}

/// Form fields for `POST /v1/checkout/sessions`.
fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
    vec![
        ("mode".into(), "payment".into()),
        ("line_items[0][quantity]".into(), "1".into()),
        (
            "line_items[0][price_data][currency]".into(),
            request.currency.clone(),
        ),
        (
            "line_items[0][price_data][unit_amount]".into(),
            request.amount_cents.to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]".into(),
            request.product_name.clone(),
        ),
        ("success_url".into(), request.success_url.clone()),
        ("cancel_url".into(), request.cancel_url.clone()),
        (
            format!("metadata[{FINGERPRINT_KEY}]"),
            request.fingerprint.clone(),
        ),
    ]
}

fn stripe_error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<StripeError>(body) {
        Ok(err) => format!("HTTP {status}: {}", err.error.message),
        Err(_) => format!("Stripe API error: HTTP {status}"),
    }
}

// ── Stripe wire types ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    url: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl From<StripeCheckoutSession> for CheckoutSession {
    fn from(mut raw: StripeCheckoutSession) -> Self {
        CheckoutSession {
            id: raw.id,
            url: raw.url,
            payment_status: raw.payment_status.unwrap_or_else(|| "unknown".to_string()),
            fingerprint: raw.metadata.remove(FINGERPRINT_KEY),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeError {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    message: String,
}
