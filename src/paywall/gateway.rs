//! Payment provider seam.

use crate::error::TaxShieldError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Provider status string for a settled checkout.
pub const STATUS_PAID: &str = "paid";

/// Everything needed to open a hosted checkout page.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub amount_cents: u64,
    pub currency: String,
    pub product_name: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Stored server-side in the checkout's metadata.
    pub fingerprint: String,
}

/// A checkout session as the provider reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// Hosted payment page; absent once the session is complete or expired.
    pub url: Option<String>,
    /// `paid`, `unpaid`, or `no_payment_required`.
    pub payment_status: String,
    /// Fingerprint stored at creation.
    pub fingerprint: Option<String>,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == STATUS_PAID
    }
}

/// The payment provider, as far as the paywall needs it.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a checkout session.
    async fn create(&self, request: &CheckoutRequest) -> Result<CheckoutSession, TaxShieldError>;

    /// Fetch a checkout session by id.
    async fn retrieve(&self, session_id: &str) -> Result<CheckoutSession, TaxShieldError>;

    /// Close an open checkout session so its link can no longer be paid.
    async fn expire(&self, session_id: &str) -> Result<(), TaxShieldError>;
}
