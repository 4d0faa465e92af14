//! Paywall: checkout creation and payment verification.
//!
//! ## States
//!
//! ```text
//!            initiate                confirm (paid + fingerprint match)
//!  Unpaid ─────────────▶ AttemptCreated ─────────────────────────────▶ Paid
//!    ▲                        │
//!    └────────────────────────┘
//!     amounts changed / mismatch / reset
//! ```
//!
//! An unlock attempt carries a one-time token. The checkout stores the
//! fingerprint of (amounts, token) in its metadata; the session keeps only
//! the token. On confirmation the fingerprint is rebuilt from the figures
//! currently on screen, so a checkout paid for other numbers can never
//! unlock these ones.
//!
//! Submodules:
//! 1. [`fingerprint`] — the composite key and its canonical string
//! 2. [`gateway`]     — the provider trait the controller talks to
//! 3. [`stripe`]      — Stripe Checkout implementation

pub mod fingerprint;
pub mod gateway;
pub mod stripe;

use crate::config::TaxShieldConfig;
use crate::error::TaxShieldError;
use crate::session::SessionState;
use chrono::{DateTime, Utc};
use fingerprint::Fingerprint;
use gateway::{CheckoutRequest, PaymentGateway};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Product name shown on the checkout page.
pub const PRODUCT_NAME: &str = "Forensic Tax Audit Report";

/// One unlock attempt, as held client-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    /// Random one-time token mixed into the fingerprint.
    pub token: String,
    pub checkout_session_id: String,
    pub checkout_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Where the session stands with respect to payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PaywallState {
    /// Nothing paid. `voided` remembers the last attempt invalidated by an
    /// edit so that confirming it reports a mismatch rather than "no
    /// payment in progress".
    Unpaid { voided: Option<PaymentAttempt> },
    /// A checkout is open for the current figures.
    AttemptCreated { attempt: PaymentAttempt },
    /// Unlocked; the figures are read-only from here on.
    Paid { attempt: PaymentAttempt },
}

impl Default for PaywallState {
    fn default() -> Self {
        PaywallState::Unpaid { voided: None }
    }
}

impl PaywallState {
    /// Drop an outstanding attempt back to `Unpaid`, remembering it as voided.
    ///
    /// Returns the attempt whose checkout should now be expired. A paid
    /// state is left alone.
    pub(crate) fn void(&mut self) -> Option<PaymentAttempt> {
        match std::mem::take(self) {
            PaywallState::AttemptCreated { attempt } => {
                *self = PaywallState::Unpaid {
                    voided: Some(attempt.clone()),
                };
                Some(attempt)
            }
            other => {
                *self = other;
                None
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaywallState::Unpaid { .. } => "unpaid",
            PaywallState::AttemptCreated { .. } => "awaiting payment",
            PaywallState::Paid { .. } => "paid",
        }
    }
}

/// Result of a confirmation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Provider reports paid and the fingerprint matches. Session is `Paid`.
    Paid,
    /// Provider has not settled the checkout. Session unchanged.
    NotPaid { status: String },
    /// Paid, but not for the figures on screen. Session reset to `Unpaid`
    /// with no attempt; a new unlock is required.
    Mismatch,
}

impl ConfirmOutcome {
    /// Convert to a `Result`, for callers that treat anything but `Paid` as an error.
    pub fn into_result(self) -> Result<(), TaxShieldError> {
        match self {
            ConfirmOutcome::Paid => Ok(()),
            ConfirmOutcome::NotPaid { status } => {
                Err(TaxShieldError::PaymentNotCompleted { status })
            }
            ConfirmOutcome::Mismatch => Err(TaxShieldError::FingerprintMismatch),
        }
    }
}

/// Paywall controller bound to one gateway and config.
pub struct Paywall<'a> {
    gateway: &'a dyn PaymentGateway,
    config: &'a TaxShieldConfig,
}

impl<'a> Paywall<'a> {
    pub fn new(gateway: &'a dyn PaymentGateway, config: &'a TaxShieldConfig) -> Self {
        Self { gateway, config }
    }

    /// Open a checkout for the figures currently on screen.
    ///
    /// Mints a fresh token every time. An attempt already open is replaced
    /// and its checkout expired.
    pub async fn initiate(&self, session: &mut SessionState) -> Result<PaymentAttempt, TaxShieldError> {
        if session.is_paid() {
            return Err(TaxShieldError::AmountsLocked);
        }
        let amounts = session.amounts().ok_or(TaxShieldError::NoStub)?;

        let token = Uuid::new_v4().simple().to_string();
        let fingerprint = Fingerprint::new(&amounts, token.as_str());

        let request = CheckoutRequest {
            amount_cents: self.config.unlock_price_cents,
            currency: self.config.currency.clone(),
            product_name: PRODUCT_NAME.to_string(),
            success_url: self.config.success_url(),
            cancel_url: self.config.cancel_url(),
            fingerprint: fingerprint.encode(),
        };
        let checkout = self.gateway.create(&request).await?;

        let attempt = PaymentAttempt {
            token,
            checkout_session_id: checkout.id,
            checkout_url: checkout.url,
            created_at: Utc::now(),
        };

        let previous = std::mem::replace(
            &mut session.paywall,
            PaywallState::AttemptCreated {
                attempt: attempt.clone(),
            },
        );
        if let PaywallState::AttemptCreated { attempt: stale } = previous {
            self.expire_stale(&stale).await;
        }

        info!("Unlock attempt created: {}", attempt.checkout_session_id);
        Ok(attempt)
    }

    /// Verify a checkout against the figures currently on screen.
    ///
    /// Fails closed: anything short of a settled checkout whose stored
    /// fingerprint equals the recomputed one leaves the session locked.
    pub async fn confirm(
        &self,
        session: &mut SessionState,
        session_id: &str,
    ) -> Result<ConfirmOutcome, TaxShieldError> {
        if session.is_paid() {
            return Ok(ConfirmOutcome::Paid);
        }
        let amounts = session.amounts().ok_or(TaxShieldError::NoStub)?;

        let (attempt, voided) = match &session.paywall {
            PaywallState::AttemptCreated { attempt } => (attempt.clone(), false),
            PaywallState::Unpaid {
                voided: Some(attempt),
            } => (attempt.clone(), true),
            _ => return Err(TaxShieldError::NoActiveAttempt),
        };

        let checkout = self.gateway.retrieve(session_id).await?;
        if !checkout.is_paid() {
            info!(
                "Checkout {} not paid yet (status {})",
                checkout.id, checkout.payment_status
            );
            return Ok(ConfirmOutcome::NotPaid {
                status: checkout.payment_status,
            });
        }

        let expected = Fingerprint::new(&amounts, attempt.token.as_str());
        let matched = !voided
            && checkout
                .fingerprint
                .as_deref()
                .is_some_and(|stored| expected.matches(stored));

        if matched {
            info!("Payment verified for checkout {}", checkout.id);
            session.paywall = PaywallState::Paid { attempt };
            Ok(ConfirmOutcome::Paid)
        } else {
            warn!(
                "Payment fingerprint mismatch on checkout {} (voided attempt: {}); unlock reset",
                checkout.id, voided
            );
            session.paywall = PaywallState::default();
            // The open attempt is dropped with the reset; its link must not stay payable.
            if !voided && attempt.checkout_session_id != checkout.id {
                self.expire_stale(&attempt).await;
            }
            Ok(ConfirmOutcome::Mismatch)
        }
    }

    /// Edit the figures on screen, expiring the checkout they invalidate.
    pub async fn update_amounts(
        &self,
        session: &mut SessionState,
        amounts: crate::stub::StubAmounts,
    ) -> Result<(), TaxShieldError> {
        if let Some(stale) = session.set_amounts(amounts)? {
            self.expire_stale(&stale).await;
        }
        Ok(())
    }

    /// Close a superseded checkout. Best effort: confirmation-time
    /// fingerprint checks still reject it if this fails.
    pub async fn expire_stale(&self, stale: &PaymentAttempt) {
        match self.gateway.expire(&stale.checkout_session_id).await {
            Ok(()) => info!("Expired stale checkout {}", stale.checkout_session_id),
            Err(e) => warn!(
                "Could not expire stale checkout {}: {}",
                stale.checkout_session_id, e
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::gateway::{CheckoutSession, STATUS_PAID};
    use super::*;
    use crate::stub::StubAmounts;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory provider: remembers what was created, lets tests settle it.
    #[derive(Default)]
    pub(crate) struct FakeGateway {
        sessions: Mutex<HashMap<String, CheckoutSession>>,
        pub(crate) expired: Mutex<Vec<String>>,
        pub(crate) fail_create: bool,
        counter: Mutex<u32>,
    }

    impl FakeGateway {
        pub(crate) fn settle(&self, id: &str) {
            let mut sessions = self.sessions.lock().unwrap();
            let s = sessions.get_mut(id).expect("known session");
            s.payment_status = STATUS_PAID.to_string();
            s.url = None;
        }

        /// Simulate a checkout created elsewhere (another tab, a replayed link).
        pub(crate) fn insert_paid(&self, id: &str, fingerprint: &str) {
            self.sessions.lock().unwrap().insert(
                id.to_string(),
                CheckoutSession {
                    id: id.to_string(),
                    url: None,
                    payment_status: STATUS_PAID.to_string(),
                    fingerprint: Some(fingerprint.to_string()),
                },
            );
        }
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create(&self, request: &CheckoutRequest) -> Result<CheckoutSession, TaxShieldError> {
            if self.fail_create {
                return Err(TaxShieldError::PaymentSessionFailed("card processor down".into()));
            }
            let mut n = self.counter.lock().unwrap();
            *n += 1;
            let session = CheckoutSession {
                id: format!("cs_test_{n}"),
                url: Some(format!("https://checkout.test/{n}")),
                payment_status: "unpaid".into(),
                fingerprint: Some(request.fingerprint.clone()),
            };
            self.sessions
                .lock()
                .unwrap()
                .insert(session.id.clone(), session.clone());
            Ok(session)
        }

        async fn retrieve(&self, session_id: &str) -> Result<CheckoutSession, TaxShieldError> {
            self.sessions
                .lock()
                .unwrap()
                .get(session_id)
                .cloned()
                .ok_or_else(|| TaxShieldError::PaymentLookupFailed {
                    session_id: session_id.to_string(),
                    reason: "No such checkout.session".into(),
                })
        }

        async fn expire(&self, session_id: &str) -> Result<(), TaxShieldError> {
            self.expired.lock().unwrap().push(session_id.to_string());
            Ok(())
        }
    }

    fn session_with(o: f64, d: f64, t: f64) -> SessionState {
        let mut s = SessionState::new();
        s.set_amounts(StubAmounts::new(o, d, t)).unwrap();
        s
    }

    #[tokio::test]
    async fn initiate_then_confirm_paid() {
        let gw = FakeGateway::default();
        let config = TaxShieldConfig::default();
        let paywall = Paywall::new(&gw, &config);
        let mut s = session_with(9000.0, 4000.0, 30000.0);

        let attempt = paywall.initiate(&mut s).await.unwrap();
        assert!(matches!(s.paywall, PaywallState::AttemptCreated { .. }));
        assert_eq!(attempt.checkout_url.as_deref(), Some("https://checkout.test/1"));

        gw.settle(&attempt.checkout_session_id);
        let outcome = paywall.confirm(&mut s, &attempt.checkout_session_id).await.unwrap();
        assert_eq!(outcome, ConfirmOutcome::Paid);
        assert!(s.is_paid());
    }

    #[tokio::test]
    async fn unpaid_checkout_fails_closed() {
        let gw = FakeGateway::default();
        let config = TaxShieldConfig::default();
        let paywall = Paywall::new(&gw, &config);
        let mut s = session_with(1.0, 2.0, 3.0);

        let attempt = paywall.initiate(&mut s).await.unwrap();
        let outcome = paywall.confirm(&mut s, &attempt.checkout_session_id).await.unwrap();
        assert_eq!(
            outcome,
            ConfirmOutcome::NotPaid {
                status: "unpaid".into()
            }
        );
        assert!(matches!(s.paywall, PaywallState::AttemptCreated { .. }));
    }

    #[tokio::test]
    async fn edit_after_initiate_is_a_mismatch() {
        for edit in [
            StubAmounts::new(9000.01, 4000.0, 30000.0),
            StubAmounts::new(9000.0, 3999.0, 30000.0),
            StubAmounts::new(9000.0, 4000.0, 50000.0),
        ] {
            let gw = FakeGateway::default();
            let config = TaxShieldConfig::default();
            let paywall = Paywall::new(&gw, &config);
            let mut s = session_with(9000.0, 4000.0, 30000.0);

            let attempt = paywall.initiate(&mut s).await.unwrap();
            gw.settle(&attempt.checkout_session_id);
            paywall.update_amounts(&mut s, edit).await.unwrap();

            let outcome = paywall.confirm(&mut s, &attempt.checkout_session_id).await.unwrap();
            assert_eq!(outcome, ConfirmOutcome::Mismatch, "edit {edit:?}");
            assert!(!s.is_paid());
            assert_eq!(s.paywall, PaywallState::default());
            assert_eq!(
                gw.expired.lock().unwrap().as_slice(),
                &[attempt.checkout_session_id.clone()]
            );
        }
    }

    #[tokio::test]
    async fn edit_back_to_original_figures_still_mismatches() {
        let gw = FakeGateway::default();
        let config = TaxShieldConfig::default();
        let paywall = Paywall::new(&gw, &config);
        let mut s = session_with(100.0, 100.0, 100.0);

        let attempt = paywall.initiate(&mut s).await.unwrap();
        gw.settle(&attempt.checkout_session_id);
        paywall.update_amounts(&mut s, StubAmounts::new(1.0, 1.0, 1.0)).await.unwrap();
        paywall.update_amounts(&mut s, StubAmounts::new(100.0, 100.0, 100.0)).await.unwrap();

        let outcome = paywall.confirm(&mut s, &attempt.checkout_session_id).await.unwrap();
        assert_eq!(outcome, ConfirmOutcome::Mismatch);
    }

    #[tokio::test]
    async fn foreign_checkout_is_a_mismatch() {
        let gw = FakeGateway::default();
        let config = TaxShieldConfig::default();
        let paywall = Paywall::new(&gw, &config);
        let mut s = session_with(9000.0, 4000.0, 30000.0);

        paywall.initiate(&mut s).await.unwrap();
        // Paid for the same numbers but under someone else's token.
        let forged = Fingerprint::new(&StubAmounts::new(9000.0, 4000.0, 30000.0), "other").encode();
        gw.insert_paid("cs_elsewhere", &forged);

        let outcome = paywall.confirm(&mut s, "cs_elsewhere").await.unwrap();
        assert_eq!(outcome, ConfirmOutcome::Mismatch);
        assert!(matches!(
            outcome.into_result(),
            Err(TaxShieldError::FingerprintMismatch)
        ));
        assert_eq!(
            gw.expired.lock().unwrap().as_slice(),
            &["cs_test_1".to_string()]
        );
        // A new token is needed before the next confirmation.
        assert!(matches!(
            paywall.confirm(&mut s, "cs_elsewhere").await,
            Err(TaxShieldError::NoActiveAttempt)
        ));
    }

    #[tokio::test]
    async fn reinitiate_mints_new_token_and_expires_old() {
        let gw = FakeGateway::default();
        let config = TaxShieldConfig::default();
        let paywall = Paywall::new(&gw, &config);
        let mut s = session_with(1.0, 2.0, 3.0);

        let first = paywall.initiate(&mut s).await.unwrap();
        let second = paywall.initiate(&mut s).await.unwrap();
        assert_ne!(first.token, second.token);
        assert_eq!(
            gw.expired.lock().unwrap().as_slice(),
            &[first.checkout_session_id.clone()]
        );

        // Paying the old link does not unlock: its fingerprint carries the old token.
        gw.settle(&first.checkout_session_id);
        let outcome = paywall.confirm(&mut s, &first.checkout_session_id).await.unwrap();
        assert_eq!(outcome, ConfirmOutcome::Mismatch);
    }

    #[tokio::test]
    async fn mismatch_expires_the_open_checkout() {
        let gw = FakeGateway::default();
        let config = TaxShieldConfig::default();
        let paywall = Paywall::new(&gw, &config);
        let mut s = session_with(1.0, 2.0, 3.0);

        let first = paywall.initiate(&mut s).await.unwrap();
        gw.settle(&first.checkout_session_id);
        let second = paywall.initiate(&mut s).await.unwrap();

        let outcome = paywall.confirm(&mut s, &first.checkout_session_id).await.unwrap();
        assert_eq!(outcome, ConfirmOutcome::Mismatch);
        assert_eq!(s.paywall, PaywallState::default());

        // The reset dropped `second`, so its link is closed too; paying it
        // could never be confirmed.
        assert_eq!(
            gw.expired.lock().unwrap().as_slice(),
            &[
                first.checkout_session_id.clone(),
                second.checkout_session_id.clone()
            ]
        );
    }

    #[tokio::test]
    async fn lookup_failure_propagates_and_keeps_attempt() {
        let gw = FakeGateway::default();
        let config = TaxShieldConfig::default();
        let paywall = Paywall::new(&gw, &config);
        let mut s = session_with(1.0, 2.0, 3.0);
        paywall.initiate(&mut s).await.unwrap();

        let err = paywall.confirm(&mut s, "cs_missing").await.unwrap_err();
        assert!(matches!(err, TaxShieldError::PaymentLookupFailed { .. }));
        assert!(matches!(s.paywall, PaywallState::AttemptCreated { .. }));
    }

    #[tokio::test]
    async fn create_failure_leaves_state_untouched() {
        let gw = FakeGateway {
            fail_create: true,
            ..Default::default()
        };
        let config = TaxShieldConfig::default();
        let paywall = Paywall::new(&gw, &config);
        let mut s = session_with(1.0, 2.0, 3.0);

        let err = paywall.initiate(&mut s).await.unwrap_err();
        assert!(matches!(err, TaxShieldError::PaymentSessionFailed(_)));
        assert_eq!(s.paywall, PaywallState::default());
    }

    #[tokio::test]
    async fn confirm_without_attempt() {
        let gw = FakeGateway::default();
        let config = TaxShieldConfig::default();
        let paywall = Paywall::new(&gw, &config);
        let mut s = session_with(1.0, 2.0, 3.0);
        assert!(matches!(
            paywall.confirm(&mut s, "cs_test_1").await,
            Err(TaxShieldError::NoActiveAttempt)
        ));
        let mut empty = SessionState::new();
        assert!(matches!(
            paywall.initiate(&mut empty).await,
            Err(TaxShieldError::NoStub)
        ));
    }

    #[tokio::test]
    async fn initiate_refused_once_paid() {
        let gw = FakeGateway::default();
        let config = TaxShieldConfig::default();
        let paywall = Paywall::new(&gw, &config);
        let mut s = session_with(1.0, 2.0, 3.0);
        let attempt = paywall.initiate(&mut s).await.unwrap();
        gw.settle(&attempt.checkout_session_id);
        paywall.confirm(&mut s, &attempt.checkout_session_id).await.unwrap();

        assert!(matches!(
            paywall.initiate(&mut s).await,
            Err(TaxShieldError::AmountsLocked)
        ));
        // Confirming again is idempotent.
        assert_eq!(
            paywall.confirm(&mut s, &attempt.checkout_session_id).await.unwrap(),
            ConfirmOutcome::Paid
        );
    }

    #[test]
    fn checkout_request_carries_config() {
        let config = TaxShieldConfig::builder()
            .unlock_price_cents(1499)
            .public_base_url("https://shield.test")
            .build()
            .unwrap();
        assert_eq!(config.unlock_price_cents, 1499);
        assert!(config.success_url().starts_with("https://shield.test/"));
    }
}
