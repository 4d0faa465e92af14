//! # taxshield
//!
//! Read year-to-date overtime, double-time, and tip income off a pay-stub
//! photo, estimate how much of it is tax-exempt, and sell the detailed
//! report behind a checkout.
//!
//! ## Flow Overview
//!
//! ```text
//! pay-stub image
//!  │
//!  ├─ 1. Upload   size ceiling + JPEG/PNG sniffing
//!  ├─ 2. Limit    one accepted scan per cooldown window
//!  ├─ 3. Extract  VLM call → JSON → ExtractedStub (editable)
//!  ├─ 4. Compute  1/3 overtime, 1/4 double time, tips up to the cap
//!  ├─ 5. Paywall  checkout bound to the figures by a fingerprint
//!  └─ 6. Report   one-page PDF, only once paid
//! ```
//!
//! All per-user state lives in [`SessionState`], passed by `&mut` to every
//! handler. The model and the payment provider sit behind the
//! [`StubReader`] and [`PaymentGateway`] traits.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use taxshield::{handlers, resolve_provider, LlmStubReader, SessionState, TaxShieldConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = TaxShieldConfig::default();
//!     let reader = LlmStubReader::new(resolve_provider(&config).await?, &config);
//!
//!     let mut session = SessionState::new();
//!     let scan = handlers::scan_file(
//!         &mut session,
//!         Path::new("stub.jpg"),
//!         chrono::Utc::now(),
//!         &reader,
//!         &config,
//!     )
//!     .await?;
//!     println!("{:?}", scan.extraction.stub.amounts);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `taxshield` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod compute;
pub mod config;
pub mod discovery;
pub mod error;
pub mod handlers;
pub mod paywall;
pub mod pipeline;
pub mod prompts;
pub mod provider;
pub mod report;
pub mod session;
pub mod stub;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use compute::{ComputationResult, TaxRules};
pub use config::{TaxShieldConfig, TaxShieldConfigBuilder};
pub use error::{ExtractionError, TaxShieldError};
pub use handlers::{ScanOutcome, StatusView};
pub use paywall::gateway::{CheckoutRequest, CheckoutSession, PaymentGateway};
pub use paywall::stripe::StripeGateway;
pub use paywall::{ConfirmOutcome, PaymentAttempt, Paywall, PaywallState};
pub use pipeline::extract::{ExtractionOutcome, LlmStubReader, ModelReply, StubReader};
pub use provider::resolve_provider;
pub use report::{render_report, write_report};
pub use session::{SessionState, SessionStore};
pub use stub::{ExtractedStub, StubAmounts};
