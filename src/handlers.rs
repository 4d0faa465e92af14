//! User interactions, one function per form action.
//!
//! Each handler takes the session by `&mut` and performs exactly one step of
//! the flow: scan, edit, unlock, confirm, view, report. None of them retry
//! anything; every error leaves the session usable.
//!
//! ## Scan ordering
//!
//! ```text
//! validate upload ──▶ paid? ──▶ cooldown ──▶ │ ──▶ model call ──▶ replace stub
//!   (no quota used)    (locked)   (stamped)  │    (tagged errors)   (only on success)
//!  ◀────────────── admission ──────────────▶ │ ◀──────── extraction ────────▶
//! ```
//!
//! A rejected upload never touches the cooldown. An accepted one stamps it
//! before the model call, so a failed extraction still counts. Admission
//! needs no model, so callers can refuse a scan before resolving a provider.

use crate::compute::{ComputationResult, TaxRules};
use crate::config::TaxShieldConfig;
use crate::error::TaxShieldError;
use crate::paywall::{PaymentAttempt, PaywallState};
use crate::pipeline::extract::{read_stub, ExtractionOutcome, StubReader};
use crate::pipeline::upload::{read_upload, validate_upload, StubImage};
use crate::report::render_report;
use crate::session::SessionState;
use crate::stub::ExtractedStub;
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{info, warn};

/// What a scan produced.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub extraction: ExtractionOutcome,
    /// Attempt invalidated because the new figures differ. Its checkout
    /// should be expired.
    pub voided: Option<PaymentAttempt>,
}

/// Scan an uploaded image held in memory.
pub async fn scan_upload(
    session: &mut SessionState,
    bytes: Vec<u8>,
    now: DateTime<Utc>,
    reader: &dyn StubReader,
    config: &TaxShieldConfig,
) -> Result<ScanOutcome, TaxShieldError> {
    let image = accept_upload(session, bytes, now, config)?;
    extract(session, &image, reader, config).await
}

/// Scan an image file on disk.
pub async fn scan_file(
    session: &mut SessionState,
    path: &Path,
    now: DateTime<Utc>,
    reader: &dyn StubReader,
    config: &TaxShieldConfig,
) -> Result<ScanOutcome, TaxShieldError> {
    let image = accept_file(session, path, now, config).await?;
    extract(session, &image, reader, config).await
}

/// Admit an in-memory upload for scanning and stamp the cooldown.
pub fn accept_upload(
    session: &mut SessionState,
    bytes: Vec<u8>,
    now: DateTime<Utc>,
    config: &TaxShieldConfig,
) -> Result<StubImage, TaxShieldError> {
    let image = validate_upload(bytes, config.max_upload_bytes)?;
    admit(session, image, now, config)
}

/// Admit an image file for scanning and stamp the cooldown.
pub async fn accept_file(
    session: &mut SessionState,
    path: &Path,
    now: DateTime<Utc>,
    config: &TaxShieldConfig,
) -> Result<StubImage, TaxShieldError> {
    let image = read_upload(path, config.max_upload_bytes).await?;
    admit(session, image, now, config)
}

fn admit(
    session: &mut SessionState,
    image: StubImage,
    now: DateTime<Utc>,
    config: &TaxShieldConfig,
) -> Result<StubImage, TaxShieldError> {
    if session.is_paid() {
        return Err(TaxShieldError::AmountsLocked);
    }
    session.begin_scan(now, config.scan_cooldown())?;
    Ok(image)
}

/// Send an admitted image to the model and keep the figures it read.
///
/// The previous figures survive a failed extraction.
pub async fn extract(
    session: &mut SessionState,
    image: &StubImage,
    reader: &dyn StubReader,
    config: &TaxShieldConfig,
) -> Result<ScanOutcome, TaxShieldError> {
    info!(
        "Scanning pay stub ({} bytes, {})",
        image.bytes.len(),
        image.mime_type
    );
    let extraction = read_stub(reader, image, config).await;

    let voided = if extraction.is_ok() {
        session.set_stub(extraction.stub.clone())?
    } else {
        warn!("Scan failed; keeping the previous figures");
        None
    };
    Ok(ScanOutcome { extraction, voided })
}

/// What the results panel may show.
///
/// The exempt breakdown and refund are present only once paid; the raw
/// figures are always visible so they can be corrected before paying.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusView {
    pub stub: Option<ExtractedStub>,
    pub paywall: &'static str,
    pub checkout_url: Option<String>,
    pub result: Option<ComputationResult>,
}

pub fn status(session: &SessionState, rules: &TaxRules) -> StatusView {
    let checkout_url = match &session.paywall {
        PaywallState::AttemptCreated { attempt } => attempt.checkout_url.clone(),
        _ => None,
    };
    StatusView {
        stub: session.stub.clone(),
        paywall: session.paywall.label(),
        checkout_url,
        result: session.unlocked_result(rules).ok(),
    }
}

/// Render the report for a paid session.
pub fn report(session: &SessionState, rules: &TaxRules) -> Result<Vec<u8>, TaxShieldError> {
    let result = session.unlocked_result(rules)?;
    let stub = session.stub.as_ref().ok_or(TaxShieldError::NoStub)?;
    render_report(stub, &result, rules)
}
