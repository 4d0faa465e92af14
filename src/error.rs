//! Error types for the taxshield library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`TaxShieldError`] — the current interaction cannot proceed (oversized
//!   upload, cooldown still running, checkout could not be created, payment
//!   fingerprint mismatch). Returned as `Err(TaxShieldError)` from the
//!   session operations. None of them poison the session: the user fixes
//!   the input or waits, then re-triggers the action.
//!
//! * [`ExtractionError`] — the vision model call failed or answered with
//!   something we cannot parse. Stored inside
//!   [`crate::pipeline::extract::ExtractionOutcome`] next to a zeroed stub so
//!   a bad model answer is reported, never raised.

use std::path::PathBuf;
use thiserror::Error;

/// All interaction-scoped errors returned by the taxshield library.
#[derive(Debug, Error)]
pub enum TaxShieldError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// No bytes were uploaded.
    #[error("No pay stub was uploaded.\nChoose a JPEG or PNG image of your pay stub.")]
    MissingFile,

    /// The upload exceeds the configured ceiling.
    #[error("File is too large: {size} bytes (limit is {limit} bytes)")]
    FileTooLarge { size: usize, limit: usize },

    /// The upload is not an image format the model accepts.
    #[error("Unsupported image: {detail}\nUpload a JPEG or PNG photo of the pay stub.")]
    UnsupportedImage { detail: String },

    /// The local image file could not be read.
    #[error("Failed to read '{path}': {source}")]
    UploadReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Rate limiting ─────────────────────────────────────────────────────
    /// A scan was requested before the cooldown elapsed.
    #[error("Please wait {retry_after_secs}s before scanning another pay stub.")]
    RateLimited { retry_after_secs: u64 },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The model call failed; carries the tagged extraction error.
    #[error("Pay stub extraction failed: {0}")]
    ExtractionFailed(#[from] ExtractionError),

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Model discovery against the provider's model list failed.
    #[error("Model discovery failed: {0}")]
    ModelDiscoveryFailed(String),

    // ── Payment errors ────────────────────────────────────────────────────
    /// The payment provider refused to create a checkout session.
    #[error("Could not create checkout session: {0}")]
    PaymentSessionFailed(String),

    /// The payment provider could not return the checkout session.
    #[error("Could not look up checkout session '{session_id}': {reason}")]
    PaymentLookupFailed { session_id: String, reason: String },

    /// Confirmation was requested but no unlock attempt is held locally.
    #[error("No payment in progress. Start the unlock again.")]
    NoActiveAttempt,

    /// The amounts were edited after payment was created, or the checkout
    /// belongs to a different attempt. The old attempt has been voided.
    #[error("Payment does not match the figures on screen. Unlock again to pay for these numbers.")]
    FingerprintMismatch,

    /// The checkout exists but the provider has not reported it as paid.
    #[error("Payment not completed yet (provider status: {status})")]
    PaymentNotCompleted { status: String },

    /// Output was requested before the session reached `Paid`.
    #[error("This report is locked. Unlock it first.")]
    NotPaid,

    /// The amounts cannot be changed once the report is unlocked.
    #[error("Figures are locked after payment. Start over to scan a new pay stub.")]
    AmountsLocked,

    /// There is nothing to compute, unlock, or render yet.
    #[error("No pay stub has been scanned in this session.")]
    NoStub,

    // ── Report errors ─────────────────────────────────────────────────────
    /// printpdf failed to lay out or serialise the report.
    #[error("Failed to render report: {0}")]
    ReportFailed(String),

    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Session errors ────────────────────────────────────────────────────
    /// Could not read or write the session file.
    #[error("Session file '{path}' could not be accessed: {source}")]
    SessionIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The session file exists but is not a valid session.
    #[error("Session file '{path}' is corrupt: {detail}\nRun `taxshield reset` to start over.")]
    SessionCorrupt { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TaxShieldError {
    /// True for errors that indicate tampering or a stale payment link
    /// rather than an ordinary failure.
    pub fn is_security_event(&self) -> bool {
        matches!(self, TaxShieldError::FingerprintMismatch)
    }
}

/// A non-fatal extraction failure.
///
/// Stored alongside a zeroed [`crate::stub::ExtractedStub`] in
/// [`crate::pipeline::extract::ExtractionOutcome`].
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum ExtractionError {
    /// The request never produced a response (DNS, TLS, timeout, …).
    #[error("Connection failed: {detail}")]
    Transport { detail: String },

    /// The provider answered with an error status.
    #[error("Model API error: {detail}")]
    Upstream { detail: String },

    /// The model answered, but not with the JSON object we asked for.
    #[error("AI parsing error: {detail}")]
    Malformed { detail: String },
}
