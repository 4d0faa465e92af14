//! Per-user session state and its on-disk store.
//!
//! Everything one user's interaction touches lives in [`SessionState`]:
//! the scan cooldown, the current stub, and the paywall state. Every
//! operation takes it by `&mut`, and [`SessionState::reset`] is the single
//! "start over" that clears all of it at once.

use crate::compute::{ComputationResult, TaxRules};
use crate::error::TaxShieldError;
use crate::paywall::{PaymentAttempt, PaywallState};
use crate::stub::{ExtractedStub, StubAmounts};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One browser session's worth of state.
///
/// Initial value: no scan yet, no stub, `Unpaid` with nothing voided.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Time of the last accepted scan.
    pub last_scan_at: Option<DateTime<Utc>>,
    /// The stub currently on screen.
    pub stub: Option<ExtractedStub>,
    pub paywall: PaywallState,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear everything.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_paid(&self) -> bool {
        matches!(self.paywall, PaywallState::Paid { .. })
    }

    /// Accept a scan at `now` unless one was accepted less than `cooldown` ago.
    ///
    /// Only accepted scans move the timestamp; a rejected request does not
    /// extend the wait.
    pub fn begin_scan(&mut self, now: DateTime<Utc>, cooldown: Duration) -> Result<(), TaxShieldError> {
        if let Some(last) = self.last_scan_at {
            let elapsed = now.signed_duration_since(last);
            if elapsed < cooldown {
                let remaining = cooldown - elapsed;
                // Round up so "wait 0s" is never shown while still blocked.
                let retry_after_secs = (remaining.num_milliseconds().max(0) as u64).div_ceil(1000);
                return Err(TaxShieldError::RateLimited { retry_after_secs });
            }
        }
        self.last_scan_at = Some(now);
        Ok(())
    }

    /// Replace the stub on screen with a fresh scan.
    ///
    /// Refused once paid. Returns the attempt voided by the change, if any,
    /// so the caller can close its checkout.
    pub fn set_stub(&mut self, stub: ExtractedStub) -> Result<Option<PaymentAttempt>, TaxShieldError> {
        if self.is_paid() {
            return Err(TaxShieldError::AmountsLocked);
        }
        let changed = self
            .stub
            .as_ref()
            .map_or(true, |old| !old.amounts.same_cents(&stub.amounts));
        self.stub = Some(stub);
        Ok(if changed { self.paywall.void() } else { None })
    }

    /// Edit the displayed amounts.
    ///
    /// Refused once paid. A change voids any outstanding attempt; setting
    /// the same cents again is a no-op.
    pub fn set_amounts(&mut self, amounts: StubAmounts) -> Result<Option<PaymentAttempt>, TaxShieldError> {
        if self.is_paid() {
            return Err(TaxShieldError::AmountsLocked);
        }
        let stub = self.stub.get_or_insert_with(ExtractedStub::default);
        if stub.amounts.same_cents(&amounts) {
            return Ok(None);
        }
        stub.amounts = amounts;
        debug!("Amounts edited; paywall returns to unpaid");
        Ok(self.paywall.void())
    }

    /// Amounts on screen, if a stub is loaded.
    pub fn amounts(&self) -> Option<StubAmounts> {
        self.stub.as_ref().map(|s| s.amounts)
    }

    /// The computation for the current amounts, gated on payment.
    pub fn unlocked_result(&self, rules: &TaxRules) -> Result<ComputationResult, TaxShieldError> {
        let stub = self.stub.as_ref().ok_or(TaxShieldError::NoStub)?;
        if !self.is_paid() {
            return Err(TaxShieldError::NotPaid);
        }
        Ok(rules.compute(&stub.amounts))
    }
}

/// JSON file holding one [`SessionState`] between CLI invocations.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the session; a missing file is a fresh session.
    pub fn load(&self) -> Result<SessionState, TaxShieldError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No session at {}, starting fresh", self.path.display());
                return Ok(SessionState::default());
            }
            Err(e) => {
                return Err(TaxShieldError::SessionIo {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };
        serde_json::from_str(&text).map_err(|e| TaxShieldError::SessionCorrupt {
            path: self.path.clone(),
            detail: e.to_string(),
        })
    }

    /// Write the session atomically: temp file in the same directory, then rename.
    pub fn save(&self, state: &SessionState) -> Result<(), TaxShieldError> {
        let io_err = |source| TaxShieldError::SessionIo {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| TaxShieldError::Internal(format!("session serialise: {e}")))?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    /// Delete the file, as part of "start over".
    pub fn clear(&self) -> Result<(), TaxShieldError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Session cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TaxShieldError::SessionIo {
                path: self.path.clone(),
                source: e,
            }),
        }
    }
}
