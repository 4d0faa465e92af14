//! The exemption rule: fixed divisors, a tip cap, and a flat refund rate.
//!
//! Overtime is paid at 1.5×, so one third of it is the premium portion;
//! double time is paid at 2×, and one quarter of the YTD figure is treated as
//! exempt. Tips are exempt in full up to the cap.

use crate::stub::StubAmounts;
use serde::{Deserialize, Serialize};

/// Divisors, cap, and rate used by [`TaxRules::compute`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxRules {
    /// Default: 3.
    pub overtime_divisor: f64,
    /// Default: 4.
    pub doubletime_divisor: f64,
    /// Maximum exempt tip income. Default: 25 000.
    pub tip_cap: f64,
    /// Marginal rate applied to the exempt total. Default: 0.22.
    pub refund_rate: f64,
}

impl Default for TaxRules {
    fn default() -> Self {
        Self {
            overtime_divisor: 3.0,
            doubletime_divisor: 4.0,
            tip_cap: 25_000.0,
            refund_rate: 0.22,
        }
    }
}

/// Exempt amounts and refund estimate for one set of [`StubAmounts`].
///
/// Never stored; recompute whenever the amounts change.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ComputationResult {
    pub exempt_overtime: f64,
    pub exempt_doubletime: f64,
    pub exempt_tips: f64,
    pub total_exempt: f64,
    pub refund_estimate: f64,
}

impl TaxRules {
    /// Apply the rule. Pure and deterministic.
    pub fn compute(&self, amounts: &StubAmounts) -> ComputationResult {
        let exempt_overtime = amounts.overtime_ytd / self.overtime_divisor;
        let exempt_doubletime = amounts.doubletime_ytd / self.doubletime_divisor;
        let exempt_tips = amounts.tips_ytd.min(self.tip_cap);
        let total_exempt = exempt_overtime + exempt_doubletime + exempt_tips;

        ComputationResult {
            exempt_overtime,
            exempt_doubletime,
            exempt_tips,
            total_exempt,
            refund_estimate: total_exempt * self.refund_rate,
        }
    }

    /// Exempt share of overtime as a whole percentage (33 for divisor 3).
    pub fn overtime_percent(&self) -> u32 {
        percent_of(self.overtime_divisor)
    }

    /// Exempt share of double time as a whole percentage (25 for divisor 4).
    pub fn doubletime_percent(&self) -> u32 {
        percent_of(self.doubletime_divisor)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.overtime_divisor.is_finite() && self.overtime_divisor > 0.0) {
            return Err(format!(
                "overtime divisor must be > 0, got {}",
                self.overtime_divisor
            ));
        }
        if !(self.doubletime_divisor.is_finite() && self.doubletime_divisor > 0.0) {
            return Err(format!(
                "double-time divisor must be > 0, got {}",
                self.doubletime_divisor
            ));
        }
        if !(self.tip_cap.is_finite() && self.tip_cap >= 0.0) {
            return Err(format!("tip cap must be ≥ 0, got {}", self.tip_cap));
        }
        if !(0.0..=1.0).contains(&self.refund_rate) {
            return Err(format!(
                "refund rate must be 0.0–1.0, got {}",
                self.refund_rate
            ));
        }
        Ok(())
    }
}

fn percent_of(divisor: f64) -> u32 {
    (100.0 / divisor).floor() as u32
}
