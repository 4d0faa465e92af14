//! Pay-stub data as read by the vision model.

use serde::{Deserialize, Serialize};

/// The three year-to-date income figures the exemption rule works on.
///
/// Amounts are dollars as `f64`, always finite and non-negative once they
/// have passed through [`StubAmounts::new`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StubAmounts {
    /// YTD overtime (1.5×) income.
    pub overtime_ytd: f64,
    /// YTD double-time (2.0×) income.
    pub doubletime_ytd: f64,
    /// YTD tip income.
    pub tips_ytd: f64,
}

impl StubAmounts {
    /// Build a set of amounts, replacing negative or non-finite values with 0.0.
    pub fn new(overtime_ytd: f64, doubletime_ytd: f64, tips_ytd: f64) -> Self {
        Self {
            overtime_ytd: sanitize_amount(overtime_ytd),
            doubletime_ytd: sanitize_amount(doubletime_ytd),
            tips_ytd: sanitize_amount(tips_ytd),
        }
    }

    /// Amounts rounded to whole cents, in (overtime, double-time, tips) order.
    pub fn to_cents(&self) -> (i64, i64, i64) {
        (
            to_cents(self.overtime_ytd),
            to_cents(self.doubletime_ytd),
            to_cents(self.tips_ytd),
        )
    }

    /// True when both sets round to the same cents.
    ///
    /// Float equality is too strict for values that went through a text
    /// round trip (the CLI re-parses what it printed).
    pub fn same_cents(&self, other: &StubAmounts) -> bool {
        self.to_cents() == other.to_cents()
    }
}

/// Everything the model read off one pay stub.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractedStub {
    pub employee_name: Option<String>,
    pub employer_name: Option<String>,
    /// Pay-period end date as printed, ideally `YYYY-MM-DD`.
    pub pay_period_end: Option<String>,
    pub amounts: StubAmounts,
}

impl ExtractedStub {
    /// Employee name, or `"Unknown"`.
    pub fn employee_or_unknown(&self) -> &str {
        self.employee_name.as_deref().unwrap_or(UNKNOWN)
    }

    /// Employer name, or `"Unknown"`.
    pub fn employer_or_unknown(&self) -> &str {
        self.employer_name.as_deref().unwrap_or(UNKNOWN)
    }

    /// Pay-period end date, or `"Unknown"`.
    pub fn period_end_or_unknown(&self) -> &str {
        self.pay_period_end.as_deref().unwrap_or(UNKNOWN)
    }
}

const UNKNOWN: &str = "Unknown";

fn sanitize_amount(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

fn to_cents(v: f64) -> i64 {
    (v * 100.0).round() as i64
}
