//! Payment fingerprint: binds a checkout to the exact figures it unlocks.

use crate::stub::StubAmounts;
use std::fmt;

/// Composite key of the three amounts (whole cents) and a one-time token.
///
/// Amounts are held as integer cents and printed from integers, so the
/// stored form and the recomputed form cannot disagree because of float
/// formatting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    overtime_cents: i64,
    doubletime_cents: i64,
    tips_cents: i64,
    token: String,
}

impl Fingerprint {
    pub fn new(amounts: &StubAmounts, token: impl Into<String>) -> Self {
        let (overtime_cents, doubletime_cents, tips_cents) = amounts.to_cents();
        Self {
            overtime_cents,
            doubletime_cents,
            tips_cents,
            token: token.into(),
        }
    }

    /// Canonical string form, e.g. `9000.00|4000.00|30000.00|<token>`.
    /// This is what goes into the checkout metadata.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Exact string comparison against a stored fingerprint.
    pub fn matches(&self, stored: &str) -> bool {
        self.encode() == stored
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            Dollars(self.overtime_cents),
            Dollars(self.doubletime_cents),
            Dollars(self.tips_cents),
            self.token
        )
    }
}

struct Dollars(i64);

impl fmt::Display for Dollars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}
