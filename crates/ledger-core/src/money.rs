//! # Money Module
//!
//! Monetary amounts in integer minor units.
//!
//! The tax service reports sums as JSON decimals. They are converted once,
//! at the edge, with [`Money::from_decimal`] and carried as integers from
//! then on.
//!
//! ```rust
//! use ledger_core::money::Money;
//!
//! let price = Money::from_decimal(10.99);
//! assert_eq!(price.cents(), 1099);
//! assert_eq!(price.to_string(), "10.99");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// A monetary value in the smallest currency unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Converts a decimal amount, rounding half away from zero.
    ///
    /// Non-finite input becomes zero.
    pub fn from_decimal(amount: f64) -> Self {
        if !amount.is_finite() {
            return Money(0);
        }
        Money((amount * 100.0).round() as i64)
    }

    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}
