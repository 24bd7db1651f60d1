//! Type-safe price representation using decimal arithmetic.
//!
//! The store prices everything in Tanzania Shillings. Shillings are shown
//! without a fractional part and with comma thousands separators, e.g.
//! `TZS 24,700`.

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::ParseError;

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., shillings, dollars).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Create a price in Tanzania Shillings.
    #[must_use]
    pub const fn tzs(amount: Decimal) -> Self {
        Self::new(amount, CurrencyCode::TZS)
    }

    /// Format for display (e.g., `TZS 24,700`).
    #[must_use]
    pub fn display(&self) -> String {
        let dp = self.currency_code.minor_units();
        let rounded = self
            .amount
            .round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);

        let raw = format!("{:.*}", dp as usize, rounded.abs());
        let (whole, fraction) = raw.split_once('.').map_or((raw.as_str(), None), |(w, f)| (w, Some(f)));

        let mut out = String::with_capacity(raw.len() + 8);
        out.push_str(self.currency_code.prefix());
        if rounded.is_sign_negative() && !rounded.is_zero() {
            out.push('-');
        }
        out.push_str(&group_thousands(whole));
        if let Some(fraction) = fraction {
            out.push('.');
            out.push_str(fraction);
        }
        out
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Insert a comma between every group of three digits.
fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    TZS,
    USD,
}

impl CurrencyCode {
    /// Number of decimal places shown for this currency.
    #[must_use]
    pub const fn minor_units(self) -> u32 {
        match self {
            Self::TZS => 0,
            Self::USD => 2,
        }
    }

    /// Display prefix placed before the amount.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::TZS => "TZS ",
            Self::USD => "$",
        }
    }

    /// The ISO code as stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TZS => "TZS",
            Self::USD => "USD",
        }
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TZS" => Ok(Self::TZS),
            "USD" => Ok(Self::USD),
            _ => Err(ParseError::Currency(s.to_string())),
        }
    }
}
