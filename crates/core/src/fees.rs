//! Release math - percentage fee plus flat network fee
//!
//! The fee is computed in decimal at two decimal places with half-up
//! rounding, then converted back to minor units. Rounding happens once, at
//! the 2-decimal boundary, so repeated releases never accumulate drift.

use crate::amount::Amount;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Fee parameters applied when the running total is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Percentage fee as a fraction (0.02 = 2%)
    pub rate: Decimal,
    /// Flat network fee in minor units, deducted after the percentage fee
    pub flat_fee: Amount,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            rate: Decimal::new(2, 2), // 2%
            flat_fee: Amount::from_minor_units_unchecked(30),
        }
    }
}

/// What a release of the current total would pay out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseBreakdown {
    /// The total being released
    pub total: Amount,
    /// Percentage fee, rounded half-up at 2 decimal places
    pub fee: Amount,
    /// total - fee - flat_fee, clamped at zero
    pub net: Amount,
}

impl FeeSchedule {
    pub fn new(rate: Decimal, flat_fee: Amount) -> Self {
        Self { rate, flat_fee }
    }

    /// Compute fee and net for releasing `total`.
    pub fn breakdown(&self, total: Amount) -> ReleaseBreakdown {
        let gross = total.to_decimal();
        let fee_dec = (gross * self.rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let fee_minor = (fee_dec * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .unwrap_or(i64::MAX)
            .max(0);
        let fee = Amount::from_minor_units_unchecked(fee_minor.min(total.minor_units()));
        let net = total.saturating_sub(fee).saturating_sub(self.flat_fee);
        ReleaseBreakdown { total, fee, net }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn schedule() -> FeeSchedule {
        FeeSchedule::new(dec!(0.02), Amount::from_minor_units(30).unwrap())
    }

    #[test]
    fn test_release_example_from_docs() {
        // $1000.00 at 2% with a $0.30 network fee
        let b = schedule().breakdown(Amount::from_minor_units(100_000).unwrap());
        assert_eq!(b.fee.minor_units(), 2_000); // $20.00
        assert_eq!(b.net.minor_units(), 97_970); // $979.70
    }

    #[test]
    fn test_fee_rounds_half_up() {
        // $10.25 at 2% = $0.205 -> $0.21
        let b = schedule().breakdown(Amount::from_minor_units(1_025).unwrap());
        assert_eq!(b.fee.minor_units(), 21);
        assert_eq!(b.net.minor_units(), 1_025 - 21 - 30);
    }

    #[test]
    fn test_net_clamped_at_zero() {
        // Total smaller than the flat fee
        let b = schedule().breakdown(Amount::from_minor_units(10).unwrap());
        assert_eq!(b.net, Amount::ZERO);
    }

    #[test]
    fn test_zero_total() {
        let b = schedule().breakdown(Amount::ZERO);
        assert_eq!(b.fee, Amount::ZERO);
        assert_eq!(b.net, Amount::ZERO);
    }

    #[test]
    fn test_fee_never_exceeds_total() {
        let huge_rate = FeeSchedule::new(dec!(2.0), Amount::ZERO);
        let b = huge_rate.breakdown(Amount::from_minor_units(100).unwrap());
        assert_eq!(b.fee.minor_units(), 100);
        assert_eq!(b.net, Amount::ZERO);
    }
}
