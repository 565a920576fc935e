//! Rounding policy for derived monetary values.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// How derived prices and extended costs are rounded to their scale.
///
/// The policy is a single engine-wide configuration value: every average
/// price and every `quantity × price` extension uses it.
///
/// - [`RoundingPolicy::HalfUp`] (default): ties round away from zero. Rounding
///   error is symmetric; whatever residue a removal leaves behind stays on the
///   source balance and goes out with its last unit.
/// - [`RoundingPolicy::Ceiling`]: always round toward positive infinity. The
///   downstream row (item line, target product) is never under-charged; the
///   source balance bears the residue. Removals are capped at the source's
///   total cost, so ceiling rounding can never make a balance negative.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingPolicy {
    #[default]
    HalfUp,
    Ceiling,
}

impl RoundingPolicy {
    pub fn strategy(self) -> RoundingStrategy {
        match self {
            RoundingPolicy::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            RoundingPolicy::Ceiling => RoundingStrategy::ToPositiveInfinity,
        }
    }

    pub fn round(self, value: Decimal, scale: u32) -> Decimal {
        value.round_dp_with_strategy(scale, self.strategy())
    }
}

impl core::str::FromStr for RoundingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "half_up" | "half-up" => Ok(RoundingPolicy::HalfUp),
            "ceiling" => Ok(RoundingPolicy::Ceiling),
            other => Err(format!("unknown rounding policy '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn half_up_rounds_ties_away_from_zero() {
        assert_eq!(RoundingPolicy::HalfUp.round(dec!(1.0000005), 6), dec!(1.000001));
        assert_eq!(RoundingPolicy::HalfUp.round(dec!(-42.105264), 2), dec!(-42.11));
        assert_eq!(RoundingPolicy::HalfUp.round(dec!(1.0000004), 6), dec!(1.000000));
    }

    #[test]
    fn ceiling_rounds_toward_positive_infinity() {
        assert_eq!(RoundingPolicy::Ceiling.round(dec!(1.0000001), 6), dec!(1.000001));
        assert_eq!(RoundingPolicy::Ceiling.round(dec!(-1.0000009), 6), dec!(-1.000000));
    }

    #[test]
    fn parses_config_spellings() {
        assert_eq!("half_up".parse::<RoundingPolicy>(), Ok(RoundingPolicy::HalfUp));
        assert_eq!(" CEILING ".parse::<RoundingPolicy>(), Ok(RoundingPolicy::Ceiling));
        assert!("banker".parse::<RoundingPolicy>().is_err());
    }
}
