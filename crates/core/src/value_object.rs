//! Value objects: equality by value, not identity.
//!
//! The numeric contract of the ledger lives here: quantities carry at most
//! [`QUANTITY_SCALE`] fractional digits, monetary amounts and unit prices at
//! most [`MONEY_SCALE`]. Inputs with more digits are rejected rather than
//! silently rounded; values derived by arithmetic are rounded with the
//! engine's [`RoundingPolicy`].

use core::ops::Neg;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::rounding::RoundingPolicy;

/// Fractional digits carried by quantities.
pub const QUANTITY_SCALE: u32 = 2;

/// Fractional digits carried by monetary amounts and unit prices.
pub const MONEY_SCALE: u32 = 6;

/// Fractional digits of operator-facing report values (discrepancy value).
pub const REPORT_SCALE: u32 = 2;

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Non-negative physical quantity (kg, units, ...), two fractional digits.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);

    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value < Decimal::ZERO {
            return Err(DomainError::invalid_quantity(format!(
                "quantity cannot be negative (got {value})"
            )));
        }
        if value.round_dp(QUANTITY_SCALE) != value {
            return Err(DomainError::invalid_quantity(format!(
                "quantity carries more than {QUANTITY_SCALE} fractional digits (got {value})"
            )));
        }
        Ok(Self(value.normalize()))
    }

    /// A quantity that must be strictly positive (movement amounts).
    pub fn positive(value: Decimal) -> DomainResult<Self> {
        let qty = Self::new(value)?;
        if qty.is_zero() {
            return Err(DomainError::invalid_quantity("quantity must be positive"));
        }
        Ok(qty)
    }

    pub fn value(self) -> Decimal {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// `self + rhs`, failing INVALID_QUANTITY past the decimal range.
    pub fn checked_add(self, rhs: Quantity) -> DomainResult<Quantity> {
        self.0
            .checked_add(rhs.0)
            .map(Quantity)
            .ok_or_else(|| DomainError::invalid_quantity(format!("quantity overflow adding {rhs} to {self}")))
    }

    pub fn checked_sub(self, rhs: Quantity) -> Option<Quantity> {
        let diff = self.0 - rhs.0;
        (diff >= Decimal::ZERO).then_some(Quantity(diff))
    }

    /// `to - self` as a signed decimal.
    pub fn delta_to(self, to: Quantity) -> Decimal {
        to.0 - self.0
    }

    /// Magnitude of a signed quantity delta.
    pub fn from_delta(delta: Decimal) -> Quantity {
        Quantity(delta.abs())
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<Decimal> for Quantity {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for Decimal {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl ValueObject for Quantity {}

/// Signed monetary amount in the reporting currency, six fractional digits.
///
/// Signed so that cost deltas (corrections, reversals) share the type; balances
/// enforce their own non-negativity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value.round_dp(MONEY_SCALE) != value {
            return Err(DomainError::invalid_total_cost(format!(
                "amount carries more than {MONEY_SCALE} fractional digits (got {value})"
            )));
        }
        Ok(Self(value.normalize()))
    }

    /// A monetary amount that must not be negative (costs, totals).
    pub fn non_negative(value: Decimal) -> DomainResult<Self> {
        let money = Self::new(value)?;
        if money.is_negative() {
            return Err(DomainError::invalid_total_cost(format!(
                "amount cannot be negative (got {value})"
            )));
        }
        Ok(money)
    }

    /// Round an arbitrary derived value to money scale.
    pub fn rounded(value: Decimal, policy: RoundingPolicy) -> Self {
        Self(policy.round(value, MONEY_SCALE).normalize())
    }

    pub fn value(self) -> Decimal {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn abs(self) -> Money {
        Money(self.0.abs())
    }

    pub fn checked_add(self, rhs: Money) -> DomainResult<Money> {
        self.0
            .checked_add(rhs.0)
            .map(Money)
            .ok_or_else(|| DomainError::invalid_total_cost(format!("amount overflow adding {rhs} to {self}")))
    }

    pub fn checked_sub(self, rhs: Money) -> DomainResult<Money> {
        self.0
            .checked_sub(rhs.0)
            .map(Money)
            .ok_or_else(|| {
                DomainError::invalid_total_cost(format!("amount overflow subtracting {rhs} from {self}"))
            })
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl ValueObject for Money {}

/// Non-negative price per unit of quantity, six fractional digits.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct UnitPrice(Decimal);

impl UnitPrice {
    pub const ZERO: UnitPrice = UnitPrice(Decimal::ZERO);

    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value < Decimal::ZERO {
            return Err(DomainError::invalid_total_cost(format!(
                "unit price cannot be negative (got {value})"
            )));
        }
        if value.round_dp(MONEY_SCALE) != value {
            return Err(DomainError::invalid_total_cost(format!(
                "unit price carries more than {MONEY_SCALE} fractional digits (got {value})"
            )));
        }
        Ok(Self(value.normalize()))
    }

    /// Round a derived ratio to price scale. Negative ratios collapse to zero.
    pub fn rounded(value: Decimal, policy: RoundingPolicy) -> Self {
        if value <= Decimal::ZERO {
            return Self::ZERO;
        }
        Self(policy.round(value, MONEY_SCALE).normalize())
    }

    pub fn value(self) -> Decimal {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// `quantity × self`, rounded to money scale.
    pub fn extend(self, quantity: Quantity, policy: RoundingPolicy) -> DomainResult<Money> {
        quantity
            .value()
            .checked_mul(self.0)
            .map(|cost| Money::rounded(cost, policy))
            .ok_or_else(|| {
                DomainError::invalid_total_cost(format!("cost of {quantity} at {self} overflows"))
            })
    }
}

impl core::fmt::Display for UnitPrice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<Decimal> for UnitPrice {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UnitPrice> for Decimal {
    fn from(value: UnitPrice) -> Self {
        value.0
    }
}

impl ValueObject for UnitPrice {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use rust_decimal_macros::dec;

    #[test]
    fn quantity_rejects_negative_and_over_scale() {
        assert!(Quantity::new(dec!(-1)).unwrap_err().is(ErrorCode::InvalidQuantity));
        assert!(Quantity::new(dec!(1.005)).unwrap_err().is(ErrorCode::InvalidQuantity));
        assert_eq!(Quantity::new(dec!(1.50)).unwrap().value(), dec!(1.5));
        assert!(Quantity::positive(Decimal::ZERO).is_err());
    }

    #[test]
    fn money_rejects_over_scale_inputs() {
        assert!(Money::new(dec!(0.0000001)).unwrap_err().is(ErrorCode::InvalidTotalCost));
        assert!(Money::non_negative(dec!(-2)).unwrap_err().is(ErrorCode::InvalidTotalCost));
        assert_eq!(Money::new(dec!(-2)).unwrap().value(), dec!(-2));
    }

    #[test]
    fn extend_rounds_to_money_scale() {
        let price = UnitPrice::new(dec!(21.052632)).unwrap();
        let qty = Quantity::new(dec!(0.33)).unwrap();
        // 0.33 × 21.052632 = 6.94736856
        assert_eq!(price.extend(qty, RoundingPolicy::HalfUp).unwrap().value(), dec!(6.947369));
        assert_eq!(price.extend(qty, RoundingPolicy::Ceiling).unwrap().value(), dec!(6.947369));
    }

    #[test]
    fn arithmetic_past_the_decimal_range_is_an_error() {
        let huge = Money::new(dec!(50000000000000000000000000000)).unwrap();
        assert!(huge.checked_add(huge).unwrap_err().is(ErrorCode::InvalidTotalCost));
        assert!((-huge).checked_sub(huge).unwrap_err().is(ErrorCode::InvalidTotalCost));

        let lots = Quantity::new(dec!(50000000000000000000000000000)).unwrap();
        assert!(lots.checked_add(lots).unwrap_err().is(ErrorCode::InvalidQuantity));

        let price = UnitPrice::new(dec!(1000)).unwrap();
        assert!(price.extend(lots, RoundingPolicy::HalfUp).unwrap_err().is(ErrorCode::InvalidTotalCost));
    }

    #[test]
    fn quantity_subtraction_never_goes_negative() {
        let five = Quantity::new(dec!(5)).unwrap();
        let two = Quantity::new(dec!(2)).unwrap();
        assert_eq!(five.checked_sub(two).unwrap().value(), dec!(3));
        assert!(two.checked_sub(five).is_none());
        assert_eq!(five.delta_to(two), dec!(-3));
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let ok: Quantity = serde_json::from_str("\"2.50\"").unwrap();
        assert_eq!(ok.value(), dec!(2.5));
        assert!(serde_json::from_str::<Quantity>("\"-1\"").is_err());
    }
}
