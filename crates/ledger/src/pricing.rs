//! Weighted-average cost calculator.

use rust_decimal::Decimal;

use supplyledger_core::{DomainError, DomainResult, Money, Quantity, RoundingPolicy, UnitPrice};

/// `total_cost / quantity` at price scale, or zero when there is no quantity.
pub fn average_price(
    total_cost: Money,
    quantity: Quantity,
    policy: RoundingPolicy,
) -> DomainResult<UnitPrice> {
    if !quantity.is_positive() || total_cost.value() <= Decimal::ZERO {
        return Ok(UnitPrice::ZERO);
    }
    total_cost
        .value()
        .checked_div(quantity.value())
        .map(|price| UnitPrice::rounded(price, policy))
        .ok_or_else(|| {
            DomainError::invalid_total_cost(format!(
                "average of {total_cost} over {quantity} is out of range"
            ))
        })
}

/// Cost of taking `quantity` out of a pool valued at `price`, never more than
/// `available`.
///
/// Taking the whole pool (`quantity == pool_quantity`) yields the whole
/// `available` amount so no residue is stranded behind a deleted row.
pub fn removal_cost(
    quantity: Quantity,
    pool_quantity: Quantity,
    price: UnitPrice,
    available: Money,
    policy: RoundingPolicy,
) -> DomainResult<Money> {
    if quantity >= pool_quantity {
        return Ok(available);
    }
    Ok(price.extend(quantity, policy)?.min(available))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn qty(v: Decimal) -> Quantity {
        Quantity::new(v).unwrap()
    }

    fn money(v: Decimal) -> Money {
        Money::new(v).unwrap()
    }

    #[test]
    fn average_of_empty_pool_is_zero() {
        let price = average_price(money(dec!(100)), Quantity::ZERO, RoundingPolicy::HalfUp).unwrap();
        assert!(price.is_zero());
    }

    #[test]
    fn average_rounds_to_six_digits() {
        let price = average_price(money(dec!(400)), qty(dec!(19)), RoundingPolicy::HalfUp).unwrap();
        assert_eq!(price.value(), dec!(21.052632));

        let up = average_price(money(dec!(10)), qty(dec!(3)), RoundingPolicy::Ceiling).unwrap();
        assert_eq!(up.value(), dec!(3.333334));
        let half = average_price(money(dec!(10)), qty(dec!(3)), RoundingPolicy::HalfUp).unwrap();
        assert_eq!(half.value(), dec!(3.333333));
    }

    #[test]
    fn removal_cost_is_capped_and_drains_exactly() {
        let price = UnitPrice::new(dec!(3.333334)).unwrap();
        let pool = qty(dec!(3));
        let available = money(dec!(10));

        let part = removal_cost(qty(dec!(2)), pool, price, available, RoundingPolicy::Ceiling).unwrap();
        assert_eq!(part.value(), dec!(6.666668));

        let all = removal_cost(pool, pool, price, available, RoundingPolicy::Ceiling).unwrap();
        assert_eq!(all, available);
    }

    #[test]
    fn average_out_of_range_is_an_error() {
        let cost = money(dec!(70000000000000000000000000000));
        let err = average_price(cost, qty(dec!(0.01)), RoundingPolicy::HalfUp).unwrap_err();
        assert!(err.is(supplyledger_core::ErrorCode::InvalidTotalCost));
    }
}
