//! Movement operations on a single balance.
//!
//! Each operation validates first and mutates only on success, so a failed
//! call leaves the balance exactly as it was.

use supplyledger_core::{DomainError, DomainResult, Money, Quantity, RoundingPolicy, UnitPrice};

use crate::balance::ProductBalance;
use crate::owner::OwnerKind;
use crate::pricing::removal_cost;

/// What a removal actually took out of a balance.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Removal {
    pub quantity: Quantity,
    /// Cost actually removed; owed to whatever receives the goods.
    pub cost: Money,
    /// Average unit price in effect before the removal.
    pub unit_price: UnitPrice,
    /// The removal emptied the balance (row must be deleted).
    pub depleted: bool,
}

impl<K: OwnerKind> ProductBalance<K> {
    /// Add quantity at a given cost.
    pub fn add(
        &mut self,
        quantity: Quantity,
        cost: Money,
        policy: RoundingPolicy,
    ) -> DomainResult<()> {
        if !quantity.is_positive() {
            return Err(DomainError::invalid_quantity(format!(
                "added quantity must be positive ({})",
                self.key
            )));
        }
        if cost.is_negative() {
            return Err(DomainError::invalid_total_cost(format!(
                "added cost cannot be negative ({})",
                self.key
            )));
        }

        let next_quantity = self.quantity.checked_add(quantity)?;
        let next_cost = self.total_cost.checked_add(cost)?;
        self.set(next_quantity, next_cost, policy)
    }

    /// Remove quantity valued at the current average price.
    pub fn remove(&mut self, quantity: Quantity, policy: RoundingPolicy) -> DomainResult<Removal> {
        let remaining = self.check_removable(quantity)?;
        let unit_price = self.average_unit_cost;
        let cost = removal_cost(quantity, self.quantity, unit_price, self.total_cost, policy)?;
        self.take(quantity, cost, remaining, unit_price, policy)
    }

    /// Remove quantity at a caller-supplied cost (upstream price snapshot).
    ///
    /// Draining the balance takes whatever cost remains, which may differ from
    /// `cost` by accumulated rounding.
    pub fn remove_with_cost(
        &mut self,
        quantity: Quantity,
        cost: Money,
        policy: RoundingPolicy,
    ) -> DomainResult<Removal> {
        let remaining = self.check_removable(quantity)?;
        if cost.is_negative() {
            return Err(DomainError::invalid_total_cost(format!(
                "removed cost cannot be negative ({})",
                self.key
            )));
        }

        let unit_price = self.average_unit_cost;
        let cost = if remaining.is_zero() {
            self.total_cost
        } else if cost > self.total_cost {
            return Err(DomainError::invalid_total_cost(format!(
                "removing {cost} exceeds the {} carried by {}",
                self.total_cost, self.key
            )));
        } else {
            cost
        };
        self.take(quantity, cost, remaining, unit_price, policy)
    }

    /// Cost-only change; quantity is untouched.
    pub fn adjust_cost(&mut self, delta: Money, policy: RoundingPolicy) -> DomainResult<()> {
        if self.quantity.is_zero() && !delta.is_zero() {
            return Err(DomainError::invalid_total_cost(format!(
                "cannot carry cost without quantity ({})",
                self.key
            )));
        }
        let adjusted = self.total_cost.checked_add(delta)?;
        if adjusted.is_negative() {
            return Err(DomainError::invalid_total_cost(format!(
                "cost adjustment of {delta} would make {} negative",
                self.key
            )));
        }

        self.set(self.quantity, adjusted, policy)
    }

    /// Replace quantity and cost outright (audited manual adjustment).
    pub fn overwrite(
        &mut self,
        quantity: Quantity,
        total_cost: Money,
        policy: RoundingPolicy,
    ) -> DomainResult<()> {
        if total_cost.is_negative() {
            return Err(DomainError::invalid_total_cost(format!(
                "total cost cannot be negative ({})",
                self.key
            )));
        }
        if quantity.is_zero() && total_cost.is_positive() {
            return Err(DomainError::invalid_total_cost(format!(
                "cannot carry cost without quantity ({})",
                self.key
            )));
        }

        self.set(quantity, total_cost, policy)
    }

    fn check_removable(&self, quantity: Quantity) -> DomainResult<Quantity> {
        if !quantity.is_positive() {
            return Err(DomainError::invalid_quantity(format!(
                "removed quantity must be positive ({})",
                self.key
            )));
        }
        self.quantity.checked_sub(quantity).ok_or_else(|| {
            DomainError::insufficient_quantity(format!(
                "requested {quantity}, available {} ({})",
                self.quantity, self.key
            ))
        })
    }

    fn take(
        &mut self,
        quantity: Quantity,
        cost: Money,
        remaining: Quantity,
        unit_price: UnitPrice,
        policy: RoundingPolicy,
    ) -> DomainResult<Removal> {
        let left = self.total_cost.checked_sub(cost)?;
        self.set(remaining, left, policy)?;
        Ok(Removal {
            quantity,
            cost,
            unit_price,
            depleted: self.is_depleted(),
        })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use supplyledger_core::{ErrorCode, ProductId, WarehouseId};

    use super::*;
    use crate::balance::WarehouseBalance;
    use crate::pricing::average_price;

    const POLICY: RoundingPolicy = RoundingPolicy::HalfUp;

    fn qty(v: Decimal) -> Quantity {
        Quantity::new(v).unwrap()
    }

    fn money(v: Decimal) -> Money {
        Money::new(v).unwrap()
    }

    fn empty() -> WarehouseBalance {
        WarehouseBalance::open(WarehouseId::new(), ProductId::new())
    }

    #[test]
    fn add_then_remove_follows_the_average() {
        let mut balance = empty();
        balance.add(qty(dec!(10)), money(dec!(100)), POLICY).unwrap();
        assert_eq!(balance.quantity().value(), dec!(10));
        assert_eq!(balance.total_cost().value(), dec!(100));
        assert_eq!(balance.average_unit_cost().value(), dec!(10));

        let removal = balance.remove(qty(dec!(4)), POLICY).unwrap();
        assert_eq!(removal.cost.value(), dec!(40));
        assert_eq!(removal.unit_price.value(), dec!(10));
        assert!(!removal.depleted);
        assert_eq!(balance.quantity().value(), dec!(6));
        assert_eq!(balance.total_cost().value(), dec!(60));
        assert_eq!(balance.average_unit_cost().value(), dec!(10));

        let last = balance.remove(qty(dec!(6)), POLICY).unwrap();
        assert!(last.depleted);
        assert!(balance.is_depleted());
        assert!(balance.total_cost().is_zero());
    }

    #[test]
    fn add_rejects_invalid_inputs() {
        let mut balance = empty();
        let err = balance.add(Quantity::ZERO, Money::ZERO, POLICY).unwrap_err();
        assert!(err.is(ErrorCode::InvalidQuantity));

        let err = balance.add(qty(dec!(1)), money(dec!(-1)), POLICY).unwrap_err();
        assert!(err.is(ErrorCode::InvalidTotalCost));
        assert_eq!(balance, empty_like(&balance));
    }

    fn empty_like(balance: &WarehouseBalance) -> WarehouseBalance {
        WarehouseBalance::open(balance.owner_id(), balance.product_id())
    }

    #[test]
    fn add_past_the_decimal_range_fails_without_mutating() {
        let mut balance = empty();
        let huge = money(dec!(50000000000000000000000000000));
        balance.add(qty(dec!(1)), huge, POLICY).unwrap();
        let before = balance.clone();

        let err = balance.add(qty(dec!(1)), huge, POLICY).unwrap_err();
        assert!(err.is(ErrorCode::InvalidTotalCost));
        assert_eq!(balance, before);

        let lots = qty(dec!(50000000000000000000000000000));
        let mut stock = empty();
        stock.add(lots, money(dec!(1)), POLICY).unwrap();
        let err = stock.add(lots, money(dec!(1)), POLICY).unwrap_err();
        assert!(err.is(ErrorCode::InvalidQuantity));
        assert_eq!(stock.quantity(), lots);
    }

    #[test]
    fn remove_beyond_quantity_is_insufficient_and_leaves_balance() {
        let mut balance = empty();
        balance.add(qty(dec!(2)), money(dec!(5)), POLICY).unwrap();
        let before = balance.clone();

        let err = balance.remove(qty(dec!(3)), POLICY).unwrap_err();
        assert!(err.is(ErrorCode::InsufficientQuantity));
        assert_eq!(balance, before);
    }

    #[test]
    fn draining_removal_takes_the_rounding_residue() {
        let mut balance = empty();
        balance.add(qty(dec!(3)), money(dec!(10)), POLICY).unwrap();

        let first = balance.remove(qty(dec!(1)), POLICY).unwrap();
        assert_eq!(first.cost.value(), dec!(3.333333));
        let rest = balance.remove(qty(dec!(2)), POLICY).unwrap();
        assert_eq!(rest.cost.value(), dec!(6.666667));
        assert_eq!(first.cost.checked_add(rest.cost).unwrap(), money(dec!(10)));
    }

    #[test]
    fn remove_with_cost_uses_the_snapshot_price() {
        let mut balance = empty();
        balance.add(qty(dec!(10)), money(dec!(100)), POLICY).unwrap();

        let removal = balance
            .remove_with_cost(qty(dec!(2)), money(dec!(30)), POLICY)
            .unwrap();
        assert_eq!(removal.cost.value(), dec!(30));
        assert_eq!(balance.total_cost().value(), dec!(70));
        assert_eq!(balance.average_unit_cost().value(), dec!(8.75));
    }

    #[test]
    fn remove_with_cost_cannot_overdraw_cost() {
        let mut balance = empty();
        balance.add(qty(dec!(10)), money(dec!(10)), POLICY).unwrap();
        let err = balance
            .remove_with_cost(qty(dec!(1)), money(dec!(11)), POLICY)
            .unwrap_err();
        assert!(err.is(ErrorCode::InvalidTotalCost));
    }

    #[test]
    fn adjust_cost_never_goes_negative() {
        let mut balance = empty();
        balance.add(qty(dec!(4)), money(dec!(8)), POLICY).unwrap();

        balance.adjust_cost(money(dec!(-2)), POLICY).unwrap();
        assert_eq!(balance.total_cost().value(), dec!(6));
        assert_eq!(balance.average_unit_cost().value(), dec!(1.5));
        assert_eq!(balance.quantity().value(), dec!(4));

        let err = balance.adjust_cost(money(dec!(-7)), POLICY).unwrap_err();
        assert!(err.is(ErrorCode::InvalidTotalCost));
        assert_eq!(balance.total_cost().value(), dec!(6));
    }

    #[test]
    fn overwrite_rejects_cost_without_quantity() {
        let mut balance = empty();
        balance.add(qty(dec!(4)), money(dec!(8)), POLICY).unwrap();
        let err = balance
            .overwrite(Quantity::ZERO, money(dec!(1)), POLICY)
            .unwrap_err();
        assert!(err.is(ErrorCode::InvalidTotalCost));

        balance.overwrite(Quantity::ZERO, Money::ZERO, POLICY).unwrap();
        assert!(balance.is_depleted());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: after any add/remove sequence the cached average equals
        /// round(total/quantity, 6), and removed + remaining cost equals added cost.
        #[test]
        fn average_is_recomputed_and_cost_is_conserved(
            steps in prop::collection::vec((1i64..10_000i64, 0i64..1_000_000_000i64, any::<bool>()), 1..30)
        ) {
            let mut balance = empty();
            let mut added = Money::ZERO;
            let mut removed = Money::ZERO;

            for (raw_qty, raw_cost, is_add) in steps {
                let quantity = qty(Decimal::new(raw_qty, 2));
                if is_add || balance.is_depleted() {
                    let cost = money(Decimal::new(raw_cost, 6));
                    balance.add(quantity, cost, POLICY).unwrap();
                    added = added.checked_add(cost).unwrap();
                } else {
                    let take = quantity.min(balance.quantity());
                    let removal = balance.remove(take, POLICY).unwrap();
                    removed = removed.checked_add(removal.cost).unwrap();
                }

                let expected = average_price(balance.total_cost(), balance.quantity(), POLICY).unwrap();
                prop_assert_eq!(balance.average_unit_cost(), expected);
                prop_assert!(!balance.total_cost().is_negative());
                prop_assert_eq!(added, removed.checked_add(balance.total_cost()).unwrap());
            }
        }
    }
}
