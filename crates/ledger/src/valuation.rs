//! Owner-level valuation over positive balances.

use serde::{Deserialize, Serialize};

use supplyledger_core::{DomainResult, Money, Quantity};

use crate::balance::ProductBalance;
use crate::owner::OwnerKind;

/// Summary of stock value held by one owner (or across owners).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValuationSummary {
    pub product_count: usize,
    pub total_quantity: Quantity,
    pub total_value: Money,
}

impl ValuationSummary {
    pub fn from_balances<'a, K, I>(balances: I) -> DomainResult<Self>
    where
        K: OwnerKind,
        I: IntoIterator<Item = &'a ProductBalance<K>>,
    {
        balances
            .into_iter()
            .filter(|b| !b.is_depleted())
            .try_fold(Self::default(), |acc, b| {
                Ok(Self {
                    product_count: acc.product_count + 1,
                    total_quantity: acc.total_quantity.checked_add(b.quantity())?,
                    total_value: acc.total_value.checked_add(b.total_cost())?,
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use supplyledger_core::{ProductId, RoundingPolicy, WarehouseId};

    use crate::balance::WarehouseBalance;

    #[test]
    fn summary_skips_empty_rows() {
        let warehouse = WarehouseId::new();
        let mut a = WarehouseBalance::open(warehouse, ProductId::new());
        a.add(
            Quantity::new(dec!(5)).unwrap(),
            Money::new(dec!(50)).unwrap(),
            RoundingPolicy::HalfUp,
        )
        .unwrap();
        let mut b = WarehouseBalance::open(warehouse, ProductId::new());
        b.add(
            Quantity::new(dec!(1.5)).unwrap(),
            Money::new(dec!(3)).unwrap(),
            RoundingPolicy::HalfUp,
        )
        .unwrap();
        let empty = WarehouseBalance::open(warehouse, ProductId::new());

        let summary = ValuationSummary::from_balances([&a, &b, &empty]).unwrap();
        assert_eq!(summary.product_count, 2);
        assert_eq!(summary.total_quantity.value(), dec!(6.5));
        assert_eq!(summary.total_value.value(), dec!(53));
    }
}
