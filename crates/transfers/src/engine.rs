//! Pure transfer movements between two balances of one warehouse.
//!
//! Callers load both balances (locked), run one of these functions, then
//! persist both sides and the record in the same transaction.

use rust_decimal::Decimal;

use supplyledger_core::{DomainError, DomainResult, ErrorCode, Money, Quantity, RoundingPolicy};
use supplyledger_ledger::{Removal, WarehouseBalance};

use crate::transfer::{ProductTransfer, QuantityChange};

/// Net effect of a transfer movement on its source product.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TransferMovement {
    /// Signed quantity leaving the source (negative when returned to it).
    pub quantity: Decimal,
    /// Signed cost leaving the source.
    pub cost: Money,
}

/// Move `quantity` out of `from` at its average price and into `to`.
pub fn execute(
    from: &mut WarehouseBalance,
    to: &mut WarehouseBalance,
    quantity: Quantity,
    policy: RoundingPolicy,
) -> DomainResult<Removal> {
    ensure_distinct(from, to)?;
    let removal = from
        .remove(quantity, policy)
        .map_err(|e| e.recode(ErrorCode::InsufficientQuantity, ErrorCode::InsufficientProduct))?;
    to.add(quantity, removal.cost, policy)?;
    Ok(removal)
}

/// Replay a quantity edit of `transfer` at its original unit price and update
/// the record in place.
pub fn replay(
    change: QuantityChange,
    transfer: &mut ProductTransfer,
    from: &mut WarehouseBalance,
    to: &mut WarehouseBalance,
    policy: RoundingPolicy,
) -> DomainResult<TransferMovement> {
    ensure_distinct(from, to)?;
    match change {
        QuantityChange::Unchanged => Ok(TransferMovement {
            quantity: Decimal::ZERO,
            cost: Money::ZERO,
        }),
        QuantityChange::Increase(delta) => {
            let cost = transfer.unit_price.extend(delta, policy)?;
            let quantity = transfer.quantity.checked_add(delta)?;
            let removal = from
                .remove_with_cost(delta, cost, policy)
                .map_err(|e| e.recode(ErrorCode::InsufficientQuantity, ErrorCode::InsufficientProduct))?;
            let total_cost = transfer.total_cost.checked_add(removal.cost)?;
            to.add(delta, removal.cost, policy)?;
            transfer.quantity = quantity;
            transfer.total_cost = total_cost;
            Ok(TransferMovement {
                quantity: delta.value(),
                cost: removal.cost,
            })
        }
        QuantityChange::Decrease(delta) => {
            let cost = transfer.unit_price.extend(delta, policy)?.min(transfer.total_cost);
            let returned = give_back(delta, cost, from, to, policy)?;
            transfer.quantity = transfer
                .quantity
                .checked_sub(delta)
                .ok_or_else(|| DomainError::invalid_quantity("transfer decrease exceeds its quantity"))?;
            transfer.total_cost = transfer.total_cost.checked_sub(returned)?.max(Money::ZERO);
            Ok(TransferMovement {
                quantity: -delta.value(),
                cost: -returned,
            })
        }
        QuantityChange::Reverse => {
            let quantity = transfer.quantity;
            let returned = give_back(quantity, transfer.total_cost, from, to, policy)?;
            transfer.quantity = Quantity::ZERO;
            transfer.total_cost = Money::ZERO;
            Ok(TransferMovement {
                quantity: -quantity.value(),
                cost: -returned,
            })
        }
    }
}

/// Undo a whole transfer: the target gives back the recorded quantity and cost.
pub fn reverse(
    transfer: &ProductTransfer,
    from: &mut WarehouseBalance,
    to: &mut WarehouseBalance,
    policy: RoundingPolicy,
) -> DomainResult<Money> {
    ensure_distinct(from, to)?;
    give_back(transfer.quantity, transfer.total_cost, from, to, policy)
}

fn give_back(
    quantity: Quantity,
    cost: Money,
    from: &mut WarehouseBalance,
    to: &mut WarehouseBalance,
    policy: RoundingPolicy,
) -> DomainResult<Money> {
    let removal = to
        .remove_with_cost(quantity, cost, policy)
        .map_err(|e| e.recode(ErrorCode::InsufficientQuantity, ErrorCode::InsufficientProductTarget))?;
    from.add(quantity, removal.cost, policy)?;
    Ok(removal.cost)
}

fn ensure_distinct(from: &WarehouseBalance, to: &WarehouseBalance) -> DomainResult<()> {
    if from.product_id() == to.product_id() {
        return Err(DomainError::same_product_transfer());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use supplyledger_core::{
        OperationContext, ProductId, ReasonId, TransferId, UserId, WarehouseId,
    };

    use crate::transfer::TransferRequest;

    const POLICY: RoundingPolicy = RoundingPolicy::HalfUp;

    fn qty(v: Decimal) -> Quantity {
        Quantity::new(v).unwrap()
    }

    fn money(v: Decimal) -> Money {
        Money::new(v).unwrap()
    }

    fn pair(source_qty: Decimal, source_cost: Decimal) -> (WarehouseBalance, WarehouseBalance) {
        let warehouse = WarehouseId::new();
        let mut from = WarehouseBalance::open(warehouse, ProductId::new());
        if !source_qty.is_zero() {
            from.add(qty(source_qty), money(source_cost), POLICY).unwrap();
        }
        let to = WarehouseBalance::open(warehouse, ProductId::new());
        (from, to)
    }

    fn record(from: &WarehouseBalance, to: &WarehouseBalance, removal: &Removal) -> ProductTransfer {
        TransferRequest {
            warehouse_id: from.owner_id(),
            from_product: from.product_id(),
            to_product: to.product_id(),
            quantity: removal.quantity,
            reason_id: ReasonId::new(),
            description: None,
        }
        .into_record(
            TransferId::new(),
            removal.unit_price,
            removal.cost,
            &OperationContext::now(UserId::new()),
        )
    }

    #[test]
    fn execute_moves_quantity_and_cost() {
        let (mut from, mut to) = pair(dec!(5), dec!(50));
        let removal = execute(&mut from, &mut to, qty(dec!(5)), POLICY).unwrap();

        assert!(removal.depleted);
        assert!(from.is_depleted());
        assert_eq!(to.quantity().value(), dec!(5));
        assert_eq!(to.total_cost().value(), dec!(50));
        assert_eq!(to.average_unit_cost().value(), dec!(10));
    }

    #[test]
    fn execute_short_source_is_insufficient_product() {
        let (mut from, mut to) = pair(dec!(2), dec!(20));
        let err = execute(&mut from, &mut to, qty(dec!(3)), POLICY).unwrap_err();
        assert!(err.is(ErrorCode::InsufficientProduct));
        assert_eq!(from.quantity().value(), dec!(2));
        assert!(to.is_depleted());
    }

    #[test]
    fn decrease_returns_at_original_price() {
        let (mut from, mut to) = pair(dec!(5), dec!(50));
        let removal = execute(&mut from, &mut to, qty(dec!(5)), POLICY).unwrap();
        let mut transfer = record(&from, &to, &removal);

        let movement = replay(
            QuantityChange::Decrease(qty(dec!(2))),
            &mut transfer,
            &mut from,
            &mut to,
            POLICY,
        )
        .unwrap();

        assert_eq!(movement.quantity, dec!(-2));
        assert_eq!(movement.cost.value(), dec!(-20));
        assert_eq!(from.quantity().value(), dec!(2));
        assert_eq!(from.total_cost().value(), dec!(20));
        assert_eq!(to.quantity().value(), dec!(3));
        assert_eq!(to.total_cost().value(), dec!(30));
        assert_eq!(transfer.quantity.value(), dec!(3));
        assert_eq!(transfer.total_cost.value(), dec!(30));
    }

    #[test]
    fn increase_pulls_more_at_original_price() {
        let (mut from, mut to) = pair(dec!(10), dec!(100));
        let removal = execute(&mut from, &mut to, qty(dec!(4)), POLICY).unwrap();
        let mut transfer = record(&from, &to, &removal);

        replay(
            QuantityChange::Increase(qty(dec!(1))),
            &mut transfer,
            &mut from,
            &mut to,
            POLICY,
        )
        .unwrap();

        assert_eq!(from.quantity().value(), dec!(5));
        assert_eq!(from.total_cost().value(), dec!(50));
        assert_eq!(to.total_cost().value(), dec!(50));
        assert_eq!(transfer.quantity.value(), dec!(5));
        assert_eq!(transfer.total_cost.value(), dec!(50));
    }

    #[test]
    fn increase_short_on_cost_keeps_its_own_code() {
        let (mut from, mut to) = pair(dec!(10), dec!(100));
        let removal = execute(&mut from, &mut to, qty(dec!(4)), POLICY).unwrap();
        let mut transfer = record(&from, &to, &removal);
        from.overwrite(from.quantity(), money(dec!(5)), POLICY).unwrap();
        let before = transfer.clone();

        let err = replay(
            QuantityChange::Increase(qty(dec!(1))),
            &mut transfer,
            &mut from,
            &mut to,
            POLICY,
        )
        .unwrap_err();
        assert!(err.is(ErrorCode::InvalidTotalCost));
        assert_eq!(transfer, before);
    }

    #[test]
    fn reverse_with_consumed_target_is_insufficient_target() {
        let (mut from, mut to) = pair(dec!(5), dec!(50));
        let removal = execute(&mut from, &mut to, qty(dec!(5)), POLICY).unwrap();
        let transfer = record(&from, &to, &removal);
        to.remove(qty(dec!(1)), POLICY).unwrap();

        let err = reverse(&transfer, &mut from, &mut to, POLICY).unwrap_err();
        assert!(err.is(ErrorCode::InsufficientProductTarget));
    }

    #[test]
    fn reverse_restores_both_sides() {
        let (mut from, mut to) = pair(dec!(3), dec!(10));
        let removal = execute(&mut from, &mut to, qty(dec!(2)), POLICY).unwrap();
        let transfer = record(&from, &to, &removal);

        let returned = reverse(&transfer, &mut from, &mut to, POLICY).unwrap();
        assert_eq!(returned, removal.cost);
        assert!(to.is_depleted());
        assert_eq!(from.quantity().value(), dec!(3));
        assert_eq!(from.total_cost().value(), dec!(10));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: a transfer never creates or destroys quantity or cost.
        #[test]
        fn transfer_conserves_quantity_and_cost(
            source_qty in 1i64..100_000i64,
            source_cost in 0i64..10_000_000_000i64,
            share in 1i64..=100i64,
        ) {
            let source_qty = Decimal::new(source_qty, 2);
            let source_cost = Decimal::new(source_cost, 6);
            let (mut from, mut to) = pair(source_qty, source_cost);
            let moved = qty((source_qty * Decimal::new(share, 2)).round_dp(2).max(dec!(0.01)).min(source_qty));

            execute(&mut from, &mut to, moved, POLICY).unwrap();

            prop_assert_eq!(from.quantity().value() + to.quantity().value(), source_qty);
            prop_assert_eq!(from.total_cost().value() + to.total_cost().value(), source_cost);
        }
    }
}
