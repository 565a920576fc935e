//! Pure withdrawal movements between a warehouse balance and a consignment.

use rust_decimal::Decimal;

use supplyledger_core::{
    AggregateRoot, DomainError, DomainResult, ErrorCode, ItemId, Money, OperationContext,
    Quantity, RoundingPolicy,
};
use supplyledger_ledger::{WarehouseBalance, average_price};

use crate::consignment::Consignment;
use crate::item::ConsignmentItem;
use crate::kind::ConsignmentKind;
use crate::update::ItemChange;

/// What an item edit did to the warehouse and the consignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome<K: ConsignmentKind> {
    /// The edited line, or `None` when it was removed.
    pub item: Option<ConsignmentItem<K>>,
    /// Signed quantity that left the warehouse.
    pub warehouse_quantity: Decimal,
    /// Signed cost that left the warehouse.
    pub warehouse_cost: Money,
    /// Cost the consignment's zero floor absorbed.
    pub absorbed: Money,
}

/// Withdraw `quantity` from the warehouse onto the consignment at the current
/// average price.
pub fn withdraw<K: ConsignmentKind>(
    balance: &mut WarehouseBalance,
    consignment: &mut Consignment<K>,
    item_id: ItemId,
    quantity: Quantity,
    ctx: &OperationContext,
    policy: RoundingPolicy,
) -> DomainResult<ConsignmentItem<K>> {
    let removal = balance
        .remove(quantity, policy)
        .map_err(|e| e.recode(ErrorCode::InsufficientQuantity, ErrorCode::InsufficientProduct))?;
    consignment.charge(removal.cost)?;

    Ok(ConsignmentItem::new(
        item_id,
        *consignment.id(),
        balance.owner_id(),
        balance.product_id(),
        quantity,
        removal.unit_price,
        removal.cost,
        ctx,
    ))
}

/// Apply a planned item edit.
pub fn apply_change<K: ConsignmentKind>(
    change: ItemChange,
    mut item: ConsignmentItem<K>,
    balance: &mut WarehouseBalance,
    consignment: &mut Consignment<K>,
    ctx: &OperationContext,
    policy: RoundingPolicy,
) -> DomainResult<ItemOutcome<K>> {
    ensure_line_of(&item, balance)?;
    match change {
        ItemChange::Remove => {
            let (quantity, cost, absorbed) = return_item(&item, balance, consignment, policy)?;
            Ok(ItemOutcome {
                item: None,
                warehouse_quantity: -quantity.value(),
                warehouse_cost: -cost,
                absorbed,
            })
        }
        ItemChange::Increase { quantity, unit_price } => {
            let cost = unit_price.extend(quantity, policy)?;
            let grown = item.quantity.checked_add(quantity)?;
            let removal = balance
                .remove_with_cost(quantity, cost, policy)
                .map_err(|e| e.recode(ErrorCode::InsufficientQuantity, ErrorCode::InsufficientProduct))?;
            let line_cost = item.total_cost.checked_add(removal.cost)?;
            let absorbed = consignment.charge(removal.cost)?;
            item.quantity = grown;
            item.total_cost = line_cost;
            item.updated_at = ctx.occurred_at();
            Ok(ItemOutcome {
                item: Some(item),
                warehouse_quantity: quantity.value(),
                warehouse_cost: removal.cost,
                absorbed,
            })
        }
        ItemChange::Decrease { quantity, unit_price } => {
            let remaining = item.quantity.checked_sub(quantity).ok_or_else(|| {
                DomainError::invalid_quantity(format!(
                    "cannot return {quantity} from item {} holding {}",
                    item.id, item.quantity
                ))
            })?;
            let cost = unit_price.extend(quantity, policy)?.min(item.total_cost);
            let line_cost = item.total_cost.checked_sub(cost)?;
            balance.add(quantity, cost, policy)?;
            let absorbed = consignment.credit(cost)?;
            item.quantity = remaining;
            item.total_cost = line_cost;
            item.updated_at = ctx.occurred_at();
            Ok(ItemOutcome {
                item: Some(item),
                warehouse_quantity: -quantity.value(),
                warehouse_cost: -cost,
                absorbed,
            })
        }
        ItemChange::Reprice { new_total, delta } => {
            balance.adjust_cost(-delta, policy)?;
            let absorbed = consignment.apply_delta(delta)?;
            item.total_cost = new_total;
            item.unit_cost = average_price(new_total, item.quantity, policy)?;
            item.updated_at = ctx.occurred_at();
            Ok(ItemOutcome {
                item: Some(item),
                warehouse_quantity: Decimal::ZERO,
                warehouse_cost: delta,
                absorbed,
            })
        }
    }
}

/// Put a whole line back into its warehouse balance and off the consignment.
///
/// Returns the quantity and cost returned and the amount the consignment's
/// floor absorbed.
pub fn return_item<K: ConsignmentKind>(
    item: &ConsignmentItem<K>,
    balance: &mut WarehouseBalance,
    consignment: &mut Consignment<K>,
    policy: RoundingPolicy,
) -> DomainResult<(Quantity, Money, Money)> {
    ensure_line_of(item, balance)?;
    if item.quantity.is_positive() {
        balance.add(item.quantity, item.total_cost, policy)?;
    }
    let absorbed = consignment.credit(item.total_cost)?;
    Ok((item.quantity, item.total_cost, absorbed))
}

fn ensure_line_of<K: ConsignmentKind>(
    item: &ConsignmentItem<K>,
    balance: &WarehouseBalance,
) -> DomainResult<()> {
    if item.warehouse_id != balance.owner_id() || item.product_id != balance.product_id() {
        return Err(DomainError::invalid_update_request(format!(
            "item {} does not belong to {}",
            item.id,
            balance.key()
        )));
    }
    Ok(())
}
