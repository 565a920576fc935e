use serde::{Deserialize, Serialize};

use supplyledger_core::{DomainError, DomainResult, Money, Quantity, RoundingPolicy, UnitPrice};

use crate::item::ConsignmentItem;
use crate::kind::ConsignmentKind;

/// Request: edit exactly one of an item's quantity or total cost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdate {
    pub new_quantity: Option<Quantity>,
    pub new_total_cost: Option<Money>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ItemChange {
    /// Quantity set to zero: return everything and delete the line.
    Remove,
    /// Withdraw this much more at the line's unit price.
    Increase { quantity: Quantity, unit_price: UnitPrice },
    /// Return this much to the warehouse at the line's unit price.
    Decrease { quantity: Quantity, unit_price: UnitPrice },
    /// Cost-only correction; `delta` is `new_total - old_total`.
    Reprice { new_total: Money, delta: Money },
}

impl ItemUpdate {
    pub fn plan<K: ConsignmentKind>(
        &self,
        item: &ConsignmentItem<K>,
        policy: RoundingPolicy,
    ) -> DomainResult<ItemChange> {
        match (self.new_quantity, self.new_total_cost) {
            (Some(_), Some(_)) | (None, None) => Err(DomainError::invalid_update_request(
                "provide exactly one of newQuantity or newTotalCost",
            )),
            (Some(quantity), None) => {
                if quantity == item.quantity {
                    return Err(DomainError::no_changes());
                }
                if quantity.is_zero() {
                    return Ok(ItemChange::Remove);
                }
                let unit_price = item.resolve_unit_price(policy)?;
                let delta = item.quantity.delta_to(quantity);
                let magnitude = Quantity::from_delta(delta);
                Ok(if delta.is_sign_positive() {
                    ItemChange::Increase { quantity: magnitude, unit_price }
                } else {
                    ItemChange::Decrease { quantity: magnitude, unit_price }
                })
            }
            (None, Some(total)) => {
                if total.is_negative() {
                    return Err(DomainError::invalid_total_cost(format!(
                        "item total cost cannot be negative (got {total})"
                    )));
                }
                if total == item.total_cost {
                    return Err(DomainError::no_changes());
                }
                Ok(ItemChange::Reprice {
                    new_total: total,
                    delta: total.checked_sub(item.total_cost)?,
                })
            }
        }
    }
}
