use chrono::{DateTime, Utc};

use supplyledger_core::{
    DomainError, DomainResult, Entity, ItemId, Money, OperationContext, ProductId, Quantity,
    RoundingPolicy, UnitPrice, UserId, WarehouseId,
};
use supplyledger_ledger::average_price;

use crate::kind::ConsignmentKind;

/// One product line withdrawn from a warehouse onto a consignment.
///
/// `unit_cost` is the warehouse average at the time of withdrawal; quantity
/// edits replay at this price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsignmentItem<K: ConsignmentKind> {
    pub id: ItemId,
    pub consignment_id: K::Id,
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub unit_cost: UnitPrice,
    pub total_cost: Money,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<K: ConsignmentKind> ConsignmentItem<K> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ItemId,
        consignment_id: K::Id,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        quantity: Quantity,
        unit_cost: UnitPrice,
        total_cost: Money,
        ctx: &OperationContext,
    ) -> Self {
        Self {
            id,
            consignment_id,
            warehouse_id,
            product_id,
            quantity,
            unit_cost,
            total_cost,
            created_by: ctx.user_id(),
            created_at: ctx.occurred_at(),
            updated_at: ctx.occurred_at(),
        }
    }

    /// Price used to replay quantity edits.
    ///
    /// Falls back to `total_cost / quantity` for lines stored without a unit
    /// cost; a line that has neither cannot be repriced.
    pub fn resolve_unit_price(&self, policy: RoundingPolicy) -> DomainResult<UnitPrice> {
        if !self.unit_cost.is_zero() {
            return Ok(self.unit_cost);
        }
        if self.quantity.is_positive() {
            return average_price(self.total_cost, self.quantity, policy);
        }
        Err(DomainError::unit_price_missing(format!(
            "item {} has no unit cost and no quantity to derive one",
            self.id
        )))
    }
}

impl<K: ConsignmentKind> Entity for ConsignmentItem<K> {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use supplyledger_core::{ErrorCode, ShipmentId};

    use crate::kind::Shipment;

    fn item(quantity: Quantity, unit: UnitPrice, total: Money) -> ConsignmentItem<Shipment> {
        ConsignmentItem::new(
            ItemId::new(),
            ShipmentId::new(),
            WarehouseId::new(),
            ProductId::new(),
            quantity,
            unit,
            total,
            &OperationContext::now(UserId::new()),
        )
    }

    #[test]
    fn unit_price_falls_back_to_line_average() {
        let line = item(
            Quantity::new(dec!(4)).unwrap(),
            UnitPrice::ZERO,
            Money::new(dec!(10)).unwrap(),
        );
        let price = line.resolve_unit_price(RoundingPolicy::HalfUp).unwrap();
        assert_eq!(price.value(), dec!(2.5));
    }

    #[test]
    fn unit_price_missing_without_quantity() {
        let line = item(Quantity::ZERO, UnitPrice::ZERO, Money::ZERO);
        let err = line.resolve_unit_price(RoundingPolicy::HalfUp).unwrap_err();
        assert!(err.is(ErrorCode::UnitPriceMissing));
    }
}
