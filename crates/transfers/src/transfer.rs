use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use supplyledger_core::{
    DomainError, DomainResult, Entity, Money, OperationContext, ProductId, Quantity, ReasonId,
    TransferId, UnitPrice, UserId, WarehouseId,
};

/// Audit record of a quantity+cost movement between two products of one
/// warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductTransfer {
    pub id: TransferId,
    pub warehouse_id: WarehouseId,
    pub from_product: ProductId,
    pub to_product: ProductId,
    pub quantity: Quantity,
    /// Average price of the source product when the transfer was made.
    /// Later edits replay their delta at this price.
    pub unit_price: UnitPrice,
    /// Cost currently moved by this transfer.
    pub total_cost: Money,
    pub reason_id: ReasonId,
    pub description: Option<String>,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for ProductTransfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Request: move `quantity` of `from_product` into `to_product`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub warehouse_id: WarehouseId,
    pub from_product: ProductId,
    pub to_product: ProductId,
    pub quantity: Quantity,
    pub reason_id: ReasonId,
    pub description: Option<String>,
}

impl TransferRequest {
    pub fn validate(&self) -> DomainResult<()> {
        if self.from_product == self.to_product {
            return Err(DomainError::same_product_transfer());
        }
        if !self.quantity.is_positive() {
            return Err(DomainError::invalid_quantity(
                "transfer quantity must be positive",
            ));
        }
        Ok(())
    }

    /// Build the audit record once the movement has been applied.
    pub fn into_record(
        self,
        id: TransferId,
        unit_price: UnitPrice,
        total_cost: Money,
        ctx: &OperationContext,
    ) -> ProductTransfer {
        ProductTransfer {
            id,
            warehouse_id: self.warehouse_id,
            from_product: self.from_product,
            to_product: self.to_product,
            quantity: self.quantity,
            unit_price,
            total_cost,
            reason_id: self.reason_id,
            description: self.description,
            user_id: ctx.user_id(),
            created_at: ctx.occurred_at(),
            updated_at: ctx.occurred_at(),
        }
    }
}

/// Request: edit a recorded transfer. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferUpdate {
    pub quantity: Option<Quantity>,
    pub reason_id: Option<ReasonId>,
    pub description: Option<String>,
}

/// How the transferred quantity changes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum QuantityChange {
    Unchanged,
    /// Pull this much more from the source product.
    Increase(Quantity),
    /// Return this much from the target product to the source.
    Decrease(Quantity),
    /// Undo the whole transfer and delete its record.
    Reverse,
}

/// The effective changes an update carries, after dropping no-op fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub quantity: QuantityChange,
    pub reason_id: Option<ReasonId>,
    pub description: Option<String>,
}

impl TransferUpdate {
    pub fn plan(&self, current: &ProductTransfer) -> DomainResult<TransferPlan> {
        let quantity = match self.quantity {
            None => QuantityChange::Unchanged,
            Some(q) if q == current.quantity => QuantityChange::Unchanged,
            Some(q) if q.is_zero() => QuantityChange::Reverse,
            Some(q) => {
                let delta = current.quantity.delta_to(q);
                let magnitude = Quantity::from_delta(delta);
                if delta.is_sign_positive() {
                    QuantityChange::Increase(magnitude)
                } else {
                    QuantityChange::Decrease(magnitude)
                }
            }
        };
        let reason_id = self.reason_id.filter(|r| *r != current.reason_id);
        let description = self
            .description
            .clone()
            .filter(|d| current.description.as_deref() != Some(d.as_str()));

        if quantity == QuantityChange::Unchanged && reason_id.is_none() && description.is_none() {
            return Err(DomainError::no_changes());
        }

        Ok(TransferPlan {
            quantity,
            reason_id,
            description,
        })
    }
}
