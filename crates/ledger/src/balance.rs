use serde::{Deserialize, Serialize};
use uuid::Uuid;

use supplyledger_core::{
    AggregateRoot, DomainError, DomainResult, Money, ProductId, Quantity, RoundingPolicy,
    UnitPrice,
};

use crate::owner::{BalanceOwner, Driver, OwnerKind, Warehouse};
use crate::pricing::average_price;

/// Identity of a balance row: one per (owner, product).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BalanceKey<K: OwnerKind> {
    pub owner_id: K::Id,
    pub product_id: ProductId,
}

impl<K: OwnerKind> BalanceKey<K> {
    pub fn new(owner_id: K::Id, product_id: ProductId) -> Self {
        Self {
            owner_id,
            product_id,
        }
    }
}

impl<K: OwnerKind> core::fmt::Display for BalanceKey<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {} / product {}", K::KIND, self.owner_id, self.product_id)
    }
}

/// Aggregate root: quantity and cost of one product held by one owner.
///
/// The average unit cost is always derived from `(total_cost, quantity)`; it is
/// cached on the value only so readers do not need to know the rounding policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductBalance<K: OwnerKind> {
    pub(crate) key: BalanceKey<K>,
    pub(crate) quantity: Quantity,
    pub(crate) total_cost: Money,
    pub(crate) average_unit_cost: UnitPrice,
    pub(crate) version: u64,
}

pub type WarehouseBalance = ProductBalance<Warehouse>;
pub type DriverBalance = ProductBalance<Driver>;

impl<K: OwnerKind> ProductBalance<K> {
    /// A not-yet-persisted empty balance (first add creates the row).
    pub fn open(owner_id: K::Id, product_id: ProductId) -> Self {
        Self {
            key: BalanceKey::new(owner_id, product_id),
            quantity: Quantity::ZERO,
            total_cost: Money::ZERO,
            average_unit_cost: UnitPrice::ZERO,
            version: 0,
        }
    }

    /// Rebuild a balance from persisted columns.
    pub fn restore(
        key: BalanceKey<K>,
        quantity: Quantity,
        total_cost: Money,
        version: u64,
        policy: RoundingPolicy,
    ) -> DomainResult<Self> {
        if total_cost.is_negative() {
            return Err(DomainError::invalid_total_cost(format!(
                "stored total cost for {key} is negative"
            )));
        }
        Ok(Self {
            key,
            quantity,
            total_cost,
            average_unit_cost: average_price(total_cost, quantity, policy)?,
            version,
        })
    }

    pub fn key(&self) -> &BalanceKey<K> {
        &self.key
    }

    pub fn owner_id(&self) -> K::Id {
        self.key.owner_id
    }

    pub fn product_id(&self) -> ProductId {
        self.key.product_id
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn total_cost(&self) -> Money {
        self.total_cost
    }

    pub fn average_unit_cost(&self) -> UnitPrice {
        self.average_unit_cost
    }

    /// Whether the row must be deleted rather than saved.
    pub fn is_depleted(&self) -> bool {
        self.quantity.is_zero()
    }

    pub fn is_persisted(&self) -> bool {
        self.version > 0
    }

    /// Same state, stamped with the version a store just committed.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn snapshot(&self) -> BalanceSnapshot {
        BalanceSnapshot {
            owner: K::KIND,
            owner_id: self.key.owner_id.into(),
            product_id: self.key.product_id,
            quantity: self.quantity,
            total_cost: self.total_cost,
            average_unit_cost: self.average_unit_cost,
        }
    }

    /// Replace quantity and cost and re-derive the average. Nothing changes
    /// when the average cannot be derived.
    pub(crate) fn set(
        &mut self,
        quantity: Quantity,
        total_cost: Money,
        policy: RoundingPolicy,
    ) -> DomainResult<()> {
        let total_cost = if quantity.is_zero() { Money::ZERO } else { total_cost };
        let average_unit_cost = average_price(total_cost, quantity, policy)?;
        self.quantity = quantity;
        self.total_cost = total_cost;
        self.average_unit_cost = average_unit_cost;
        Ok(())
    }
}

impl<K: OwnerKind> AggregateRoot for ProductBalance<K> {
    type Id = BalanceKey<K>;

    fn id(&self) -> &Self::Id {
        &self.key
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Owner-agnostic, serializable view of a balance at a point in time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub owner: BalanceOwner,
    pub owner_id: Uuid,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub total_cost: Money,
    pub average_unit_cost: UnitPrice,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use supplyledger_core::{ErrorCode, WarehouseId};

    #[test]
    fn restore_derives_average() {
        let key = BalanceKey::<Warehouse>::new(WarehouseId::new(), ProductId::new());
        let balance = ProductBalance::restore(
            key,
            Quantity::new(dec!(4)).unwrap(),
            Money::new(dec!(10)).unwrap(),
            7,
            RoundingPolicy::HalfUp,
        )
        .unwrap();
        assert_eq!(balance.average_unit_cost().value(), dec!(2.5));
        assert_eq!(balance.version(), 7);
        assert!(balance.is_persisted());
    }

    #[test]
    fn restore_rejects_negative_cost() {
        let key = BalanceKey::<Driver>::new(supplyledger_core::DriverId::new(), ProductId::new());
        let err = ProductBalance::restore(
            key,
            Quantity::ZERO,
            Money::new(dec!(-1)).unwrap(),
            1,
            RoundingPolicy::HalfUp,
        )
        .unwrap_err();
        assert!(err.is(ErrorCode::InvalidTotalCost));
    }

    #[test]
    fn snapshot_is_owner_tagged() {
        let owner = WarehouseId::new();
        let balance = WarehouseBalance::open(owner, ProductId::new());
        let snap = balance.snapshot();
        assert_eq!(snap.owner, BalanceOwner::Warehouse);
        assert_eq!(snap.owner_id, *owner.as_uuid());
        assert!(balance.is_depleted());
    }
}
