use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use supplyledger_audit::{
    AdjustmentFilter, DiscrepancyFilter, WarehouseBalanceAdjustment, WarehouseDiscrepancy,
};
use supplyledger_core::{
    AggregateRoot, ExpectedVersion, ItemId, Money, ProductId, Quantity, ReasonId, RoundingPolicy, TransferId,
    UnitPrice, UserId, WarehouseId,
};
use supplyledger_ledger::{BalanceKey, BalanceOwner, OwnerKind, ProductBalance};
use supplyledger_transfers::{ProductTransfer, WithdrawalReason};
use supplyledger_withdrawals::{Consignment, ConsignmentItem, ConsignmentKind, ConsignmentOwner};

use super::{
    AuditRepository, BalanceRepository, ConsignmentRepository, LedgerStore, LedgerTx,
    ReasonRepository, StoreError, StoreResult, TransferRepository, check_version,
};
use crate::error::EngineError;

#[derive(Debug, Clone)]
struct BalanceRow {
    quantity: Quantity,
    total_cost: Money,
    version: u64,
}

#[derive(Debug, Clone)]
struct ConsignmentRow {
    running_total_cost: Money,
    version: u64,
}

#[derive(Debug, Clone)]
struct ItemRow {
    owner: ConsignmentOwner,
    consignment_id: Uuid,
    warehouse_id: WarehouseId,
    product_id: ProductId,
    quantity: Quantity,
    unit_cost: UnitPrice,
    total_cost: Money,
    created_by: UserId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ItemRow {
    fn belongs_to<K: ConsignmentKind>(&self, id: K::Id) -> bool {
        self.owner == K::KIND && self.consignment_id == id.into()
    }

    fn to_item<K: ConsignmentKind>(&self, id: ItemId) -> ConsignmentItem<K> {
        ConsignmentItem {
            id,
            consignment_id: K::Id::from(self.consignment_id),
            warehouse_id: self.warehouse_id,
            product_id: self.product_id,
            quantity: self.quantity,
            unit_cost: self.unit_cost,
            total_cost: self.total_cost,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Tables {
    balances: HashMap<(BalanceOwner, Uuid, ProductId), BalanceRow>,
    consignments: HashMap<(ConsignmentOwner, Uuid), ConsignmentRow>,
    items: HashMap<ItemId, ItemRow>,
    transfers: HashMap<TransferId, ProductTransfer>,
    discrepancies: Vec<WarehouseDiscrepancy>,
    adjustments: Vec<WarehouseBalanceAdjustment>,
    reasons: HashMap<ReasonId, WithdrawalReason>,
}

/// In-memory transactional ledger store.
///
/// Intended for tests/dev. Writers are serialized by one lock; each
/// transaction works on a copy of the tables that replaces the committed state
/// only when the closure succeeds.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    tables: RwLock<Tables>,
    policy: RoundingPolicy,
}

impl InMemoryLedgerStore {
    pub fn new(policy: RoundingPolicy) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            policy,
        }
    }

    pub fn policy(&self) -> RoundingPolicy {
        self.policy
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn transaction<T, F>(&self, work: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, EngineError>,
    {
        let mut committed = self
            .tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        let mut working = committed.clone();
        let out = work(&mut InMemoryTx {
            tables: &mut working,
            policy: self.policy,
        })?;

        *committed = working;
        Ok(out)
    }
}

struct InMemoryTx<'a> {
    tables: &'a mut Tables,
    policy: RoundingPolicy,
}

impl InMemoryTx<'_> {
    fn restore_balance<K: OwnerKind>(
        &self,
        key: BalanceKey<K>,
        row: &BalanceRow,
    ) -> StoreResult<ProductBalance<K>> {
        ProductBalance::restore(key, row.quantity, row.total_cost, row.version, self.policy)
            .map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    fn balances_where<K: OwnerKind>(
        &self,
        keep: impl Fn(Uuid, ProductId, &BalanceRow) -> bool,
    ) -> StoreResult<Vec<ProductBalance<K>>> {
        let mut rows: Vec<_> = self
            .tables
            .balances
            .iter()
            .filter(|((kind, owner, product), row)| *kind == K::KIND && keep(*owner, *product, row))
            .collect();
        rows.sort_by_key(|((_, owner, product), _)| (*owner, *product.as_uuid()));

        rows.into_iter()
            .map(|((_, owner, product), row)| {
                self.restore_balance(BalanceKey::new(K::Id::from(*owner), *product), row)
            })
            .collect()
    }
}

fn balance_slot<K: OwnerKind>(key: &BalanceKey<K>) -> (BalanceOwner, Uuid, ProductId) {
    (K::KIND, key.owner_id.into(), key.product_id)
}

impl<K: OwnerKind> BalanceRepository<K> for InMemoryTx<'_> {
    fn find(&mut self, key: &BalanceKey<K>) -> StoreResult<Option<ProductBalance<K>>> {
        match self.tables.balances.get(&balance_slot(key)) {
            Some(row) => self.restore_balance(*key, row).map(Some),
            None => Ok(None),
        }
    }

    fn save(&mut self, balance: &ProductBalance<K>, expected: ExpectedVersion) -> StoreResult<u64> {
        let slot = balance_slot(balance.key());
        let current = self.tables.balances.get(&slot).map(|r| r.version).unwrap_or(0);
        check_version(balance.key(), expected, current)?;
        let version = current + 1;
        self.tables.balances.insert(
            slot,
            BalanceRow {
                quantity: balance.quantity(),
                total_cost: balance.total_cost(),
                version,
            },
        );
        Ok(version)
    }

    fn delete(&mut self, key: &BalanceKey<K>, expected: ExpectedVersion) -> StoreResult<()> {
        let slot = balance_slot(key);
        let current = self.tables.balances.get(&slot).map(|r| r.version).unwrap_or(0);
        check_version(key, expected, current)?;
        self.tables.balances.remove(&slot);
        Ok(())
    }

    fn list_by_owner(&mut self, owner_id: K::Id) -> StoreResult<Vec<ProductBalance<K>>> {
        let owner: Uuid = owner_id.into();
        self.balances_where(|o, _, _| o == owner)
    }

    fn list_by_product(&mut self, product_id: ProductId) -> StoreResult<Vec<ProductBalance<K>>> {
        self.balances_where(|_, p, _| p == product_id)
    }

    fn list_positive(&mut self) -> StoreResult<Vec<ProductBalance<K>>> {
        self.balances_where(|_, _, row| row.quantity.is_positive())
    }
}

impl<K: ConsignmentKind> ConsignmentRepository<K> for InMemoryTx<'_> {
    fn find(&mut self, id: K::Id) -> StoreResult<Option<Consignment<K>>> {
        Ok(self
            .tables
            .consignments
            .get(&(K::KIND, id.into()))
            .map(|row| Consignment::restore(id, row.running_total_cost, row.version)))
    }

    fn save(&mut self, consignment: &Consignment<K>, expected: ExpectedVersion) -> StoreResult<u64> {
        let id = *consignment.id();
        let slot = (K::KIND, id.into());
        let current = self.tables.consignments.get(&slot).map(|r| r.version).unwrap_or(0);
        check_version(format_args!("{} {id}", K::KIND), expected, current)?;
        let version = current + 1;
        self.tables.consignments.insert(
            slot,
            ConsignmentRow {
                running_total_cost: consignment.running_total_cost(),
                version,
            },
        );
        Ok(version)
    }

    fn delete(&mut self, id: K::Id, expected: ExpectedVersion) -> StoreResult<()> {
        let slot = (K::KIND, id.into());
        let current = self.tables.consignments.get(&slot).map(|r| r.version).unwrap_or(0);
        check_version(format_args!("{} {id}", K::KIND), expected, current)?;
        self.tables.consignments.remove(&slot);
        self.tables.items.retain(|_, item| !item.belongs_to::<K>(id));
        Ok(())
    }

    fn find_item(&mut self, id: K::Id, item_id: ItemId) -> StoreResult<Option<ConsignmentItem<K>>> {
        Ok(self
            .tables
            .items
            .get(&item_id)
            .filter(|row| row.belongs_to::<K>(id))
            .map(|row| row.to_item(item_id)))
    }

    fn list_items(&mut self, id: K::Id) -> StoreResult<Vec<ConsignmentItem<K>>> {
        let mut items: Vec<ConsignmentItem<K>> = self
            .tables
            .items
            .iter()
            .filter(|(_, row)| row.belongs_to::<K>(id))
            .map(|(item_id, row)| row.to_item(*item_id))
            .collect();
        items.sort_by_key(|item| (item.created_at, *item.id.as_uuid()));
        Ok(items)
    }

    fn save_item(&mut self, item: &ConsignmentItem<K>) -> StoreResult<()> {
        self.tables.items.insert(
            item.id,
            ItemRow {
                owner: K::KIND,
                consignment_id: item.consignment_id.into(),
                warehouse_id: item.warehouse_id,
                product_id: item.product_id,
                quantity: item.quantity,
                unit_cost: item.unit_cost,
                total_cost: item.total_cost,
                created_by: item.created_by,
                created_at: item.created_at,
                updated_at: item.updated_at,
            },
        );
        Ok(())
    }

    fn delete_item(&mut self, item_id: ItemId) -> StoreResult<()> {
        self.tables.items.remove(&item_id);
        Ok(())
    }
}

impl TransferRepository for InMemoryTx<'_> {
    fn find(&mut self, id: TransferId) -> StoreResult<Option<ProductTransfer>> {
        Ok(self.tables.transfers.get(&id).cloned())
    }

    fn save(&mut self, transfer: &ProductTransfer) -> StoreResult<()> {
        self.tables.transfers.insert(transfer.id, transfer.clone());
        Ok(())
    }

    fn delete(&mut self, id: TransferId) -> StoreResult<()> {
        self.tables.transfers.remove(&id);
        Ok(())
    }

    fn list_by_warehouse(&mut self, warehouse_id: WarehouseId) -> StoreResult<Vec<ProductTransfer>> {
        let mut transfers: Vec<ProductTransfer> = self
            .tables
            .transfers
            .values()
            .filter(|t| t.warehouse_id == warehouse_id)
            .cloned()
            .collect();
        transfers.sort_by_key(|t| (t.created_at, *t.id.as_uuid()));
        Ok(transfers)
    }
}

impl AuditRepository for InMemoryTx<'_> {
    fn append_discrepancy(&mut self, record: &WarehouseDiscrepancy) -> StoreResult<()> {
        self.tables.discrepancies.push(record.clone());
        Ok(())
    }

    fn append_adjustment(&mut self, record: &WarehouseBalanceAdjustment) -> StoreResult<()> {
        self.tables.adjustments.push(record.clone());
        Ok(())
    }

    fn list_discrepancies(&mut self, filter: &DiscrepancyFilter) -> StoreResult<Vec<WarehouseDiscrepancy>> {
        Ok(self
            .tables
            .discrepancies
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    fn list_adjustments(&mut self, filter: &AdjustmentFilter) -> StoreResult<Vec<WarehouseBalanceAdjustment>> {
        Ok(self
            .tables
            .adjustments
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }
}

impl ReasonRepository for InMemoryTx<'_> {
    fn find(&mut self, id: ReasonId) -> StoreResult<Option<WithdrawalReason>> {
        Ok(self.tables.reasons.get(&id).cloned())
    }

    fn save(&mut self, reason: &WithdrawalReason) -> StoreResult<()> {
        self.tables.reasons.insert(reason.id, reason.clone());
        Ok(())
    }
}

impl LedgerTx for InMemoryTx<'_> {
    fn warehouse_balances(&mut self) -> &mut dyn BalanceRepository<supplyledger_ledger::Warehouse> {
        self
    }

    fn driver_balances(&mut self) -> &mut dyn BalanceRepository<supplyledger_ledger::Driver> {
        self
    }

    fn vehicles(&mut self) -> &mut dyn ConsignmentRepository<supplyledger_withdrawals::Vehicle> {
        self
    }

    fn shipments(&mut self) -> &mut dyn ConsignmentRepository<supplyledger_withdrawals::Shipment> {
        self
    }

    fn transfers(&mut self) -> &mut dyn TransferRepository {
        self
    }

    fn audit(&mut self) -> &mut dyn AuditRepository {
        self
    }

    fn reasons(&mut self) -> &mut dyn ReasonRepository {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use supplyledger_core::DomainError;
    use supplyledger_ledger::WarehouseBalance;

    fn stocked() -> WarehouseBalance {
        let mut balance = WarehouseBalance::open(WarehouseId::new(), ProductId::new());
        balance
            .add(
                Quantity::new(dec!(3)).unwrap(),
                Money::new(dec!(9)).unwrap(),
                RoundingPolicy::HalfUp,
            )
            .unwrap();
        balance
    }

    #[test]
    fn failed_transaction_leaves_tables_untouched() {
        let store = InMemoryLedgerStore::default();
        let balance = stocked();
        let key = *balance.key();

        let result: Result<(), EngineError> = store.transaction(|tx| {
            tx.warehouse_balances().persist(balance.clone())?;
            Err(DomainError::insufficient_product("abort").into())
        });
        assert!(result.is_err());

        let found = store
            .transaction(|tx| Ok(tx.warehouse_balances().find(&key)?))
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn stale_version_is_rejected() {
        let store = InMemoryLedgerStore::default();
        let balance = stocked();

        let saved = store
            .transaction(|tx| Ok(tx.warehouse_balances().persist(balance.clone())?))
            .unwrap()
            .unwrap();
        assert_eq!(saved.version(), 1);

        // `balance` still carries version 0: a second insert must conflict.
        let err = store
            .transaction(|tx| Ok(tx.warehouse_balances().persist(balance.clone())?))
            .unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::Conflict(_))));
    }

    #[test]
    fn deleting_a_consignment_drops_its_items() {
        use supplyledger_core::{OperationContext, VehicleId};
        use supplyledger_withdrawals::Vehicle;

        let store = InMemoryLedgerStore::default();
        let vehicle_id = VehicleId::new();
        let item = ConsignmentItem::<Vehicle>::new(
            ItemId::new(),
            vehicle_id,
            WarehouseId::new(),
            ProductId::new(),
            Quantity::new(dec!(1)).unwrap(),
            UnitPrice::ZERO,
            Money::ZERO,
            &OperationContext::now(UserId::new()),
        );

        store
            .transaction(|tx| {
                let vehicles = tx.vehicles();
                vehicles.save(&Consignment::open(vehicle_id), ExpectedVersion::Exact(0))?;
                vehicles.save_item(&item)?;
                Ok(())
            })
            .unwrap();

        let remaining = store
            .transaction(|tx| {
                let vehicles = tx.vehicles();
                vehicles.delete(vehicle_id, ExpectedVersion::Exact(1))?;
                Ok(vehicles.list_items(vehicle_id)?)
            })
            .unwrap();
        assert!(remaining.is_empty());
    }
}
