//! Transactional persistence for the ledger.
//!
//! Every engine operation runs inside one [`LedgerStore::transaction`]. The
//! closure receives a [`LedgerTx`] exposing one repository per table; either
//! everything it wrote commits or nothing does.
//!
//! Balances and consignments carry a version. Writes state the version they
//! were read at (`ExpectedVersion`); a mismatch fails with
//! [`StoreError::Conflict`]. `find` on a balance or consignment also locks the
//! row for the rest of the transaction where the backend supports it.

use thiserror::Error;

use supplyledger_audit::{
    AdjustmentFilter, DiscrepancyFilter, WarehouseBalanceAdjustment, WarehouseDiscrepancy,
};
use supplyledger_core::{
    AggregateRoot, ExpectedVersion, ItemId, ProductId, ReasonId, TransferId, WarehouseId,
};
use supplyledger_ledger::{BalanceKey, Driver, OwnerKind, ProductBalance, Warehouse};
use supplyledger_transfers::{ProductTransfer, WithdrawalReason};
use supplyledger_withdrawals::{Consignment, ConsignmentItem, ConsignmentKind, Shipment, Vehicle};

use crate::error::EngineError;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Optimistic concurrency check failed (row changed or vanished since read).
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// A stored row could not be turned back into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Backend failure (connection, lock poisoning, SQL error).
    #[error("storage backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait BalanceRepository<K: OwnerKind> {
    /// Load (and lock) one balance row.
    fn find(&mut self, key: &BalanceKey<K>) -> StoreResult<Option<ProductBalance<K>>>;

    /// Insert or update a row; returns the version now stored.
    fn save(&mut self, balance: &ProductBalance<K>, expected: ExpectedVersion) -> StoreResult<u64>;

    fn delete(&mut self, key: &BalanceKey<K>, expected: ExpectedVersion) -> StoreResult<()>;

    fn list_by_owner(&mut self, owner_id: K::Id) -> StoreResult<Vec<ProductBalance<K>>>;

    fn list_by_product(&mut self, product_id: ProductId) -> StoreResult<Vec<ProductBalance<K>>>;

    fn list_positive(&mut self) -> StoreResult<Vec<ProductBalance<K>>>;

    /// Load a balance, or an empty unsaved one when the row does not exist.
    fn find_or_open(&mut self, key: &BalanceKey<K>) -> StoreResult<ProductBalance<K>> {
        Ok(self
            .find(key)?
            .unwrap_or_else(|| ProductBalance::open(key.owner_id, key.product_id)))
    }

    /// Write back a mutated balance: depleted rows are deleted, others saved.
    ///
    /// Returns the stored balance (with its new version), or `None` if the
    /// row no longer exists.
    fn persist(&mut self, balance: ProductBalance<K>) -> StoreResult<Option<ProductBalance<K>>> {
        if balance.is_depleted() {
            if balance.is_persisted() {
                self.delete(balance.key(), balance.expected_version())?;
            }
            return Ok(None);
        }
        let version = self.save(&balance, balance.expected_version())?;
        Ok(Some(balance.with_version(version)))
    }
}

pub trait ConsignmentRepository<K: ConsignmentKind> {
    /// Load (and lock) a consignment.
    fn find(&mut self, id: K::Id) -> StoreResult<Option<Consignment<K>>>;

    /// Insert or update; returns the version now stored.
    fn save(&mut self, consignment: &Consignment<K>, expected: ExpectedVersion) -> StoreResult<u64>;

    /// Delete a consignment together with its remaining item lines.
    fn delete(&mut self, id: K::Id, expected: ExpectedVersion) -> StoreResult<()>;

    fn find_item(&mut self, id: K::Id, item_id: ItemId) -> StoreResult<Option<ConsignmentItem<K>>>;

    fn list_items(&mut self, id: K::Id) -> StoreResult<Vec<ConsignmentItem<K>>>;

    fn save_item(&mut self, item: &ConsignmentItem<K>) -> StoreResult<()>;

    fn delete_item(&mut self, item_id: ItemId) -> StoreResult<()>;
}

pub trait TransferRepository {
    fn find(&mut self, id: TransferId) -> StoreResult<Option<ProductTransfer>>;
    fn save(&mut self, transfer: &ProductTransfer) -> StoreResult<()>;
    fn delete(&mut self, id: TransferId) -> StoreResult<()>;
    fn list_by_warehouse(&mut self, warehouse_id: WarehouseId) -> StoreResult<Vec<ProductTransfer>>;
}

/// Append-only audit tables.
pub trait AuditRepository {
    fn append_discrepancy(&mut self, record: &WarehouseDiscrepancy) -> StoreResult<()>;
    fn append_adjustment(&mut self, record: &WarehouseBalanceAdjustment) -> StoreResult<()>;
    fn list_discrepancies(&mut self, filter: &DiscrepancyFilter) -> StoreResult<Vec<WarehouseDiscrepancy>>;
    fn list_adjustments(&mut self, filter: &AdjustmentFilter) -> StoreResult<Vec<WarehouseBalanceAdjustment>>;
}

pub trait ReasonRepository {
    fn find(&mut self, id: ReasonId) -> StoreResult<Option<WithdrawalReason>>;
    fn save(&mut self, reason: &WithdrawalReason) -> StoreResult<()>;
}

/// One open store transaction.
pub trait LedgerTx {
    fn warehouse_balances(&mut self) -> &mut dyn BalanceRepository<Warehouse>;
    fn driver_balances(&mut self) -> &mut dyn BalanceRepository<Driver>;
    fn vehicles(&mut self) -> &mut dyn ConsignmentRepository<Vehicle>;
    fn shipments(&mut self) -> &mut dyn ConsignmentRepository<Shipment>;
    fn transfers(&mut self) -> &mut dyn TransferRepository;
    fn audit(&mut self) -> &mut dyn AuditRepository;
    fn reasons(&mut self) -> &mut dyn ReasonRepository;
}

/// A transactional ledger backend.
pub trait LedgerStore: Send + Sync {
    /// Run `work` in one all-or-nothing transaction; an `Err` rolls back.
    fn transaction<T, F>(&self, work: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, EngineError>;
}

impl<S: LedgerStore> LedgerStore for std::sync::Arc<S> {
    fn transaction<T, F>(&self, work: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, EngineError>,
    {
        (**self).transaction(work)
    }
}

/// Owner kinds with a balance table.
pub trait BalanceOwnerStore: OwnerKind {
    fn balances(tx: &mut dyn LedgerTx) -> &mut dyn BalanceRepository<Self>;
}

impl BalanceOwnerStore for Warehouse {
    fn balances(tx: &mut dyn LedgerTx) -> &mut dyn BalanceRepository<Self> {
        tx.warehouse_balances()
    }
}

impl BalanceOwnerStore for Driver {
    fn balances(tx: &mut dyn LedgerTx) -> &mut dyn BalanceRepository<Self> {
        tx.driver_balances()
    }
}

/// Consignment kinds with a consignment table.
pub trait ConsignmentStore: ConsignmentKind {
    fn consignments(tx: &mut dyn LedgerTx) -> &mut dyn ConsignmentRepository<Self>;
}

impl ConsignmentStore for Vehicle {
    fn consignments(tx: &mut dyn LedgerTx) -> &mut dyn ConsignmentRepository<Self> {
        tx.vehicles()
    }
}

impl ConsignmentStore for Shipment {
    fn consignments(tx: &mut dyn LedgerTx) -> &mut dyn ConsignmentRepository<Self> {
        tx.shipments()
    }
}

/// Compare a write's expectation with the stored version.
pub(crate) fn check_version(
    what: impl core::fmt::Display,
    expected: ExpectedVersion,
    found: u64,
) -> StoreResult<()> {
    expected
        .check(found)
        .map_err(|err| StoreError::Conflict(format!("{what}: {}", err.message())))
}
