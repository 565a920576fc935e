//! Purchases, stock movements and warehouse receipts.

use serde::Serialize;
use tracing::{info, warn};

use supplyledger_audit::{ReceiptCheck, WarehouseDiscrepancy};
use supplyledger_core::{
    AggregateRoot, DomainError, DriverId, Money, OperationContext, ProductId, Quantity, RecordId,
    RoundingPolicy, UnitPrice, WarehouseId,
};
use supplyledger_ledger::{BalanceKey, BalanceSnapshot, Driver, ProductBalance, Warehouse};

use super::{LedgerEngine, missing, not_found};
use crate::error::EngineResult;
use crate::store::{BalanceOwnerStore, LedgerStore, LedgerTx};

/// Result of an average-priced stock-out.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct StockOut {
    /// Average price the goods left at.
    pub price: UnitPrice,
    pub cost: Money,
    pub balance: BalanceSnapshot,
}

/// Result of receiving a driver's goods into a warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub balance: BalanceSnapshot,
    pub discrepancy: Option<WarehouseDiscrepancy>,
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// A driver bought `quantity` for `cost`.
    pub fn record_purchase(
        &self,
        ctx: &OperationContext,
        driver_id: DriverId,
        product_id: ProductId,
        quantity: Quantity,
        cost: Money,
    ) -> EngineResult<BalanceSnapshot> {
        self.run("record_purchase", |tx, policy| {
            let key = BalanceKey::<Driver>::new(driver_id, product_id);
            let snapshot = add_stock(tx, key, quantity, cost, policy)?;
            info!(user = %ctx.user_id(), %key, %quantity, %cost, "purchase recorded");
            Ok(snapshot)
        })
    }

    /// Undo (part of) a purchase at the cost it was bought for.
    pub fn cancel_purchase(
        &self,
        ctx: &OperationContext,
        driver_id: DriverId,
        product_id: ProductId,
        quantity: Quantity,
        cost: Money,
    ) -> EngineResult<BalanceSnapshot> {
        self.run("cancel_purchase", |tx, policy| {
            let key = BalanceKey::<Driver>::new(driver_id, product_id);
            let mut balance = existing(tx, &key)?;
            balance.remove_with_cost(quantity, cost, policy)?;
            let snapshot = balance.snapshot();
            Driver::balances(tx).persist(balance)?;
            info!(user = %ctx.user_id(), %key, %quantity, %cost, "purchase cancelled");
            Ok(snapshot)
        })
    }

    /// Correct the cost of goods a driver holds; quantity is untouched.
    pub fn correct_purchase_cost(
        &self,
        ctx: &OperationContext,
        driver_id: DriverId,
        product_id: ProductId,
        delta: Money,
    ) -> EngineResult<BalanceSnapshot> {
        self.run("correct_purchase_cost", |tx, policy| {
            let key = BalanceKey::<Driver>::new(driver_id, product_id);
            let mut balance = existing(tx, &key)?;
            balance.adjust_cost(delta, policy)?;
            let snapshot = balance.snapshot();
            Driver::balances(tx).persist(balance)?;
            info!(user = %ctx.user_id(), %key, %delta, "purchase cost corrected");
            Ok(snapshot)
        })
    }

    pub fn stock_in(
        &self,
        ctx: &OperationContext,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        quantity: Quantity,
        cost: Money,
    ) -> EngineResult<BalanceSnapshot> {
        self.run("stock_in", |tx, policy| {
            let key = BalanceKey::<Warehouse>::new(warehouse_id, product_id);
            let snapshot = add_stock(tx, key, quantity, cost, policy)?;
            info!(user = %ctx.user_id(), %key, %quantity, %cost, "stock in");
            Ok(snapshot)
        })
    }

    /// Take goods out of a warehouse at the current average price.
    pub fn stock_out(
        &self,
        ctx: &OperationContext,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> EngineResult<StockOut> {
        self.run("stock_out", |tx, policy| {
            let key = BalanceKey::<Warehouse>::new(warehouse_id, product_id);
            let repo = tx.warehouse_balances();
            let mut balance = repo.find_or_open(&key)?;
            let removal = balance.remove(quantity, policy)?;
            let snapshot = balance.snapshot();
            repo.persist(balance)?;
            info!(
                user = %ctx.user_id(),
                %key,
                %quantity,
                price = %removal.unit_price,
                cost = %removal.cost,
                depleted = removal.depleted,
                "stock out"
            );
            Ok(StockOut {
                price: removal.unit_price,
                cost: removal.cost,
                balance: snapshot,
            })
        })
    }

    /// Move a driver's purchase into a warehouse.
    ///
    /// The driver's whole cost follows the goods whatever quantity arrives;
    /// a mismatch between purchased and received quantity is recorded as a
    /// discrepancy.
    pub fn receive_into_warehouse(
        &self,
        ctx: &OperationContext,
        driver_id: DriverId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        received: Quantity,
    ) -> EngineResult<Receipt> {
        self.run("receive_into_warehouse", |tx, policy| {
            if !received.is_positive() {
                return Err(DomainError::invalid_quantity("received quantity must be positive").into());
            }

            let driver_key = BalanceKey::<Driver>::new(driver_id, product_id);
            let driver = existing(tx, &driver_key)?;
            let discrepancy = ReceiptCheck::new(&driver, warehouse_id, received).detect(RecordId::new(), ctx)?;

            tx.driver_balances().delete(driver.key(), driver.expected_version())?;

            let key = BalanceKey::<Warehouse>::new(warehouse_id, product_id);
            let balance = add_stock(tx, key, received, driver.total_cost(), policy)?;

            if let Some(record) = &discrepancy {
                tx.audit().append_discrepancy(record)?;
                warn!(
                    %driver_key,
                    warehouse = %warehouse_id,
                    purchased = %record.purchased_quantity,
                    received = %record.received_quantity,
                    kind = record.discrepancy_type.as_str(),
                    value = %record.discrepancy_value,
                    "receipt discrepancy recorded"
                );
            }
            info!(user = %ctx.user_id(), %driver_key, %key, %received, cost = %driver.total_cost(), "received into warehouse");

            Ok(Receipt { balance, discrepancy })
        })
    }
}

pub(crate) fn existing<K: BalanceOwnerStore>(
    tx: &mut dyn LedgerTx,
    key: &BalanceKey<K>,
) -> EngineResult<ProductBalance<K>> {
    let found = K::balances(tx).find(key)?;
    not_found(found, || DomainError::balance_not_found(missing("balance", key)))
}

fn add_stock<K: BalanceOwnerStore>(
    tx: &mut dyn LedgerTx,
    key: BalanceKey<K>,
    quantity: Quantity,
    cost: Money,
    policy: RoundingPolicy,
) -> EngineResult<BalanceSnapshot> {
    let repo = K::balances(tx);
    let mut balance = repo.find_or_open(&key)?;
    balance.add(quantity, cost, policy)?;
    let snapshot = balance.snapshot();
    repo.persist(balance)?;
    Ok(snapshot)
}
