//! Withdrawals onto vehicles and shipments.
//!
//! Generic over the consignment kind: `engine.add_item::<Vehicle>(..)` and
//! `engine.add_item::<Shipment>(..)` run the same code against different
//! tables.

use tracing::{info, warn};

use supplyledger_core::{
    AggregateRoot, DomainError, ItemId, Money, OperationContext, ProductId, Quantity, WarehouseId,
};
use supplyledger_ledger::{BalanceKey, Warehouse};
use supplyledger_withdrawals::{
    Consignment, ConsignmentItem, ItemChange, ItemOutcome, ItemUpdate, apply_change, return_item,
    withdraw,
};

use super::movement::existing;
use super::{LedgerEngine, missing, not_found};
use crate::error::EngineResult;
use crate::store::{ConsignmentStore, LedgerStore, LedgerTx};

impl<S: LedgerStore> LedgerEngine<S> {
    /// Register a vehicle or shipment with an empty running total.
    pub fn open_consignment<K: ConsignmentStore>(
        &self,
        ctx: &OperationContext,
        id: K::Id,
    ) -> EngineResult<Consignment<K>> {
        self.run("open_consignment", |tx, _| {
            let repo = K::consignments(tx);
            if repo.find(id)?.is_some() {
                return Err(DomainError::consignment_exists(format!("{} {id} already exists", K::KIND)).into());
            }
            let consignment = Consignment::<K>::open(id);
            let version = repo.save(&consignment, consignment.expected_version())?;
            info!(user = %ctx.user_id(), kind = %K::KIND, %id, "consignment opened");
            Ok(consignment.with_version(version))
        })
    }

    /// Withdraw goods from a warehouse onto a consignment at the current
    /// average price.
    pub fn add_item<K: ConsignmentStore>(
        &self,
        ctx: &OperationContext,
        id: K::Id,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> EngineResult<ConsignmentItem<K>> {
        self.run("add_item", |tx, policy| {
            let mut consignment = existing_consignment::<K>(tx, id)?;
            let key = BalanceKey::<Warehouse>::new(warehouse_id, product_id);
            let mut balance = tx.warehouse_balances().find_or_open(&key)?;

            let item = withdraw(&mut balance, &mut consignment, ItemId::new(), quantity, ctx, policy)?;

            tx.warehouse_balances().persist(balance)?;
            let repo = K::consignments(tx);
            repo.save(&consignment, consignment.expected_version())?;
            repo.save_item(&item)?;
            info!(
                user = %ctx.user_id(),
                kind = %K::KIND,
                %id,
                item = %item.id,
                %key,
                %quantity,
                price = %item.unit_cost,
                cost = %item.total_cost,
                running_total = %consignment.running_total_cost(),
                "item withdrawn"
            );
            Ok(item)
        })
    }

    /// Edit exactly one of an item's quantity or total cost.
    pub fn update_item<K: ConsignmentStore>(
        &self,
        ctx: &OperationContext,
        id: K::Id,
        item_id: ItemId,
        update: ItemUpdate,
    ) -> EngineResult<ItemOutcome<K>> {
        self.run("update_item", |tx, policy| {
            let mut consignment = existing_consignment::<K>(tx, id)?;
            let found = K::consignments(tx).find_item(id, item_id)?;
            let item = not_found(found, || {
                DomainError::item_not_found(format!("item {item_id} is not on {} {id}", K::KIND))
            })?;
            let change = update.plan(&item, policy)?;

            let key = BalanceKey::<Warehouse>::new(item.warehouse_id, item.product_id);
            let mut balance = match change {
                ItemChange::Reprice { .. } => existing(tx, &key)?,
                _ => tx.warehouse_balances().find_or_open(&key)?,
            };

            let outcome = apply_change(change, item, &mut balance, &mut consignment, ctx, policy)?;

            tx.warehouse_balances().persist(balance)?;
            let repo = K::consignments(tx);
            repo.save(&consignment, consignment.expected_version())?;
            match &outcome.item {
                Some(item) => repo.save_item(item)?,
                None => repo.delete_item(item_id)?,
            }

            clamped::<K>(id, outcome.absorbed);
            info!(
                user = %ctx.user_id(),
                kind = %K::KIND,
                %id,
                item = %item_id,
                quantity = %outcome.warehouse_quantity,
                cost = %outcome.warehouse_cost,
                removed = outcome.item.is_none(),
                "item updated"
            );
            Ok(outcome)
        })
    }

    /// Return every item to its warehouse and delete the consignment.
    /// Returns the total cost handed back.
    pub fn delete_consignment<K: ConsignmentStore>(
        &self,
        ctx: &OperationContext,
        id: K::Id,
    ) -> EngineResult<Money> {
        self.run("delete_consignment", |tx, policy| {
            let mut consignment = existing_consignment::<K>(tx, id)?;
            let items = K::consignments(tx).list_items(id)?;

            let mut returned = Money::ZERO;
            let mut absorbed = Money::ZERO;
            for item in &items {
                let key = BalanceKey::<Warehouse>::new(item.warehouse_id, item.product_id);
                let mut balance = tx.warehouse_balances().find_or_open(&key)?;
                let (_, cost, floor) = return_item(item, &mut balance, &mut consignment, policy)?;
                tx.warehouse_balances().persist(balance)?;
                returned = returned.checked_add(cost)?;
                absorbed = absorbed.checked_add(floor)?;
            }

            K::consignments(tx).delete(id, consignment.expected_version())?;

            clamped::<K>(id, absorbed);
            info!(
                user = %ctx.user_id(),
                kind = %K::KIND,
                %id,
                items = items.len(),
                %returned,
                "consignment deleted"
            );
            Ok(returned)
        })
    }
}

fn existing_consignment<K: ConsignmentStore>(
    tx: &mut dyn LedgerTx,
    id: K::Id,
) -> EngineResult<Consignment<K>> {
    let found = K::consignments(tx).find(id)?;
    not_found(found, || DomainError::consignment_not_found(missing(K::KIND.as_str(), id)))
}

/// The consignment's books disagreed with its items and the zero floor
/// swallowed the difference.
fn clamped<K: ConsignmentStore>(id: K::Id, absorbed: Money) {
    if absorbed.is_positive() {
        warn!(
            kind = %K::KIND,
            %id,
            %absorbed,
            "running total floored at zero; needs reconciliation"
        );
    }
}
