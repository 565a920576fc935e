//! Product-to-product transfers inside one warehouse.

use tracing::info;

use supplyledger_core::{
    DomainError, Money, OperationContext, ProductId, ReasonId, RoundingPolicy, TransferId,
    WarehouseId,
};
use supplyledger_ledger::{BalanceKey, Warehouse, WarehouseBalance};
use supplyledger_transfers::{
    ProductTransfer, QuantityChange, TransferRequest, TransferUpdate, WithdrawalReason, execute,
    replay, reverse,
};

use super::{LedgerEngine, missing, not_found};
use crate::error::EngineResult;
use crate::store::{LedgerStore, LedgerTx};

impl<S: LedgerStore> LedgerEngine<S> {
    /// Add or replace an entry of the reason catalogue.
    pub fn register_reason(&self, reason: WithdrawalReason) -> EngineResult<()> {
        self.run("register_reason", |tx, _| {
            tx.reasons().save(&reason)?;
            info!(reason = %reason.id, purpose = reason.purpose.as_str(), "reason registered");
            Ok(())
        })
    }

    /// Move quantity and cost from one product to another at the source's
    /// average price.
    pub fn transfer(
        &self,
        ctx: &OperationContext,
        request: TransferRequest,
    ) -> EngineResult<ProductTransfer> {
        self.run("transfer", |tx, policy| {
            request.validate()?;
            transferable_reason(tx, request.reason_id)?;

            let (mut from, mut to) =
                load_pair(tx, request.warehouse_id, request.from_product, request.to_product)?;
            let removal = execute(&mut from, &mut to, request.quantity, policy)?;
            persist_pair(tx, from, to)?;

            let record = request.into_record(TransferId::new(), removal.unit_price, removal.cost, ctx);
            tx.transfers().save(&record)?;
            info!(
                user = %ctx.user_id(),
                transfer = %record.id,
                warehouse = %record.warehouse_id,
                from = %record.from_product,
                to = %record.to_product,
                quantity = %record.quantity,
                price = %record.unit_price,
                cost = %record.total_cost,
                "transfer recorded"
            );
            Ok(record)
        })
    }

    /// Edit a recorded transfer.
    ///
    /// Quantity deltas are replayed at the transfer's original unit price.
    /// Setting the quantity to zero reverses the transfer and deletes it, in
    /// which case `None` is returned.
    pub fn update_transfer(
        &self,
        ctx: &OperationContext,
        id: TransferId,
        update: TransferUpdate,
    ) -> EngineResult<Option<ProductTransfer>> {
        self.run("update_transfer", |tx, policy| {
            let mut transfer = existing_transfer(tx, id)?;
            let plan = update.plan(&transfer)?;
            if let Some(reason_id) = plan.reason_id {
                transferable_reason(tx, reason_id)?;
            }

            match plan.quantity {
                QuantityChange::Reverse => {
                    let returned = undo(tx, &transfer, policy)?;
                    info!(user = %ctx.user_id(), transfer = %id, %returned, "transfer reversed");
                    return Ok(None);
                }
                QuantityChange::Unchanged => {}
                change => {
                    let (mut from, mut to) =
                        load_pair(tx, transfer.warehouse_id, transfer.from_product, transfer.to_product)?;
                    let movement = replay(change, &mut transfer, &mut from, &mut to, policy)?;
                    persist_pair(tx, from, to)?;
                    info!(
                        user = %ctx.user_id(),
                        transfer = %id,
                        quantity = %movement.quantity,
                        cost = %movement.cost,
                        "transfer quantity replayed"
                    );
                }
            }

            if let Some(reason_id) = plan.reason_id {
                transfer.reason_id = reason_id;
            }
            if let Some(description) = plan.description {
                transfer.description = Some(description);
            }
            transfer.updated_at = ctx.occurred_at();
            tx.transfers().save(&transfer)?;
            Ok(Some(transfer))
        })
    }

    /// Reverse a transfer in full and delete its record. Returns the cost
    /// moved back to the source product.
    pub fn delete_transfer(&self, ctx: &OperationContext, id: TransferId) -> EngineResult<Money> {
        self.run("delete_transfer", |tx, policy| {
            let transfer = existing_transfer(tx, id)?;
            let returned = undo(tx, &transfer, policy)?;
            info!(user = %ctx.user_id(), transfer = %id, %returned, "transfer deleted");
            Ok(returned)
        })
    }
}

fn existing_transfer(tx: &mut dyn LedgerTx, id: TransferId) -> EngineResult<ProductTransfer> {
    let found = tx.transfers().find(id)?;
    not_found(found, || DomainError::transfer_not_found(missing("transfer", id)))
}

fn transferable_reason(tx: &mut dyn LedgerTx, id: ReasonId) -> EngineResult<WithdrawalReason> {
    let found = tx.reasons().find(id)?;
    let reason = not_found(found, || DomainError::reason_not_found(missing("reason", id)))?;
    reason.ensure_transferable()?;
    Ok(reason)
}

fn load_pair(
    tx: &mut dyn LedgerTx,
    warehouse_id: WarehouseId,
    from: ProductId,
    to: ProductId,
) -> EngineResult<(WarehouseBalance, WarehouseBalance)> {
    let repo = tx.warehouse_balances();
    let from = repo.find_or_open(&BalanceKey::<Warehouse>::new(warehouse_id, from))?;
    let to = repo.find_or_open(&BalanceKey::<Warehouse>::new(warehouse_id, to))?;
    Ok((from, to))
}

fn persist_pair(
    tx: &mut dyn LedgerTx,
    from: WarehouseBalance,
    to: WarehouseBalance,
) -> EngineResult<()> {
    let repo = tx.warehouse_balances();
    repo.persist(from)?;
    repo.persist(to)?;
    Ok(())
}

fn undo(
    tx: &mut dyn LedgerTx,
    transfer: &ProductTransfer,
    policy: RoundingPolicy,
) -> EngineResult<Money> {
    let (mut from, mut to) =
        load_pair(tx, transfer.warehouse_id, transfer.from_product, transfer.to_product)?;
    let returned = reverse(transfer, &mut from, &mut to, policy)?;
    persist_pair(tx, from, to)?;
    tx.transfers().delete(transfer.id)?;
    Ok(returned)
}
