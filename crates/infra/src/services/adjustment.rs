//! Audited manual balance adjustments.

use tracing::info;

use supplyledger_audit::{BalanceOverwrite, WarehouseBalanceAdjustment};
use supplyledger_core::{OperationContext, ProductId, RecordId, WarehouseId};
use supplyledger_ledger::{BalanceKey, Warehouse};

use super::LedgerEngine;
use super::movement::existing;
use crate::error::EngineResult;
use crate::store::LedgerStore;

impl<S: LedgerStore> LedgerEngine<S> {
    /// Overwrite a warehouse balance and record what changed.
    pub fn update_balance(
        &self,
        ctx: &OperationContext,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        overwrite: BalanceOverwrite,
    ) -> EngineResult<WarehouseBalanceAdjustment> {
        self.run("update_balance", |tx, policy| {
            let key = BalanceKey::<Warehouse>::new(warehouse_id, product_id);
            let mut balance = existing(tx, &key)?;
            let record = overwrite.apply(&mut balance, RecordId::new(), ctx, policy)?;

            tx.warehouse_balances().persist(balance)?;
            tx.audit().append_adjustment(&record)?;
            info!(
                user = %ctx.user_id(),
                %key,
                kind = record.adjustment_type.as_str(),
                previous_quantity = %record.previous_quantity,
                new_quantity = %record.new_quantity,
                previous_total_cost = %record.previous_total_cost,
                new_total_cost = %record.new_total_cost,
                "balance adjusted"
            );
            Ok(record)
        })
    }
}
