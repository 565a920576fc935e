//! Read-only queries.

use supplyledger_audit::{
    AdjustmentFilter, DiscrepancyFilter, DiscrepancyStatistics, WarehouseBalanceAdjustment,
    WarehouseDiscrepancy,
};
use supplyledger_core::{ProductId, TransferId, WarehouseId};
use supplyledger_ledger::{BalanceKey, ProductBalance, ValuationSummary};
use supplyledger_transfers::ProductTransfer;
use supplyledger_withdrawals::{Consignment, ConsignmentItem};

use super::LedgerEngine;
use crate::error::EngineResult;
use crate::store::{BalanceOwnerStore, ConsignmentStore, LedgerStore};

impl<S: LedgerStore> LedgerEngine<S> {
    pub fn balance<K: BalanceOwnerStore>(
        &self,
        owner_id: K::Id,
        product_id: ProductId,
    ) -> EngineResult<Option<ProductBalance<K>>> {
        self.read(|tx| Ok(K::balances(tx).find(&BalanceKey::new(owner_id, product_id))?))
    }

    pub fn balances_by_owner<K: BalanceOwnerStore>(
        &self,
        owner_id: K::Id,
    ) -> EngineResult<Vec<ProductBalance<K>>> {
        self.read(|tx| Ok(K::balances(tx).list_by_owner(owner_id)?))
    }

    pub fn balances_by_product<K: BalanceOwnerStore>(
        &self,
        product_id: ProductId,
    ) -> EngineResult<Vec<ProductBalance<K>>> {
        self.read(|tx| Ok(K::balances(tx).list_by_product(product_id)?))
    }

    pub fn positive_balances<K: BalanceOwnerStore>(&self) -> EngineResult<Vec<ProductBalance<K>>> {
        self.read(|tx| Ok(K::balances(tx).list_positive()?))
    }

    /// Stock value held by one owner.
    pub fn valuation<K: BalanceOwnerStore>(&self, owner_id: K::Id) -> EngineResult<ValuationSummary> {
        let balances = self.balances_by_owner::<K>(owner_id)?;
        Ok(ValuationSummary::from_balances(&balances)?)
    }

    pub fn transfer_record(&self, id: TransferId) -> EngineResult<Option<ProductTransfer>> {
        self.read(|tx| Ok(tx.transfers().find(id)?))
    }

    pub fn transfers_by_warehouse(&self, warehouse_id: WarehouseId) -> EngineResult<Vec<ProductTransfer>> {
        self.read(|tx| Ok(tx.transfers().list_by_warehouse(warehouse_id)?))
    }

    pub fn consignment<K: ConsignmentStore>(&self, id: K::Id) -> EngineResult<Option<Consignment<K>>> {
        self.read(|tx| Ok(K::consignments(tx).find(id)?))
    }

    pub fn items<K: ConsignmentStore>(&self, id: K::Id) -> EngineResult<Vec<ConsignmentItem<K>>> {
        self.read(|tx| Ok(K::consignments(tx).list_items(id)?))
    }

    pub fn discrepancies(&self, filter: &DiscrepancyFilter) -> EngineResult<Vec<WarehouseDiscrepancy>> {
        self.read(|tx| Ok(tx.audit().list_discrepancies(filter)?))
    }

    /// Gain/loss totals over the records `filter` selects.
    pub fn discrepancy_statistics(&self, filter: &DiscrepancyFilter) -> EngineResult<DiscrepancyStatistics> {
        let records = self.discrepancies(filter)?;
        Ok(DiscrepancyStatistics::from_records(&records)?)
    }

    pub fn adjustments(&self, filter: &AdjustmentFilter) -> EngineResult<Vec<WarehouseBalanceAdjustment>> {
        self.read(|tx| Ok(tx.audit().list_adjustments(filter)?))
    }
}
