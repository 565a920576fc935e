//! Append-only audit trail: receipt discrepancies and manual balance
//! adjustments.

pub mod adjustment;
pub mod discrepancy;
pub mod record;

pub use adjustment::{AdjustmentFilter, AdjustmentType, BalanceOverwrite, WarehouseBalanceAdjustment};
pub use discrepancy::{
    DiscrepancyFilter, DiscrepancyStatistics, DiscrepancyType, ReceiptCheck, WarehouseDiscrepancy,
};
pub use record::AuditRecord;
