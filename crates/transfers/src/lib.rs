//! Product-to-product transfers within one warehouse.

pub mod engine;
pub mod reason;
pub mod transfer;

pub use engine::{TransferMovement, execute, replay, reverse};
pub use reason::{ReasonPurpose, WithdrawalReason};
pub use transfer::{ProductTransfer, QuantityChange, TransferPlan, TransferRequest, TransferUpdate};
