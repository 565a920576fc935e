//! Balance ledger & average-cost calculator.
//!
//! This crate contains the weighted-average valuation rules, implemented
//! purely as deterministic domain logic (no IO, no storage).

pub mod balance;
pub mod movement;
pub mod owner;
pub mod pricing;
pub mod valuation;

pub use balance::{BalanceKey, BalanceSnapshot, DriverBalance, ProductBalance, WarehouseBalance};
pub use movement::Removal;
pub use owner::{BalanceOwner, Driver, OwnerKind, Warehouse};
pub use pricing::{average_price, removal_cost};
pub use valuation::ValuationSummary;
