//! Withdrawals from warehouses onto vehicles and shipments.
//!
//! Both consignment kinds share one engine, parameterized by
//! [`ConsignmentKind`].

pub mod consignment;
pub mod engine;
pub mod item;
pub mod kind;
pub mod update;

pub use consignment::Consignment;
pub use engine::{ItemOutcome, apply_change, return_item, withdraw};
pub use item::ConsignmentItem;
pub use kind::{ConsignmentKind, ConsignmentOwner, Shipment, Vehicle};
pub use update::{ItemChange, ItemUpdate};
