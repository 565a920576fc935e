//! `supplyledger-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the error taxonomy, versioning, the numeric value objects and
//! the rounding policy shared by every ledger crate.

pub mod aggregate;
pub mod context;
pub mod entity;
pub mod error;
pub mod id;
pub mod rounding;
pub mod value_object;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use context::{CurrentUser, OperationContext};
pub use entity::Entity;
pub use error::{DomainError, DomainResult, ErrorCategory, ErrorCode};
pub use id::{
    DriverId, ItemId, ProductId, ReasonId, RecordId, ShipmentId, TransferId, UserId, VehicleId,
    WarehouseId,
};
pub use rounding::RoundingPolicy;
pub use value_object::{
    Money, Quantity, UnitPrice, ValueObject, MONEY_SCALE, QUANTITY_SCALE, REPORT_SCALE,
};
