//! Balance owner kinds.
//!
//! A [`crate::ProductBalance`] is generic over who holds the goods. Warehouses
//! and drivers keep identical books; only the identifier type differs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use supplyledger_core::{DriverId, WarehouseId};

/// Runtime tag of an owner kind (storage discriminator, logging).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceOwner {
    Warehouse,
    Driver,
}

impl BalanceOwner {
    pub fn as_str(self) -> &'static str {
        match self {
            BalanceOwner::Warehouse => "warehouse",
            BalanceOwner::Driver => "driver",
        }
    }
}

impl core::fmt::Display for BalanceOwner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-level owner kind.
pub trait OwnerKind:
    Copy + Eq + core::hash::Hash + core::fmt::Debug + Default + Send + Sync + 'static
{
    type Id: Copy
        + Eq
        + core::hash::Hash
        + core::fmt::Debug
        + core::fmt::Display
        + Send
        + Sync
        + From<Uuid>
        + Into<Uuid>
        + 'static;

    const KIND: BalanceOwner;
}

/// Goods held in a warehouse.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Warehouse;

impl OwnerKind for Warehouse {
    type Id = WarehouseId;
    const KIND: BalanceOwner = BalanceOwner::Warehouse;
}

/// Goods bought by a driver and not yet received into a warehouse.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Driver;

impl OwnerKind for Driver {
    type Id = DriverId;
    const KIND: BalanceOwner = BalanceOwner::Driver;
}
