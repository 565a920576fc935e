//! Consignment kinds: what goods are withdrawn onto.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use supplyledger_core::{ShipmentId, VehicleId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsignmentOwner {
    Vehicle,
    Shipment,
}

impl ConsignmentOwner {
    pub fn as_str(self) -> &'static str {
        match self {
            ConsignmentOwner::Vehicle => "vehicle",
            ConsignmentOwner::Shipment => "shipment",
        }
    }
}

impl core::fmt::Display for ConsignmentOwner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-level consignment kind. Vehicles and shipments share one withdrawal
/// engine; only the identifier differs.
pub trait ConsignmentKind:
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

    const KIND: ConsignmentOwner;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Vehicle;

impl ConsignmentKind for Vehicle {
    type Id = VehicleId;
    const KIND: ConsignmentOwner = ConsignmentOwner::Vehicle;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shipment;

impl ConsignmentKind for Shipment {
    type Id = ShipmentId;
    const KIND: ConsignmentOwner = ConsignmentOwner::Shipment;
}
