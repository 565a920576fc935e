use supplyledger_core::{AggregateRoot, DomainResult, Money};

use crate::kind::ConsignmentKind;

/// Aggregate root: a vehicle or shipment and the running cost of the goods
/// withdrawn onto it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consignment<K: ConsignmentKind> {
    id: K::Id,
    running_total_cost: Money,
    version: u64,
}

impl<K: ConsignmentKind> Consignment<K> {
    pub fn open(id: K::Id) -> Self {
        Self {
            id,
            running_total_cost: Money::ZERO,
            version: 0,
        }
    }

    pub fn restore(id: K::Id, running_total_cost: Money, version: u64) -> Self {
        Self {
            id,
            running_total_cost: running_total_cost.max(Money::ZERO),
            version,
        }
    }

    pub fn running_total_cost(&self) -> Money {
        self.running_total_cost
    }

    pub fn is_persisted(&self) -> bool {
        self.version > 0
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn charge(&mut self, amount: Money) -> DomainResult<Money> {
        self.apply_delta(amount)
    }

    pub fn credit(&mut self, amount: Money) -> DomainResult<Money> {
        self.apply_delta(-amount)
    }

    /// Apply a signed cost delta, flooring the running total at zero.
    ///
    /// Returns the amount the floor absorbed (zero when the books agree).
    pub fn apply_delta(&mut self, delta: Money) -> DomainResult<Money> {
        let next = self.running_total_cost.checked_add(delta)?;
        if next.is_negative() {
            self.running_total_cost = Money::ZERO;
            Ok(next.abs())
        } else {
            self.running_total_cost = next;
            Ok(Money::ZERO)
        }
    }
}

impl<K: ConsignmentKind> AggregateRoot for Consignment<K> {
    type Id = K::Id;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
