//! Receipt discrepancies between what a driver bought and what a warehouse
//! counted in.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use supplyledger_core::{
    DomainError, DomainResult, DriverId, Money, OperationContext, ProductId, Quantity, REPORT_SCALE, RecordId,
    RoundingPolicy, UnitPrice, UserId, WarehouseId,
};
use supplyledger_ledger::DriverBalance;

use crate::record::AuditRecord;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancyType {
    Gain,
    Loss,
}

impl DiscrepancyType {
    pub fn as_str(self) -> &'static str {
        match self {
            DiscrepancyType::Gain => "GAIN",
            DiscrepancyType::Loss => "LOSS",
        }
    }
}

impl core::str::FromStr for DiscrepancyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GAIN" => Ok(DiscrepancyType::Gain),
            "LOSS" => Ok(DiscrepancyType::Loss),
            other => Err(format!("unknown discrepancy type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseDiscrepancy {
    pub id: RecordId,
    pub driver_id: DriverId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub purchased_quantity: Quantity,
    pub received_quantity: Quantity,
    /// `received - purchased`; negative for a loss.
    pub discrepancy_quantity: Decimal,
    pub unit_price: UnitPrice,
    /// `discrepancy_quantity * unit_price`, two fractional digits.
    pub discrepancy_value: Money,
    pub discrepancy_type: DiscrepancyType,
    pub user_id: UserId,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord for WarehouseDiscrepancy {
    fn record_type(&self) -> &'static str {
        "audit.discrepancy"
    }

    fn record_id(&self) -> RecordId {
        self.id
    }

    fn recorded_by(&self) -> UserId {
        self.user_id
    }

    fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

/// A driver-to-warehouse receipt about to be booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptCheck {
    pub driver_id: DriverId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub purchased: Quantity,
    pub unit_price: UnitPrice,
    pub received: Quantity,
}

impl ReceiptCheck {
    pub fn new(driver: &DriverBalance, warehouse_id: WarehouseId, received: Quantity) -> Self {
        Self {
            driver_id: driver.owner_id(),
            product_id: driver.product_id(),
            warehouse_id,
            purchased: driver.quantity(),
            unit_price: driver.average_unit_cost(),
            received,
        }
    }

    /// Compare purchased and received quantities; `None` when they agree.
    ///
    /// The value is always rounded half-up to report scale, independent of the
    /// ledger's rounding policy.
    pub fn detect(
        &self,
        id: RecordId,
        ctx: &OperationContext,
    ) -> DomainResult<Option<WarehouseDiscrepancy>> {
        let quantity = self.purchased.delta_to(self.received);
        if quantity.is_zero() {
            return Ok(None);
        }
        let raw = quantity.checked_mul(self.unit_price.value()).ok_or_else(|| {
            DomainError::invalid_total_cost(format!(
                "discrepancy of {quantity} at {} is out of range",
                self.unit_price
            ))
        })?;
        let value = RoundingPolicy::HalfUp.round(raw, REPORT_SCALE);
        let discrepancy_type = if quantity.is_sign_positive() {
            DiscrepancyType::Gain
        } else {
            DiscrepancyType::Loss
        };

        Ok(Some(WarehouseDiscrepancy {
            id,
            driver_id: self.driver_id,
            product_id: self.product_id,
            warehouse_id: self.warehouse_id,
            purchased_quantity: self.purchased,
            received_quantity: self.received,
            discrepancy_quantity: quantity,
            unit_price: self.unit_price,
            discrepancy_value: Money::rounded(value, RoundingPolicy::HalfUp),
            discrepancy_type,
            user_id: ctx.user_id(),
            recorded_at: ctx.occurred_at(),
        }))
    }
}

/// Selection over discrepancy records; unset fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscrepancyFilter {
    pub warehouse_id: Option<WarehouseId>,
    pub driver_id: Option<DriverId>,
    pub product_id: Option<ProductId>,
    pub discrepancy_type: Option<DiscrepancyType>,
    pub recorded_from: Option<DateTime<Utc>>,
    pub recorded_to: Option<DateTime<Utc>>,
}

impl DiscrepancyFilter {
    pub fn matches(&self, record: &WarehouseDiscrepancy) -> bool {
        self.warehouse_id.is_none_or(|w| w == record.warehouse_id)
            && self.driver_id.is_none_or(|d| d == record.driver_id)
            && self.product_id.is_none_or(|p| p == record.product_id)
            && self.discrepancy_type.is_none_or(|t| t == record.discrepancy_type)
            && self.recorded_from.is_none_or(|from| record.recorded_at >= from)
            && self.recorded_to.is_none_or(|to| record.recorded_at <= to)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscrepancyStatistics {
    pub gain_count: usize,
    pub loss_count: usize,
    /// Sum of gain values.
    pub total_gain_value: Money,
    /// Sum of absolute loss values.
    pub total_loss_value: Money,
    /// `total_gain_value - total_loss_value`.
    pub net_value: Money,
}

impl DiscrepancyStatistics {
    pub fn from_records<'a, I>(records: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = &'a WarehouseDiscrepancy>,
    {
        let mut stats = Self::default();
        for record in records {
            match record.discrepancy_type {
                DiscrepancyType::Gain => {
                    stats.gain_count += 1;
                    stats.total_gain_value = stats.total_gain_value.checked_add(record.discrepancy_value)?;
                }
                DiscrepancyType::Loss => {
                    stats.loss_count += 1;
                    stats.total_loss_value =
                        stats.total_loss_value.checked_add(record.discrepancy_value.abs())?;
                }
            }
        }
        stats.net_value = stats.total_gain_value.checked_sub(stats.total_loss_value)?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn driver_with(quantity: Decimal, cost: Decimal) -> DriverBalance {
        let mut balance = DriverBalance::open(DriverId::new(), ProductId::new());
        balance
            .add(
                Quantity::new(quantity).unwrap(),
                Money::new(cost).unwrap(),
                RoundingPolicy::HalfUp,
            )
            .unwrap();
        balance
    }

    fn ctx() -> OperationContext {
        OperationContext::now(UserId::new())
    }

    #[test]
    fn short_receipt_is_a_loss() {
        let driver = driver_with(dec!(19), dec!(400));
        assert_eq!(driver.average_unit_cost().value(), dec!(21.052632));

        let check = ReceiptCheck::new(&driver, WarehouseId::new(), Quantity::new(dec!(17)).unwrap());
        let record = check.detect(RecordId::new(), &ctx()).unwrap().unwrap();

        assert_eq!(record.discrepancy_quantity, dec!(-2));
        assert_eq!(record.discrepancy_value.value(), dec!(-42.11));
        assert_eq!(record.discrepancy_type, DiscrepancyType::Loss);
    }

    #[test]
    fn matching_receipt_records_nothing() {
        let driver = driver_with(dec!(5), dec!(12));
        let check = ReceiptCheck::new(&driver, WarehouseId::new(), driver.quantity());
        assert!(check.detect(RecordId::new(), &ctx()).unwrap().is_none());
    }

    #[test]
    fn statistics_split_gains_and_losses() {
        let driver = driver_with(dec!(10), dec!(100));
        let warehouse = WarehouseId::new();
        let loss = ReceiptCheck::new(&driver, warehouse, Quantity::new(dec!(7)).unwrap())
            .detect(RecordId::new(), &ctx())
            .unwrap()
            .unwrap();
        let gain = ReceiptCheck::new(&driver, warehouse, Quantity::new(dec!(11)).unwrap())
            .detect(RecordId::new(), &ctx())
            .unwrap()
            .unwrap();

        let stats = DiscrepancyStatistics::from_records([&loss, &gain]).unwrap();
        assert_eq!(stats.loss_count, 1);
        assert_eq!(stats.gain_count, 1);
        assert_eq!(stats.total_loss_value.value(), dec!(30));
        assert_eq!(stats.total_gain_value.value(), dec!(10));
        assert_eq!(stats.net_value.value(), dec!(-20));

        let only_gains = DiscrepancyFilter {
            discrepancy_type: Some(DiscrepancyType::Gain),
            ..Default::default()
        };
        assert!(only_gains.matches(&gain));
        assert!(!only_gains.matches(&loss));
    }

    #[test]
    fn type_serializes_upper_case() {
        let json = serde_json::to_string(&DiscrepancyType::Loss).unwrap();
        assert_eq!(json, "\"LOSS\"");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: GAIN iff received > purchased, LOSS iff received < purchased,
        /// no record iff equal.
        #[test]
        fn discrepancy_sign_follows_quantities(
            purchased in 1i64..1_000_000i64,
            received in 0i64..1_000_000i64,
            cost in 0i64..1_000_000_000i64,
        ) {
            let driver = driver_with(Decimal::new(purchased, 2), Decimal::new(cost, 6));
            let received = Quantity::new(Decimal::new(received, 2)).unwrap();
            let record = ReceiptCheck::new(&driver, WarehouseId::new(), received)
                .detect(RecordId::new(), &ctx())
                .unwrap();

            match received.cmp(&driver.quantity()) {
                core::cmp::Ordering::Equal => prop_assert!(record.is_none()),
                core::cmp::Ordering::Greater => {
                    prop_assert_eq!(record.map(|r| r.discrepancy_type), Some(DiscrepancyType::Gain));
                }
                core::cmp::Ordering::Less => {
                    prop_assert_eq!(record.map(|r| r.discrepancy_type), Some(DiscrepancyType::Loss));
                }
            }
        }
    }
}
