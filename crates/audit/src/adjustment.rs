//! Audited manual overwrites of a warehouse balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use supplyledger_core::{
    DomainError, DomainResult, Money, OperationContext, ProductId, Quantity, RecordId,
    RoundingPolicy, UnitPrice, UserId, WarehouseId,
};
use supplyledger_ledger::WarehouseBalance;

use crate::record::AuditRecord;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentType {
    Quantity,
    TotalCost,
    Both,
}

impl AdjustmentType {
    pub fn as_str(self) -> &'static str {
        match self {
            AdjustmentType::Quantity => "QUANTITY",
            AdjustmentType::TotalCost => "TOTAL_COST",
            AdjustmentType::Both => "BOTH",
        }
    }
}

impl core::str::FromStr for AdjustmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUANTITY" => Ok(AdjustmentType::Quantity),
            "TOTAL_COST" => Ok(AdjustmentType::TotalCost),
            "BOTH" => Ok(AdjustmentType::Both),
            other => Err(format!("unknown adjustment type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseBalanceAdjustment {
    pub id: RecordId,
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub previous_quantity: Quantity,
    pub new_quantity: Quantity,
    pub previous_total_cost: Money,
    pub new_total_cost: Money,
    pub previous_average: UnitPrice,
    pub new_average: UnitPrice,
    pub adjustment_type: AdjustmentType,
    pub description: Option<String>,
    pub user_id: UserId,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord for WarehouseBalanceAdjustment {
    fn record_type(&self) -> &'static str {
        "audit.balance_adjustment"
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

/// Request: overwrite a warehouse balance's quantity and/or total cost.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceOverwrite {
    pub quantity: Option<Quantity>,
    pub total_cost: Option<Money>,
    pub description: Option<String>,
}

impl BalanceOverwrite {
    /// Apply the overwrite and return the audit entry describing it.
    ///
    /// A quantity-only change keeps the old average price, so the total cost
    /// becomes `old_average * new_quantity`.
    pub fn apply(
        &self,
        balance: &mut WarehouseBalance,
        id: RecordId,
        ctx: &OperationContext,
        policy: RoundingPolicy,
    ) -> DomainResult<WarehouseBalanceAdjustment> {
        if let Some(cost) = self.total_cost {
            if cost.is_negative() {
                return Err(DomainError::invalid_total_cost(format!(
                    "total cost cannot be negative (got {cost})"
                )));
            }
        }

        let quantity_changed = self.quantity.filter(|q| *q != balance.quantity());
        let cost_changed = self.total_cost.filter(|c| *c != balance.total_cost());
        let adjustment_type = match (quantity_changed, cost_changed) {
            (None, None) => return Err(DomainError::no_changes()),
            (Some(_), None) => AdjustmentType::Quantity,
            (None, Some(_)) => AdjustmentType::TotalCost,
            (Some(_), Some(_)) => AdjustmentType::Both,
        };

        let previous_quantity = balance.quantity();
        let previous_total_cost = balance.total_cost();
        let previous_average = balance.average_unit_cost();

        let new_quantity = quantity_changed.unwrap_or(previous_quantity);
        let new_total_cost = match (self.total_cost, quantity_changed) {
            (Some(cost), _) => cost,
            (None, Some(q)) if q.is_zero() => Money::ZERO,
            (None, Some(q)) => previous_average.extend(q, policy)?,
            (None, None) => previous_total_cost,
        };

        balance.overwrite(new_quantity, new_total_cost, policy)?;

        Ok(WarehouseBalanceAdjustment {
            id,
            warehouse_id: balance.owner_id(),
            product_id: balance.product_id(),
            previous_quantity,
            new_quantity: balance.quantity(),
            previous_total_cost,
            new_total_cost: balance.total_cost(),
            previous_average,
            new_average: balance.average_unit_cost(),
            adjustment_type,
            description: self.description.clone(),
            user_id: ctx.user_id(),
            recorded_at: ctx.occurred_at(),
        })
    }
}

/// Selection over adjustment records; unset fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentFilter {
    pub warehouse_id: Option<WarehouseId>,
    pub product_id: Option<ProductId>,
}

impl AdjustmentFilter {
    pub fn matches(&self, record: &WarehouseBalanceAdjustment) -> bool {
        self.warehouse_id.is_none_or(|w| w == record.warehouse_id)
            && self.product_id.is_none_or(|p| p == record.product_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use supplyledger_core::ErrorCode;

    const POLICY: RoundingPolicy = RoundingPolicy::HalfUp;

    fn stocked(quantity: Decimal, cost: Decimal) -> WarehouseBalance {
        let mut balance = WarehouseBalance::open(WarehouseId::new(), ProductId::new());
        balance
            .add(Quantity::new(quantity).unwrap(), Money::new(cost).unwrap(), POLICY)
            .unwrap();
        balance
    }

    fn ctx() -> OperationContext {
        OperationContext::now(UserId::new())
    }

    #[test]
    fn quantity_only_keeps_the_average() {
        let mut balance = stocked(dec!(10), dec!(25));
        let overwrite = BalanceOverwrite {
            quantity: Some(Quantity::new(dec!(4)).unwrap()),
            ..Default::default()
        };
        let record = overwrite.apply(&mut balance, RecordId::new(), &ctx(), POLICY).unwrap();

        assert_eq!(record.adjustment_type, AdjustmentType::Quantity);
        assert_eq!(record.previous_total_cost.value(), dec!(25));
        assert_eq!(record.new_total_cost.value(), dec!(10));
        assert_eq!(record.new_average.value(), dec!(2.5));
        assert_eq!(balance.quantity().value(), dec!(4));
    }

    #[test]
    fn cost_only_leaves_quantity() {
        let mut balance = stocked(dec!(10), dec!(25));
        let overwrite = BalanceOverwrite {
            total_cost: Some(Money::new(dec!(30)).unwrap()),
            description: Some("recount".to_string()),
            ..Default::default()
        };
        let record = overwrite.apply(&mut balance, RecordId::new(), &ctx(), POLICY).unwrap();

        assert_eq!(record.adjustment_type, AdjustmentType::TotalCost);
        assert_eq!(balance.quantity().value(), dec!(10));
        assert_eq!(balance.average_unit_cost().value(), dec!(3));
        assert_eq!(record.description.as_deref(), Some("recount"));
    }

    #[test]
    fn unchanged_values_are_no_changes() {
        let mut balance = stocked(dec!(10), dec!(25));
        let before = balance.clone();
        let overwrite = BalanceOverwrite {
            quantity: Some(balance.quantity()),
            total_cost: Some(balance.total_cost()),
            description: None,
        };
        let err = overwrite.apply(&mut balance, RecordId::new(), &ctx(), POLICY).unwrap_err();
        assert!(err.is(ErrorCode::NoChanges));
        assert_eq!(balance, before);

        let err = BalanceOverwrite::default()
            .apply(&mut balance, RecordId::new(), &ctx(), POLICY)
            .unwrap_err();
        assert!(err.is(ErrorCode::NoChanges));
    }

    #[test]
    fn zero_quantity_with_cost_is_rejected() {
        let mut balance = stocked(dec!(10), dec!(25));
        let overwrite = BalanceOverwrite {
            quantity: Some(Quantity::ZERO),
            total_cost: Some(Money::new(dec!(5)).unwrap()),
            description: None,
        };
        let err = overwrite.apply(&mut balance, RecordId::new(), &ctx(), POLICY).unwrap_err();
        assert!(err.is(ErrorCode::InvalidTotalCost));
        assert_eq!(balance.quantity().value(), dec!(10));
    }

    #[test]
    fn zero_quantity_alone_empties_the_balance() {
        let mut balance = stocked(dec!(10), dec!(25));
        let overwrite = BalanceOverwrite {
            quantity: Some(Quantity::ZERO),
            ..Default::default()
        };
        let record = overwrite.apply(&mut balance, RecordId::new(), &ctx(), POLICY).unwrap();
        assert!(balance.is_depleted());
        assert!(record.new_total_cost.is_zero());
        assert!(record.new_average.is_zero());
    }
}
