use serde::{Deserialize, Serialize};

use supplyledger_core::{DomainError, DomainResult, ReasonId};

/// Which movements a withdrawal reason may be attached to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonPurpose {
    /// Plain withdrawals only.
    Removing,
    /// Plain withdrawals and product-to-product transfers.
    Both,
}

impl ReasonPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonPurpose::Removing => "REMOVING",
            ReasonPurpose::Both => "BOTH",
        }
    }
}

impl core::str::FromStr for ReasonPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REMOVING" => Ok(ReasonPurpose::Removing),
            "BOTH" => Ok(ReasonPurpose::Both),
            other => Err(format!("unknown reason purpose '{other}'")),
        }
    }
}

/// Operator-maintained reason attached to a movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalReason {
    pub id: ReasonId,
    pub name: String,
    pub purpose: ReasonPurpose,
}

impl WithdrawalReason {
    pub fn new(id: ReasonId, name: impl Into<String>, purpose: ReasonPurpose) -> Self {
        Self {
            id,
            name: name.into(),
            purpose,
        }
    }

    pub fn allows_transfers(&self) -> bool {
        self.purpose == ReasonPurpose::Both
    }

    pub fn ensure_transferable(&self) -> DomainResult<()> {
        if self.allows_transfers() {
            Ok(())
        } else {
            Err(DomainError::invalid_reason_purpose(format!(
                "reason '{}' ({}) cannot be used for transfers",
                self.name, self.id
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use supplyledger_core::ErrorCode;

    #[test]
    fn only_both_purpose_is_transferable() {
        let both = WithdrawalReason::new(ReasonId::new(), "regrade", ReasonPurpose::Both);
        assert!(both.ensure_transferable().is_ok());

        let removing = WithdrawalReason::new(ReasonId::new(), "spoilage", ReasonPurpose::Removing);
        let err = removing.ensure_transferable().unwrap_err();
        assert!(err.is(ErrorCode::InvalidReasonPurpose));
    }
}
