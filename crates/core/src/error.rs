//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Broad family an [`ErrorCode`] belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    NotFound,
    Validation,
    /// Quantity or value would not be conserved (shortfall on a source row).
    Conservation,
    Pricing,
    /// Stale optimistic-lock token.
    Conflict,
    /// Unexpected storage or lookup fault.
    Failure,
}

/// Stable, operator-facing error code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BalanceNotFound,
    TransferNotFound,
    ReasonNotFound,
    ItemNotFound,
    ConsignmentNotFound,
    UserNotFound,

    InvalidId,
    InvalidQuantity,
    InvalidTotalCost,
    InvalidUpdateRequest,
    NoChanges,
    InvalidReasonPurpose,
    SameProductTransfer,
    ConsignmentExists,

    InsufficientQuantity,
    InsufficientProduct,
    InsufficientProductTarget,

    UnitPriceMissing,

    Conflict,
    StorageFailure,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BalanceNotFound => "BALANCE_NOT_FOUND",
            ErrorCode::TransferNotFound => "TRANSFER_NOT_FOUND",
            ErrorCode::ReasonNotFound => "REASON_NOT_FOUND",
            ErrorCode::ItemNotFound => "ITEM_NOT_FOUND",
            ErrorCode::ConsignmentNotFound => "CONSIGNMENT_NOT_FOUND",
            ErrorCode::UserNotFound => "USER_NOT_FOUND",
            ErrorCode::InvalidId => "INVALID_ID",
            ErrorCode::InvalidQuantity => "INVALID_QUANTITY",
            ErrorCode::InvalidTotalCost => "INVALID_TOTAL_COST",
            ErrorCode::InvalidUpdateRequest => "INVALID_UPDATE_REQUEST",
            ErrorCode::NoChanges => "NO_CHANGES",
            ErrorCode::InvalidReasonPurpose => "INVALID_REASON_PURPOSE",
            ErrorCode::SameProductTransfer => "SAME_PRODUCT_TRANSFER",
            ErrorCode::ConsignmentExists => "CONSIGNMENT_EXISTS",
            ErrorCode::InsufficientQuantity => "INSUFFICIENT_QUANTITY",
            ErrorCode::InsufficientProduct => "INSUFFICIENT_PRODUCT",
            ErrorCode::InsufficientProductTarget => "INSUFFICIENT_PRODUCT_TARGET",
            ErrorCode::UnitPriceMissing => "UNIT_PRICE_MISSING",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::StorageFailure => "STORAGE_FAILURE",
        }
    }

    pub fn category(self) -> ErrorCategory {
        match self {
            ErrorCode::BalanceNotFound
            | ErrorCode::TransferNotFound
            | ErrorCode::ReasonNotFound
            | ErrorCode::ItemNotFound
            | ErrorCode::ConsignmentNotFound
            | ErrorCode::UserNotFound => ErrorCategory::NotFound,
            ErrorCode::InvalidId
            | ErrorCode::InvalidQuantity
            | ErrorCode::InvalidTotalCost
            | ErrorCode::InvalidUpdateRequest
            | ErrorCode::NoChanges
            | ErrorCode::InvalidReasonPurpose
            | ErrorCode::SameProductTransfer
            | ErrorCode::ConsignmentExists => ErrorCategory::Validation,
            ErrorCode::InsufficientQuantity
            | ErrorCode::InsufficientProduct
            | ErrorCode::InsufficientProductTarget => ErrorCategory::Conservation,
            ErrorCode::UnitPriceMissing => ErrorCategory::Pricing,
            ErrorCode::Conflict => ErrorCategory::Conflict,
            ErrorCode::StorageFailure => ErrorCategory::Failure,
        }
    }
}

impl core::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain-level error: a stable code plus a human-readable message.
///
/// Keep this focused on deterministic business failures (validation,
/// conservation, lookups). Storage faults are wrapped by the infrastructure
/// layer and only surface here as [`ErrorCode::StorageFailure`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct DomainError {
    code: ErrorCode,
    message: String,
}

impl DomainError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }

    pub fn balance_not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::BalanceNotFound, msg)
    }

    pub fn transfer_not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransferNotFound, msg)
    }

    pub fn reason_not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ReasonNotFound, msg)
    }

    pub fn item_not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ItemNotFound, msg)
    }

    pub fn consignment_not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConsignmentNotFound, msg)
    }

    pub fn user_not_found() -> Self {
        Self::new(ErrorCode::UserNotFound, "no current user")
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidId, msg)
    }

    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidQuantity, msg)
    }

    pub fn invalid_total_cost(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidTotalCost, msg)
    }

    pub fn invalid_update_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidUpdateRequest, msg)
    }

    pub fn no_changes() -> Self {
        Self::new(ErrorCode::NoChanges, "submitted values match the current state")
    }

    pub fn invalid_reason_purpose(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidReasonPurpose, msg)
    }

    pub fn same_product_transfer() -> Self {
        Self::new(
            ErrorCode::SameProductTransfer,
            "source and target product must differ",
        )
    }

    pub fn consignment_exists(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConsignmentExists, msg)
    }

    pub fn insufficient_quantity(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InsufficientQuantity, msg)
    }

    pub fn insufficient_product(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InsufficientProduct, msg)
    }

    pub fn insufficient_product_target(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InsufficientProductTarget, msg)
    }

    pub fn unit_price_missing(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnitPriceMissing, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, msg)
    }

    /// Re-label the error's code, keeping the message.
    ///
    /// Used where a generic ledger failure (e.g. `INSUFFICIENT_QUANTITY`) must
    /// surface under a call-site specific code (e.g. `INSUFFICIENT_PRODUCT`).
    pub fn recode(self, from: ErrorCode, to: ErrorCode) -> Self {
        if self.code == from {
            Self { code: to, ..self }
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_in_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::InsufficientProductTarget).unwrap();
        assert_eq!(json, "\"INSUFFICIENT_PRODUCT_TARGET\"");
        assert_eq!(
            ErrorCode::InsufficientProductTarget.as_str(),
            "INSUFFICIENT_PRODUCT_TARGET"
        );
    }

    #[test]
    fn display_carries_code_and_message() {
        let err = DomainError::insufficient_product("need 5, have 2");
        assert_eq!(err.to_string(), "INSUFFICIENT_PRODUCT: need 5, have 2");
        assert_eq!(err.category(), ErrorCategory::Conservation);
    }

    #[test]
    fn recode_only_touches_matching_code() {
        let err = DomainError::insufficient_quantity("short")
            .recode(ErrorCode::InsufficientQuantity, ErrorCode::InsufficientProduct);
        assert!(err.is(ErrorCode::InsufficientProduct));

        let untouched = DomainError::no_changes()
            .recode(ErrorCode::InsufficientQuantity, ErrorCode::InsufficientProduct);
        assert!(untouched.is(ErrorCode::NoChanges));
    }
}
