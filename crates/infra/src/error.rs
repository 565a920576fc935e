//! Engine-level error: what callers of the services see.

use serde::Serialize;
use thiserror::Error;

use supplyledger_core::{DomainError, ErrorCategory, ErrorCode};

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Deterministic business rule failure.
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// Persistence failed (stale version, backend fault).
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Domain(e) => e.code(),
            EngineError::Store(StoreError::Conflict(_)) => ErrorCode::Conflict,
            EngineError::Store(_) => ErrorCode::StorageFailure,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.code().category()
    }

    /// Whether re-running the operation may succeed (stale version).
    pub fn is_retryable(&self) -> bool {
        self.code() == ErrorCode::Conflict
    }

    /// Operator-facing `(code, message)` pair.
    pub fn body(&self) -> ErrorBody {
        let message = match self {
            EngineError::Domain(e) => e.message().to_string(),
            EngineError::Store(e) => e.to_string(),
        };
        ErrorBody {
            code: self.code(),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorBody {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "code": self.code, "message": self.message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflicts_surface_as_conflict() {
        let err = EngineError::from(StoreError::Conflict("balance moved".into()));
        assert_eq!(err.code(), ErrorCode::Conflict);
        assert!(err.is_retryable());

        let err = EngineError::from(StoreError::Backend("connection reset".into()));
        assert_eq!(err.code(), ErrorCode::StorageFailure);
        assert_eq!(err.category(), ErrorCategory::Failure);
    }

    #[test]
    fn body_serializes_code_and_message() {
        let err = EngineError::from(DomainError::insufficient_product("need 5, have 2"));
        let json = err.body().to_json();
        assert_eq!(json["code"], "INSUFFICIENT_PRODUCT");
        assert_eq!(json["message"], "need 5, have 2");
    }
}
