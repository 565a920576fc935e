//! Explicit operation context (acting user + business time).

use chrono::{DateTime, Utc};

use crate::error::{DomainError, DomainResult};
use crate::id::UserId;

/// Source of the currently authenticated user.
///
/// Implemented by whatever sits in front of the engine (session, token
/// claims, CLI flag). The engine never reads ambient global state.
pub trait CurrentUser {
    fn current_user_id(&self) -> Option<UserId>;
}

impl CurrentUser for Option<UserId> {
    fn current_user_id(&self) -> Option<UserId> {
        *self
    }
}

impl CurrentUser for UserId {
    fn current_user_id(&self) -> Option<UserId> {
        Some(*self)
    }
}

/// Passed into every mutating operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OperationContext {
    user_id: UserId,
    occurred_at: DateTime<Utc>,
}

impl OperationContext {
    pub fn new(user_id: UserId, occurred_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            occurred_at,
        }
    }

    pub fn now(user_id: UserId) -> Self {
        Self::new(user_id, Utc::now())
    }

    /// Resolve the acting user, failing with `USER_NOT_FOUND` when absent.
    pub fn resolve(source: &dyn CurrentUser) -> DomainResult<Self> {
        source
            .current_user_id()
            .map(Self::now)
            .ok_or_else(DomainError::user_not_found)
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn resolve_requires_a_user() {
        let none: Option<UserId> = None;
        let err = OperationContext::resolve(&none).unwrap_err();
        assert!(err.is(ErrorCode::UserNotFound));

        let user = UserId::new();
        let ctx = OperationContext::resolve(&user).unwrap();
        assert_eq!(ctx.user_id(), user);
    }
}
