//! Ledger services: the public operations of the engine.
//!
//! Every operation follows the same pipeline:
//!
//! ```text
//! request
//!   ↓
//! 1. open one store transaction
//!   ↓
//! 2. load (and lock) every row the operation touches
//!   ↓
//! 3. run the pure movement (ledger / transfers / withdrawals / audit crates)
//!   ↓
//! 4. persist rows with their expected versions, append audit records
//!   ↓
//! 5. commit, or roll back on the first error
//! ```
//!
//! The services hold no state of their own beyond the store and the rounding
//! policy, so one engine can be shared across threads behind an `Arc`.

use tracing::warn;

use supplyledger_core::{CurrentUser, DomainError, OperationContext, RoundingPolicy};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::store::{InMemoryLedgerStore, LedgerStore, LedgerTx};

pub mod adjustment;
pub mod movement;
pub mod queries;
pub mod transfer;
pub mod withdrawal;

pub use movement::{Receipt, StockOut};

#[derive(Debug)]
pub struct LedgerEngine<S> {
    store: S,
    policy: RoundingPolicy,
}

impl<S> LedgerEngine<S> {
    pub fn new(store: S, config: &EngineConfig) -> Self {
        Self {
            store,
            policy: config.rounding,
        }
    }

    pub fn policy(&self) -> RoundingPolicy {
        self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Context for the next operation, or USER_NOT_FOUND when the caller
    /// cannot name an acting user.
    pub fn context(&self, user: &dyn CurrentUser) -> EngineResult<OperationContext> {
        OperationContext::resolve(user).map_err(|err| {
            warn!(code = %err.code(), error = %err, "no acting user");
            err.into()
        })
    }
}

impl LedgerEngine<InMemoryLedgerStore> {
    /// Engine over a fresh in-memory store (tests, local tooling).
    pub fn in_memory(config: &EngineConfig) -> Self {
        Self::new(InMemoryLedgerStore::new(config.rounding), config)
    }
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// Run a mutating operation in one transaction; rejections are logged.
    fn run<T>(
        &self,
        operation: &'static str,
        work: impl FnOnce(&mut dyn LedgerTx, RoundingPolicy) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let policy = self.policy;
        let result = self.store.transaction(|tx| work(tx, policy));
        if let Err(err) = &result {
            warn!(operation, code = %err.code(), error = %err, "operation rejected");
        }
        result
    }

    /// Run a read-only query in one transaction.
    fn read<T>(&self, work: impl FnOnce(&mut dyn LedgerTx) -> EngineResult<T>) -> EngineResult<T> {
        self.store.transaction(work)
    }
}

pub(crate) fn missing(kind: &str, what: impl core::fmt::Display) -> String {
    format!("{kind} {what} does not exist")
}

pub(crate) fn not_found<T>(
    found: Option<T>,
    err: impl FnOnce() -> DomainError,
) -> EngineResult<T> {
    found.ok_or_else(|| err().into())
}
