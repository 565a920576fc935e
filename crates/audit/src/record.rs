use chrono::{DateTime, Utc};

use supplyledger_core::{RecordId, UserId};

/// An append-only audit entry.
///
/// Records are facts: once written they are never edited or deleted.
pub trait AuditRecord: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable record type identifier (e.g. "audit.discrepancy").
    fn record_type(&self) -> &'static str;

    fn record_id(&self) -> RecordId;

    fn recorded_by(&self) -> UserId;

    fn recorded_at(&self) -> DateTime<Utc>;
}
