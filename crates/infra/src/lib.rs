//! Infrastructure layer: storage backends, configuration and the ledger
//! services that tie the pure domain crates to a transactional store.

pub mod config;
pub mod error;
pub mod services;
pub mod store;


pub use config::{DatabaseConfig, EngineConfig};
pub use error::{EngineError, EngineResult, ErrorBody};
pub use services::{LedgerEngine, Receipt, StockOut};
pub use store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, StoreError};
