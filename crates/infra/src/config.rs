//! Engine configuration.
//!
//! Loaded hierarchically:
//! 1. defaults in code
//! 2. an optional `supplyledger.toml` (or the file named by `SUPPLYLEDGER_CONFIG`)
//! 3. `SUPPLYLEDGER__*` environment overrides (`SUPPLYLEDGER__ROUNDING=ceiling`,
//!    `SUPPLYLEDGER__DATABASE__URL=...`)

use config::{ConfigError, Environment, File};
use serde::Deserialize;

use supplyledger_core::RoundingPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Rounding applied to every derived price and extended cost.
    #[serde(default)]
    pub rounding: RoundingPolicy,

    /// Fallback tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; only the Postgres store reads it.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rounding: RoundingPolicy::default(),
            log_filter: default_log_filter(),
            database: DatabaseConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from file and environment.
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var("SUPPLYLEDGER_CONFIG").unwrap_or_else(|_| "supplyledger".into());
        Self::load_from(&file)
    }

    /// Load using `file` (extension optional) as the config file source.
    pub fn load_from(file: &str) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .set_default("rounding", "half_up")?
            .set_default("log_filter", default_log_filter())?
            .set_default("database.max_connections", default_max_connections())?
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix("SUPPLYLEDGER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Install the JSON tracing subscriber using `log_filter` as fallback.
    pub fn init_logging(&self) {
        supplyledger_observability::init_with(&self.log_filter);
    }
}
