//! Layered server configuration
//!
//! Precedence, lowest first:
//! 1. Built-in defaults
//! 2. Host file (/etc/batchdel/batchdel.toml or --host-config)
//! 3. Scenario `[config]` table
//! 4. CLI overrides

mod defaults;
mod effective;
mod merge;

pub use defaults::{DeleteConfig, SignalConfig, TimerConfig};
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig, DEFAULT_HOST_CONFIG};
pub use merge::{merge_into, merge_layers};
