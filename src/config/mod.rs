//! Configuration for the synchronization layer
//!
//! Built-in defaults, then an optional TOML file, then `WAF_SYNC_*`
//! environment variables, then command-line overrides.

pub mod loader;
pub mod types;

pub use loader::{ConfigLoader, ConfigOverrides};
pub use types::{ApiConfig, LogFormat, LoggingSettings, PollerSettings, StreamSettings, SyncConfig};
