//! # waf-sync
//!
//! Client-side synchronization layer for a WAF monitoring dashboard.
//!
//! Three components keep an in-memory view consistent with the WAF:
//!
//! - [`StreamConsumer`] follows the live event feed over WebSocket,
//!   reconnecting forever on a fixed delay, into a bounded newest-first buffer
//!   that can be paused.
//! - [`StatsPoller`] fetches aggregate statistics eagerly and then on a fixed
//!   interval, replacing the snapshot as a whole.
//! - [`MutationSynchronizer`] toggles rules and unblocks addresses, updating
//!   its caches only once the server confirms.
//!
//! [`Monitor`] wires all three to one [`SyncConfig`].

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod mutation;
pub mod poller;
pub mod session;
pub mod stream;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{SnapshotClient, WafApi};
pub use config::{ConfigLoader, SyncConfig};
pub use error::{Error, Result};
pub use mutation::{MutationSynchronizer, MutationTarget};
pub use poller::StatsPoller;
pub use session::Monitor;
pub use stream::{ConnectionState, EventBuffer, StreamConfig, StreamConsumer};
pub use types::{Action, BlockedIp, Event, LogQuery, Rule, Stats};
