//! Live feed of classified request events
//!
//! - `buffer`: bounded newest-first event buffer
//! - `message`: frame parsing
//! - `transport`: connector seam and the WebSocket client
//! - `consumer`: the reconnecting consumer

pub mod buffer;
pub mod consumer;
pub mod message;
pub mod transport;
pub mod types;

pub use buffer::EventBuffer;
pub use consumer::StreamConsumer;
pub use message::{parse_frame, Discard, NEW_EVENT_TAG};
pub use transport::{FeedConnection, FeedConnector, WebSocketConnector};
pub use types::{ConnectionState, FeedStats, Frame, StreamConfig};
