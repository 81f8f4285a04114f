//! Channel relay engine.
//!
//! Mirrors every message posted in a source channel into a target channel,
//! either as the bot itself or through a webhook that shows the original
//! author's name and avatar. Relay definitions survive restarts through a
//! JSON state file.
//!
//! # Architecture
//!
//! ```text
//! Discord gateway ──► InboundEvent ──► RelayRegistry lookup
//!                                            │
//!                                            ▼
//!                                      PayloadBuilder ──► Transport ──► target channel
//!
//! Admin HTTP ──► start / stop / list ──► RelayRegistry ──► ConfigStore (JSON file)
//! ```

pub mod engine;
pub mod error;
pub mod payload;
pub mod registry;
pub mod remote;
pub mod routes;
pub mod store;
pub mod transport;
pub mod types;

#[cfg(feature = "discord")]
pub mod discord;

pub use engine::{CommandReply, RelayEngine, RestoreReport};
pub use error::{RelayError, Result};
pub use registry::{RelayRegistry, StartRequest};
pub use remote::{ChannelHandle, RemotePlatform};
pub use store::ConfigStore;
pub use types::{InboundEvent, RelayMode, RelayPayload, RelaySummary, WebhookCredential};
