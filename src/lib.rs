//! # PopSub UDP
//!
//! `popsub-udp` is a minimal topic-based publish/subscribe client that talks
//! to a broker over UDP. A process picks an identity, publishes payloads
//! under a topic, and subscribes callbacks to topics; a background task
//! decodes the broker's deliveries and hands them to the matching callbacks.
//!
//! ```no_run
//! # async fn demo() -> Result<(), popsub_udp::ClientError> {
//! let client = popsub_udp::Client::connect("alice", "localhost").await?;
//! client
//!     .subscribe("temp", |topic: &str, payload: &str| println!("{topic}: {payload}"))
//!     .await?;
//! client.publish("temp", "21.5").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - `client`: the public facade (`connect`, `publish`, `subscribe`, `unsubscribe`, `close`).
//! - `config`: loads settings for the command-line tool.
//! - `registry`: the thread-safe map from topic to local handlers.
//! - `transport`: wire format, UDP session and the background receiver.
//! - `utils`: error types and logging setup.

pub mod client;
pub mod config;
pub mod registry;
pub mod transport;
pub mod utils;

pub use client::{Client, ClientId};
pub use registry::SubscriptionId;
pub use transport::{PROTOCOL_PORT, ReceiverState, SessionConfig, StatsSnapshot, StopReason};
pub use utils::error::{ClientError, FrameError};
