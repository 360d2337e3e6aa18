//! The `client` module is the public face of the crate.
//!
//! [`Client`] ties the pieces together: it validates the identity, builds
//! frames for the transport session and keeps the local topic registry in
//! step with the subscriptions it sends to the broker.

pub mod pubsub_client;
pub use pubsub_client::{Client, ClientId};
