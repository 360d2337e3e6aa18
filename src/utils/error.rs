//! The `error` module defines the error types used within `popsub-udp`.
//!
//! Codec failures are described by [`FrameError`]; everything a caller of the
//! client facade can observe is a [`ClientError`], which wraps frame errors so
//! `?` works across both layers.

use std::io;

use thiserror::Error;

/// Errors raised while encoding or decoding a wire frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Inbound bytes do not form a valid frame.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The encoded frame does not fit into a single datagram.
    #[error("frame of {size} bytes exceeds the {max} byte datagram limit")]
    PayloadTooLarge { size: usize, max: usize },

    /// A header field is empty or contains the delimiter.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

/// Errors surfaced by the client facade and the transport session.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The client identity is empty or contains the frame delimiter.
    #[error("invalid client id {0:?}")]
    InvalidIdentity(String),

    /// The broker hostname could not be resolved.
    #[error("failed to resolve broker host {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    /// Another process already listens on the inbound port.
    #[error("inbound port {port} is already in use")]
    PortInUse { port: u16 },

    /// Binding a socket failed for a reason other than the port being taken.
    #[error("failed to bind socket: {0}")]
    Bind(#[source] io::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The session was closed; no further operations are possible.
    #[error("session is closed")]
    SessionClosed,

    /// A socket operation failed while sending.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}
