//! Background receive loop.
//!
//! The receiver owns the inbound socket. Each cycle waits for either a
//! datagram or the shutdown signal, decodes the datagram and hands `msg`
//! frames to the registry. A malformed datagram is logged, counted and
//! skipped; only a socket error or shutdown ends the loop. Whatever ends it,
//! the final [`ReceiverState`] is published on a watch channel so the session
//! can tell that it has stopped receiving.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::UdpSocket;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::registry::Registry;
use crate::transport::frame::{self, Frame, MAX_FRAME_SIZE};

/// Why the receiver stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The session was closed or dropped.
    Closed,
    /// Reading from the inbound socket failed.
    TransportError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverState {
    Running,
    Stopped(StopReason),
}

impl ReceiverState {
    pub fn is_running(&self) -> bool {
        matches!(self, ReceiverState::Running)
    }

    pub fn stop_reason(&self) -> Option<&StopReason> {
        match self {
            ReceiverState::Running => None,
            ReceiverState::Stopped(reason) => Some(reason),
        }
    }
}

/// Counters describing what the receiver has seen so far.
#[derive(Debug, Default)]
pub struct ReceiverStats {
    datagrams: AtomicU64,
    dispatched: AtomicU64,
    malformed: AtomicU64,
    undelivered: AtomicU64,
    ignored: AtomicU64,
}

/// Point-in-time copy of [`ReceiverStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Datagrams read from the socket.
    pub datagrams: u64,
    /// `msg` frames handed to at least one handler.
    pub dispatched: u64,
    /// Datagrams that failed to decode.
    pub malformed: u64,
    /// `msg` frames for topics with no local handler. These still reach the
    /// unmatched-message fallback when one is installed.
    pub undelivered: u64,
    /// Well-formed frames of a kind the client does not consume.
    pub ignored: u64,
}

impl ReceiverStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            datagrams: self.datagrams.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            undelivered: self.undelivered.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Decodes inbound datagrams and dispatches them to the registry.
#[derive(Debug, Clone)]
pub struct Receiver {
    registry: Registry,
    stats: Arc<ReceiverStats>,
}

impl Receiver {
    pub fn new(registry: Registry, stats: Arc<ReceiverStats>) -> Self {
        Self { registry, stats }
    }

    /// Processes one datagram. Never fails: bad input is logged and counted.
    pub fn handle_datagram(&self, datagram: &[u8]) {
        ReceiverStats::bump(&self.stats.datagrams);

        let frame = match frame::decode(datagram) {
            Ok(frame) => frame,
            Err(e) => {
                ReceiverStats::bump(&self.stats.malformed);
                warn!(
                    len = datagram.len(),
                    "discarding datagram: {e} ({:?})",
                    String::from_utf8_lossy(&datagram[..datagram.len().min(64)])
                );
                return;
            }
        };

        match frame {
            Frame::Publish {
                client_id,
                topic,
                payload,
            } => {
                debug!(from = %client_id, %topic, "message received");
                if self.registry.dispatch(&topic, &payload) > 0 {
                    ReceiverStats::bump(&self.stats.dispatched);
                } else {
                    ReceiverStats::bump(&self.stats.undelivered);
                    self.registry.dispatch_unmatched(&client_id, &topic, &payload);
                }
            }
            other => {
                ReceiverStats::bump(&self.stats.ignored);
                debug!(kind = other.kind().tag(), topic = other.topic(), "ignoring frame");
            }
        }
    }

    /// Runs the loop until `shutdown` fires (or its sender is dropped) or the
    /// socket fails, then records the outcome in `state`.
    pub async fn run(
        self,
        socket: UdpSocket,
        mut shutdown: oneshot::Receiver<()>,
        state: Arc<watch::Sender<ReceiverState>>,
    ) {
        // one spare byte so an oversized datagram shows up as too long
        let mut buf = vec![0u8; MAX_FRAME_SIZE + 1];

        let reason = loop {
            tokio::select! {
                _ = &mut shutdown => break StopReason::Closed,
                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => {
                        debug!(%from, len, "datagram received");
                        self.handle_datagram(&buf[..len]);
                    }
                    Err(e) => {
                        warn!("receive failed, receiver stopping: {e}");
                        break StopReason::TransportError(e.to_string());
                    }
                },
            }
        };

        info!(?reason, "receiver stopped");
        state.send_replace(ReceiverState::Stopped(reason));
    }
}
