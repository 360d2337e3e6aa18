//! Transport session
//!
//! A session owns the two UDP sockets of a client: an outbound socket bound
//! to an ephemeral port that sends frames to the broker, and an inbound
//! socket bound to the protocol port on which the broker delivers messages.
//! Both sockets use the address family of the resolved broker. The inbound
//! socket is moved into the receiver task and released when that task ends.
//! The outbound socket is released by [`Session::close`].

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::net::{UdpSocket, lookup_host};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::registry::Registry;
use crate::transport::PROTOCOL_PORT;
use crate::transport::frame::{self, Frame};
use crate::transport::receiver::{
    Receiver, ReceiverState, ReceiverStats, StatsSnapshot, StopReason,
};
use crate::utils::error::ClientError;

/// Port overrides for a session.
///
/// The broker always delivers to [`PROTOCOL_PORT`], so production clients
/// keep the defaults. Tests and relays on non-standard ports override them;
/// a `listen_port` of `0` picks an ephemeral port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub broker_port: u16,
    pub listen_port: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            broker_port: PROTOCOL_PORT,
            listen_port: PROTOCOL_PORT,
        }
    }
}

struct ReceiverTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct Session {
    client_id: String,
    broker: SocketAddr,
    local_addr: SocketAddr,
    outbound: Mutex<Option<Arc<UdpSocket>>>,
    receiver: Mutex<Option<ReceiverTask>>,
    state: Arc<watch::Sender<ReceiverState>>,
    stats: Arc<ReceiverStats>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    /// Resolves the broker, binds both sockets and starts the receiver.
    ///
    /// `client_id` must already be validated. Must be called from within a
    /// tokio runtime.
    pub async fn connect(
        client_id: &str,
        host: &str,
        config: &SessionConfig,
        registry: Registry,
    ) -> Result<Self, ClientError> {
        let broker = resolve(host, config.broker_port).await?;

        // both sockets follow the broker's address family so deliveries come
        // back to a socket that can receive them
        let unspecified: IpAddr = if broker.is_ipv4() {
            Ipv4Addr::UNSPECIFIED.into()
        } else {
            Ipv6Addr::UNSPECIFIED.into()
        };

        let inbound = UdpSocket::bind((unspecified, config.listen_port))
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::AddrInUse => ClientError::PortInUse {
                    port: config.listen_port,
                },
                _ => ClientError::Bind(e),
            })?;
        let local_addr = inbound.local_addr()?;

        let outbound = UdpSocket::bind((unspecified, 0))
            .await
            .map_err(ClientError::Bind)?;

        let stats = Arc::new(ReceiverStats::default());
        let state = Arc::new(watch::Sender::new(ReceiverState::Running));
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(Receiver::new(registry, stats.clone()).run(
            inbound,
            shutdown_rx,
            state.clone(),
        ));

        info!(client_id, %broker, %local_addr, "session connected");

        Ok(Self {
            client_id: client_id.to_string(),
            broker,
            local_addr,
            outbound: Mutex::new(Some(Arc::new(outbound))),
            receiver: Mutex::new(Some(ReceiverTask { shutdown, handle })),
            state,
            stats,
        })
    }

    /// Encodes `frame` and sends it to the broker as one datagram.
    ///
    /// Encoding errors are returned before anything is sent.
    pub async fn send(&self, frame: &Frame) -> Result<(), ClientError> {
        let socket = self.outbound()?;
        let bytes = frame::encode(frame)?;
        socket.send_to(&bytes, self.broker).await?;
        debug!(kind = frame.kind().tag(), topic = frame.topic(), len = bytes.len(), "frame sent");
        Ok(())
    }

    /// Fails with [`ClientError::SessionClosed`] once the session is closed.
    pub fn ensure_open(&self) -> Result<(), ClientError> {
        self.outbound().map(|_| ())
    }

    fn outbound(&self) -> Result<Arc<UdpSocket>, ClientError> {
        lock(&self.outbound)
            .as_ref()
            .cloned()
            .ok_or(ClientError::SessionClosed)
    }

    /// Stops the receiver and releases both sockets. Calling it again is a
    /// no-op.
    ///
    /// A handler that is already running finishes before this returns; no
    /// further datagrams are read.
    pub async fn close(&self) {
        let outbound = lock(&self.outbound).take();
        let receiver = lock(&self.receiver).take();

        if let Some(ReceiverTask { shutdown, handle }) = receiver {
            // the receiver may already have stopped on its own
            let _ = shutdown.send(());
            if let Err(e) = handle.await {
                error!("receiver task failed: {e}");
                self.state.send_replace(ReceiverState::Stopped(
                    StopReason::TransportError(e.to_string()),
                ));
            }
        }

        if outbound.is_some() {
            info!(client_id = %self.client_id, "session closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.outbound).is_none()
    }

    pub fn receiver_state(&self) -> ReceiverState {
        self.state.borrow().clone()
    }

    /// Waits until the receiver has stopped and returns why.
    pub async fn stopped(&self) -> StopReason {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|state| !state.is_running()).await {
            Ok(state) => state.stop_reason().cloned().unwrap_or(StopReason::Closed),
            Err(_) => StopReason::Closed,
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn broker_addr(&self) -> SocketAddr {
        self.broker
    }

    /// Address of the inbound socket.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("client_id", &self.client_id)
            .field("broker", &self.broker)
            .field("local_addr", &self.local_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Resolves `host:port`, preferring IPv4 when the host has both kinds of
/// address.
async fn resolve(host: &str, port: u16) -> Result<SocketAddr, ClientError> {
    let resolve_err = |source| ClientError::Resolve {
        host: host.to_string(),
        source,
    };

    let addrs: Vec<SocketAddr> = lookup_host((host, port)).await.map_err(resolve_err)?.collect();
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| {
            resolve_err(io::Error::new(
                io::ErrorKind::NotFound,
                "no addresses found",
            ))
        })
}
