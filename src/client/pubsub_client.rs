use std::fmt;
use std::net::SocketAddr;

use tracing::info;

use crate::registry::{Registry, SubscriptionId};
use crate::transport::frame::{self, DELIMITER, Frame};
use crate::transport::receiver::{ReceiverState, StatsSnapshot, StopReason};
use crate::transport::session::{Session, SessionConfig};
use crate::utils::error::ClientError;

/// Identity under which a client talks to the broker.
///
/// Non-empty and free of the frame delimiter; immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Result<Self, ClientError> {
        let id = id.into();
        if id.is_empty() || id.contains(DELIMITER) {
            return Err(ClientError::InvalidIdentity(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Publish/subscribe client connected to one broker.
///
/// Every operation sends at most one datagram and never waits for a reply;
/// the protocol has no acknowledgments. Messages for subscribed topics are
/// delivered to the registered handlers from a background task.
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    registry: Registry,
    session: Session,
}

impl Client {
    /// Connects to the broker at `host` on the protocol port.
    ///
    /// Fails with [`ClientError::InvalidIdentity`] for a bad id and with
    /// [`ClientError::PortInUse`] when another client on this host is
    /// already receiving.
    pub async fn connect(client_id: &str, host: &str) -> Result<Self, ClientError> {
        Self::connect_with(client_id, host, &SessionConfig::default()).await
    }

    /// Like [`Client::connect`] with explicit port overrides.
    pub async fn connect_with(
        client_id: &str,
        host: &str,
        config: &SessionConfig,
    ) -> Result<Self, ClientError> {
        let id = ClientId::new(client_id)?;
        let registry = Registry::new();
        let session = Session::connect(id.as_str(), host, config, registry.clone()).await?;
        Ok(Self {
            id,
            registry,
            session,
        })
    }

    /// Publishes `payload` under `topic`.
    pub async fn publish(&self, topic: &str, payload: &str) -> Result<(), ClientError> {
        self.session
            .send(&Frame::publish(self.id.as_str(), topic, payload))
            .await
    }

    /// Subscribes `handler` to `topic`.
    ///
    /// Subscribing the same topic again adds another handler; both receive
    /// every message. The handler is registered before the request is sent
    /// so no delivery can slip past it, and removed again if sending fails.
    pub async fn subscribe<F>(&self, topic: &str, handler: F) -> Result<SubscriptionId, ClientError>
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.session.ensure_open()?;
        frame::validate_field("topic", topic)?;

        let id = self.registry.register(topic, handler);
        if let Err(e) = self
            .session
            .send(&Frame::subscribe(self.id.as_str(), topic))
            .await
        {
            self.registry.remove(topic, id);
            return Err(e);
        }

        info!(client_id = %self.id, topic, "subscribed");
        Ok(id)
    }

    /// Unsubscribes from `topic` and drops all of its local handlers.
    ///
    /// Handlers are removed even if the request cannot be sent, so a late
    /// delivery from the broker is never dispatched.
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), ClientError> {
        self.session.ensure_open()?;
        frame::validate_field("topic", topic)?;

        self.registry.unregister(topic);
        self.session
            .send(&Frame::unsubscribe(self.id.as_str(), topic))
            .await?;

        info!(client_id = %self.id, topic, "unsubscribed");
        Ok(())
    }

    /// Receives every delivered message that no subscription matched, as
    /// `(sender client id, topic, payload)`.
    ///
    /// Useful when another process on this host registered the interest at
    /// the broker, since deliveries always arrive on the protocol port.
    /// Replaces any previous fallback.
    pub fn on_unmatched<F>(&self, handler: F) -> Result<(), ClientError>
    where
        F: Fn(&str, &str, &str) + Send + Sync + 'static,
    {
        self.session.ensure_open()?;
        self.registry.set_unmatched(handler);
        Ok(())
    }

    /// Stops receiving and releases the sockets. Afterwards every operation
    /// fails with [`ClientError::SessionClosed`].
    pub async fn close(&self) {
        self.session.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    pub fn client_id(&self) -> &ClientId {
        &self.id
    }

    /// Whether the background receiver is still delivering messages.
    pub fn receiver_state(&self) -> ReceiverState {
        self.session.receiver_state()
    }

    /// Resolves once the receiver has stopped.
    pub async fn stopped(&self) -> StopReason {
        self.session.stopped().await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.session.stats()
    }

    /// Topics with at least one local handler.
    pub fn subscriptions(&self) -> Vec<String> {
        self.registry.topics()
    }

    /// Address the client receives deliveries on.
    pub fn local_addr(&self) -> SocketAddr {
        self.session.local_addr()
    }

    pub fn broker_addr(&self) -> SocketAddr {
        self.session.broker_addr()
    }
}
