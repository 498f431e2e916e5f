use async_trait::async_trait;
use tokio::sync::mpsc;

use protocol::signaling::{AddressCandidate, SessionDescription};

/// Which side of the negotiation this endpoint plays. The offerer (player)
/// opens the data channel; the answerer (host) accepts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    Offerer,
    Answerer,
}

/// Everything an endpoint reports, delivered as one inbound queue instead
/// of re-entrant callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointEvent {
    /// A locally discovered address candidate to publish via signaling.
    LocalCandidate(AddressCandidate),
    /// The data channel is open; messages can flow.
    ChannelOpen,
    /// An application message arrived from the peer.
    Message(String),
    /// The connection failed or the peer went away.
    ChannelClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerErrorKind {
    InvalidState,
    ConnectionClosed,
    Signaling,
    Unauthorized,
    NotFound,
    RateLimited,
    Http,
    Cancelled,
}

/// Error carrying a coarse kind plus human-readable context.
#[derive(Debug, Clone)]
pub struct PeerError {
    pub kind: PeerErrorKind,
    pub message: String,
}

impl PeerError {
    pub fn new(kind: PeerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PeerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for PeerError {}

/// The platform's peer-transport primitive. Real deployments back this with
/// an actual real-time transport; tests use the in-process loopback.
#[async_trait]
pub trait PeerEndpoint: Send {
    fn role(&self) -> EndpointRole;

    async fn create_offer(&mut self) -> Result<SessionDescription, PeerError>;

    async fn create_answer(&mut self) -> Result<SessionDescription, PeerError>;

    async fn set_local_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), PeerError>;

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), PeerError>;

    /// Apply one remote address candidate. Callers must apply each
    /// candidate at most once; re-application is an error.
    async fn add_remote_candidate(&mut self, candidate: AddressCandidate)
        -> Result<(), PeerError>;

    /// Queue an application message to the peer. Fails when the channel is
    /// not open.
    fn send_text(&self, text: &str) -> Result<(), PeerError>;

    /// Hand over the endpoint's event queue. Yields `None` after the first
    /// call.
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<EndpointEvent>>;

    /// Tear the connection down; the peer observes `ChannelClosed`.
    async fn close(&mut self);
}

/// Creates endpoints on demand, one per negotiated peer.
pub trait EndpointFactory: Send + Sync {
    fn create_endpoint(&self, role: EndpointRole) -> Box<dyn PeerEndpoint>;
}
