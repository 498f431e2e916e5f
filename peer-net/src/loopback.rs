//! In-process endpoint implementation. Endpoints pair up through opaque
//! `loopback:` tokens carried in the session descriptions, so the full
//! negotiation shape (offer/answer/candidates via a rendezvous) can run
//! without a real network transport.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use protocol::signaling::{AddressCandidate, SessionDescription};

use crate::endpoint::{
    EndpointEvent, EndpointFactory, EndpointRole, PeerEndpoint, PeerError, PeerErrorKind,
};

const SDP_PREFIX: &str = "loopback:";
const CANDIDATE_PREFIX: &str = "candidate:loopback:";

#[derive(Debug)]
struct EndpointShared {
    events_tx: mpsc::UnboundedSender<EndpointEvent>,
    peer_tx: Option<mpsc::UnboundedSender<EndpointEvent>>,
    local_set: bool,
    remote_set: bool,
    remote_candidates: usize,
    open: bool,
    closed: bool,
}

impl EndpointShared {
    /// The channel opens once both descriptions and at least one remote
    /// candidate have been applied on this side.
    fn check_open(&mut self) {
        if !self.open
            && !self.closed
            && self.local_set
            && self.remote_set
            && self.remote_candidates > 0
            && self.peer_tx.is_some()
        {
            self.open = true;
            let _ = self.events_tx.send(EndpointEvent::ChannelOpen);
        }
    }
}

type Registry = Arc<Mutex<HashMap<String, Arc<Mutex<EndpointShared>>>>>;

/// Shared rendezvous for a set of loopback endpoints. Clone it into every
/// factory that should be able to pair.
#[derive(Debug, Clone, Default)]
pub struct LoopbackNetwork {
    registry: Registry,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, id: &str, shared: Arc<Mutex<EndpointShared>>) {
        self.registry
            .lock()
            .expect("loopback registry poisoned")
            .insert(id.to_string(), shared);
    }

    fn lookup(&self, id: &str) -> Option<Arc<Mutex<EndpointShared>>> {
        self.registry
            .lock()
            .expect("loopback registry poisoned")
            .get(id)
            .cloned()
    }
}

pub struct LoopbackEndpoint {
    id: String,
    role: EndpointRole,
    network: LoopbackNetwork,
    shared: Arc<Mutex<EndpointShared>>,
    events_rx: Option<mpsc::UnboundedReceiver<EndpointEvent>>,
}

impl LoopbackEndpoint {
    fn new(role: EndpointRole, network: LoopbackNetwork) -> Self {
        let id = Uuid::new_v4().to_string();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(EndpointShared {
            events_tx,
            peer_tx: None,
            local_set: false,
            remote_set: false,
            remote_candidates: 0,
            open: false,
            closed: false,
        }));
        network.register(&id, shared.clone());
        Self {
            id,
            role,
            network,
            shared,
            events_rx: Some(events_rx),
        }
    }

    fn peer_id_from(blob: &str, prefix: &str) -> Result<String, PeerError> {
        blob.strip_prefix(prefix)
            .map(str::to_string)
            .ok_or_else(|| {
                PeerError::new(PeerErrorKind::InvalidState, format!("not a loopback blob: {blob}"))
            })
    }

    fn link_to(&self, peer_token: &str) -> Result<(), PeerError> {
        let peer_shared = self.network.lookup(peer_token).ok_or_else(|| {
            PeerError::new(
                PeerErrorKind::InvalidState,
                format!("unknown loopback peer {peer_token}"),
            )
        })?;

        // Lock one side at a time; nested locking would invite a deadlock
        // when both peers link concurrently.
        let my_tx = self.shared.lock().expect("endpoint poisoned").events_tx.clone();
        let peer_events_tx = {
            let mut peer = peer_shared.lock().expect("endpoint poisoned");
            peer.peer_tx = Some(my_tx);
            peer.events_tx.clone()
        };
        let mut shared = self.shared.lock().expect("endpoint poisoned");
        shared.peer_tx = Some(peer_events_tx);
        Ok(())
    }
}

#[async_trait]
impl PeerEndpoint for LoopbackEndpoint {
    fn role(&self) -> EndpointRole {
        self.role
    }

    async fn create_offer(&mut self) -> Result<SessionDescription, PeerError> {
        if self.role != EndpointRole::Offerer {
            return Err(PeerError::new(
                PeerErrorKind::InvalidState,
                "only the offerer creates offers",
            ));
        }
        Ok(SessionDescription::offer(format!("{SDP_PREFIX}{}", self.id)))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, PeerError> {
        if self.role != EndpointRole::Answerer {
            return Err(PeerError::new(
                PeerErrorKind::InvalidState,
                "only the answerer creates answers",
            ));
        }
        if !self.shared.lock().expect("endpoint poisoned").remote_set {
            return Err(PeerError::new(
                PeerErrorKind::InvalidState,
                "answer requires a remote offer",
            ));
        }
        Ok(SessionDescription::answer(format!("{SDP_PREFIX}{}", self.id)))
    }

    async fn set_local_description(
        &mut self,
        _description: SessionDescription,
    ) -> Result<(), PeerError> {
        let mut shared = self.shared.lock().expect("endpoint poisoned");
        shared.local_set = true;
        // Candidate gathering starts once the local description is in
        // place, mirroring the platform transport's behavior.
        let candidate = AddressCandidate {
            candidate: format!("{CANDIDATE_PREFIX}{}", self.id),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
        };
        let _ = shared.events_tx.send(EndpointEvent::LocalCandidate(candidate));
        shared.check_open();
        Ok(())
    }

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), PeerError> {
        let peer_token = Self::peer_id_from(&description.sdp, SDP_PREFIX)?;
        self.link_to(&peer_token)?;
        let mut shared = self.shared.lock().expect("endpoint poisoned");
        shared.remote_set = true;
        shared.check_open();
        Ok(())
    }

    async fn add_remote_candidate(
        &mut self,
        candidate: AddressCandidate,
    ) -> Result<(), PeerError> {
        let peer_token = Self::peer_id_from(&candidate.candidate, CANDIDATE_PREFIX)?;
        if peer_token == self.id {
            // Both directions share one rendezvous queue, so a consumer can
            // see its own published candidates echoed back.
            return Err(PeerError::new(
                PeerErrorKind::InvalidState,
                "candidate refers to the local endpoint",
            ));
        }
        let mut shared = self.shared.lock().expect("endpoint poisoned");
        if !shared.remote_set {
            return Err(PeerError::new(
                PeerErrorKind::InvalidState,
                "candidate before remote description",
            ));
        }
        shared.remote_candidates += 1;
        shared.check_open();
        Ok(())
    }

    fn send_text(&self, text: &str) -> Result<(), PeerError> {
        let shared = self.shared.lock().expect("endpoint poisoned");
        if !shared.open {
            return Err(PeerError::new(
                PeerErrorKind::ConnectionClosed,
                "data channel not open",
            ));
        }
        let peer_tx = shared.peer_tx.as_ref().ok_or_else(|| {
            PeerError::new(PeerErrorKind::ConnectionClosed, "peer unlinked")
        })?;
        peer_tx
            .send(EndpointEvent::Message(text.to_string()))
            .map_err(|_| PeerError::new(PeerErrorKind::ConnectionClosed, "peer gone"))
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<EndpointEvent>> {
        self.events_rx.take()
    }

    async fn close(&mut self) {
        let mut shared = self.shared.lock().expect("endpoint poisoned");
        if shared.closed {
            return;
        }
        shared.closed = true;
        shared.open = false;
        if let Some(peer_tx) = shared.peer_tx.take() {
            let _ = peer_tx.send(EndpointEvent::ChannelClosed);
        }
    }
}

/// Factory handing out endpoints that all rendezvous on one network.
#[derive(Debug, Clone, Default)]
pub struct LoopbackFactory {
    network: LoopbackNetwork,
}

impl LoopbackFactory {
    pub fn new(network: LoopbackNetwork) -> Self {
        Self { network }
    }
}

impl EndpointFactory for LoopbackFactory {
    fn create_endpoint(&self, role: EndpointRole) -> Box<dyn PeerEndpoint> {
        Box::new(LoopbackEndpoint::new(role, self.network.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn negotiate() -> (
        LoopbackEndpoint,
        LoopbackEndpoint,
        mpsc::UnboundedReceiver<EndpointEvent>,
        mpsc::UnboundedReceiver<EndpointEvent>,
    ) {
        let network = LoopbackNetwork::new();
        let mut player = LoopbackEndpoint::new(EndpointRole::Offerer, network.clone());
        let mut host = LoopbackEndpoint::new(EndpointRole::Answerer, network.clone());
        let mut player_events = player.take_events().unwrap();
        let mut host_events = host.take_events().unwrap();

        let offer = player.create_offer().await.unwrap();
        player.set_local_description(offer.clone()).await.unwrap();
        let player_candidate = match player_events.recv().await.unwrap() {
            EndpointEvent::LocalCandidate(c) => c,
            other => panic!("expected candidate, got {other:?}"),
        };

        host.set_remote_description(offer).await.unwrap();
        let answer = host.create_answer().await.unwrap();
        host.set_local_description(answer.clone()).await.unwrap();
        let host_candidate = match host_events.recv().await.unwrap() {
            EndpointEvent::LocalCandidate(c) => c,
            other => panic!("expected candidate, got {other:?}"),
        };

        player.set_remote_description(answer).await.unwrap();
        player.add_remote_candidate(host_candidate).await.unwrap();
        host.add_remote_candidate(player_candidate).await.unwrap();

        assert_eq!(player_events.recv().await.unwrap(), EndpointEvent::ChannelOpen);
        assert_eq!(host_events.recv().await.unwrap(), EndpointEvent::ChannelOpen);

        (player, host, player_events, host_events)
    }

    #[tokio::test]
    async fn full_negotiation_opens_both_sides() {
        let (player, host, mut player_events, mut host_events) = negotiate().await;

        player.send_text("hello host").unwrap();
        host.send_text("hello player").unwrap();

        assert_eq!(
            host_events.recv().await.unwrap(),
            EndpointEvent::Message("hello host".into())
        );
        assert_eq!(
            player_events.recv().await.unwrap(),
            EndpointEvent::Message("hello player".into())
        );
    }

    #[tokio::test]
    async fn send_before_open_fails() {
        let network = LoopbackNetwork::new();
        let player = LoopbackEndpoint::new(EndpointRole::Offerer, network);
        let err = player.send_text("too early").unwrap_err();
        assert_eq!(err.kind, PeerErrorKind::ConnectionClosed);
    }

    #[tokio::test]
    async fn own_candidate_echo_is_rejected() {
        let (mut player, _host, _pe, _he) = negotiate().await;
        let own = AddressCandidate {
            candidate: format!("{CANDIDATE_PREFIX}{}", player.id),
            sdp_mid: None,
            sdp_m_line_index: None,
        };
        let err = player.add_remote_candidate(own).await.unwrap_err();
        assert_eq!(err.kind, PeerErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn close_notifies_the_peer() {
        let (mut player, _host, _player_events, mut host_events) = negotiate().await;
        player.close().await;
        assert_eq!(host_events.recv().await.unwrap(), EndpointEvent::ChannelClosed);
        assert!(player.send_text("after close").is_err());
    }
}
