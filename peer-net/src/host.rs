//! Host-side connection manager: polls the rendezvous for player offers,
//! answers each one, applies address candidates exactly once, and exposes
//! send/broadcast over the opened data channels.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use protocol::signaling::{CandidatePublishRequest, PlayerSummary};

use crate::client::SignalingClient;
use crate::endpoint::{EndpointEvent, EndpointFactory, EndpointRole, PeerEndpoint, PeerError};

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub base_url: String,
    pub room_id: String,
    pub host_token: String,
    /// Cadence for discovering new player offers.
    pub offer_poll_interval: Duration,
    /// Cadence for picking up freshly appended address candidates.
    pub candidate_poll_interval: Duration,
}

impl HostConfig {
    pub fn new(
        base_url: impl Into<String>,
        room_id: impl Into<String>,
        host_token: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            room_id: room_id.into(),
            host_token: host_token.into(),
            offer_poll_interval: Duration::from_secs(1),
            candidate_poll_interval: Duration::from_millis(500),
        }
    }
}

/// What the owning game loop observes from the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    PlayerJoined {
        player_id: String,
        nickname: Option<String>,
    },
    PlayerLeft {
        player_id: String,
    },
    Message {
        player_id: String,
        text: String,
    },
}

enum HostCmd {
    Send { player_id: String, text: String },
    Broadcast { text: String },
    Stop,
}

/// Owner-facing handle; the manager task holds all connection state.
#[derive(Clone)]
pub struct HostHandle {
    cmd_tx: mpsc::UnboundedSender<HostCmd>,
    connected_rx: watch::Receiver<Vec<String>>,
    poll_failures: Arc<AtomicU32>,
}

impl HostHandle {
    /// Queue a message to one player; silently dropped when the channel is
    /// not open.
    pub fn send(&self, player_id: &str, text: impl Into<String>) {
        let _ = self.cmd_tx.send(HostCmd::Send {
            player_id: player_id.to_string(),
            text: text.into(),
        });
    }

    /// Queue a message to every currently open channel.
    pub fn broadcast(&self, text: impl Into<String>) {
        let _ = self.cmd_tx.send(HostCmd::Broadcast { text: text.into() });
    }

    pub fn connected_players(&self) -> Vec<String> {
        self.connected_rx.borrow().clone()
    }

    /// Consecutive failed polls, for the owner's backoff or alerting.
    pub fn poll_failures(&self) -> u32 {
        self.poll_failures.load(Ordering::Relaxed)
    }

    /// Cancel all timers and close every connection.
    pub fn stop(&self) {
        let _ = self.cmd_tx.send(HostCmd::Stop);
    }
}

struct PeerState {
    endpoint: Box<dyn PeerEndpoint>,
    nickname: Option<String>,
    open: bool,
    /// Index into the player's candidate queue; never rewound, so no
    /// candidate is applied twice.
    applied_candidates: usize,
    forwarder: JoinHandle<()>,
}

pub struct HostConnectionManager;

impl HostConnectionManager {
    /// Spawn the manager task. Events arrive on the returned receiver until
    /// `HostHandle::stop` is called or the receiver is dropped.
    pub fn start(
        config: HostConfig,
        factory: Arc<dyn EndpointFactory>,
    ) -> (HostHandle, mpsc::UnboundedReceiver<HostEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected_rx) = watch::channel(Vec::new());
        let poll_failures = Arc::new(AtomicU32::new(0));

        let handle = HostHandle {
            cmd_tx,
            connected_rx,
            poll_failures: poll_failures.clone(),
        };

        let driver = HostDriver {
            client: SignalingClient::new(config.base_url.clone()),
            config,
            factory,
            peers: HashMap::new(),
            processed_players: HashSet::new(),
            events_tx,
            connected_tx,
            poll_failures,
        };
        tokio::spawn(driver.run(cmd_rx));

        (handle, events_rx)
    }
}

struct HostDriver {
    config: HostConfig,
    client: SignalingClient,
    factory: Arc<dyn EndpointFactory>,
    peers: HashMap<String, PeerState>,
    /// Players whose offer has already been taken through negotiation.
    processed_players: HashSet<String>,
    events_tx: mpsc::UnboundedSender<HostEvent>,
    connected_tx: watch::Sender<Vec<String>>,
    poll_failures: Arc<AtomicU32>,
}

impl HostDriver {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<HostCmd>) {
        let (peer_events_tx, mut peer_events_rx) =
            mpsc::unbounded_channel::<(String, EndpointEvent)>();

        let mut offer_tick = tokio::time::interval(self.config.offer_poll_interval);
        offer_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut candidate_tick = tokio::time::interval(self.config.candidate_poll_interval);
        candidate_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = offer_tick.tick() => {
                    match self.poll_offers(&peer_events_tx).await {
                        Ok(()) => {
                            self.poll_failures.store(0, Ordering::Relaxed);
                        }
                        Err(err) => {
                            self.poll_failures.fetch_add(1, Ordering::Relaxed);
                            warn!(%err, "offer poll failed");
                        }
                    }
                }
                _ = candidate_tick.tick() => {
                    if let Err(err) = self.poll_candidates().await {
                        self.poll_failures.fetch_add(1, Ordering::Relaxed);
                        warn!(%err, "candidate poll failed");
                    }
                }
                Some((player_id, event)) = peer_events_rx.recv() => {
                    self.handle_endpoint_event(player_id, event).await;
                }
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(HostCmd::Send { player_id, text }) => {
                            if let Some(peer) = self.peers.get(&player_id) {
                                if peer.open {
                                    if let Err(err) = peer.endpoint.send_text(&text) {
                                        debug!(%player_id, %err, "send dropped");
                                    }
                                }
                            }
                        }
                        Some(HostCmd::Broadcast { text }) => {
                            for (player_id, peer) in &self.peers {
                                if peer.open {
                                    if let Err(err) = peer.endpoint.send_text(&text) {
                                        debug!(%player_id, %err, "broadcast drop");
                                    }
                                }
                            }
                        }
                        Some(HostCmd::Stop) | None => break,
                    }
                }
            }
        }

        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        for (_, mut peer) in self.peers.drain() {
            peer.endpoint.close().await;
            peer.forwarder.abort();
        }
        let _ = self.connected_tx.send(Vec::new());
        debug!(room_id = %self.config.room_id, "host connection manager stopped");
    }

    async fn poll_offers(
        &mut self,
        peer_events_tx: &mpsc::UnboundedSender<(String, EndpointEvent)>,
    ) -> Result<(), PeerError> {
        let players = self
            .client
            .fetch_players(&self.config.room_id, &self.config.host_token)
            .await?;

        for summary in players {
            if !summary.has_offer || self.processed_players.contains(&summary.player_id) {
                continue;
            }
            self.processed_players.insert(summary.player_id.clone());
            if let Err(err) = self.admit_player(&summary, peer_events_tx).await {
                warn!(player_id = %summary.player_id, %err, "negotiation setup failed");
            }
        }
        Ok(())
    }

    async fn admit_player(
        &mut self,
        summary: &PlayerSummary,
        peer_events_tx: &mpsc::UnboundedSender<(String, EndpointEvent)>,
    ) -> Result<(), PeerError> {
        let player_id = summary.player_id.clone();
        let offer = self
            .client
            .fetch_offer(&self.config.room_id, &player_id, &self.config.host_token)
            .await?
            .ok_or_else(|| {
                PeerError::new(crate::PeerErrorKind::Signaling, "offer vanished mid-poll")
            })?;

        let mut endpoint = self.factory.create_endpoint(EndpointRole::Answerer);
        let mut events = endpoint
            .take_events()
            .expect("fresh endpoint yields its event queue");

        let forwarder = {
            let peer_events_tx = peer_events_tx.clone();
            let player_id = player_id.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    if peer_events_tx.send((player_id.clone(), event)).is_err() {
                        break;
                    }
                }
            })
        };

        endpoint.set_remote_description(offer).await?;
        let answer = endpoint.create_answer().await?;
        endpoint.set_local_description(answer.clone()).await?;
        self.client
            .publish_answer(
                &self.config.room_id,
                &player_id,
                answer,
                &self.config.host_token,
            )
            .await?;

        debug!(%player_id, "answer published, awaiting channel");
        self.peers.insert(
            player_id,
            PeerState {
                endpoint,
                nickname: summary.nickname.clone(),
                open: false,
                applied_candidates: 0,
                forwarder,
            },
        );
        Ok(())
    }

    async fn poll_candidates(&mut self) -> Result<(), PeerError> {
        if self.peers.is_empty() {
            return Ok(());
        }
        let by_player = self
            .client
            .fetch_candidates_by_player(&self.config.room_id, &self.config.host_token)
            .await?;

        for (player_id, candidates) in by_player {
            let Some(peer) = self.peers.get_mut(&player_id) else {
                continue;
            };
            let start = peer.applied_candidates.min(candidates.len());
            for candidate in &candidates[start..] {
                // Advance the cursor unconditionally; a candidate is offered
                // to the endpoint exactly once, echoes included.
                peer.applied_candidates += 1;
                if let Err(err) = peer.endpoint.add_remote_candidate(candidate.clone()).await {
                    debug!(%player_id, %err, "candidate not applied");
                }
            }
        }
        Ok(())
    }

    async fn handle_endpoint_event(&mut self, player_id: String, event: EndpointEvent) {
        match event {
            EndpointEvent::LocalCandidate(candidate) => {
                let request = CandidatePublishRequest {
                    player_id: Some(player_id.clone()),
                    player_token: None,
                    candidate: Some(candidate),
                    host_token: Some(self.config.host_token.clone()),
                };
                if let Err(err) = self
                    .client
                    .publish_candidate(&self.config.room_id, &request)
                    .await
                {
                    warn!(%player_id, %err, "candidate publish failed");
                }
            }
            EndpointEvent::ChannelOpen => {
                let nickname = match self.peers.get_mut(&player_id) {
                    Some(peer) => {
                        peer.open = true;
                        peer.nickname.clone()
                    }
                    None => return,
                };
                self.publish_connected();
                let _ = self.events_tx.send(HostEvent::PlayerJoined {
                    player_id,
                    nickname,
                });
            }
            EndpointEvent::Message(text) => {
                let _ = self.events_tx.send(HostEvent::Message { player_id, text });
            }
            EndpointEvent::ChannelClosed => {
                if let Some(mut peer) = self.peers.remove(&player_id) {
                    peer.endpoint.close().await;
                    peer.forwarder.abort();
                    self.publish_connected();
                    let _ = self.events_tx.send(HostEvent::PlayerLeft { player_id });
                }
            }
        }
    }

    fn publish_connected(&self) {
        let connected: Vec<String> = self
            .peers
            .iter()
            .filter(|(_, peer)| peer.open)
            .map(|(player_id, _)| player_id.clone())
            .collect();
        let _ = self.connected_tx.send(connected);
    }
}
