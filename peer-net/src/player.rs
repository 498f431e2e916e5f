//! Player-side connection manager: publishes one offer, polls for the
//! host's answer and for address candidates, and reports the single data
//! channel's lifecycle to its owner.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use protocol::signaling::{CandidatePublishRequest, OfferPublishRequest};

use crate::client::SignalingClient;
use crate::endpoint::{
    EndpointEvent, EndpointFactory, EndpointRole, PeerError, PeerErrorKind,
};

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub base_url: String,
    pub room_id: String,
    /// `None` lets the rendezvous mint an id.
    pub player_id: Option<String>,
    pub nickname: Option<String>,
    /// Cadence for answer and candidate polling.
    pub poll_interval: Duration,
    /// Pause between negotiation attempts in `connect_with_retry`.
    pub reconnect_delay: Duration,
}

impl PlayerConfig {
    pub fn new(base_url: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            room_id: room_id.into(),
            player_id: None,
            nickname: None,
            poll_interval: Duration::from_millis(500),
            reconnect_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Connected { player_id: String },
    Message(String),
    Disconnected,
}

enum PlayerCmd {
    Send { text: String },
    Stop,
}

#[derive(Clone)]
pub struct PlayerHandle {
    cmd_tx: mpsc::UnboundedSender<PlayerCmd>,
    player_id: String,
    player_token: String,
}

impl PlayerHandle {
    pub fn send(&self, text: impl Into<String>) {
        let _ = self.cmd_tx.send(PlayerCmd::Send { text: text.into() });
    }

    pub fn stop(&self) {
        let _ = self.cmd_tx.send(PlayerCmd::Stop);
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn player_token(&self) -> &str {
        &self.player_token
    }
}

pub struct PlayerConnectionManager;

impl PlayerConnectionManager {
    /// One full negotiation attempt. On failure the old endpoint is
    /// unusable; retrying means a fresh call with a fresh offer.
    pub async fn connect(
        config: PlayerConfig,
        factory: Arc<dyn EndpointFactory>,
    ) -> Result<(PlayerHandle, mpsc::UnboundedReceiver<PlayerEvent>), PeerError> {
        let client = SignalingClient::new(config.base_url.clone());

        let mut endpoint = factory.create_endpoint(EndpointRole::Offerer);
        let mut endpoint_events = endpoint
            .take_events()
            .expect("fresh endpoint yields its event queue");

        let offer = endpoint.create_offer().await?;
        let response = client
            .publish_offer(
                &config.room_id,
                &OfferPublishRequest {
                    player_id: config.player_id.clone(),
                    player_token: None,
                    nickname: config.nickname.clone(),
                    offer: Some(offer.clone()),
                    host_token: None,
                },
            )
            .await?;
        let player_id = response.player_id;
        let player_token = response.player_token;
        // Local candidates start flowing only now, so every one of them is
        // published with the bound token.
        endpoint.set_local_description(offer).await?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        let handle = PlayerHandle {
            cmd_tx,
            player_id: player_id.clone(),
            player_token: player_token.clone(),
        };

        let room_id = config.room_id.clone();
        let poll_interval = config.poll_interval;
        tokio::spawn(async move {
            let mut remote_applied = false;
            let mut candidate_cursor = 0usize;
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !remote_applied {
                            match client.fetch_answer(&room_id, &player_id, &player_token).await {
                                Ok(Some(answer)) => {
                                    match endpoint.set_remote_description(answer).await {
                                        Ok(()) => remote_applied = true,
                                        Err(err) => warn!(%err, "answer apply failed"),
                                    }
                                }
                                Ok(None) => {}
                                Err(err) => warn!(%err, "answer poll failed"),
                            }
                        }
                        if remote_applied {
                            match client
                                .fetch_candidates(&room_id, &player_id, &player_token, candidate_cursor)
                                .await
                            {
                                Ok(candidates) => {
                                    for candidate in candidates {
                                        candidate_cursor += 1;
                                        if let Err(err) =
                                            endpoint.add_remote_candidate(candidate).await
                                        {
                                            debug!(%err, "candidate not applied");
                                        }
                                    }
                                }
                                Err(err) => warn!(%err, "candidate poll failed"),
                            }
                        }
                    }
                    event = endpoint_events.recv() => {
                        match event {
                            Some(EndpointEvent::LocalCandidate(candidate)) => {
                                let request = CandidatePublishRequest {
                                    player_id: Some(player_id.clone()),
                                    player_token: Some(player_token.clone()),
                                    candidate: Some(candidate),
                                    host_token: None,
                                };
                                if let Err(err) =
                                    client.publish_candidate(&room_id, &request).await
                                {
                                    warn!(%err, "candidate publish failed");
                                }
                            }
                            Some(EndpointEvent::ChannelOpen) => {
                                let _ = events_tx.send(PlayerEvent::Connected {
                                    player_id: player_id.clone(),
                                });
                            }
                            Some(EndpointEvent::Message(text)) => {
                                let _ = events_tx.send(PlayerEvent::Message(text));
                            }
                            Some(EndpointEvent::ChannelClosed) | None => {
                                let _ = events_tx.send(PlayerEvent::Disconnected);
                                break;
                            }
                        }
                    }
                    cmd = cmd_rx.recv() => {
                        match cmd {
                            Some(PlayerCmd::Send { text }) => {
                                if let Err(err) = endpoint.send_text(&text) {
                                    debug!(%err, "send dropped");
                                }
                            }
                            Some(PlayerCmd::Stop) | None => {
                                endpoint.close().await;
                                break;
                            }
                        }
                    }
                }
            }
            debug!(%player_id, "player connection manager stopped");
        });

        Ok((handle, events_rx))
    }

    /// Unbounded fixed-delay retry around `connect`, for owners that just
    /// want a connection eventually. Each attempt is a complete fresh
    /// negotiation.
    pub async fn connect_with_retry(
        config: PlayerConfig,
        factory: Arc<dyn EndpointFactory>,
        shutdown_rx: common::shutdown::ShutdownReceiver,
    ) -> Result<(PlayerHandle, mpsc::UnboundedReceiver<PlayerEvent>), PeerError> {
        loop {
            match Self::connect(config.clone(), factory.clone()).await {
                Ok(connected) => return Ok(connected),
                Err(err) => {
                    warn!(%err, delay_ms = config.reconnect_delay.as_millis() as u64,
                        "negotiation failed, retrying");
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(config.reconnect_delay) => {}
                _ = common::shutdown::wait(shutdown_rx.clone()) => {
                    return Err(PeerError::new(PeerErrorKind::Cancelled, "shutdown"));
                }
            }
        }
    }
}
