use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use protocol::signaling::{AddressCandidate, PlayerSummary, SessionDescription};

use crate::ids;

/// Credentials handed back from session creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionHandle {
    pub room_id: String,
    pub host_token: String,
}

/// Per-player signaling state within a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConnection {
    pub player_id: String,
    #[serde(default)]
    pub nickname: Option<String>,
    /// Bound on the first offer submission; `None` until then.
    #[serde(default)]
    pub player_token: Option<String>,
    #[serde(default)]
    pub offer: Option<SessionDescription>,
    #[serde(default)]
    pub answer: Option<SessionDescription>,
    /// Append-only; consumers slice by index, never by content.
    #[serde(default)]
    pub candidates: Vec<AddressCandidate>,
    pub created_at: i64,
}

impl PlayerConnection {
    fn new(player_id: &str) -> Self {
        Self {
            player_id: player_id.to_string(),
            nickname: None,
            player_token: None,
            offer: None,
            answer: None,
            candidates: Vec::new(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn summary(&self) -> PlayerSummary {
        PlayerSummary {
            player_id: self.player_id.clone(),
            nickname: self.nickname.clone(),
            has_offer: self.offer.is_some(),
            has_answer: self.answer.is_some(),
            candidate_count: self.candidates.len(),
        }
    }
}

/// One game room's signaling record. `host_token` is minted once at
/// creation and never rotated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub room_id: String,
    pub host_token: String,
    pub created_at: i64,
    #[serde(default)]
    pub players: HashMap<String, PlayerConnection>,
}

impl Session {
    pub fn new(room_id: String) -> Self {
        Self {
            room_id,
            host_token: ids::generate_token(),
            created_at: chrono::Utc::now().timestamp_millis(),
            players: HashMap::new(),
        }
    }

    /// Store an offer, creating the player and binding a token on first
    /// contact. Returns the player's bound token.
    pub fn apply_offer(
        &mut self,
        player_id: &str,
        nickname: Option<&str>,
        offer: SessionDescription,
    ) -> String {
        let player = self
            .players
            .entry(player_id.to_string())
            .or_insert_with(|| PlayerConnection::new(player_id));
        if let Some(nickname) = nickname {
            player.nickname = Some(nickname.to_string());
        }
        player.offer = Some(offer);
        player
            .player_token
            .get_or_insert_with(ids::generate_token)
            .clone()
    }

    /// Store the host's answer. Returns false when the player is unknown.
    pub fn apply_answer(&mut self, player_id: &str, answer: SessionDescription) -> bool {
        match self.players.get_mut(player_id) {
            Some(player) => {
                player.answer = Some(answer);
                true
            }
            None => false,
        }
    }

    pub fn push_candidate(&mut self, player_id: &str, candidate: AddressCandidate) {
        self.players
            .entry(player_id.to_string())
            .or_insert_with(|| PlayerConnection::new(player_id))
            .candidates
            .push(candidate);
    }

    pub fn player_list(&self) -> Vec<PlayerSummary> {
        self.players.values().map(PlayerConnection::summary).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_binds_token_once() {
        let mut session = Session::new("ROOM42".to_string());
        let first = session.apply_offer("p1", Some("ada"), SessionDescription::offer("sdp-1"));
        let second = session.apply_offer("p1", None, SessionDescription::offer("sdp-2"));

        assert_eq!(first, second);
        let player = &session.players["p1"];
        assert_eq!(player.nickname.as_deref(), Some("ada"));
        assert_eq!(player.offer.as_ref().unwrap().sdp, "sdp-2");
    }

    #[test]
    fn candidate_creates_player_before_offer() {
        let mut session = Session::new("ROOM42".to_string());
        session.push_candidate(
            "p1",
            AddressCandidate {
                candidate: "candidate:1".to_string(),
                sdp_mid: None,
                sdp_m_line_index: None,
            },
        );

        let player = &session.players["p1"];
        assert!(player.offer.is_none());
        assert!(player.player_token.is_none());
        assert_eq!(player.candidates.len(), 1);
    }

    #[test]
    fn answer_for_unknown_player_is_rejected() {
        let mut session = Session::new("ROOM42".to_string());
        assert!(!session.apply_answer("ghost", SessionDescription::answer("sdp")));
    }

    #[test]
    fn serde_roundtrip_preserves_players() {
        let mut session = Session::new("ROOM42".to_string());
        session.apply_offer("p1", Some("ada"), SessionDescription::offer("sdp"));
        session.push_candidate(
            "p1",
            AddressCandidate {
                candidate: "candidate:1".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_m_line_index: Some(0),
            },
        );

        let text = serde_json::to_string(&session).unwrap();
        let restored: Session = serde_json::from_str(&text).unwrap();
        assert_eq!(restored.room_id, "ROOM42");
        assert_eq!(restored.players["p1"].candidates.len(), 1);
        assert_eq!(
            restored.players["p1"].player_token,
            session.players["p1"].player_token
        );
    }
}
