use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use protocol::signaling::{AddressCandidate, PlayerSummary, SessionDescription};

use crate::session::{PlayerConnection, Session, SessionHandle};
use crate::{ids, SessionStore, StoreError, SESSION_TTL_SECS};

/// In-process fallback backend. A single write lock per store serializes
/// every read-modify-write, which also covers racing candidate appends for
/// the same room.
#[derive(Debug, Clone)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(SESSION_TTL_SECS))
    }
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Drop sessions older than the TTL. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let cutoff = chrono::Utc::now().timestamp_millis() - self.ttl.as_millis() as i64;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.created_at > cutoff);
        let removed = before - sessions.len();
        if removed > 0 {
            info!(removed, "swept expired sessions");
        }
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self) -> Result<SessionHandle, StoreError> {
        let mut sessions = self.sessions.write().await;
        let room_id = loop {
            let candidate = ids::generate_room_id();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        let session = Session::new(room_id.clone());
        let handle = SessionHandle {
            room_id: room_id.clone(),
            host_token: session.host_token.clone(),
        };
        sessions.insert(room_id, session);
        debug!(room_id = %handle.room_id, "session created");
        Ok(handle)
    }

    async fn get_session(&self, room_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(room_id).cloned())
    }

    async fn set_player_offer(
        &self,
        room_id: &str,
        player_id: &str,
        nickname: Option<&str>,
        offer: SessionDescription,
    ) -> Result<Option<String>, StoreError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions
            .get_mut(room_id)
            .map(|session| session.apply_offer(player_id, nickname, offer)))
    }

    async fn set_player_answer(
        &self,
        room_id: &str,
        player_id: &str,
        answer: SessionDescription,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(room_id) {
            session.apply_answer(player_id, answer);
        }
        Ok(())
    }

    async fn add_candidate(
        &self,
        room_id: &str,
        player_id: &str,
        candidate: AddressCandidate,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(room_id) {
            session.push_candidate(player_id, candidate);
        }
        Ok(())
    }

    async fn get_player(
        &self,
        room_id: &str,
        player_id: &str,
    ) -> Result<Option<PlayerConnection>, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(room_id)
            .and_then(|session| session.players.get(player_id))
            .cloned())
    }

    async fn get_player_list(
        &self,
        room_id: &str,
    ) -> Result<Option<Vec<PlayerSummary>>, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(room_id)
            .map(Session::player_list))
    }
}

/// Periodic TTL sweep for the in-memory backend (the Redis backend expires
/// keys on its own). Runs until shutdown is triggered.
pub async fn run_sweeper(
    store: MemorySessionStore,
    period: Duration,
    shutdown_rx: common::shutdown::ShutdownReceiver,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut shutdown = std::pin::pin!(common::shutdown::wait(shutdown_rx));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                store.sweep().await;
            }
            _ = &mut shutdown => {
                debug!("session sweeper stopped");
                return;
            }
        }
    }
}
