use async_trait::async_trait;
use tracing::debug;

use ::redis::aio::ConnectionManager;
use ::redis::AsyncCommands;

use protocol::signaling::{AddressCandidate, PlayerSummary, SessionDescription};

use crate::session::{PlayerConnection, Session, SessionHandle};
use crate::{SessionStore, StoreError, SESSION_TTL_SECS};

/// TTL-capable external backend: one JSON value per room under
/// `session:{roomId}`, rewritten with a refreshed expiry on every mutation.
#[derive(Clone)]
pub struct RedisSessionStore {
    manager: ConnectionManager,
    ttl_secs: u64,
}

impl RedisSessionStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Self::connect_with_ttl(url, SESSION_TTL_SECS).await
    }

    pub async fn connect_with_ttl(url: &str, ttl_secs: u64) -> Result<Self, StoreError> {
        let client = ::redis::Client::open(url).map_err(StoreError::from)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager, ttl_secs })
    }

    fn key(room_id: &str) -> String {
        format!("session:{room_id}")
    }

    async fn load(&self, room_id: &str) -> Result<Option<Session>, StoreError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(Self::key(room_id)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let raw = serde_json::to_string(session)?;
        conn.set_ex::<_, _, ()>(Self::key(&session.room_id), raw, self.ttl_secs)
            .await?;
        Ok(())
    }

    /// Load-mutate-save against a single key. Within one process the
    /// protocol handlers serialize through this call; across processes the
    /// last write wins, same as the single-value layout implies.
    async fn update<F, T>(&self, room_id: &str, mutate: F) -> Result<Option<T>, StoreError>
    where
        F: FnOnce(&mut Session) -> T + Send,
    {
        let Some(mut session) = self.load(room_id).await? else {
            return Ok(None);
        };
        let out = mutate(&mut session);
        self.save(&session).await?;
        Ok(Some(out))
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create_session(&self) -> Result<SessionHandle, StoreError> {
        let mut conn = self.manager.clone();
        loop {
            let session = Session::new(crate::ids::generate_room_id());
            let raw = serde_json::to_string(&session)?;
            // SET NX EX claims the room id atomically; a collision retries.
            let claimed: Option<String> = ::redis::cmd("SET")
                .arg(Self::key(&session.room_id))
                .arg(&raw)
                .arg("NX")
                .arg("EX")
                .arg(self.ttl_secs)
                .query_async(&mut conn)
                .await?;
            if claimed.is_some() {
                debug!(room_id = %session.room_id, "session created");
                return Ok(SessionHandle {
                    room_id: session.room_id,
                    host_token: session.host_token,
                });
            }
        }
    }

    async fn get_session(&self, room_id: &str) -> Result<Option<Session>, StoreError> {
        self.load(room_id).await
    }

    async fn set_player_offer(
        &self,
        room_id: &str,
        player_id: &str,
        nickname: Option<&str>,
        offer: SessionDescription,
    ) -> Result<Option<String>, StoreError> {
        self.update(room_id, |session| session.apply_offer(player_id, nickname, offer))
            .await
    }

    async fn set_player_answer(
        &self,
        room_id: &str,
        player_id: &str,
        answer: SessionDescription,
    ) -> Result<(), StoreError> {
        self.update(room_id, |session| session.apply_answer(player_id, answer))
            .await?;
        Ok(())
    }

    async fn add_candidate(
        &self,
        room_id: &str,
        player_id: &str,
        candidate: AddressCandidate,
    ) -> Result<(), StoreError> {
        self.update(room_id, |session| session.push_candidate(player_id, candidate))
            .await?;
        Ok(())
    }

    async fn get_player(
        &self,
        room_id: &str,
        player_id: &str,
    ) -> Result<Option<PlayerConnection>, StoreError> {
        Ok(self
            .load(room_id)
            .await?
            .and_then(|session| session.players.get(player_id).cloned()))
    }

    async fn get_player_list(
        &self,
        room_id: &str,
    ) -> Result<Option<Vec<PlayerSummary>>, StoreError> {
        Ok(self.load(room_id).await?.map(|session| session.player_list()))
    }
}
