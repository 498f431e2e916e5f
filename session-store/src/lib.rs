pub mod ids;
pub mod memory;
pub mod redis;
pub mod session;

use async_trait::async_trait;
use thiserror::Error;

use protocol::signaling::{AddressCandidate, PlayerSummary, SessionDescription};

pub use memory::{run_sweeper, MemorySessionStore};
pub use redis::RedisSessionStore;
pub use session::{PlayerConnection, Session, SessionHandle};

/// Default signaling session lifetime.
pub const SESSION_TTL_SECS: u64 = 4 * 3600;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend: {0}")]
    Backend(String),
    #[error("session encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Rendezvous state per room. The store is trusting: token checks belong to
/// the protocol handler in front of it. Mutating operations on a missing
/// session are no-ops, signalled through `Option`, never errors.
///
/// Implementations must serialize concurrent mutations to the same room so
/// racing candidate appends are never lost.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Mint a fresh room id and host token and persist an empty session.
    async fn create_session(&self) -> Result<SessionHandle, StoreError>;

    async fn get_session(&self, room_id: &str) -> Result<Option<Session>, StoreError>;

    /// Store a player's offer, creating the player record if needed. Binds
    /// a fresh player token on the first offer and returns the bound token.
    /// `Ok(None)` when the session does not exist.
    async fn set_player_offer(
        &self,
        room_id: &str,
        player_id: &str,
        nickname: Option<&str>,
        offer: SessionDescription,
    ) -> Result<Option<String>, StoreError>;

    /// Store the host's answer for a player. No-op when the session or the
    /// player is absent.
    async fn set_player_answer(
        &self,
        room_id: &str,
        player_id: &str,
        answer: SessionDescription,
    ) -> Result<(), StoreError>;

    /// Append an address candidate, creating the player record if absent
    /// (candidates may race ahead of offer delivery).
    async fn add_candidate(
        &self,
        room_id: &str,
        player_id: &str,
        candidate: AddressCandidate,
    ) -> Result<(), StoreError>;

    async fn get_player(
        &self,
        room_id: &str,
        player_id: &str,
    ) -> Result<Option<PlayerConnection>, StoreError>;

    /// Presence summaries for every player in the room; `Ok(None)` when the
    /// session does not exist.
    async fn get_player_list(
        &self,
        room_id: &str,
    ) -> Result<Option<Vec<PlayerSummary>>, StoreError>;
}
