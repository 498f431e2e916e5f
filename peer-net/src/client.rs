use std::collections::HashMap;

use serde::de::DeserializeOwned;

use protocol::signaling::{
    AckResponse, AddressCandidate, AnswerGetResponse, AnswerPublishRequest,
    CandidatePublishRequest, CandidatesByPlayerResponse, CandidatesResponse,
    CreateSessionResponse, ErrorResponse, OfferGetResponse, OfferPublishRequest,
    OfferPublishResponse, PlayerListResponse, PlayerSummary, SessionDescription,
};

use crate::endpoint::{PeerError, PeerErrorKind};

/// Thin typed client over the signaling HTTP surface. Every method is one
/// request/response round trip; polling cadence belongs to the managers.
#[derive(Debug, Clone)]
pub struct SignalingClient {
    http: reqwest::Client,
    base_url: String,
}

impl SignalingClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn parse<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, PeerError> {
        let status = resp.status();
        if status.is_success() {
            return resp
                .json()
                .await
                .map_err(|err| PeerError::new(PeerErrorKind::Http, err.to_string()));
        }
        let kind = match status.as_u16() {
            403 => PeerErrorKind::Unauthorized,
            404 => PeerErrorKind::NotFound,
            429 => PeerErrorKind::RateLimited,
            _ => PeerErrorKind::Http,
        };
        let message = resp
            .json::<ErrorResponse>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| status.to_string());
        Err(PeerError::new(kind, message))
    }

    fn transport_err(err: reqwest::Error) -> PeerError {
        PeerError::new(PeerErrorKind::Signaling, err.to_string())
    }

    pub async fn create_session(&self) -> Result<CreateSessionResponse, PeerError> {
        let resp = self
            .http
            .post(self.url("/session/create"))
            .send()
            .await
            .map_err(Self::transport_err)?;
        Self::parse(resp).await
    }

    pub async fn publish_offer(
        &self,
        room_id: &str,
        request: &OfferPublishRequest,
    ) -> Result<OfferPublishResponse, PeerError> {
        let resp = self
            .http
            .post(self.url(&format!("/session/{room_id}/offer")))
            .json(request)
            .send()
            .await
            .map_err(Self::transport_err)?;
        Self::parse(resp).await
    }

    pub async fn fetch_offer(
        &self,
        room_id: &str,
        player_id: &str,
        host_token: &str,
    ) -> Result<Option<SessionDescription>, PeerError> {
        let resp = self
            .http
            .get(self.url(&format!("/session/{room_id}/offer")))
            .query(&[("playerId", player_id), ("hostToken", host_token)])
            .send()
            .await
            .map_err(Self::transport_err)?;
        let body: OfferGetResponse = Self::parse(resp).await?;
        Ok(body.offer)
    }

    pub async fn fetch_players(
        &self,
        room_id: &str,
        host_token: &str,
    ) -> Result<Vec<PlayerSummary>, PeerError> {
        let resp = self
            .http
            .get(self.url(&format!("/session/{room_id}/offer")))
            .query(&[("hostToken", host_token)])
            .send()
            .await
            .map_err(Self::transport_err)?;
        let body: PlayerListResponse = Self::parse(resp).await?;
        Ok(body.players)
    }

    pub async fn publish_answer(
        &self,
        room_id: &str,
        player_id: &str,
        answer: SessionDescription,
        host_token: &str,
    ) -> Result<(), PeerError> {
        let request = AnswerPublishRequest {
            player_id: Some(player_id.to_string()),
            answer: Some(answer),
            host_token: Some(host_token.to_string()),
        };
        let resp = self
            .http
            .post(self.url(&format!("/session/{room_id}/answer")))
            .json(&request)
            .send()
            .await
            .map_err(Self::transport_err)?;
        let _: AckResponse = Self::parse(resp).await?;
        Ok(())
    }

    pub async fn fetch_answer(
        &self,
        room_id: &str,
        player_id: &str,
        player_token: &str,
    ) -> Result<Option<SessionDescription>, PeerError> {
        let resp = self
            .http
            .get(self.url(&format!("/session/{room_id}/answer")))
            .query(&[("playerId", player_id), ("playerToken", player_token)])
            .send()
            .await
            .map_err(Self::transport_err)?;
        let body: AnswerGetResponse = Self::parse(resp).await?;
        Ok(body.answer)
    }

    pub async fn publish_candidate(
        &self,
        room_id: &str,
        request: &CandidatePublishRequest,
    ) -> Result<(), PeerError> {
        let resp = self
            .http
            .post(self.url(&format!("/session/{room_id}/candidate")))
            .json(request)
            .send()
            .await
            .map_err(Self::transport_err)?;
        let _: AckResponse = Self::parse(resp).await?;
        Ok(())
    }

    pub async fn fetch_candidates(
        &self,
        room_id: &str,
        player_id: &str,
        player_token: &str,
        after_index: usize,
    ) -> Result<Vec<AddressCandidate>, PeerError> {
        let after = after_index.to_string();
        let resp = self
            .http
            .get(self.url(&format!("/session/{room_id}/candidate")))
            .query(&[
                ("playerId", player_id),
                ("playerToken", player_token),
                ("afterIndex", after.as_str()),
            ])
            .send()
            .await
            .map_err(Self::transport_err)?;
        let body: CandidatesResponse = Self::parse(resp).await?;
        Ok(body.candidates)
    }

    pub async fn fetch_candidates_by_player(
        &self,
        room_id: &str,
        host_token: &str,
    ) -> Result<HashMap<String, Vec<AddressCandidate>>, PeerError> {
        let resp = self
            .http
            .get(self.url(&format!("/session/{room_id}/candidate")))
            .query(&[("hostToken", host_token)])
            .send()
            .await
            .map_err(Self::transport_err)?;
        let body: CandidatesByPlayerResponse = Self::parse(resp).await?;
        Ok(body.candidates_by_player)
    }
}
