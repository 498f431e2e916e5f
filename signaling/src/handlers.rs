use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use protocol::signaling::{
    AckResponse, AnswerGetResponse, AnswerPublishRequest, CandidatePublishRequest,
    CandidatesByPlayerResponse, CandidatesResponse, CreateSessionResponse, OfferGetResponse,
    OfferPublishRequest, OfferPublishResponse, PlayerListResponse, SessionResponse,
};
use session_store::Session;

use crate::error::SignalingError;
use crate::AppState;

fn host_authorized(session: &Session, token: Option<&str>) -> bool {
    token == Some(session.host_token.as_str())
}

fn require_host(session: &Session, token: Option<&str>) -> Result<(), SignalingError> {
    if host_authorized(session, token) {
        Ok(())
    } else {
        Err(SignalingError::Authorization("invalid host token".into()))
    }
}

fn player_token_matches(session: &Session, player_id: &str, token: Option<&str>) -> bool {
    session
        .players
        .get(player_id)
        .and_then(|player| player.player_token.as_deref())
        .is_some_and(|bound| token == Some(bound))
}

async fn load_session(state: &AppState, room_id: &str) -> Result<Session, SignalingError> {
    state
        .store
        .get_session(room_id)
        .await?
        .ok_or_else(|| SignalingError::NotFound("session not found".into()))
}

pub async fn create_session(
    State(state): State<AppState>,
) -> Result<Json<CreateSessionResponse>, SignalingError> {
    let handle = state.store.create_session().await?;
    debug!(room_id = %handle.room_id, "session created");
    Ok(Json(CreateSessionResponse {
        room_id: handle.room_id,
        host_token: handle.host_token,
    }))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<SessionResponse>, SignalingError> {
    let session = load_session(&state, &room_id).await?;
    Ok(Json(SessionResponse {
        room_id: session.room_id.clone(),
        players: session.player_list(),
    }))
}

pub async fn post_offer(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(req): Json<OfferPublishRequest>,
) -> Result<Json<OfferPublishResponse>, SignalingError> {
    let offer = req
        .offer
        .ok_or_else(|| SignalingError::Validation("offer is required".into()))?;
    let session = load_session(&state, &room_id).await?;

    let as_host = match req.host_token.as_deref() {
        Some(token) => {
            require_host(&session, Some(token))?;
            true
        }
        None => false,
    };

    let player_id = req
        .player_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    // First submission binds the token; resubmission requires it back.
    if !as_host {
        let bound = session
            .players
            .get(&player_id)
            .and_then(|player| player.player_token.as_deref());
        if let Some(bound) = bound {
            if req.player_token.as_deref() != Some(bound) {
                return Err(SignalingError::Authorization("invalid player token".into()));
            }
        }
    }

    let player_token = state
        .store
        .set_player_offer(&room_id, &player_id, req.nickname.as_deref(), offer)
        .await?
        .ok_or_else(|| SignalingError::NotFound("session not found".into()))?;

    Ok(Json(OfferPublishResponse {
        success: true,
        player_id,
        player_token,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferQuery {
    player_id: Option<String>,
    player_token: Option<String>,
    host_token: Option<String>,
}

pub async fn get_offer(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<OfferQuery>,
) -> Result<Response, SignalingError> {
    let session = load_session(&state, &room_id).await?;

    let Some(player_id) = query.player_id else {
        // No player scope: the host's polling view, presence flags only.
        require_host(&session, query.host_token.as_deref())?;
        return Ok(Json(PlayerListResponse {
            players: session.player_list(),
        })
        .into_response());
    };

    let player = session
        .players
        .get(&player_id)
        .ok_or_else(|| SignalingError::NotFound("player not found".into()))?;

    if !host_authorized(&session, query.host_token.as_deref())
        && !player_token_matches(&session, &player_id, query.player_token.as_deref())
    {
        return Err(SignalingError::Authorization(
            "host or player token required".into(),
        ));
    }

    Ok(Json(OfferGetResponse {
        offer: player.offer.clone(),
    })
    .into_response())
}

pub async fn post_answer(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(req): Json<AnswerPublishRequest>,
) -> Result<Json<AckResponse>, SignalingError> {
    let answer = req
        .answer
        .ok_or_else(|| SignalingError::Validation("answer is required".into()))?;
    let player_id = req
        .player_id
        .ok_or_else(|| SignalingError::Validation("playerId is required".into()))?;

    let session = load_session(&state, &room_id).await?;
    require_host(&session, req.host_token.as_deref())?;

    state
        .store
        .set_player_answer(&room_id, &player_id, answer)
        .await?;
    Ok(Json(AckResponse { success: true }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerQuery {
    player_id: Option<String>,
    player_token: Option<String>,
}

pub async fn get_answer(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<AnswerQuery>,
) -> Result<Json<AnswerGetResponse>, SignalingError> {
    let player_id = query
        .player_id
        .ok_or_else(|| SignalingError::Validation("playerId is required".into()))?;

    let session = load_session(&state, &room_id).await?;
    let player = session
        .players
        .get(&player_id)
        .ok_or_else(|| SignalingError::NotFound("player not found".into()))?;

    if !player_token_matches(&session, &player_id, query.player_token.as_deref()) {
        return Err(SignalingError::Authorization("invalid player token".into()));
    }

    Ok(Json(AnswerGetResponse {
        answer: player.answer.clone(),
    }))
}

pub async fn post_candidate(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(req): Json<CandidatePublishRequest>,
) -> Result<Json<AckResponse>, SignalingError> {
    let candidate = req
        .candidate
        .ok_or_else(|| SignalingError::Validation("candidate is required".into()))?;
    let player_id = req
        .player_id
        .ok_or_else(|| SignalingError::Validation("playerId is required".into()))?;

    let session = load_session(&state, &room_id).await?;

    match req.host_token.as_deref() {
        // Host may append on behalf of any player.
        Some(token) => require_host(&session, Some(token))?,
        None => {
            // A bound token must match; an unbound player may still push
            // candidates that raced ahead of its first offer.
            let bound = session
                .players
                .get(&player_id)
                .and_then(|player| player.player_token.as_deref());
            if bound.is_some() && req.player_token.as_deref() != bound {
                return Err(SignalingError::Authorization("invalid player token".into()));
            }
        }
    }

    state
        .store
        .add_candidate(&room_id, &player_id, candidate)
        .await?;
    Ok(Json(AckResponse { success: true }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateQuery {
    player_id: Option<String>,
    player_token: Option<String>,
    host_token: Option<String>,
    after_index: Option<usize>,
}

pub async fn get_candidate(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<CandidateQuery>,
) -> Result<Response, SignalingError> {
    let session = load_session(&state, &room_id).await?;

    if let Some(player_id) = query.player_id {
        let player = session
            .players
            .get(&player_id)
            .ok_or_else(|| SignalingError::NotFound("player not found".into()))?;

        if !host_authorized(&session, query.host_token.as_deref())
            && !player_token_matches(&session, &player_id, query.player_token.as_deref())
        {
            return Err(SignalingError::Authorization(
                "host or player token required".into(),
            ));
        }

        let after = query.after_index.unwrap_or(0).min(player.candidates.len());
        return Ok(Json(CandidatesResponse {
            candidates: player.candidates[after..].to_vec(),
        })
        .into_response());
    }

    if query.host_token.is_some() {
        require_host(&session, query.host_token.as_deref())?;
        let candidates_by_player = session
            .players
            .iter()
            .map(|(player_id, player)| (player_id.clone(), player.candidates.clone()))
            .collect();
        return Ok(Json(CandidatesByPlayerResponse {
            candidates_by_player,
        })
        .into_response());
    }

    Err(SignalingError::Validation(
        "playerId or hostToken required".into(),
    ))
}
