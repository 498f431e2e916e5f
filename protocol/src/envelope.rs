use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::payload::{
    AnswerAckPayload, AnswerSubmitPayload, GameEndPayload, GameStartPayload, LeaderboardUpdatePayload,
    LobbyState, QuestionLockPayload, QuestionRevealPayload, QuestionShowPayload, RoomJoinPayload,
    RoomJoinedPayload, RoomLeavePayload,
};

pub const PROTOCOL_VERSION: u8 = 1;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
}

/// Envelope carried on the data channel once a peer is connected.
/// The `t` tag selects the payload shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub v: u8,
    pub id: String,
    pub ts: i64,
    #[serde(flatten)]
    pub body: MessageBody,
}

/// Payload distinguishing the message kinds, tagged by `t`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", content = "payload")]
pub enum MessageBody {
    #[serde(rename = "room.join")]
    RoomJoin(RoomJoinPayload),
    #[serde(rename = "room.joined")]
    RoomJoined(RoomJoinedPayload),
    #[serde(rename = "room.leave")]
    RoomLeave(RoomLeavePayload),
    #[serde(rename = "lobby.update")]
    LobbyUpdate(LobbyState),
    #[serde(rename = "game.start")]
    GameStart(GameStartPayload),
    #[serde(rename = "game.end")]
    GameEnd(GameEndPayload),
    #[serde(rename = "question.show")]
    QuestionShow(QuestionShowPayload),
    #[serde(rename = "question.lock")]
    QuestionLock(QuestionLockPayload),
    #[serde(rename = "question.reveal")]
    QuestionReveal(QuestionRevealPayload),
    #[serde(rename = "answer.submit")]
    AnswerSubmit(AnswerSubmitPayload),
    #[serde(rename = "answer.ack")]
    AnswerAck(AnswerAckPayload),
    #[serde(rename = "leaderboard.update")]
    LeaderboardUpdate(LeaderboardUpdatePayload),
}

impl MessageBody {
    /// The wire tag for this message kind.
    pub fn kind(&self) -> &'static str {
        match self {
            MessageBody::RoomJoin(_) => "room.join",
            MessageBody::RoomJoined(_) => "room.joined",
            MessageBody::RoomLeave(_) => "room.leave",
            MessageBody::LobbyUpdate(_) => "lobby.update",
            MessageBody::GameStart(_) => "game.start",
            MessageBody::GameEnd(_) => "game.end",
            MessageBody::QuestionShow(_) => "question.show",
            MessageBody::QuestionLock(_) => "question.lock",
            MessageBody::QuestionReveal(_) => "question.reveal",
            MessageBody::AnswerSubmit(_) => "answer.submit",
            MessageBody::AnswerAck(_) => "answer.ack",
            MessageBody::LeaderboardUpdate(_) => "leaderboard.update",
        }
    }
}

impl Message {
    pub fn new(body: MessageBody) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            id: Uuid::new_v4().to_string(),
            ts: chrono::Utc::now().timestamp_millis(),
            body,
        }
    }
}

/// Encode a message into its JSON text framing.
pub fn encode(message: &Message) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

/// Decode a message from JSON text, rejecting unknown protocol versions.
pub fn decode(text: &str) -> Result<Message, ProtocolError> {
    let message: Message = serde_json::from_str(text)?;
    if message.v != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(message.v));
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrip() {
        let message = Message::new(MessageBody::AnswerSubmit(AnswerSubmitPayload {
            player_id: "p1".into(),
            question_id: "q1".into(),
            choice_id: "c2".into(),
            time_ms: 4200,
        }));

        let text = encode(&message).expect("encode");
        let decoded = decode(&text).expect("decode");

        assert_eq!(decoded.v, PROTOCOL_VERSION);
        assert_eq!(decoded.body.kind(), "answer.submit");
        match decoded.body {
            MessageBody::AnswerSubmit(payload) => {
                assert_eq!(payload.question_id, "q1");
                assert_eq!(payload.time_ms, 4200);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn tag_and_payload_keys_on_the_wire() {
        let message = Message::new(MessageBody::AnswerAck(AnswerAckPayload { accepted: true }));
        let text = encode(&message).expect("encode");
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["v"], 1);
        assert_eq!(value["t"], "answer.ack");
        assert_eq!(value["payload"]["accepted"], true);
        assert!(value["id"].is_string());
        assert!(value["ts"].is_i64());
    }

    #[test]
    fn rejects_unknown_version() {
        let text = r#"{"v":9,"id":"x","ts":0,"t":"answer.ack","payload":{"accepted":false}}"#;
        assert!(matches!(
            decode(text),
            Err(ProtocolError::UnsupportedVersion(9))
        ));
    }
}
