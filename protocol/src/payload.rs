use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::pack::Choice;

/// Match settings, agreed at the lobby and broadcast with `game.start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameSettings {
    pub question_time_limit: u64,
    pub show_leaderboard: bool,
    pub shuffle_questions: bool,
    pub shuffle_choices: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            question_time_limit: 20_000,
            show_leaderboard: true,
            shuffle_questions: false,
            shuffle_choices: false,
        }
    }
}

/// Roster entry shared in lobby updates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub id: String,
    pub nickname: String,
    pub is_ready: bool,
    pub is_connected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoinPayload {
    pub nickname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoinedPayload {
    pub player_id: String,
    pub lobby: LobbyState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomLeavePayload {
    pub player_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyState {
    pub room_id: String,
    pub players: Vec<PlayerInfo>,
    pub settings: GameSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStartPayload {
    pub settings: GameSettings,
    pub question_count: usize,
}

/// Broadcast when a question opens. Never carries the correct answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionShowPayload {
    pub question_id: String,
    pub question_index: usize,
    pub total_questions: usize,
    pub prompt: String,
    pub choices: Vec<Choice>,
    pub start_time: i64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionLockPayload {
    pub question_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResult {
    pub correct: bool,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceStat {
    pub count: u32,
    pub percent: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRevealPayload {
    pub question_id: String,
    pub correct_choice_id: String,
    pub results_by_player: HashMap<String, PlayerResult>,
    pub choice_stats: HashMap<String, ChoiceStat>,
}

/// Player to host: one selected choice for the current question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmitPayload {
    pub player_id: String,
    pub question_id: String,
    pub choice_id: String,
    pub time_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerAckPayload {
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: String,
    pub nickname: String,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardUpdatePayload {
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEndPayload {
    pub final_leaderboard: Vec<LeaderboardEntry>,
    pub total_questions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_fields_serialize_camel_case() {
        let payload = QuestionShowPayload {
            question_id: "q1".into(),
            question_index: 0,
            total_questions: 3,
            prompt: "Capital of France?".into(),
            choices: vec![],
            start_time: 1_000,
            duration_ms: 20_000,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("questionId").is_some());
        assert!(value.get("durationMs").is_some());
        assert!(value.get("question_id").is_none());
    }
}
