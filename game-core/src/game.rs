use std::collections::HashMap;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use protocol::pack::Question;
use protocol::payload::{
    GameSettings, LeaderboardEntry, LobbyState, PlayerInfo, PlayerResult, QuestionRevealPayload,
    QuestionShowPayload,
};

use crate::scoring::{time_decay_score, ANSWER_GRACE_MS};
use crate::stats::{build_choice_stats, build_leaderboard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Idle,
    Lobby,
    Countdown,
    Question,
    Reveal,
    Intermission,
    Leaderboard,
    Ended,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("operation not allowed in phase {0:?}")]
    InvalidPhase(GamePhase),
    #[error("no questions loaded")]
    NoQuestions,
    #[error("question cursor out of range")]
    NoCurrentQuestion,
}

/// Why a submission was turned away. Expected outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotAcceptingAnswers,
    Locked,
    QuestionMismatch,
    AlreadyAnswered,
    TimeOutOfRange,
    UnknownPlayer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted { correct: bool, score_delta: u32 },
    Rejected(RejectReason),
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted { .. })
    }
}

/// Authoritative match state, owned by the host runtime. All transitions
/// are guarded; timestamps come from the caller so behavior is replayable.
#[derive(Debug, Clone)]
pub struct Game {
    room_id: String,
    phase: GamePhase,
    players: Vec<PlayerInfo>,
    settings: GameSettings,
    questions: Vec<Question>,
    current_question_index: usize,
    question_start_time: Option<i64>,
    answers: HashMap<String, Vec<String>>,
    scores: HashMap<String, u32>,
    is_locked: bool,
}

impl Game {
    pub fn new(room_id: impl Into<String>, settings: GameSettings) -> Self {
        Self {
            room_id: room_id.into(),
            phase: GamePhase::Idle,
            players: Vec::new(),
            settings,
            questions: Vec::new(),
            current_question_index: 0,
            question_start_time: None,
            answers: HashMap::new(),
            scores: HashMap::new(),
            is_locked: false,
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn players(&self) -> &[PlayerInfo] {
        &self.players
    }

    pub fn scores(&self) -> &HashMap<String, u32> {
        &self.scores
    }

    pub fn answers(&self) -> &HashMap<String, Vec<String>> {
        &self.answers
    }

    pub fn is_locked(&self) -> bool {
        self.is_locked
    }

    pub fn question_start_time(&self) -> Option<i64> {
        self.question_start_time
    }

    pub fn current_question_index(&self) -> usize {
        self.current_question_index
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_question_index)
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn remaining_questions(&self) -> usize {
        self.questions
            .len()
            .saturating_sub(self.current_question_index + 1)
    }

    pub fn lobby_state(&self) -> LobbyState {
        LobbyState {
            room_id: self.room_id.clone(),
            players: self.players.clone(),
            settings: self.settings.clone(),
        }
    }

    pub fn open_lobby(&mut self) {
        if self.phase == GamePhase::Idle {
            self.phase = GamePhase::Lobby;
        }
    }

    /// Add or reconnect a roster member. Scores start at zero on first
    /// sight and survive reconnects.
    pub fn add_player(&mut self, id: impl Into<String>, nickname: impl Into<String>) {
        let id = id.into();
        let nickname = nickname.into();
        if let Some(player) = self.players.iter_mut().find(|p| p.id == id) {
            player.is_connected = true;
            if !nickname.is_empty() {
                player.nickname = nickname;
            }
        } else {
            self.players.push(PlayerInfo {
                id: id.clone(),
                nickname,
                is_ready: false,
                is_connected: true,
            });
            self.scores.entry(id).or_insert(0);
        }
    }

    pub fn remove_player(&mut self, id: &str) {
        self.players.retain(|p| p.id != id);
    }

    pub fn set_player_ready(&mut self, id: &str, is_ready: bool) {
        if let Some(player) = self.players.iter_mut().find(|p| p.id == id) {
            player.is_ready = is_ready;
        }
    }

    /// Disconnected players stay on the roster so their results survive to
    /// the end of the match.
    pub fn set_player_connected(&mut self, id: &str, is_connected: bool) {
        if let Some(player) = self.players.iter_mut().find(|p| p.id == id) {
            player.is_connected = is_connected;
        }
    }

    pub fn set_nickname(&mut self, id: &str, nickname: &str) {
        if let Some(player) = self.players.iter_mut().find(|p| p.id == id) {
            player.nickname = nickname.to_string();
        }
    }

    pub fn set_questions(&mut self, questions: Vec<Question>) {
        self.questions = questions;
    }

    /// idle|lobby -> countdown. Shuffles per settings and zeroes every
    /// current player's score.
    pub fn start_game(&mut self) -> Result<(), GameError> {
        if !matches!(self.phase, GamePhase::Idle | GamePhase::Lobby) {
            return Err(GameError::InvalidPhase(self.phase));
        }
        if self.questions.is_empty() {
            return Err(GameError::NoQuestions);
        }

        let mut rng = rand::thread_rng();
        if self.settings.shuffle_questions {
            self.questions.shuffle(&mut rng);
        }
        if self.settings.shuffle_choices {
            for question in &mut self.questions {
                question.choices.shuffle(&mut rng);
            }
        }

        self.scores = self.players.iter().map(|p| (p.id.clone(), 0)).collect();
        self.answers.clear();
        self.current_question_index = 0;
        self.question_start_time = None;
        self.is_locked = false;
        self.phase = GamePhase::Countdown;
        debug!(room_id = %self.room_id, questions = self.questions.len(), "game started");
        Ok(())
    }

    /// countdown -> question. Clears the answer window and returns the
    /// broadcast payload (which never contains the answer).
    pub fn show_question(&mut self, now_ms: i64) -> Result<QuestionShowPayload, GameError> {
        if self.phase != GamePhase::Countdown {
            return Err(GameError::InvalidPhase(self.phase));
        }
        let total_questions = self.questions.len();
        let index = self.current_question_index;
        let question = self
            .questions
            .get(index)
            .ok_or(GameError::NoCurrentQuestion)?;

        let payload = QuestionShowPayload {
            question_id: question.id.clone(),
            question_index: index,
            total_questions,
            prompt: question.prompt.clone(),
            choices: question.choices.clone(),
            start_time: now_ms,
            duration_ms: self.settings.question_time_limit,
        };

        self.question_start_time = Some(now_ms);
        self.answers.clear();
        self.is_locked = false;
        self.phase = GamePhase::Question;
        Ok(payload)
    }

    /// Record one player's submission. Rejections leave all state intact.
    pub fn submit_answer(
        &mut self,
        player_id: &str,
        question_id: Option<&str>,
        choice_ids: Vec<String>,
        time_ms: i64,
    ) -> SubmitOutcome {
        if self.phase != GamePhase::Question {
            return SubmitOutcome::Rejected(RejectReason::NotAcceptingAnswers);
        }
        if self.is_locked {
            return SubmitOutcome::Rejected(RejectReason::Locked);
        }
        let Some(question) = self.questions.get(self.current_question_index) else {
            return SubmitOutcome::Rejected(RejectReason::QuestionMismatch);
        };
        if self.players.iter().all(|p| p.id != player_id) {
            return SubmitOutcome::Rejected(RejectReason::UnknownPlayer);
        }
        if let Some(question_id) = question_id {
            if question_id != question.id {
                return SubmitOutcome::Rejected(RejectReason::QuestionMismatch);
            }
        }
        if self.answers.contains_key(player_id) {
            return SubmitOutcome::Rejected(RejectReason::AlreadyAnswered);
        }
        if time_ms < 0 || time_ms > self.settings.question_time_limit as i64 + ANSWER_GRACE_MS {
            return SubmitOutcome::Rejected(RejectReason::TimeOutOfRange);
        }

        let correct = choice_ids.iter().any(|id| *id == question.answer.choice_id);
        let score_delta = if correct {
            time_decay_score(self.settings.question_time_limit, time_ms)
        } else {
            0
        };
        self.answers.insert(player_id.to_string(), choice_ids);
        *self.scores.entry(player_id.to_string()).or_insert(0) += score_delta;

        SubmitOutcome::Accepted {
            correct,
            score_delta,
        }
    }

    /// Freeze submissions without leaving the question phase.
    pub fn lock_question(&mut self) {
        self.is_locked = true;
    }

    /// question -> reveal. Locks and produces the per-choice stats plus the
    /// per-player correctness and cumulative-score snapshot.
    pub fn reveal_answer(&mut self) -> Result<QuestionRevealPayload, GameError> {
        if self.phase != GamePhase::Question {
            return Err(GameError::InvalidPhase(self.phase));
        }
        let question = self
            .questions
            .get(self.current_question_index)
            .ok_or(GameError::NoCurrentQuestion)?;

        let correct_choice_id = question.answer.choice_id.clone();
        let (choice_stats, _) = build_choice_stats(&question.choices, &self.answers);
        let results_by_player = self
            .players
            .iter()
            .map(|player| {
                let correct = self
                    .answers
                    .get(&player.id)
                    .is_some_and(|selected| selected.iter().any(|id| *id == correct_choice_id));
                (
                    player.id.clone(),
                    PlayerResult {
                        correct,
                        score: self.scores.get(&player.id).copied().unwrap_or(0),
                    },
                )
            })
            .collect();

        self.phase = GamePhase::Reveal;
        self.is_locked = true;
        Ok(QuestionRevealPayload {
            question_id: question.id.clone(),
            correct_choice_id,
            results_by_player,
            choice_stats,
        })
    }

    /// reveal -> leaderboard (when standings are shown between questions).
    pub fn enter_leaderboard(&mut self) -> Result<(), GameError> {
        if self.phase != GamePhase::Reveal {
            return Err(GameError::InvalidPhase(self.phase));
        }
        self.phase = GamePhase::Leaderboard;
        Ok(())
    }

    /// Advance the cursor: ended when exhausted, countdown when coming off
    /// the leaderboard, intermission otherwise. Returns the new phase.
    pub fn next_question(&mut self) -> Result<GamePhase, GameError> {
        if !matches!(self.phase, GamePhase::Reveal | GamePhase::Leaderboard) {
            return Err(GameError::InvalidPhase(self.phase));
        }
        let next_index = self.current_question_index + 1;
        if next_index >= self.questions.len() {
            self.phase = GamePhase::Ended;
        } else {
            self.current_question_index = next_index;
            self.phase = if self.phase == GamePhase::Leaderboard {
                GamePhase::Countdown
            } else {
                GamePhase::Intermission
            };
        }
        Ok(self.phase)
    }

    /// intermission -> countdown, once the pause between questions is over.
    pub fn begin_countdown(&mut self) -> Result<(), GameError> {
        if self.phase != GamePhase::Intermission {
            return Err(GameError::InvalidPhase(self.phase));
        }
        self.phase = GamePhase::Countdown;
        Ok(())
    }

    /// Host-initiated early termination; valid from any phase.
    pub fn end_game(&mut self) {
        self.phase = GamePhase::Ended;
    }

    /// Back to an empty idle state. The room identity and settings are
    /// configuration and survive.
    pub fn reset(&mut self) {
        self.phase = GamePhase::Idle;
        self.players.clear();
        self.questions.clear();
        self.current_question_index = 0;
        self.question_start_time = None;
        self.answers.clear();
        self.scores.clear();
        self.is_locked = false;
    }

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        build_leaderboard(&self.players, &self.scores)
    }

    /// Drives the auto-reveal policy: every connected player has a
    /// recorded answer for the current question.
    pub fn all_connected_answered(&self) -> bool {
        let connected: Vec<_> = self
            .players
            .iter()
            .filter(|p| p.is_connected)
            .collect();
        !connected.is_empty()
            && connected
                .iter()
                .all(|p| self.answers.contains_key(&p.id))
    }
}
