//! Host match loop: one event loop owning the authoritative `Game`, fed by
//! the connection manager's events and the host UI's commands, driving the
//! phase timers (countdown, question time limit, all-answered grace, reveal
//! and leaderboard holds) and broadcasting phase payloads to the players.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use game_core::{Game, GamePhase};
use peer_net::{HostEvent, HostHandle};
use protocol::envelope::{decode, encode, Message, MessageBody};
use protocol::payload::{
    AnswerAckPayload, GameEndPayload, GameStartPayload, LeaderboardUpdatePayload,
    QuestionLockPayload, RoomJoinedPayload,
};

/// Timer cadence for a match. All knobs are host-local; nothing here is on
/// the wire except the question duration inside `question.show`.
#[derive(Debug, Clone)]
pub struct HostGameConfig {
    pub countdown: Duration,
    pub reveal_hold: Duration,
    pub leaderboard_hold: Duration,
    pub intermission: Duration,
    /// Short delay after the last outstanding answer arrives, batching
    /// near-simultaneous submissions before the reveal.
    pub all_answered_grace: Duration,
}

impl Default for HostGameConfig {
    fn default() -> Self {
        Self {
            countdown: Duration::from_secs(3),
            reveal_hold: Duration::from_secs(5),
            leaderboard_hold: Duration::from_secs(5),
            intermission: Duration::from_secs(2),
            all_answered_grace: Duration::from_millis(400),
        }
    }
}

/// Host-UI intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    StartGame,
    Reveal,
    NextQuestion,
    EndGame,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Countdown,
    QuestionTimeout,
    AllAnsweredGrace,
    RevealHold,
    LeaderboardHold,
    Intermission,
}

#[derive(Clone)]
pub struct HostGameHandle {
    cmd_tx: mpsc::UnboundedSender<HostCommand>,
    phase_rx: watch::Receiver<GamePhase>,
}

impl HostGameHandle {
    pub fn command(&self, command: HostCommand) {
        let _ = self.cmd_tx.send(command);
    }

    pub fn phase(&self) -> GamePhase {
        *self.phase_rx.borrow()
    }

    pub fn phase_watch(&self) -> watch::Receiver<GamePhase> {
        self.phase_rx.clone()
    }
}

pub struct HostGame;

impl HostGame {
    /// Spawn the match loop. It runs until shutdown triggers or the
    /// connection manager's event stream closes, then returns the final
    /// game state.
    pub fn spawn(
        game: Game,
        peers: HostHandle,
        peer_events: mpsc::UnboundedReceiver<HostEvent>,
        config: HostGameConfig,
        shutdown_rx: common::shutdown::ShutdownReceiver,
    ) -> (HostGameHandle, JoinHandle<Game>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(game.phase());

        let driver = MatchDriver {
            game,
            peers,
            config,
            phase_tx,
            timer: None,
        };
        let task = tokio::spawn(driver.run(peer_events, cmd_rx, shutdown_rx));

        (HostGameHandle { cmd_tx, phase_rx }, task)
    }
}

struct MatchDriver {
    game: Game,
    peers: HostHandle,
    config: HostGameConfig,
    phase_tx: watch::Sender<GamePhase>,
    /// At most one pending phase timer; arming replaces the previous one.
    timer: Option<(TimerKind, Instant)>,
}

impl MatchDriver {
    async fn run(
        mut self,
        mut peer_events: mpsc::UnboundedReceiver<HostEvent>,
        mut cmd_rx: mpsc::UnboundedReceiver<HostCommand>,
        shutdown_rx: common::shutdown::ShutdownReceiver,
    ) -> Game {
        self.game.open_lobby();
        self.publish_phase();
        let mut shutdown = std::pin::pin!(common::shutdown::wait(shutdown_rx));

        loop {
            let deadline = self
                .timer
                .map(|(_, at)| at)
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep_until(deadline), if self.timer.is_some() => {
                    let (kind, _) = self.timer.take().expect("armed timer");
                    self.fire_timer(kind);
                }
                event = peer_events.recv() => {
                    match event {
                        Some(event) => self.handle_peer_event(event),
                        None => break,
                    }
                }
                Some(command) = cmd_rx.recv() => {
                    self.handle_command(command);
                }
            }
        }

        self.peers.stop();
        self.game
    }

    fn publish_phase(&self) {
        let _ = self.phase_tx.send(self.game.phase());
    }

    fn arm(&mut self, kind: TimerKind, after: Duration) {
        self.timer = Some((kind, Instant::now() + after));
    }

    fn broadcast(&self, body: MessageBody) {
        match encode(&Message::new(body)) {
            Ok(text) => self.peers.broadcast(text),
            Err(err) => warn!(%err, "broadcast encode failed"),
        }
    }

    fn send(&self, player_id: &str, body: MessageBody) {
        match encode(&Message::new(body)) {
            Ok(text) => self.peers.send(player_id, text),
            Err(err) => warn!(%err, "send encode failed"),
        }
    }

    fn handle_peer_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::PlayerJoined {
                player_id,
                nickname,
            } => {
                self.game
                    .add_player(&player_id, nickname.unwrap_or_default());
                self.broadcast(MessageBody::LobbyUpdate(self.game.lobby_state()));
            }
            HostEvent::PlayerLeft { player_id } => {
                self.game.set_player_connected(&player_id, false);
                self.broadcast(MessageBody::LobbyUpdate(self.game.lobby_state()));
                // A departure can complete the round.
                if self.game.phase() == GamePhase::Question && self.game.all_connected_answered() {
                    self.arm(TimerKind::AllAnsweredGrace, self.config.all_answered_grace);
                }
            }
            HostEvent::Message { player_id, text } => self.handle_message(&player_id, &text),
        }
    }

    fn handle_message(&mut self, player_id: &str, text: &str) {
        let message = match decode(text) {
            Ok(message) => message,
            Err(err) => {
                warn!(%player_id, %err, "undecodable peer message");
                return;
            }
        };

        match message.body {
            MessageBody::RoomJoin(payload) => {
                self.game.set_nickname(player_id, &payload.nickname);
                self.send(
                    player_id,
                    MessageBody::RoomJoined(RoomJoinedPayload {
                        player_id: player_id.to_string(),
                        lobby: self.game.lobby_state(),
                    }),
                );
                self.broadcast(MessageBody::LobbyUpdate(self.game.lobby_state()));
            }
            MessageBody::AnswerSubmit(payload) => {
                // The channel identity is authoritative; the payload's
                // player id is ignored.
                let outcome = self.game.submit_answer(
                    player_id,
                    Some(&payload.question_id),
                    vec![payload.choice_id],
                    payload.time_ms,
                );
                self.send(
                    player_id,
                    MessageBody::AnswerAck(AnswerAckPayload {
                        accepted: outcome.is_accepted(),
                    }),
                );
                if outcome.is_accepted()
                    && self.game.phase() == GamePhase::Question
                    && self.game.all_connected_answered()
                {
                    self.arm(TimerKind::AllAnsweredGrace, self.config.all_answered_grace);
                }
            }
            MessageBody::RoomLeave(_) => {
                self.game.set_player_connected(player_id, false);
                self.broadcast(MessageBody::LobbyUpdate(self.game.lobby_state()));
            }
            other => {
                debug!(%player_id, kind = other.kind(), "ignoring unexpected message");
            }
        }
    }

    fn handle_command(&mut self, command: HostCommand) {
        match command {
            HostCommand::StartGame => match self.game.start_game() {
                Ok(()) => {
                    self.broadcast(MessageBody::GameStart(GameStartPayload {
                        settings: self.game.settings().clone(),
                        question_count: self.game.question_count(),
                    }));
                    self.publish_phase();
                    self.arm(TimerKind::Countdown, self.config.countdown);
                }
                Err(err) => warn!(%err, "start rejected"),
            },
            HostCommand::Reveal => {
                if self.game.phase() == GamePhase::Question {
                    self.do_reveal();
                }
            }
            HostCommand::NextQuestion => {
                if self.game.phase() == GamePhase::Reveal {
                    self.after_reveal();
                } else if self.game.phase() == GamePhase::Leaderboard {
                    self.leave_leaderboard();
                }
            }
            HostCommand::EndGame => {
                self.game.end_game();
                self.finish();
            }
            HostCommand::Reset => {
                self.game.reset();
                self.timer = None;
                self.publish_phase();
            }
        }
    }

    fn fire_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::Countdown => {
                let now_ms = chrono::Utc::now().timestamp_millis();
                match self.game.show_question(now_ms) {
                    Ok(payload) => {
                        let duration = Duration::from_millis(payload.duration_ms);
                        self.broadcast(MessageBody::QuestionShow(payload));
                        self.publish_phase();
                        self.arm(TimerKind::QuestionTimeout, duration);
                    }
                    Err(err) => warn!(%err, "show question failed"),
                }
            }
            TimerKind::QuestionTimeout | TimerKind::AllAnsweredGrace => {
                if self.game.phase() == GamePhase::Question {
                    self.do_reveal();
                }
            }
            TimerKind::RevealHold => self.after_reveal(),
            TimerKind::LeaderboardHold => self.leave_leaderboard(),
            TimerKind::Intermission => {
                if self.game.begin_countdown().is_ok() {
                    self.publish_phase();
                    self.arm(TimerKind::Countdown, self.config.countdown);
                }
            }
        }
    }

    fn do_reveal(&mut self) {
        self.game.lock_question();
        if let Some(question) = self.game.current_question() {
            self.broadcast(MessageBody::QuestionLock(QuestionLockPayload {
                question_id: question.id.clone(),
            }));
        }
        match self.game.reveal_answer() {
            Ok(payload) => {
                self.broadcast(MessageBody::QuestionReveal(payload));
                self.publish_phase();
                self.arm(TimerKind::RevealHold, self.config.reveal_hold);
            }
            Err(err) => warn!(%err, "reveal failed"),
        }
    }

    /// After the reveal hold: show the leaderboard between questions when
    /// configured, otherwise advance directly.
    fn after_reveal(&mut self) {
        if self.game.settings().show_leaderboard && self.game.remaining_questions() > 0 {
            if self.game.enter_leaderboard().is_ok() {
                self.broadcast(MessageBody::LeaderboardUpdate(LeaderboardUpdatePayload {
                    entries: self.game.leaderboard(),
                }));
                self.publish_phase();
                self.arm(TimerKind::LeaderboardHold, self.config.leaderboard_hold);
            }
            return;
        }
        self.advance();
    }

    fn leave_leaderboard(&mut self) {
        self.advance();
    }

    fn advance(&mut self) {
        match self.game.next_question() {
            Ok(GamePhase::Ended) => self.finish(),
            Ok(GamePhase::Countdown) => {
                self.publish_phase();
                self.arm(TimerKind::Countdown, self.config.countdown);
            }
            Ok(GamePhase::Intermission) => {
                self.publish_phase();
                self.arm(TimerKind::Intermission, self.config.intermission);
            }
            Ok(other) => warn!(phase = ?other, "unexpected phase after advance"),
            Err(err) => warn!(%err, "advance failed"),
        }
    }

    fn finish(&mut self) {
        self.timer = None;
        self.broadcast(MessageBody::GameEnd(GameEndPayload {
            final_leaderboard: self.game.leaderboard(),
            total_questions: self.game.question_count(),
        }));
        self.publish_phase();
        debug!(room_id = %self.game.room_id(), "match ended");
    }
}
