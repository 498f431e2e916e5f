use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use game_core::{Game, GamePhase};
use game_host::{HostCommand, HostGame, HostGameConfig};
use peer_net::{
    HostConfig, HostConnectionManager, LoopbackFactory, LoopbackNetwork, PlayerConfig,
    PlayerConnectionManager, PlayerEvent, PlayerHandle, SignalingClient,
};
use protocol::envelope::{decode, encode, Message, MessageBody};
use protocol::pack::{Answer, Choice, Question, QuestionType};
use protocol::payload::{AnswerSubmitPayload, GameSettings, RoomJoinPayload};
use session_store::{MemorySessionStore, SessionStore};
use signaling::SignalingConfig;

const WAIT: Duration = Duration::from_secs(10);

fn question(id: &str) -> Question {
    Question {
        id: id.to_string(),
        kind: QuestionType::Mcq,
        prompt: format!("prompt {id}"),
        choices: vec![
            Choice {
                id: "a".to_string(),
                text: "A".to_string(),
            },
            Choice {
                id: "b".to_string(),
                text: "B".to_string(),
            },
        ],
        answer: Answer {
            choice_id: "a".to_string(),
        },
    }
}

fn fast_config() -> HostGameConfig {
    HostGameConfig {
        countdown: Duration::from_millis(100),
        reveal_hold: Duration::from_millis(100),
        leaderboard_hold: Duration::from_millis(100),
        intermission: Duration::from_millis(100),
        all_answered_grace: Duration::from_millis(50),
    }
}

async fn spawn_signaling() -> (String, common::shutdown::ShutdownSender) {
    common::telemetry::init("game-host-test");

    let (ready_tx, ready_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = common::shutdown::channel();
    let config = SignalingConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        rate_limit: 10_000,
        rate_window_secs: 60,
        ready_tx: Some(ready_tx),
    };
    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::default());
    tokio::spawn(signaling::run(config, store, shutdown_rx));
    let addr: SocketAddr = ready_rx.await.expect("signaling ready");
    (format!("http://{addr}"), shutdown_tx)
}

async fn connect_player(
    base: &str,
    room_id: &str,
    nickname: &str,
    factory: Arc<LoopbackFactory>,
) -> (PlayerHandle, mpsc::UnboundedReceiver<PlayerEvent>) {
    let mut config = PlayerConfig::new(base, room_id);
    config.nickname = Some(nickname.to_string());
    config.poll_interval = Duration::from_millis(50);
    let (handle, mut events) = PlayerConnectionManager::connect(config, factory)
        .await
        .expect("player negotiation");
    loop {
        let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        if matches!(event, PlayerEvent::Connected { .. }) {
            return (handle, events);
        }
    }
}

/// Next data-channel message whose kind matches, skipping the rest.
async fn wait_for_kind(
    events: &mut mpsc::UnboundedReceiver<PlayerEvent>,
    kind: &str,
) -> MessageBody {
    loop {
        let event = timeout(WAIT, events.recv())
            .await
            .expect("message within deadline")
            .expect("player events open");
        if let PlayerEvent::Message(text) = event {
            let message = decode(&text).expect("decodable envelope");
            if message.body.kind() == kind {
                return message.body;
            }
        }
    }
}

fn submit(handle: &PlayerHandle, question_id: &str, choice_id: &str, time_ms: i64) {
    let body = MessageBody::AnswerSubmit(AnswerSubmitPayload {
        player_id: handle.player_id().to_string(),
        question_id: question_id.to_string(),
        choice_id: choice_id.to_string(),
        time_ms,
    });
    handle.send(encode(&Message::new(body)).unwrap());
}

#[tokio::test]
async fn two_players_complete_a_two_question_match() {
    let (base, signaling_shutdown) = spawn_signaling().await;
    let client = SignalingClient::new(base.clone());
    let session = client.create_session().await.unwrap();

    let factory = Arc::new(LoopbackFactory::new(LoopbackNetwork::new()));
    let mut host_config = HostConfig::new(&base, &session.room_id, &session.host_token);
    host_config.offer_poll_interval = Duration::from_millis(50);
    host_config.candidate_poll_interval = Duration::from_millis(50);
    let (peers, peer_events) = HostConnectionManager::start(host_config, factory.clone());

    let settings = GameSettings {
        question_time_limit: 3_000,
        show_leaderboard: true,
        shuffle_questions: false,
        shuffle_choices: false,
    };
    let mut game = Game::new(&session.room_id, settings);
    game.set_questions(vec![question("q1"), question("q2")]);

    let (match_shutdown_tx, match_shutdown_rx) = common::shutdown::channel();
    let (handle, task) = HostGame::spawn(
        game,
        peers,
        peer_events,
        fast_config(),
        match_shutdown_rx,
    );

    let (p1, mut p1_events) = connect_player(&base, &session.room_id, "ada", factory.clone()).await;
    let (p2, mut p2_events) = connect_player(&base, &session.room_id, "lin", factory.clone()).await;

    // Joining the room echoes the lobby back.
    p1.send(
        encode(&Message::new(MessageBody::RoomJoin(RoomJoinPayload {
            nickname: "ada".to_string(),
        })))
        .unwrap(),
    );
    let joined = wait_for_kind(&mut p1_events, "room.joined").await;
    match joined {
        MessageBody::RoomJoined(payload) => {
            assert_eq!(payload.player_id, p1.player_id());
            assert_eq!(payload.lobby.room_id, session.room_id);
        }
        other => panic!("unexpected body: {other:?}"),
    }

    // Both joins must be in the roster before the match starts.
    loop {
        let update = wait_for_kind(&mut p1_events, "lobby.update").await;
        let MessageBody::LobbyUpdate(lobby) = update else {
            panic!("expected lobby.update");
        };
        if lobby.players.len() == 2 {
            break;
        }
    }

    handle.command(HostCommand::StartGame);
    match wait_for_kind(&mut p1_events, "game.start").await {
        MessageBody::GameStart(payload) => assert_eq!(payload.question_count, 2),
        other => panic!("unexpected body: {other:?}"),
    }

    for expected_id in ["q1", "q2"] {
        let shown = wait_for_kind(&mut p1_events, "question.show").await;
        let MessageBody::QuestionShow(shown) = shown else {
            panic!("expected question.show");
        };
        assert_eq!(shown.question_id, expected_id);
        wait_for_kind(&mut p2_events, "question.show").await;

        // One right, one wrong; both inside the window.
        submit(&p1, expected_id, "a", 500);
        submit(&p2, expected_id, "b", 500);

        match wait_for_kind(&mut p1_events, "answer.ack").await {
            MessageBody::AnswerAck(ack) => assert!(ack.accepted),
            other => panic!("unexpected body: {other:?}"),
        }
        match wait_for_kind(&mut p2_events, "answer.ack").await {
            MessageBody::AnswerAck(ack) => assert!(ack.accepted),
            other => panic!("unexpected body: {other:?}"),
        }

        let reveal = wait_for_kind(&mut p1_events, "question.reveal").await;
        let MessageBody::QuestionReveal(reveal) = reveal else {
            panic!("expected question.reveal");
        };
        assert_eq!(reveal.correct_choice_id, "a");
        assert!(reveal.results_by_player[p1.player_id()].correct);
        assert!(!reveal.results_by_player[p2.player_id()].correct);
        assert_eq!(reveal.choice_stats["a"].count, 1);
        assert_eq!(reveal.choice_stats["b"].count, 1);

        if expected_id == "q1" {
            let board = wait_for_kind(&mut p1_events, "leaderboard.update").await;
            let MessageBody::LeaderboardUpdate(board) = board else {
                panic!("expected leaderboard.update");
            };
            assert_eq!(board.entries[0].id, p1.player_id());
        }
    }

    let end = wait_for_kind(&mut p1_events, "game.end").await;
    let MessageBody::GameEnd(end) = end else {
        panic!("expected game.end");
    };
    assert_eq!(end.total_questions, 2);
    assert_eq!(end.final_leaderboard[0].id, p1.player_id());
    // time_ms 500 of a 3000ms window scores round(2500/3000*1000) per round.
    assert_eq!(end.final_leaderboard[0].score, 1666);
    assert_eq!(end.final_leaderboard[1].score, 0);

    common::shutdown::trigger(&match_shutdown_tx);
    let final_game = task.await.unwrap();
    assert_eq!(final_game.phase(), GamePhase::Ended);
    assert_eq!(final_game.scores()[p1.player_id()], 1666);

    common::shutdown::trigger(&signaling_shutdown);
}

#[tokio::test]
async fn host_can_end_the_match_early() {
    let (base, signaling_shutdown) = spawn_signaling().await;
    let client = SignalingClient::new(base.clone());
    let session = client.create_session().await.unwrap();

    let factory = Arc::new(LoopbackFactory::new(LoopbackNetwork::new()));
    let mut host_config = HostConfig::new(&base, &session.room_id, &session.host_token);
    host_config.offer_poll_interval = Duration::from_millis(50);
    host_config.candidate_poll_interval = Duration::from_millis(50);
    let (peers, peer_events) = HostConnectionManager::start(host_config, factory.clone());

    let mut game = Game::new(&session.room_id, GameSettings::default());
    game.set_questions(vec![question("q1"), question("q2")]);

    let (match_shutdown_tx, match_shutdown_rx) = common::shutdown::channel();
    let (handle, task) = HostGame::spawn(
        game,
        peers,
        peer_events,
        fast_config(),
        match_shutdown_rx,
    );

    let (_p1, mut p1_events) = connect_player(&base, &session.room_id, "ada", factory.clone()).await;

    handle.command(HostCommand::StartGame);
    wait_for_kind(&mut p1_events, "question.show").await;

    handle.command(HostCommand::EndGame);
    let end = wait_for_kind(&mut p1_events, "game.end").await;
    assert!(matches!(end, MessageBody::GameEnd(_)));

    let mut phases = handle.phase_watch();
    timeout(WAIT, async {
        while *phases.borrow() != GamePhase::Ended {
            phases.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    common::shutdown::trigger(&match_shutdown_tx);
    let final_game = task.await.unwrap();
    assert_eq!(final_game.phase(), GamePhase::Ended);

    common::shutdown::trigger(&signaling_shutdown);
}
