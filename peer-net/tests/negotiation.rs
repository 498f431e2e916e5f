use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use peer_net::{
    HostConfig, HostConnectionManager, HostEvent, LoopbackFactory, LoopbackNetwork, PlayerConfig,
    PlayerConnectionManager, PlayerEvent, SignalingClient,
};
use session_store::{MemorySessionStore, SessionStore};
use signaling::SignalingConfig;

const WAIT: Duration = Duration::from_secs(5);

async fn spawn_signaling() -> (String, common::shutdown::ShutdownSender) {
    common::telemetry::init("peer-net-test");

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

fn fast_host_config(base: &str, room_id: &str, host_token: &str) -> HostConfig {
    let mut config = HostConfig::new(base, room_id, host_token);
    config.offer_poll_interval = Duration::from_millis(50);
    config.candidate_poll_interval = Duration::from_millis(50);
    config
}

fn fast_player_config(base: &str, room_id: &str, nickname: &str) -> PlayerConfig {
    let mut config = PlayerConfig::new(base, room_id);
    config.nickname = Some(nickname.to_string());
    config.poll_interval = Duration::from_millis(50);
    config
}

async fn expect_joined(events: &mut mpsc::UnboundedReceiver<HostEvent>) -> String {
    loop {
        let event = timeout(WAIT, events.recv())
            .await
            .expect("host event within deadline")
            .expect("host events open");
        if let HostEvent::PlayerJoined { player_id, .. } = event {
            return player_id;
        }
    }
}

async fn expect_connected(events: &mut mpsc::UnboundedReceiver<PlayerEvent>) -> String {
    loop {
        let event = timeout(WAIT, events.recv())
            .await
            .expect("player event within deadline")
            .expect("player events open");
        if let PlayerEvent::Connected { player_id } = event {
            return player_id;
        }
    }
}

async fn expect_player_message(events: &mut mpsc::UnboundedReceiver<PlayerEvent>) -> String {
    loop {
        let event = timeout(WAIT, events.recv())
            .await
            .expect("player event within deadline")
            .expect("player events open");
        if let PlayerEvent::Message(text) = event {
            return text;
        }
    }
}

#[tokio::test]
async fn host_and_player_establish_a_channel() {
    let (base, shutdown) = spawn_signaling().await;
    let client = SignalingClient::new(base.clone());
    let session = client.create_session().await.unwrap();

    let network = LoopbackNetwork::new();
    let factory = Arc::new(LoopbackFactory::new(network));

    let (host, mut host_events) = HostConnectionManager::start(
        fast_host_config(&base, &session.room_id, &session.host_token),
        factory.clone(),
    );
    let (player, mut player_events) = PlayerConnectionManager::connect(
        fast_player_config(&base, &session.room_id, "ada"),
        factory.clone(),
    )
    .await
    .unwrap();

    let joined_id = expect_joined(&mut host_events).await;
    let connected_id = expect_connected(&mut player_events).await;
    assert_eq!(joined_id, connected_id);
    assert_eq!(player.player_id(), joined_id);
    assert_eq!(host.connected_players(), vec![joined_id.clone()]);

    // Player to host.
    player.send("up");
    let event = timeout(WAIT, host_events.recv()).await.unwrap().unwrap();
    assert_eq!(
        event,
        HostEvent::Message {
            player_id: joined_id.clone(),
            text: "up".to_string()
        }
    );

    // Host to player, addressed and broadcast.
    host.send(&joined_id, "down");
    assert_eq!(expect_player_message(&mut player_events).await, "down");
    host.broadcast("all");
    assert_eq!(expect_player_message(&mut player_events).await, "all");

    host.stop();
    player.stop();
    common::shutdown::trigger(&shutdown);
}

#[tokio::test]
async fn broadcast_reaches_every_connected_player() {
    let (base, shutdown) = spawn_signaling().await;
    let client = SignalingClient::new(base.clone());
    let session = client.create_session().await.unwrap();

    let factory = Arc::new(LoopbackFactory::new(LoopbackNetwork::new()));
    let (host, mut host_events) = HostConnectionManager::start(
        fast_host_config(&base, &session.room_id, &session.host_token),
        factory.clone(),
    );

    let (_p1, mut p1_events) = PlayerConnectionManager::connect(
        fast_player_config(&base, &session.room_id, "ada"),
        factory.clone(),
    )
    .await
    .unwrap();
    let (_p2, mut p2_events) = PlayerConnectionManager::connect(
        fast_player_config(&base, &session.room_id, "lin"),
        factory.clone(),
    )
    .await
    .unwrap();

    expect_joined(&mut host_events).await;
    expect_joined(&mut host_events).await;
    expect_connected(&mut p1_events).await;
    expect_connected(&mut p2_events).await;
    assert_eq!(host.connected_players().len(), 2);

    host.broadcast("round one");
    assert_eq!(expect_player_message(&mut p1_events).await, "round one");
    assert_eq!(expect_player_message(&mut p2_events).await, "round one");

    host.stop();
    common::shutdown::trigger(&shutdown);
}

#[tokio::test]
async fn stopping_the_host_disconnects_players() {
    let (base, shutdown) = spawn_signaling().await;
    let client = SignalingClient::new(base.clone());
    let session = client.create_session().await.unwrap();

    let factory = Arc::new(LoopbackFactory::new(LoopbackNetwork::new()));
    let (host, mut host_events) = HostConnectionManager::start(
        fast_host_config(&base, &session.room_id, &session.host_token),
        factory.clone(),
    );
    let (_player, mut player_events) = PlayerConnectionManager::connect(
        fast_player_config(&base, &session.room_id, "ada"),
        factory.clone(),
    )
    .await
    .unwrap();

    expect_joined(&mut host_events).await;
    expect_connected(&mut player_events).await;

    host.stop();
    loop {
        let event = timeout(WAIT, player_events.recv()).await.unwrap().unwrap();
        if event == PlayerEvent::Disconnected {
            break;
        }
    }

    common::shutdown::trigger(&shutdown);
}

#[tokio::test]
async fn player_leaving_is_observed_by_the_host() {
    let (base, shutdown) = spawn_signaling().await;
    let client = SignalingClient::new(base.clone());
    let session = client.create_session().await.unwrap();

    let factory = Arc::new(LoopbackFactory::new(LoopbackNetwork::new()));
    let (host, mut host_events) = HostConnectionManager::start(
        fast_host_config(&base, &session.room_id, &session.host_token),
        factory.clone(),
    );
    let (player, mut player_events) = PlayerConnectionManager::connect(
        fast_player_config(&base, &session.room_id, "ada"),
        factory.clone(),
    )
    .await
    .unwrap();

    let joined_id = expect_joined(&mut host_events).await;
    expect_connected(&mut player_events).await;

    player.stop();
    loop {
        let event = timeout(WAIT, host_events.recv()).await.unwrap().unwrap();
        if event == (HostEvent::PlayerLeft { player_id: joined_id.clone() }) {
            break;
        }
    }
    assert!(host.connected_players().is_empty());

    host.stop();
    common::shutdown::trigger(&shutdown);
}
