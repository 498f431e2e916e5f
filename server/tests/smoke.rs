use std::time::Duration;

use common::{shutdown, telemetry};
use reqwest::StatusCode;
use serde_json::Value;
use signaling::{SignalingConfig, HEALTHZ_PATH};
use tokio::sync::oneshot;

#[tokio::test]
async fn orchestrator_runs_and_shuts_down_cleanly() -> Result<(), server::BoxError> {
    telemetry::init("server-test");

    let (ready_tx, ready_rx) = oneshot::channel();

    let config = server::ServerConfig {
        signaling: SignalingConfig {
            bind_addr: "127.0.0.1:0"
                .parse()
                .map_err(|err| Box::new(err) as server::BoxError)?,
            rate_limit: 120,
            rate_window_secs: 60,
            ready_tx: Some(ready_tx),
        },
        store: server::StoreSettings {
            redis_url: None,
            session_ttl_secs: 60,
            sweep_interval_secs: 1,
        },
    };

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    let orchestrator = tokio::spawn(server::run_with_shutdown(config, shutdown_rx));

    let addr = ready_rx
        .await
        .map_err(|err| Box::new(err) as server::BoxError)?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .map_err(|err| Box::new(err) as server::BoxError)?;

    let resp = client
        .get(format!("http://{addr}{HEALTHZ_PATH}"))
        .send()
        .await
        .map_err(|err| Box::new(err) as server::BoxError)?;
    assert_eq!(StatusCode::OK, resp.status());

    // A full create/list round trip through the composed stack.
    let created: Value = client
        .post(format!("http://{addr}/session/create"))
        .send()
        .await
        .map_err(|err| Box::new(err) as server::BoxError)?
        .json()
        .await
        .map_err(|err| Box::new(err) as server::BoxError)?;
    let room_id = created["roomId"].as_str().expect("roomId present");

    let session: Value = client
        .get(format!("http://{addr}/session/{room_id}"))
        .send()
        .await
        .map_err(|err| Box::new(err) as server::BoxError)?
        .json()
        .await
        .map_err(|err| Box::new(err) as server::BoxError)?;
    assert_eq!(session["roomId"], room_id);

    shutdown::trigger(&shutdown_tx);

    let orchestrator_result = orchestrator
        .await
        .map_err(|err| Box::new(err) as server::BoxError)?;
    orchestrator_result?;

    Ok(())
}
