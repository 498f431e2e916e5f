use std::{fs, path::Path, sync::Arc, time::Duration};

use common::shutdown;
use session_store::{MemorySessionStore, RedisSessionStore, SessionStore};
use signaling::{SignalingConfig, SignalingSettings};
use tokio::task::JoinSet;
use tracing::{error, info};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Store backend selection: Redis when a URL is configured, otherwise the
/// in-process map with a periodic TTL sweep.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct StoreSettings {
    pub redis_url: Option<String>,
    pub session_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            session_ttl_secs: session_store::SESSION_TTL_SECS,
            sweep_interval_secs: 60,
        }
    }
}

impl StoreSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            session_ttl_secs: std::env::var("SESSION_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.session_ttl_secs),
            sweep_interval_secs: std::env::var("SESSION_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.sweep_interval_secs),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct ServerSettings {
    pub signaling: SignalingSettings,
    pub store: StoreSettings,
}

impl ServerSettings {
    pub fn from_env() -> Result<Self, BoxError> {
        Ok(Self {
            signaling: SignalingSettings::from_env()?,
            store: StoreSettings::from_env(),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, BoxError> {
        let raw = fs::read_to_string(path).map_err(|err| Box::new(err) as BoxError)?;
        let settings = serde_json::from_str(&raw).map_err(|err| Box::new(err) as BoxError)?;
        Ok(settings)
    }

    pub fn into_config(self) -> ServerConfig {
        ServerConfig::from_settings(self)
    }
}

#[derive(Debug)]
pub struct ServerConfig {
    pub signaling: SignalingConfig,
    pub store: StoreSettings,
}

impl ServerConfig {
    pub fn from_settings(settings: ServerSettings) -> Self {
        Self {
            signaling: SignalingConfig::from_settings(settings.signaling),
            store: settings.store,
        }
    }

    pub fn from_env() -> Result<Self, BoxError> {
        ServerSettings::from_env().map(Self::from_settings)
    }
}

pub async fn run() -> Result<(), BoxError> {
    let config = ServerConfig::from_env()?;
    run_with_ctrl_c(config).await
}

pub async fn run_with_ctrl_c(config: ServerConfig) -> Result<(), BoxError> {
    let (shutdown_tx, shutdown_rx) = shutdown::channel();

    let ctrl_c = tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "cannot listen for ctrl_c");
        }
        shutdown::trigger(&shutdown_tx);
    });

    let result = run_with_shutdown(config, shutdown_rx).await;

    ctrl_c.abort();
    result
}

pub async fn run_with_shutdown(
    config: ServerConfig,
    shutdown_rx: shutdown::ShutdownReceiver,
) -> Result<(), BoxError> {
    let (service_shutdown_tx, service_shutdown_rx) = shutdown::channel();
    let mut join_set: JoinSet<Result<(), BoxError>> = JoinSet::new();

    let store: Arc<dyn SessionStore> = match &config.store.redis_url {
        Some(url) => {
            info!(%url, "using redis session store");
            Arc::new(
                RedisSessionStore::connect_with_ttl(url, config.store.session_ttl_secs)
                    .await
                    .map_err(|err| Box::new(err) as BoxError)?,
            )
        }
        None => {
            info!("using in-memory session store");
            let memory =
                MemorySessionStore::new(Duration::from_secs(config.store.session_ttl_secs));
            let sweeper_store = memory.clone();
            let sweeper_shutdown = service_shutdown_rx.clone();
            let sweep_interval = Duration::from_secs(config.store.sweep_interval_secs);
            join_set.spawn(async move {
                session_store::run_sweeper(sweeper_store, sweep_interval, sweeper_shutdown).await;
                Ok(())
            });
            Arc::new(memory)
        }
    };

    let signaling_shutdown = service_shutdown_rx;
    let signaling_config = config.signaling;
    join_set.spawn(async move { signaling::run(signaling_config, store, signaling_shutdown).await });

    let mut service_error: Option<BoxError> = None;
    let mut shutdown_wait = std::pin::pin!(shutdown::wait(shutdown_rx));

    loop {
        tokio::select! {
            _ = &mut shutdown_wait => {
                info!("shutdown requested");
                break;
            }
            maybe_task = join_set.join_next() => {
                match maybe_task {
                    Some(Ok(Ok(()))) => continue,
                    Some(Ok(Err(err))) => {
                        error!(%err, "service exited with error");
                        service_error = Some(err);
                        break;
                    }
                    Some(Err(join_err)) => {
                        error!(%join_err, "service join failed");
                        service_error = Some(Box::new(join_err) as BoxError);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    shutdown::trigger(&service_shutdown_tx);

    while let Some(task) = join_set.join_next().await {
        match task {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                if service_error.is_none() {
                    service_error = Some(err);
                }
            }
            Err(join_err) => {
                if service_error.is_none() {
                    service_error = Some(Box::new(join_err) as BoxError);
                }
            }
        }
    }

    match service_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
