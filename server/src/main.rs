use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

use common::telemetry;
use server::{BoxError, ServerConfig, ServerSettings};

#[derive(Debug, Parser)]
#[command(author, version, about = "Trivia signaling rendezvous server")]
struct ServerCli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    #[arg(long, value_name = "URL")]
    redis_url: Option<String>,

    #[arg(long, value_name = "N")]
    rate_limit: Option<u32>,
}

impl ServerCli {
    fn resolve_config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            return Some(path.clone());
        }
        std::env::var("SERVER_CONFIG_PATH").ok().map(PathBuf::from)
    }

    fn apply_overrides(&self, settings: &mut ServerSettings) {
        if let Some(addr) = self.bind {
            settings.signaling.bind_addr = addr;
        }
        if let Some(url) = &self.redis_url {
            settings.store.redis_url = Some(url.clone());
        }
        if let Some(limit) = self.rate_limit {
            settings.signaling.rate_limit = limit;
        }
    }
}

fn build_config(cli: &ServerCli) -> Result<ServerConfig, BoxError> {
    let mut settings = if let Some(path) = cli.resolve_config_path() {
        ServerSettings::from_file(&path)?
    } else {
        ServerSettings::from_env()?
    };

    cli.apply_overrides(&mut settings);

    Ok(settings.into_config())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init("server");

    let cli = ServerCli::parse();
    let config = build_config(&cli).map_err(|err| anyhow::anyhow!(err.to_string()))?;

    if let Err(err) = server::run_with_ctrl_c(config).await {
        tracing::error!(%err, "server exited with error");
        return Err(anyhow::anyhow!(err.to_string()));
    }
    Ok(())
}
