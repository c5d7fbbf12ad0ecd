use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nexus_im::config;
use nexus_im::relay::{RedisRelayBus, RelayBus};
use nexus_im::server::ChatServer;
use nexus_im::storage::Storage;
use nexus_im::tasks;

/// 命令行参数 / Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "nexus-im chat routing node", long_about = None)]
struct Args {
    /// 配置文件路径 / Config file path
    #[arg(short = 'c', long = "config", default_value = "config/default.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let cfg = config::load(&args.config)?;

    let storage = Arc::new(Storage::open(&cfg.storage.path)?);

    let bus: Option<Arc<dyn RelayBus>> = if cfg.bus.enabled {
        match RedisRelayBus::connect(&cfg.bus.url).await {
            Ok(bus) => {
                info!("🔗 relay bus connected at {}", cfg.bus.url);
                Some(Arc::new(bus))
            }
            Err(e) => {
                // 总线不可达不致命，单节点继续服务 / an unreachable bus is not
                // fatal, the node keeps serving alone
                warn!(error = %e, "relay bus unavailable, running in single-node mode");
                None
            }
        }
    } else {
        None
    };

    let mut server =
        ChatServer::new(storage.clone(), storage.clone()).with_node_id(cfg.server.node_id.clone());
    if let Some(bus) = bus {
        server = server.with_bus(bus);
    }
    let server = Arc::new(server);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tasks::heartbeat::spawn_sweep_task(server.clone(), cfg.server.timeout_ms, shutdown_rx);

    tokio::select! {
        result = server.clone().run(&cfg.server.host, cfg.server.ws_port) => result?,
        _ = tokio::signal::ctrl_c() => {
            let _ = shutdown_tx.send(true);
            let reset = storage.reset_all_state()?;
            info!("shutting down, {} users reset to offline", reset);
        }
    }
    Ok(())
}
