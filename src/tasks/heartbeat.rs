use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{interval, Duration};

use crate::server::ChatServer;

/// 周期清扫空闲连接，直到收到停机信号。
/// Periodically sweeps idle connections until the shutdown signal fires.
pub fn spawn_sweep_task(
    server: Arc<ChatServer>,
    timeout_ms: u64,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let sweep_interval_ms = if timeout_ms <= 1000 {
            (timeout_ms / 2).max(1)
        } else if timeout_ms <= 10000 {
            1000
        } else {
            5000
        };
        tracing::info!(
            "⏰ sweep interval set to {}ms for timeout {}ms",
            sweep_interval_ms,
            timeout_ms
        );
        let mut sweep_interval = interval(Duration::from_millis(sweep_interval_ms));
        loop {
            tokio::select! {
                _ = sweep_interval.tick() => {
                    server.close_idle_connections(timeout_ms).await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() { break; }
                }
            }
        }
    });
}
