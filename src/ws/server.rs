use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;

use crate::server::ChatServer;

/// 启动 WS 监听 / Start the WS listener
impl ChatServer {
    pub async fn run(self: Arc<Self>, host: &str, port: u16) -> Result<()> {
        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&addr).await?;
        info!("🚀 nexus-im node {} listening on {}", self.node_id, addr);

        while let Ok((stream, peer_addr)) = listener.accept().await {
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) =
                    crate::ws::connection::handle_connection(stream, peer_addr, server).await
                {
                    tracing::error!("connection error from {}: {}", peer_addr, e);
                }
            });
        }

        Ok(())
    }
}
