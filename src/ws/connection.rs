//! 单连接生命周期 / Per-connection lifecycle
//!
//! 读写分离：写任务独占 sink，任何持有 sender 的一方都能发消息；
//! 读循环结束后走异常断开路径清理。
//! Reader/writer split: the writer task owns the sink and anyone holding the
//! sender can emit; after the read loop ends the abrupt-disconnect path
//! cleans up.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{error, info};
use uuid::Uuid;

use crate::registry::Connection;
use crate::server::ChatServer;
use crate::service;

pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    server: Arc<ChatServer>,
) -> Result<()> {
    info!("📨 new connection from {}", peer_addr);

    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let conn_id = Uuid::new_v4().to_string();

    let writer_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let is_close = matches!(&msg, Message::Close(_));
            if let Err(e) = ws_sender.send(msg).await {
                error!("failed to send to {}: {}", writer_conn_id, e);
                break;
            }
            if is_close {
                let _ = ws_sender.close().await;
                break;
            }
        }
    });

    let conn = Connection::new(conn_id.clone(), peer_addr, tx);

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                conn.touch();
                if let Err(e) = server.handle_incoming(&conn, &text).await {
                    error!(conn_id = %conn_id, error = %e, "handler failed, connection kept");
                }
            }
            Ok(Message::Ping(data)) => {
                conn.touch();
                let _ = conn.sender.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                error!(conn_id = %conn_id, error = %e, "websocket error");
                break;
            }
        }
    }

    send_task.abort();
    service::session::handle_disconnect(&server, &conn_id).await;
    info!("👋 connection {} from {} closed", conn_id, peer_addr);
    Ok(())
}
