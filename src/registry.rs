//! 连接注册表 / Connection registry
//!
//! 本节点上“该用户现在可达吗”的唯一事实来源。
//! The single source of truth for "is this user reachable on this node".

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// 单个存活会话的节点本地连接句柄 / Node-local handle for one live session
#[derive(Clone)]
pub struct Connection {
    pub conn_id: String,
    pub addr: SocketAddr,
    pub sender: mpsc::UnboundedSender<Message>,
    pub last_seen: Arc<Mutex<Instant>>,
}

impl Connection {
    pub fn new(conn_id: String, addr: SocketAddr, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self { conn_id, addr, sender, last_seen: Arc::new(Mutex::new(Instant::now())) }
    }

    pub fn send_text(&self, text: String) -> Result<()> {
        self.sender
            .send(Message::Text(text))
            .map_err(|_| anyhow!("connection {} already closed", self.conn_id))
    }

    pub fn send_json<T: Serialize>(&self, value: &T) -> Result<()> {
        self.send_text(serde_json::to_string(value)?)
    }

    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }
}

/// 用户 id 到连接句柄的映射 / Map from user id to connection handle
///
/// 每个用户在单节点上至多一个条目。
/// At most one entry per user on a node.
pub struct ConnectionRegistry {
    entries: DashMap<i64, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// 仅在凭证与在线状态检查通过后调用 / Called only after credential and presence checks pass
    pub fn register(&self, user_id: i64, conn: Connection) {
        self.entries.insert(user_id, conn);
    }

    /// 持有条目守卫时写入，检查与使用之间不会被摘除。
    /// Writes while holding the entry guard; the entry cannot be removed
    /// between check and use.
    pub fn lookup_and_send(&self, user_id: i64, payload: &str) -> bool {
        match self.entries.get(&user_id) {
            Some(entry) => entry.sender.send(Message::Text(payload.to_owned())).is_ok(),
            None => false,
        }
    }

    /// 显式登出路径 / Explicit logout path
    pub fn remove(&self, user_id: i64) -> Option<Connection> {
        self.entries.remove(&user_id).map(|(_, conn)| conn)
    }

    /// 异常断开时只有连接句柄可用，线性扫描反查用户。
    /// On abrupt disconnect only the handle is known; a linear scan resolves
    /// the owning user.
    pub fn remove_by_connection(&self, conn_id: &str) -> Option<i64> {
        let user_id = self
            .entries
            .iter()
            .find_map(|entry| (entry.value().conn_id == conn_id).then(|| *entry.key()))?;
        self.entries.remove(&user_id);
        Some(user_id)
    }

    pub fn contains(&self, user_id: i64) -> bool {
        self.entries.contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 向超时连接发送关闭帧；摘除交给正常断开路径。
    /// Sends a close frame to idle connections; removal happens through the
    /// normal disconnect path.
    pub fn sweep_idle(&self, idle_for: Duration) -> usize {
        let stale: Vec<i64> = self
            .entries
            .iter()
            .filter(|entry| entry.value().last_seen.lock().elapsed() > idle_for)
            .map(|entry| *entry.key())
            .collect();
        for user_id in &stale {
            if let Some(entry) = self.entries.get(user_id) {
                let _ = entry.sender.send(Message::Close(None));
            }
        }
        stale.len()
    }
}
