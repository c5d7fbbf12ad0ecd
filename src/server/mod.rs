//! 服务端全局状态 / Server global state
//!
//! 显式构造的服务对象，持有注册表、分发表与各协作方；
//! 不使用进程级单例，便于以假实现替换存储和总线。
//! An explicitly constructed service object owning the registry, dispatch
//! table and collaborators; no process-wide singleton, so the store and bus
//! can be swapped for fakes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dispatch::{self, DispatchTable};
use crate::registry::{Connection, ConnectionRegistry};
use crate::relay::{InboundHandler, RelayBus};
use crate::storage::{ChatStore, OfflineStore};

pub struct ChatServer {
    pub registry: ConnectionRegistry,
    pub dispatch: DispatchTable,
    pub store: Arc<dyn ChatStore>,
    pub offline: Arc<dyn OfflineStore>,
    pub bus: Option<Arc<dyn RelayBus>>,
    pub node_id: String,
}

impl ChatServer {
    pub fn new(store: Arc<dyn ChatStore>, offline: Arc<dyn OfflineStore>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            dispatch: dispatch::default_table(),
            store,
            offline,
            bus: None,
            node_id: "node-local".to_string(),
        }
    }

    /// 配置转发总线 / Configure the relay bus
    pub fn with_bus(mut self, bus: Arc<dyn RelayBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// 配置节点标识 / Configure the node id
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    /// 入站消息入口：解析信封，查表分发。
    /// Inbound entry point: parse the envelope, dispatch by table.
    pub async fn handle_incoming(self: &Arc<Self>, conn: &Connection, text: &str) -> Result<()> {
        let payload: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!(conn_id = %conn.conn_id, error = %e, "undecodable frame ignored");
                return Ok(());
            }
        };
        let Some(code) = payload.get("type").and_then(Value::as_i64) else {
            warn!(conn_id = %conn.conn_id, "frame without type field ignored");
            return Ok(());
        };
        debug!(conn_id = %conn.conn_id, code, "dispatching message");
        let handler = self.dispatch.resolve(code);
        handler(Arc::clone(self), conn.clone(), payload, Utc::now()).await
    }

    /// 本用户频道的入站回调：本地直投，否则落离线队列。
    /// Inbound callback for a user channel: deliver locally, else queue.
    pub fn handle_relay_inbound(&self, user_id: i64, payload: &str) {
        if self.registry.lookup_and_send(user_id, payload) {
            debug!(user_id, "relayed message delivered locally");
            return;
        }
        // 断开与转发之间的竞态：暂存而不是丢弃
        // race between disconnect and relay: queue instead of dropping
        if let Err(e) = self.offline.append(user_id, payload) {
            warn!(user_id, error = %e, "failed to queue relayed message");
        }
    }

    pub fn relay_handler(self: &Arc<Self>) -> InboundHandler {
        let server = Arc::clone(self);
        Arc::new(move |user_id, payload| server.handle_relay_inbound(user_id, &payload))
    }

    /// 心跳清扫入口 / Heartbeat sweep entry
    pub async fn close_idle_connections(&self, timeout_ms: u64) {
        let closed = self.registry.sweep_idle(Duration::from_millis(timeout_ms));
        if closed > 0 {
            info!("🧹 closed {} idle connections", closed);
        }
    }
}
