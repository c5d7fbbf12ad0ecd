//! 点对点投递 / Direct delivery
//!
//! 三级投递决策：本地连接 → 在线则总线转发 → 离线队列。
//! 点对点与群发使用同一决策。
//! The three-tier delivery decision: local connection → bus relay when
//! online elsewhere → offline queue. Shared by direct and group delivery.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::registry::Connection;
use crate::server::ChatServer;
use crate::storage::PresenceState;

/// 消息对发送方即发即忘，不产生应答。
/// Fire-and-forget from the sender's perspective; no acknowledgement.
pub async fn one_chat(
    server: Arc<ChatServer>,
    _conn: Connection,
    payload: Value,
    _time: DateTime<Utc>,
) -> Result<()> {
    let Some(to) = payload.get("to").and_then(Value::as_i64) else {
        warn!("direct message without recipient ignored");
        return Ok(());
    };
    // 负载原样转给接收方 / the payload reaches the recipient verbatim
    let raw = serde_json::to_string(&payload)?;
    deliver_to_user(&server, to, &raw).await
}

/// 每接收者一次且仅一次的路径选择 / Picks exactly one path per recipient
pub async fn deliver_to_user(server: &Arc<ChatServer>, to: i64, raw: &str) -> Result<()> {
    if server.registry.lookup_and_send(to, raw) {
        debug!(to, "delivered over local connection");
        return Ok(());
    }

    let state = server.store.query_user(to)?.map(|user| user.state);
    if state == Some(PresenceState::Online) {
        if let Some(bus) = &server.bus {
            match bus.publish(to, raw.to_owned()).await {
                Ok(()) => {
                    debug!(to, "relayed to peer node");
                    return Ok(());
                }
                Err(e) => {
                    // 转发写失败：记录并跳过该接收者，不重复入队
                    // relay write failed: log and skip the recipient, no
                    // duplicate enqueue
                    warn!(to, error = %e, "relay publish failed, recipient skipped");
                    return Ok(());
                }
            }
        }
        // 单节点模式下没有别的节点能持有该会话，落入队列
        // single-node mode: no peer can hold the session, fall through
    }

    server.offline.append(to, raw)?;
    debug!(to, "queued offline");
    Ok(())
}
