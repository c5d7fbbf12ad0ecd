use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::registry::Connection;
use crate::server::ChatServer;

/// 插入单向好友边；对称关系由调用方写两条。
/// Inserts a directed friend edge; callers wanting symmetry insert both.
pub async fn add_friend(
    server: Arc<ChatServer>,
    _conn: Connection,
    payload: Value,
    _time: DateTime<Utc>,
) -> Result<()> {
    let (Some(id), Some(friend_id)) = (
        payload.get("id").and_then(Value::as_i64),
        payload.get("friendid").and_then(Value::as_i64),
    ) else {
        warn!("add-friend without both ids ignored");
        return Ok(());
    };
    server.store.insert_friend_edge(id, friend_id)?;
    debug!(id, friend_id, "friend edge inserted");
    Ok(())
}
