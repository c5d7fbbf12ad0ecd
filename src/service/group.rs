//! 群组管理与群发 / Group management and fan-out
//!
//! 群发对每个成员独立决策；某个成员失败只影响该成员。
//! Fan-out decides per member independently; one member's failure affects
//! that member only.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::message::{Ack, MsgType};
use crate::error::ServiceError;
use crate::registry::Connection;
use crate::server::ChatServer;
use crate::service::delivery;
use crate::storage::MemberRole;

pub async fn create_group(
    server: Arc<ChatServer>,
    conn: Connection,
    payload: Value,
    _time: DateTime<Utc>,
) -> Result<()> {
    let (Some(id), Some(name), Some(desc)) = (
        payload.get("id").and_then(Value::as_i64),
        payload.get("groupname").and_then(Value::as_str),
        payload.get("groupdesc").and_then(Value::as_str),
    ) else {
        return conn.send_json(&Ack::failure(MsgType::CreateGroupAck, &ServiceError::Malformed));
    };

    let created = server
        .store
        .create_group(name, desc)
        .and_then(|group_id| {
            server.store.add_membership(group_id, id, MemberRole::Creator)?;
            Ok(group_id)
        });
    match created {
        Ok(group_id) => {
            info!(group_id, creator = id, groupname = name, "group created");
            conn.send_json(&Ack::ok_with_id(MsgType::CreateGroupAck, group_id))
        }
        Err(e) => {
            warn!(creator = id, groupname = name, error = %e, "group creation rejected");
            conn.send_json(&Ack::failure(MsgType::CreateGroupAck, &ServiceError::GroupRejected))
        }
    }
}

pub async fn add_group(
    server: Arc<ChatServer>,
    conn: Connection,
    payload: Value,
    _time: DateTime<Utc>,
) -> Result<()> {
    let (Some(id), Some(group_id)) = (
        payload.get("id").and_then(Value::as_i64),
        payload.get("groupid").and_then(Value::as_i64),
    ) else {
        return conn.send_json(&Ack::failure(MsgType::AddGroupAck, &ServiceError::Malformed));
    };

    match server.store.add_membership(group_id, id, MemberRole::Normal) {
        Ok(()) => {
            info!(group_id, user = id, "user joined group");
            conn.send_json(&Ack::ok(MsgType::AddGroupAck))
        }
        Err(e) => {
            warn!(group_id, user = id, error = %e, "group join rejected");
            conn.send_json(&Ack::failure(MsgType::AddGroupAck, &ServiceError::GroupRejected))
        }
    }
}

/// 群消息：解析成员清单，对包括发送者在内的每个成员做一次
/// 独立投递决策。
/// Group message: resolve the roster and run one independent delivery
/// decision per member, sender included.
pub async fn group_chat(
    server: Arc<ChatServer>,
    _conn: Connection,
    payload: Value,
    _time: DateTime<Utc>,
) -> Result<()> {
    let (Some(id), Some(group_id)) = (
        payload.get("id").and_then(Value::as_i64),
        payload.get("groupid").and_then(Value::as_i64),
    ) else {
        warn!("group message without sender or group ignored");
        return Ok(());
    };

    let members = match server.store.query_group_member_ids(group_id) {
        Ok(members) => members,
        Err(e) => {
            warn!(group_id, sender = id, error = %e, "member list unavailable, message dropped");
            return Ok(());
        }
    };

    let raw = serde_json::to_string(&payload)?;
    for member in members {
        if let Err(e) = delivery::deliver_to_user(&server, member, &raw).await {
            // 失败按接收者隔离，其余成员继续 / failures are per recipient,
            // the rest of the fan-out proceeds
            warn!(member, group_id, error = %e, "delivery degraded, recipient skipped");
        }
    }
    Ok(())
}
