//! 会话与在线状态管理 / Session and presence management
//!
//! offline → online 只经由成功登录；online → offline 经由显式登出
//! 或异常断开。持久化状态必须在应答发出之前更新。
//! offline → online only via successful login; online → offline via explicit
//! logout or abrupt disconnect. Persisted state is updated before any
//! response goes out.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::message::{
    Ack, FriendSummary, GroupMemberSummary, GroupSummary, LoginAck, MsgType,
};
use crate::error::ServiceError;
use crate::registry::Connection;
use crate::server::ChatServer;
use crate::storage::{GroupWithMembers, PresenceState, UserRecord};

/// 登录：凭证校验、重复会话拒绝、注册连接、订阅频道、
/// 置为在线、取走离线消息并回好友群组清单。
/// Login: credential check, duplicate-session rejection, connection
/// registration, channel subscribe, state flip, offline drain, rosters.
pub async fn login(
    server: Arc<ChatServer>,
    conn: Connection,
    payload: Value,
    _time: DateTime<Utc>,
) -> Result<()> {
    let (Some(id), Some(password)) = (
        payload.get("id").and_then(Value::as_i64),
        payload.get("password").and_then(Value::as_str),
    ) else {
        return conn.send_json(&LoginAck::failure(&ServiceError::Malformed));
    };

    let user = match server.store.query_user(id) {
        Ok(user) => user,
        Err(e) => {
            warn!(id, error = %e, "user lookup failed during login");
            return conn.send_json(&LoginAck::failure(&ServiceError::Auth));
        }
    };
    let Some(user) = user.filter(|u| u.password == password) else {
        debug!(id, "login rejected, bad credentials");
        return conn.send_json(&LoginAck::failure(&ServiceError::Auth));
    };

    if user.state == PresenceState::Online {
        // 现有会话不受影响 / the existing session is left untouched
        debug!(id, "duplicate login rejected");
        return conn.send_json(&LoginAck::failure(&ServiceError::AlreadyLoggedIn));
    }

    server.registry.register(id, conn.clone());
    if let Some(bus) = &server.bus {
        if let Err(e) = bus.subscribe(id, server.relay_handler()).await {
            warn!(id, error = %e, "relay subscribe failed, cross-node delivery degraded");
        }
    }
    server.store.update_user_state(id, PresenceState::Online)?;

    let offlinemsg = server.offline.drain_and_clear(id).unwrap_or_else(|e| {
        warn!(id, error = %e, "offline drain failed, queue left intact");
        Vec::new()
    });
    let friends = server
        .store
        .query_friends(id)
        .unwrap_or_else(|e| {
            warn!(id, error = %e, "friend roster unavailable");
            Vec::new()
        })
        .iter()
        .map(friend_summary)
        .collect();
    let groups = server
        .store
        .query_groups_with_members(id)
        .unwrap_or_else(|e| {
            warn!(id, error = %e, "group roster unavailable");
            Vec::new()
        })
        .into_iter()
        .map(group_summary)
        .collect();

    info!(id, name = %user.name, "✅ user logged in");
    conn.send_json(&LoginAck::success(user.id, user.name, offlinemsg, friends, groups))
}

/// 登出幂等：无活动条目时只剩状态写。
/// Logout is idempotent: with no live entry only the state write remains.
pub async fn logout(
    server: Arc<ChatServer>,
    _conn: Connection,
    payload: Value,
    _time: DateTime<Utc>,
) -> Result<()> {
    let Some(id) = payload.get("id").and_then(Value::as_i64) else {
        warn!("logout without id ignored");
        return Ok(());
    };
    server.registry.remove(id);
    if let Some(bus) = &server.bus {
        if let Err(e) = bus.unsubscribe(id).await {
            warn!(id, error = %e, "relay unsubscribe failed");
        }
    }
    server.store.update_user_state(id, PresenceState::Offline)?;
    info!(id, "user logged out");
    Ok(())
}

/// 注册新用户，返回分配的 id / Register a new user, returning the assigned id
pub async fn register(
    server: Arc<ChatServer>,
    conn: Connection,
    payload: Value,
    _time: DateTime<Utc>,
) -> Result<()> {
    let (Some(name), Some(password)) = (
        payload.get("name").and_then(Value::as_str),
        payload.get("password").and_then(Value::as_str),
    ) else {
        return conn.send_json(&Ack::failure(MsgType::RegisterAck, &ServiceError::Malformed));
    };

    match server.store.insert_user(name, password) {
        Ok(id) => {
            info!(id, name, "user registered");
            conn.send_json(&Ack::ok_with_id(MsgType::RegisterAck, id))
        }
        Err(e) => {
            warn!(name, error = %e, "registration rejected by store");
            conn.send_json(&Ack::failure(MsgType::RegisterAck, &ServiceError::Registration))
        }
    }
}

/// 异常断开：凭句柄反查用户；从未登录的连接不触发状态变更。
/// Abrupt disconnect: resolve the user from the handle; a connection that
/// never logged in causes no state change.
pub async fn handle_disconnect(server: &Arc<ChatServer>, conn_id: &str) {
    let Some(user_id) = server.registry.remove_by_connection(conn_id) else {
        return;
    };
    if let Some(bus) = &server.bus {
        if let Err(e) = bus.unsubscribe(user_id).await {
            warn!(user_id, error = %e, "relay unsubscribe failed on disconnect");
        }
    }
    if let Err(e) = server.store.update_user_state(user_id, PresenceState::Offline) {
        warn!(user_id, error = %e, "presence not cleared after disconnect");
    }
    info!(user_id, "user marked offline after abrupt disconnect");
}

fn friend_summary(user: &UserRecord) -> FriendSummary {
    FriendSummary { id: user.id, name: user.name.clone(), state: user.state }
}

fn group_summary(group: GroupWithMembers) -> GroupSummary {
    GroupSummary {
        id: group.group.id,
        groupname: group.group.name,
        groupdesc: group.group.desc,
        users: group
            .members
            .into_iter()
            .map(|(user, role)| GroupMemberSummary {
                id: user.id,
                name: user.name,
                state: user.state,
                role,
            })
            .collect(),
    }
}
