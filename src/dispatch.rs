//! 消息分发表 / Message dispatch table
//!
//! 类型编码到处理器的映射，启动时一次性注册。未知类型降级为
//! 仅记日志的兜底处理器，坏消息不会终止连接或进程。
//! Type-code to handler map, registered once at startup. Unknown types fall
//! back to a log-only handler; a bad message never kills a connection or the
//! process.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::domain::message::MsgType;
use crate::registry::Connection;
use crate::server::ChatServer;
use crate::service;

pub type HandlerOutput = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// 统一处理器签名：(连接, 负载, 时间) / Uniform handler shape: (connection, payload, time)
pub type MsgHandler =
    Arc<dyn Fn(Arc<ChatServer>, Connection, Value, DateTime<Utc>) -> HandlerOutput + Send + Sync>;

pub struct DispatchTable {
    handlers: HashMap<i64, MsgHandler>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    pub fn register(&mut self, msg: MsgType, handler: MsgHandler) {
        self.handlers.insert(msg.code(), handler);
    }

    /// 总是返回可调用的处理器 / Always returns a callable handler
    pub fn resolve(&self, code: i64) -> MsgHandler {
        match self.handlers.get(&code) {
            Some(handler) => handler.clone(),
            None => Arc::new(move |_server, _conn, _payload, _time| {
                Box::pin(async move {
                    warn!(code, "no handler for message type, message ignored");
                    Ok(())
                })
            }),
        }
    }
}

fn handler<F, Fut>(f: F) -> MsgHandler
where
    F: Fn(Arc<ChatServer>, Connection, Value, DateTime<Utc>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |server, conn, payload, time| Box::pin(f(server, conn, payload, time)))
}

/// 服务的全部入站操作 / Every inbound operation of the service
pub fn default_table() -> DispatchTable {
    let mut table = DispatchTable::new();
    table.register(MsgType::Login, handler(service::session::login));
    table.register(MsgType::Logout, handler(service::session::logout));
    table.register(MsgType::Register, handler(service::session::register));
    table.register(MsgType::OneChat, handler(service::delivery::one_chat));
    table.register(MsgType::AddFriend, handler(service::friend::add_friend));
    table.register(MsgType::CreateGroup, handler(service::group::create_group));
    table.register(MsgType::AddGroup, handler(service::group::add_group));
    table.register(MsgType::GroupChat, handler(service::group::group_chat));
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use std::net::SocketAddr;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn unknown_type_resolves_to_silent_fallback() {
        let storage = Arc::new(Storage::open_temporary().unwrap());
        let server = Arc::new(ChatServer::new(storage.clone(), storage));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let conn = Connection::new("c1".into(), addr, tx);

        let fallback = server.dispatch.resolve(404);
        fallback(server.clone(), conn, serde_json::json!({"type": 404}), Utc::now())
            .await
            .unwrap();
        // 兜底处理器不产生任何出站帧 / the fallback emits no outbound frame
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn all_wire_operations_are_registered() {
        let table = default_table();
        for msg in [
            MsgType::Login,
            MsgType::Logout,
            MsgType::Register,
            MsgType::OneChat,
            MsgType::AddFriend,
            MsgType::CreateGroup,
            MsgType::AddGroup,
            MsgType::GroupChat,
        ] {
            assert!(table.handlers.contains_key(&msg.code()));
        }
    }
}
