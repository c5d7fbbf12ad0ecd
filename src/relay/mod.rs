//! 跨节点转发桥 / Cross-node relay bridge
//!
//! 以用户为频道的发布订阅总线抽象；任何至少一次投递的
//! pub/sub 传输都可以作为实现。
//! A per-user-channel pub/sub bus abstraction; any at-least-once pub/sub
//! transport qualifies as an implementation.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

mod redis;
pub use self::redis::RedisRelayBus;

/// 订阅回调：收到转发给某用户的负载 / Subscription callback: a payload relayed for a user
pub type InboundHandler = Arc<dyn Fn(i64, String) + Send + Sync>;

#[async_trait]
pub trait RelayBus: Send + Sync {
    /// 本节点成为该用户频道的唯一接收方 / This node becomes the sole receiver for the user's channel
    async fn subscribe(&self, user_id: i64, on_message: InboundHandler) -> Result<()>;
    async fn unsubscribe(&self, user_id: i64) -> Result<()>;
    async fn publish(&self, user_id: i64, payload: String) -> Result<()>;
}

/// 进程内总线：同进程多节点与测试用 / In-process bus for same-process nodes and tests
pub struct LocalBus {
    subscribers: DashMap<i64, InboundHandler>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self { subscribers: DashMap::new() }
    }
}

#[async_trait]
impl RelayBus for LocalBus {
    async fn subscribe(&self, user_id: i64, on_message: InboundHandler) -> Result<()> {
        self.subscribers.insert(user_id, on_message);
        Ok(())
    }

    async fn unsubscribe(&self, user_id: i64) -> Result<()> {
        self.subscribers.remove(&user_id);
        Ok(())
    }

    async fn publish(&self, user_id: i64, payload: String) -> Result<()> {
        // 先克隆回调再调用，避免持守卫重入 / clone the callback before calling
        // so the guard is not held across re-entry
        let handler = self.subscribers.get(&user_id).map(|entry| entry.value().clone());
        match handler {
            Some(handler) => handler(user_id, payload),
            None => debug!(user_id, "publish with no subscriber, payload dropped"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[tokio::test]
    async fn publish_reaches_subscriber_until_unsubscribe() {
        let bus = LocalBus::new();
        let seen: Arc<Mutex<Vec<(i64, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(8, Arc::new(move |uid, payload| sink.lock().push((uid, payload))))
            .await
            .unwrap();

        bus.publish(8, "one".into()).await.unwrap();
        bus.publish(9, "nobody".into()).await.unwrap();
        bus.unsubscribe(8).await.unwrap();
        bus.publish(8, "late".into()).await.unwrap();

        let seen = seen.lock();
        assert_eq!(seen.as_slice(), &[(8, "one".to_string())]);
    }
}
