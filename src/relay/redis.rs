//! Redis 发布订阅桥实现 / Redis pub/sub bridge implementation
//!
//! 频道名即用户 id；订阅流与订阅控制分离为两个后台任务。
//! Channel names are plain user ids; the subscription stream and the
//! subscribe/unsubscribe control path run as two background tasks.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::StreamExt;
use redis::aio::{MultiplexedConnection, PubSubSink, PubSubStream};
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{InboundHandler, RelayBus};

enum BusCommand {
    Subscribe(i64),
    Unsubscribe(i64),
}

pub struct RedisRelayBus {
    publisher: MultiplexedConnection,
    control: mpsc::UnboundedSender<BusCommand>,
    handlers: Arc<DashMap<i64, InboundHandler>>,
}

impl RedisRelayBus {
    /// 连接失败由调用方决定降级；本类型不做重试。
    /// The caller decides how to degrade on connect failure; no retries here.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let publisher = client.get_multiplexed_async_connection().await?;
        let (sink, stream) = client.get_async_pubsub().await?.split();

        let handlers: Arc<DashMap<i64, InboundHandler>> = Arc::new(DashMap::new());
        let (control, control_rx) = mpsc::unbounded_channel();
        tokio::spawn(control_loop(sink, control_rx));
        tokio::spawn(inbound_loop(stream, handlers.clone()));

        Ok(Self { publisher, control, handlers })
    }

    fn send_command(&self, cmd: BusCommand) -> Result<()> {
        self.control.send(cmd).map_err(|_| anyhow!("relay bus task stopped"))
    }
}

#[async_trait]
impl RelayBus for RedisRelayBus {
    async fn subscribe(&self, user_id: i64, on_message: InboundHandler) -> Result<()> {
        self.handlers.insert(user_id, on_message);
        self.send_command(BusCommand::Subscribe(user_id))
    }

    async fn unsubscribe(&self, user_id: i64) -> Result<()> {
        self.handlers.remove(&user_id);
        self.send_command(BusCommand::Unsubscribe(user_id))
    }

    async fn publish(&self, user_id: i64, payload: String) -> Result<()> {
        let mut conn = self.publisher.clone();
        let _: () = conn.publish(user_id.to_string(), payload).await?;
        Ok(())
    }
}

async fn control_loop(mut sink: PubSubSink, mut rx: mpsc::UnboundedReceiver<BusCommand>) {
    while let Some(cmd) = rx.recv().await {
        let result = match cmd {
            BusCommand::Subscribe(user_id) => sink.subscribe(user_id.to_string()).await,
            BusCommand::Unsubscribe(user_id) => sink.unsubscribe(user_id.to_string()).await,
        };
        if let Err(e) = result {
            warn!(error = %e, "relay bus subscription change failed");
        }
    }
}

async fn inbound_loop(mut stream: PubSubStream, handlers: Arc<DashMap<i64, InboundHandler>>) {
    while let Some(msg) = stream.next().await {
        let channel = msg.get_channel_name().to_string();
        let Ok(user_id) = channel.parse::<i64>() else {
            debug!(channel, "ignoring message on non-user channel");
            continue;
        };
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(user_id, error = %e, "undecodable relayed payload dropped");
                continue;
            }
        };
        let handler = handlers.get(&user_id).map(|entry| entry.value().clone());
        match handler {
            Some(handler) => handler(user_id, payload),
            // 退订与在途消息之间的竞态 / race between unsubscribe and an in-flight message
            None => debug!(user_id, "relayed message with no local subscriber"),
        }
    }
    warn!("relay bus inbound stream ended");
}
