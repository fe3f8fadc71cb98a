use std::collections::HashMap;
use std::sync::Arc;

use agent_core::{traits::Transport, AgentResult};
use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

/// 内存回环代理
///
/// 按主题把发布的消息复制给所有订阅者，没有订阅者时消息被丢弃，与 MQTT 的
/// 行为一致。用于测试以及不连接真实代理的本地运行。
#[derive(Debug, Clone)]
pub struct InMemoryTransport {
    subscribers: Arc<RwLock<HashMap<String, Vec<mpsc::Sender<Vec<u8>>>>>>,
    channel_capacity: usize,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(channel_capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            channel_capacity,
        }
    }

    pub async fn subscriber_count(&self, topic: &str) -> usize {
        let subscribers = self.subscribers.read().await;
        subscribers.get(topic).map_or(0, |subs| subs.len())
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> AgentResult<()> {
        let targets = {
            let subscribers = self.subscribers.read().await;
            subscribers.get(topic).cloned().unwrap_or_default()
        };

        if targets.is_empty() {
            debug!(topic, "no subscribers, message dropped");
            return Ok(());
        }

        let mut closed = false;
        for sender in &targets {
            if sender.send(payload.clone()).await.is_err() {
                closed = true;
            }
        }

        if closed {
            let mut subscribers = self.subscribers.write().await;
            if let Some(subs) = subscribers.get_mut(topic) {
                subs.retain(|sender| !sender.is_closed());
            }
        }

        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> AgentResult<mpsc::Receiver<Vec<u8>>> {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let mut subscribers = self.subscribers.write().await;
        subscribers.entry(topic.to_string()).or_default().push(tx);
        debug!(topic, "subscribed to in-memory topic");
        Ok(rx)
    }
}
