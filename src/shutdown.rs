use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

/// 停止信号广播
///
/// 调度循环、推送通道和拓扑上报各自订阅一份接收端。触发后发送端被丢弃，
/// 之后的订阅者会立即收到信号。
#[derive(Clone)]
pub struct ShutdownManager {
    sender: Arc<RwLock<Option<broadcast::Sender<()>>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self {
            sender: Arc::new(RwLock::new(Some(sender))),
        }
    }

    pub async fn subscribe(&self) -> broadcast::Receiver<()> {
        match self.sender.read().await.as_ref() {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = broadcast::channel(1);
                let _ = tx.send(());
                rx
            }
        }
    }

    /// 触发停止，重复调用无副作用
    pub async fn shutdown(&self) {
        let Some(tx) = self.sender.write().await.take() else {
            debug!("shutdown already triggered");
            return;
        };
        debug!(subscribers = tx.receiver_count(), "broadcasting stop signal");
        let _ = tx.send(());
        info!("stop signal sent");
    }

    pub async fn is_shutdown(&self) -> bool {
        self.sender.read().await.is_none()
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
