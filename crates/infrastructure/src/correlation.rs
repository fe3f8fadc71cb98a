//! 关联表
//!
//! 发布订阅传输没有天然的请求/应答配对，出站请求在元数据中携带一个随机的
//! `request-id`，入站应答凭它找到等待方。
//!
//! 关联表由单个后台任务独占，句柄只通过命令通道与之通信：
//!
//! - `register` 在返回前已完成插入，调用方随后发布请求即可保证应答不会早于登记
//! - `resolve` 对未登记的键是空操作，只记录日志
//! - 等待方超时后删除自己的键
//! - 定期清理超过 TTL 的条目，条目数超过上限时淘汰最旧的
//!
//! 命令通道不设上限：`PendingReply` 在 `Drop` 中同步发送取消命令，不能因通道满而丢失。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use agent_core::{models::CoaResponse, AgentError, AgentResult};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};


#[derive(Debug, Clone)]
pub struct CorrelationConfig {
    pub ttl: Duration,
    pub max_entries: usize,
    pub sweep_interval: Duration,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_entries: 10000,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

enum Command {
    Register {
        key: String,
        ack: oneshot::Sender<oneshot::Receiver<CoaResponse>>,
    },
    Resolve {
        key: String,
        payload: CoaResponse,
        ack: oneshot::Sender<Result<(), CoaResponse>>,
    },
    Cancel {
        key: String,
        ack: Option<oneshot::Sender<()>>,
    },
    Contains {
        key: String,
        ack: oneshot::Sender<bool>,
    },
    Len {
        ack: oneshot::Sender<usize>,
    },
}

struct Entry {
    created_at: Instant,
    outcome: oneshot::Sender<CoaResponse>,
}

/// 关联表句柄，可廉价克隆
#[derive(Clone)]
pub struct CorrelationRegistry {
    name: &'static str,
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for CorrelationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationRegistry")
            .field("name", &self.name)
            .finish()
    }
}

impl CorrelationRegistry {
    /// 启动关联表任务。所有句柄释放后任务退出。
    pub fn spawn(name: &'static str, config: CorrelationConfig) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_registry(name, config, rx));
        Self { name, commands }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 生成新的关联键
    pub fn new_key() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// 登记关联键。返回时条目已经插入。
    pub async fn register(&self, key: &str) -> AgentResult<PendingReply> {
        let (ack, ack_rx) = oneshot::channel();
        self.send(Command::Register {
            key: key.to_string(),
            ack,
        })?;
        let outcome = ack_rx.await.map_err(|_| self.closed())?;
        Ok(PendingReply {
            key: key.to_string(),
            outcome,
            registry: self.clone(),
            settled: false,
        })
    }

    /// 投递应答。返回该键是否处于登记状态。
    pub async fn resolve(&self, key: &str, payload: CoaResponse) -> bool {
        self.try_resolve(key, payload).await.is_ok()
    }

    /// 投递应答，键未登记时原样交还应答
    pub async fn try_resolve(&self, key: &str, payload: CoaResponse) -> Result<(), CoaResponse> {
        let (ack, ack_rx) = oneshot::channel();
        let command = Command::Resolve {
            key: key.to_string(),
            payload,
            ack,
        };
        if let Err(mpsc::error::SendError(command)) = self.commands.send(command) {
            return match command {
                Command::Resolve { payload, .. } => Err(payload),
                _ => Ok(()),
            };
        }
        ack_rx.await.unwrap_or(Ok(()))
    }

    /// 放弃关联键，之后到达的应答将被忽略
    pub async fn cancel(&self, key: &str) {
        let (ack, ack_rx) = oneshot::channel();
        let command = Command::Cancel {
            key: key.to_string(),
            ack: Some(ack),
        };
        if self.send(command).is_ok() {
            let _ = ack_rx.await;
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        let (ack, ack_rx) = oneshot::channel();
        let command = Command::Contains {
            key: key.to_string(),
            ack,
        };
        if self.send(command).is_err() {
            return false;
        }
        ack_rx.await.unwrap_or(false)
    }

    pub async fn len(&self) -> usize {
        let (ack, ack_rx) = oneshot::channel();
        if self.send(Command::Len { ack }).is_err() {
            return 0;
        }
        ack_rx.await.unwrap_or(0)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn send(&self, command: Command) -> AgentResult<()> {
        self.commands.send(command).map_err(|_| self.closed())
    }

    fn closed(&self) -> AgentError {
        AgentError::Internal(format!("correlation registry '{}' has stopped", self.name))
    }
}

/// 一次已登记、尚未完成的等待
#[must_use = "a pending reply must be awaited or it is cancelled on drop"]
pub struct PendingReply {
    key: String,
    outcome: oneshot::Receiver<CoaResponse>,
    registry: CorrelationRegistry,
    settled: bool,
}

impl PendingReply {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 等待应答，最多 `timeout`。超时后删除关联键再返回超时错误。
    pub async fn await_once(mut self, timeout: Duration) -> AgentResult<CoaResponse> {
        let outcome = tokio::time::timeout(timeout, &mut self.outcome).await;
        match outcome {
            Ok(Ok(response)) => {
                self.settled = true;
                Ok(response)
            }
            Ok(Err(_)) => {
                self.settled = true;
                Err(AgentError::Transport(format!(
                    "correlation {} was evicted before a reply arrived",
                    self.key
                )))
            }
            Err(_) => {
                self.registry.cancel(&self.key).await;
                self.settled = true;
                debug!(
                    registry = self.registry.name,
                    key = %self.key,
                    "abandoned correlation after timeout"
                );
                Err(AgentError::timeout(
                    format!("{} reply {}", self.registry.name, self.key),
                    timeout,
                ))
            }
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let key = std::mem::take(&mut self.key);
        if let Err(mpsc::error::SendError(Command::Cancel { key, .. })) =
            self.registry.commands.send(Command::Cancel { key, ack: None })
        {
            debug!(
                registry = self.registry.name,
                key = %key,
                "registry already stopped, dropped wait not cancelled"
            );
        }
    }
}

async fn run_registry(
    name: &'static str,
    config: CorrelationConfig,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut entries: HashMap<String, Entry> = HashMap::new();
    let mut sweep = tokio::time::interval(config.sweep_interval);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(registry = name, "correlation registry started");

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                handle_command(name, &config, &mut entries, command);
            }
            _ = sweep.tick() => {
                purge_expired(name, config.ttl, &mut entries);
            }
        }
    }

    debug!(registry = name, pending = entries.len(), "correlation registry stopped");
}

fn handle_command(
    name: &'static str,
    config: &CorrelationConfig,
    entries: &mut HashMap<String, Entry>,
    command: Command,
) {
    match command {
        Command::Register { key, ack } => {
            if entries.len() >= config.max_entries && !entries.contains_key(&key) {
                evict_oldest(name, entries);
            }
            let (outcome, outcome_rx) = oneshot::channel();
            entries.insert(
                key,
                Entry {
                    created_at: Instant::now(),
                    outcome,
                },
            );
            let _ = ack.send(outcome_rx);
        }
        Command::Resolve { key, payload, ack } => {
            let outcome = match entries.remove(&key) {
                Some(entry) => {
                    if entry.outcome.send(payload).is_err() {
                        debug!(registry = name, key = %key, "waiter went away before reply");
                    }
                    Ok(())
                }
                None => {
                    debug!(registry = name, key = %key, "no pending request for correlation key");
                    Err(payload)
                }
            };
            let _ = ack.send(outcome);
        }
        Command::Cancel { key, ack } => {
            entries.remove(&key);
            if let Some(ack) = ack {
                let _ = ack.send(());
            }
        }
        Command::Contains { key, ack } => {
            let _ = ack.send(entries.contains_key(&key));
        }
        Command::Len { ack } => {
            let _ = ack.send(entries.len());
        }
    }
}

fn evict_oldest(name: &'static str, entries: &mut HashMap<String, Entry>) {
    let oldest = entries
        .iter()
        .min_by_key(|(_, entry)| entry.created_at)
        .map(|(key, _)| key.clone());
    if let Some(key) = oldest {
        entries.remove(&key);
        warn!(registry = name, key = %key, "correlation registry full, evicted oldest entry");
    }
}

fn purge_expired(name: &'static str, ttl: Duration, entries: &mut HashMap<String, Entry>) {
    let before = entries.len();
    entries.retain(|_, entry| entry.created_at.elapsed() <= ttl);
    let purged = before - entries.len();
    if purged > 0 {
        info!(registry = name, purged, "purged expired correlation entries");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::models::State;

    fn reply(body: &str) -> CoaResponse {
        CoaResponse {
            body: body.as_bytes().to_vec(),
            state: State::Ok,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_resolve_unknown_key_is_noop() {
        let registry = CorrelationRegistry::spawn("test", CorrelationConfig::default());
        assert!(!registry.resolve("missing", reply("late")).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_await_once_returns_concurrent_resolve() {
        let registry = CorrelationRegistry::spawn("test", CorrelationConfig::default());
        let key = CorrelationRegistry::new_key();
        let pending = registry.register(&key).await.unwrap();
        assert!(registry.contains(&key).await);

        let resolver = registry.clone();
        let resolve_key = key.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(resolver.resolve(&resolve_key, reply("pong")).await);
        });

        let response = pending.await_once(Duration::from_secs(2)).await.unwrap();
        assert_eq!(response.body, b"pong");
        assert!(!registry.contains(&key).await);
    }

    #[tokio::test]
    async fn test_await_once_times_out_after_deadline_and_forgets_key() {
        let registry = CorrelationRegistry::spawn("test", CorrelationConfig::default());
        let key = CorrelationRegistry::new_key();
        let pending = registry.register(&key).await.unwrap();

        let deadline = Duration::from_millis(150);
        let started = Instant::now();
        let err = pending.await_once(deadline).await.unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() >= deadline);
        assert!(!registry.contains(&key).await);
        assert!(!registry.resolve(&key, reply("too late")).await);
    }

    #[tokio::test]
    async fn test_resolve_delivers_at_most_once() {
        let registry = CorrelationRegistry::spawn("test", CorrelationConfig::default());
        let key = CorrelationRegistry::new_key();
        let pending = registry.register(&key).await.unwrap();

        assert!(registry.resolve(&key, reply("first")).await);
        assert!(!registry.resolve(&key, reply("second")).await);

        let response = pending.await_once(Duration::from_secs(1)).await.unwrap();
        assert_eq!(response.body, b"first");
    }

    #[tokio::test]
    async fn test_dropped_pending_reply_is_cancelled() {
        let registry = CorrelationRegistry::spawn("test", CorrelationConfig::default());
        let key = CorrelationRegistry::new_key();
        drop(registry.register(&key).await.unwrap());
        assert!(!registry.contains(&key).await);
    }

    #[tokio::test]
    async fn test_burst_of_dropped_replies_leaves_no_entries() {
        let registry = CorrelationRegistry::spawn("test", CorrelationConfig::default());
        let mut pending = Vec::new();
        for i in 0..600 {
            pending.push(registry.register(&format!("k{i}")).await.unwrap());
        }
        assert_eq!(registry.len().await, 600);

        // 全部在同一次调度内释放，中间不给关联表任务运行的机会
        drop(pending);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_max_entries_evicts_oldest() {
        let config = CorrelationConfig {
            max_entries: 2,
            ..Default::default()
        };
        let registry = CorrelationRegistry::spawn("test", config);
        let first = registry.register("k1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let _second = registry.register("k2").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let _third = registry.register("k3").await.unwrap();

        assert_eq!(registry.len().await, 2);
        assert!(!registry.contains("k1").await);
        let err = first.await_once(Duration::from_millis(50)).await.unwrap_err();
        assert!(!err.is_timeout());
    }

    #[tokio::test]
    async fn test_ttl_sweep_purges_stale_entries() {
        let config = CorrelationConfig {
            ttl: Duration::from_millis(30),
            sweep_interval: Duration::from_millis(20),
            ..Default::default()
        };
        let registry = CorrelationRegistry::spawn("test", config);
        let _pending = registry.register("stale").await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!registry.contains("stale").await);
    }
}
