use std::sync::Arc;
use std::time::Duration;

use agent_config::models::SchedulerConfig;
use agent_core::traits::TransportBinding;
use tokio::sync::{broadcast, mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::{PagingClient, TaskDispatcher};

#[derive(Debug, Clone)]
pub struct SchedulerLoopConfig {
    pub poll_interval: Duration,
    pub concurrent_jobs: usize,
}

impl SchedulerLoopConfig {
    pub fn from_scheduler_config(config: &SchedulerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            concurrent_jobs: config.concurrent_jobs.max(1),
        }
    }
}

impl Default for SchedulerLoopConfig {
    fn default() -> Self {
        Self::from_scheduler_config(&SchedulerConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Polling,
    Dispatching,
    Stopped,
}

/// 调度循环
///
/// 周期性拉取任务，经信号量限流后分发并回传结果，整批结果回传完毕才进入下一轮。
/// 首轮以及存在未取完的游标时走分页拉取，其余周期走普通轮询。
/// 推送通道上的任务与轮询共用同一个信号量。
pub struct SchedulerLoop {
    binding: Arc<dyn TransportBinding>,
    dispatcher: Arc<TaskDispatcher>,
    paging: PagingClient,
    config: SchedulerLoopConfig,
    permits: Arc<Semaphore>,
    pending_cursor: Option<String>,
    state: watch::Sender<LoopState>,
}

impl SchedulerLoop {
    pub fn new(
        binding: Arc<dyn TransportBinding>,
        dispatcher: Arc<TaskDispatcher>,
        mut config: SchedulerLoopConfig,
    ) -> Self {
        config.concurrent_jobs = config.concurrent_jobs.max(1);
        let (state, _) = watch::channel(LoopState::Idle);
        Self {
            paging: PagingClient::new(Arc::clone(&binding)),
            permits: Arc::new(Semaphore::new(config.concurrent_jobs)),
            binding,
            dispatcher,
            config,
            pending_cursor: Some(String::new()),
            state,
        }
    }

    pub fn state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: LoopState) {
        self.state.send_replace(state);
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            concurrent_jobs = self.config.concurrent_jobs,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "scheduler loop started"
        );

        let (push_stop, push_stop_rx) = broadcast::channel(1);
        let push_worker = self.binding.take_pushed_tasks().map(|pushed| {
            tokio::spawn(run_push_path(
                pushed,
                push_stop_rx,
                Arc::clone(&self.binding),
                Arc::clone(&self.dispatcher),
                Arc::clone(&self.permits),
            ))
        });

        loop {
            self.run_cycle().await;
            self.set_state(LoopState::Idle);

            tokio::select! {
                _ = shutdown.recv() => {
                    info!("scheduler loop received stop signal");
                    break;
                }
                _ = sleep(self.config.poll_interval) => {}
            }
        }

        let _ = push_stop.send(());
        if let Some(worker) = push_worker {
            if let Err(e) = worker.await {
                error!(error = %e, "push path worker failed");
            }
        }

        // 等待推送路径上尚未完成的任务
        let drained = self
            .permits
            .acquire_many(self.config.concurrent_jobs as u32)
            .await;
        drop(drained);

        self.set_state(LoopState::Stopped);
        info!("scheduler loop stopped");
    }

    async fn run_cycle(&mut self) {
        self.set_state(LoopState::Polling);

        let envelopes = match self.pending_cursor.take() {
            Some(cursor) => {
                let outcome = self.paging.fetch_all(&cursor).await;
                if !outcome.is_complete() {
                    self.pending_cursor = Some(outcome.next_cursor.clone());
                }
                outcome.envelopes
            }
            None => self.poll_batch().await,
        };

        if envelopes.is_empty() {
            return;
        }

        self.set_state(LoopState::Dispatching);
        self.dispatch_batch(envelopes).await;
    }

    /// 最多连续轮询 `concurrent_jobs` 次，遇到空页或错误提前结束
    async fn poll_batch(&self) -> Vec<Vec<u8>> {
        let mut envelopes = Vec::new();
        for _ in 0..self.config.concurrent_jobs {
            match self.binding.poll().await {
                Ok(page) if page.request_list.is_empty() => break,
                Ok(page) => envelopes.extend(page.into_envelopes()),
                Err(e) => {
                    warn!(error = %e, "poll failed, retrying next cycle");
                    break;
                }
            }
        }
        if !envelopes.is_empty() {
            info!(tasks = envelopes.len(), "found jobs");
        }
        envelopes
    }

    async fn dispatch_batch(&self, envelopes: Vec<Vec<u8>>) {
        let total = envelopes.len();
        let mut in_flight = JoinSet::new();

        for envelope in envelopes {
            let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
                warn!("dispatch permits closed, abandoning batch");
                break;
            };
            let binding = Arc::clone(&self.binding);
            let dispatcher = Arc::clone(&self.dispatcher);
            in_flight.spawn(async move {
                let _permit = permit;
                dispatch_and_submit(&dispatcher, binding.as_ref(), &envelope).await
            });
        }

        let mut delivered = 0usize;
        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(e) => error!(error = %e, "dispatch task aborted"),
            }
        }
        debug!(total, delivered, "batch finished");
    }
}

/// 分发一个信封并回传结果。回传失败只记录日志，不重试。
async fn dispatch_and_submit(
    dispatcher: &TaskDispatcher,
    binding: &dyn TransportBinding,
    envelope: &[u8],
) -> bool {
    let result = dispatcher.handle(envelope).await;
    match binding.submit_result(&result).await {
        Ok(()) => {
            metrics::counter!("remote_agent_results_total", "outcome" => "delivered").increment(1);
            debug!(operation_id = %result.operation_id, "result submitted");
            true
        }
        Err(e) => {
            metrics::counter!("remote_agent_results_total", "outcome" => "undelivered")
                .increment(1);
            warn!(
                operation_id = %result.operation_id,
                error = %e,
                "result undelivered, dropped"
            );
            false
        }
    }
}

async fn run_push_path(
    mut pushed: mpsc::Receiver<Vec<u8>>,
    mut shutdown: broadcast::Receiver<()>,
    binding: Arc<dyn TransportBinding>,
    dispatcher: Arc<TaskDispatcher>,
    permits: Arc<Semaphore>,
) {
    debug!("push path started");
    loop {
        let envelope = tokio::select! {
            _ = shutdown.recv() => break,
            envelope = pushed.recv() => match envelope {
                Some(envelope) => envelope,
                None => break,
            },
        };

        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let binding = Arc::clone(&binding);
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            let _permit = permit;
            dispatch_and_submit(&dispatcher, binding.as_ref(), &envelope).await;
        });
    }
    debug!("push path stopped");
}
