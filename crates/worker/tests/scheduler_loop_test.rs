use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_core::{
    models::{
        ComponentResultSpec, ComponentSpec, ComponentStep, DeploymentSpec, DeploymentStep,
        PagingResponse, TaskResult, ValidationRule,
    },
    traits::{TargetProvider, TransportBinding},
    AgentError, AgentResult, ProviderRegistry,
};
use agent_worker::{LoopState, SchedulerLoop, SchedulerLoopConfig, TaskDispatcher};
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{broadcast, mpsc, Notify};

#[derive(Default)]
struct FakeBinding {
    pages: Mutex<VecDeque<AgentResult<PagingResponse>>>,
    cursors: Mutex<Vec<String>>,
    submitted: Mutex<Vec<TaskResult>>,
    pushed: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    /// fetch_page 与 poll 的调用总数
    requests: AtomicUsize,
    /// 设置后 submit_result 阻塞到放行为止
    submit_gate: Option<Arc<Notify>>,
    submit_blocked: Notify,
}

impl FakeBinding {
    fn with_pages(pages: Vec<AgentResult<PagingResponse>>) -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(pages.into()),
            ..Default::default()
        })
    }

    fn submitted_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .submitted
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.operation_id.clone())
            .collect();
        ids.sort();
        ids
    }

    async fn wait_for_results(&self, expected: usize) {
        for _ in 0..250 {
            if self.submitted.lock().unwrap().len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("expected {expected} submitted results");
    }
}

#[async_trait]
impl TransportBinding for FakeBinding {
    async fn start(&self) -> AgentResult<()> {
        Ok(())
    }

    async fn fetch_page(&self, cursor: &str) -> AgentResult<PagingResponse> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.cursors.lock().unwrap().push(cursor.to_string());
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(PagingResponse::default()))
    }

    async fn poll(&self) -> AgentResult<PagingResponse> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(PagingResponse::default())
    }

    async fn submit_result(&self, result: &TaskResult) -> AgentResult<()> {
        if let Some(gate) = &self.submit_gate {
            self.submit_blocked.notify_one();
            gate.notified().await;
        }
        self.submitted.lock().unwrap().push(result.clone());
        Ok(())
    }

    async fn update_topology(&self, _topology: &[u8]) -> AgentResult<()> {
        Ok(())
    }

    fn take_pushed_tasks(&self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.pushed.lock().unwrap().take()
    }
}

/// 记录同时执行的最大任务数
#[derive(Default)]
struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl TargetProvider for ConcurrencyGauge {
    async fn get_validation_rule(&self) -> AgentResult<ValidationRule> {
        Ok(ValidationRule::default())
    }

    async fn get(
        &self,
        _deployment: &DeploymentSpec,
        _references: &[ComponentStep],
    ) -> AgentResult<Vec<ComponentSpec>> {
        Ok(Vec::new())
    }

    async fn apply(
        &self,
        _deployment: &DeploymentSpec,
        _step: &DeploymentStep,
        _is_dry_run: bool,
    ) -> AgentResult<HashMap<String, ComponentResultSpec>> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(HashMap::new())
    }
}

/// apply 在放行前一直挂起
#[derive(Default)]
struct GatedProvider {
    started: Notify,
    release: Notify,
}

#[async_trait]
impl TargetProvider for GatedProvider {
    async fn get_validation_rule(&self) -> AgentResult<ValidationRule> {
        Ok(ValidationRule::default())
    }

    async fn get(
        &self,
        _deployment: &DeploymentSpec,
        _references: &[ComponentStep],
    ) -> AgentResult<Vec<ComponentSpec>> {
        Ok(Vec::new())
    }

    async fn apply(
        &self,
        _deployment: &DeploymentSpec,
        _step: &DeploymentStep,
        _is_dry_run: bool,
    ) -> AgentResult<HashMap<String, ComponentResultSpec>> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(HashMap::new())
    }
}

fn task(id: &str) -> serde_json::Value {
    json!({
        "operationID": id,
        "provider": "gauge",
        "action": "apply",
        "deployment": {},
        "step": {}
    })
}

fn page(ids: &[&str], last_message_id: &str) -> AgentResult<PagingResponse> {
    Ok(PagingResponse {
        request_list: ids.iter().map(|id| task(id)).collect(),
        last_message_id: last_message_id.to_string(),
    })
}

fn scheduler(
    binding: Arc<FakeBinding>,
    provider: Arc<dyn TargetProvider>,
    concurrent_jobs: usize,
) -> SchedulerLoop {
    let mut registry = ProviderRegistry::new();
    registry.register("gauge", provider);
    SchedulerLoop::new(
        binding,
        Arc::new(TaskDispatcher::new(registry)),
        SchedulerLoopConfig {
            poll_interval: Duration::from_millis(20),
            concurrent_jobs,
        },
    )
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let ids: Vec<String> = (0..7).map(|i| format!("op{i}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let binding = FakeBinding::with_pages(vec![page(&id_refs, "")]);
    let gauge = Arc::new(ConcurrencyGauge::default());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(scheduler(binding.clone(), gauge.clone(), 2).run(shutdown_rx));

    binding.wait_for_results(7).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    assert_eq!(gauge.peak.load(Ordering::SeqCst), 2);
    let mut expected = ids.clone();
    expected.sort();
    assert_eq!(binding.submitted_ids(), expected);
}

#[tokio::test]
async fn test_interrupted_backlog_resumes_from_cursor() {
    let binding = FakeBinding::with_pages(vec![
        page(&["a1"], "c1"),
        Err(AgentError::timeout("fetch tasks", Duration::from_millis(10))),
        page(&["b1"], ""),
    ]);
    let gauge = Arc::new(ConcurrencyGauge::default());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(scheduler(binding.clone(), gauge, 3).run(shutdown_rx));

    binding.wait_for_results(2).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    assert_eq!(binding.submitted_ids(), vec!["a1", "b1"]);
    assert_eq!(*binding.cursors.lock().unwrap(), vec!["", "c1", "c1"]);
}

#[tokio::test]
async fn test_pushed_tasks_are_dispatched() {
    let (push_tx, push_rx) = mpsc::channel(8);
    let binding = Arc::new(FakeBinding {
        pushed: Mutex::new(Some(push_rx)),
        ..Default::default()
    });
    let gauge = Arc::new(ConcurrencyGauge::default());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(scheduler(binding.clone(), gauge, 1).run(shutdown_rx));

    push_tx
        .send(serde_json::to_vec(&task("pushed-1")).unwrap())
        .await
        .unwrap();
    binding.wait_for_results(1).await;

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
    assert_eq!(binding.submitted_ids(), vec!["pushed-1"]);
}

#[tokio::test]
async fn test_stop_signal_reaches_stopped_state() {
    let binding = FakeBinding::with_pages(Vec::new());
    let gauge = Arc::new(ConcurrencyGauge::default());
    let scheduler = scheduler(binding, gauge, 3);
    let state = scheduler.state();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(scheduler.run(shutdown_rx));
    tokio::time::sleep(Duration::from_millis(50)).await;

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(*state.borrow(), LoopState::Stopped);
}

#[tokio::test]
async fn test_in_flight_task_is_reported_after_stop_signal() {
    let binding = FakeBinding::with_pages(vec![page(&["slow-1"], "")]);
    let gate = Arc::new(GatedProvider::default());
    let scheduler = scheduler(binding.clone(), gate.clone(), 2);
    let state = scheduler.state();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    tokio::time::timeout(Duration::from_secs(2), gate.started.notified())
        .await
        .expect("task was never dispatched");
    shutdown_tx.send(()).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(binding.submitted_ids().is_empty());
    assert!(!handle.is_finished());
    assert_eq!(*state.borrow(), LoopState::Dispatching);

    gate.release.notify_one();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();

    assert_eq!(binding.submitted_ids(), vec!["slow-1"]);
    assert_eq!(*state.borrow(), LoopState::Stopped);
}

#[tokio::test]
async fn test_next_poll_waits_for_batch_results() {
    let gate = Arc::new(Notify::new());
    let binding = Arc::new(FakeBinding {
        pages: Mutex::new(vec![page(&["held-1"], "")].into()),
        submit_gate: Some(gate.clone()),
        ..Default::default()
    });
    let gauge = Arc::new(ConcurrencyGauge::default());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(scheduler(binding.clone(), gauge, 2).run(shutdown_rx));

    tokio::time::timeout(Duration::from_secs(2), binding.submit_blocked.notified())
        .await
        .expect("result was never submitted");

    // 远超轮询间隔，结果未回传前不得再次拉取
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(binding.requests.load(Ordering::SeqCst), 1);

    gate.notify_one();
    binding.wait_for_results(1).await;
    for _ in 0..100 {
        if binding.requests.load(Ordering::SeqCst) > 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(binding.requests.load(Ordering::SeqCst) > 1);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();
    assert_eq!(binding.submitted_ids(), vec!["held-1"]);
}
