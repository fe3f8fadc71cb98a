use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_config::AgentConfig;
use agent_core::{
    models::{CoaRequest, CoaResponse, PagingResponse, TaskResult},
    traits::{Transport, TransportBinding},
    AgentError, AgentResult,
};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::correlation::{CorrelationRegistry, PendingReply};
use crate::timeout::with_timeout;

#[derive(Debug, Clone)]
pub struct PubSubBindingConfig {
    pub target: String,
    pub namespace: String,
    pub request_topic: String,
    pub response_topic: String,
    pub fetch_timeout: Duration,
    pub publish_timeout: Duration,
    pub topology_timeout: Duration,
    pub push_capacity: usize,
}

impl PubSubBindingConfig {
    pub fn from_agent_config(config: &AgentConfig) -> Self {
        Self {
            target: config.target_name.clone(),
            namespace: config.namespace.clone(),
            request_topic: config.mqtt_request_topic(),
            response_topic: config.mqtt_response_topic(),
            fetch_timeout: config.scheduler.fetch_timeout(),
            publish_timeout: config.scheduler.publish_timeout(),
            topology_timeout: config.scheduler.topology_timeout(),
            push_capacity: config.mqtt().channel_capacity,
        }
    }
}

/// 发布订阅传输上的绑定
///
/// 所有出站请求发往请求主题，应答从响应主题返回。入站消息由单个路由任务处理：
/// 带 `request-id` 的先交给控制关联表，再交给拉取关联表，都未登记则忽略；
/// 不带 `request-id` 的按推送任务处理。
pub struct PubSubBinding<T: Transport> {
    transport: Arc<T>,
    config: PubSubBindingConfig,
    fetch_registry: CorrelationRegistry,
    control_registry: CorrelationRegistry,
    pushed_tx: mpsc::Sender<Vec<u8>>,
    pushed_rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    router: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport + 'static> PubSubBinding<T> {
    pub fn new(
        transport: Arc<T>,
        config: PubSubBindingConfig,
        fetch_registry: CorrelationRegistry,
        control_registry: CorrelationRegistry,
    ) -> Self {
        let (pushed_tx, pushed_rx) = mpsc::channel(config.push_capacity.max(1));
        Self {
            transport,
            config,
            fetch_registry,
            control_registry,
            pushed_tx,
            pushed_rx: Mutex::new(Some(pushed_rx)),
            router: tokio::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PubSubBindingConfig {
        &self.config
    }

    async fn publish_request(&self, request: &CoaRequest) -> AgentResult<()> {
        let payload = serde_json::to_vec(request)?;
        with_timeout(
            &format!("publish {}", request.route),
            self.config.publish_timeout,
            self.transport.publish(&self.config.request_topic, payload),
        )
        .await
    }

    /// 登记关联键、发布请求、等待应答。登记先于发布完成。
    async fn round_trip(
        &self,
        registry: &CorrelationRegistry,
        request: CoaRequest,
        timeout: Duration,
    ) -> AgentResult<CoaResponse> {
        let key = CorrelationRegistry::new_key();
        let pending: PendingReply = registry.register(&key).await?;
        let request = request.with_request_id(&key);
        debug!(route = %request.route, request_id = %key, "publishing correlated request");
        self.publish_request(&request).await?;
        pending.await_once(timeout).await
    }

    async fn fetch(&self, page: Option<&str>) -> AgentResult<PagingResponse> {
        let request = CoaRequest::fetch_tasks(&self.config.target, &self.config.namespace, page);
        let response = self
            .round_trip(&self.fetch_registry, request, self.config.fetch_timeout)
            .await?;
        if !response.state.is_success() {
            return Err(AgentError::Transport(format!(
                "task fetch rejected with state {}: {}",
                response.state.code(),
                String::from_utf8_lossy(&response.body)
            )));
        }
        PagingResponse::from_body(&response.body)
    }
}

impl<T: Transport> Drop for PubSubBinding<T> {
    fn drop(&mut self) {
        if let Some(router) = self.router.get_mut().take() {
            router.abort();
        }
    }
}

#[async_trait]
impl<T: Transport + 'static> TransportBinding for PubSubBinding<T> {
    async fn start(&self) -> AgentResult<()> {
        let mut router = self.router.lock().await;
        if router.is_some() {
            return Ok(());
        }

        let inbound = self.transport.subscribe(&self.config.response_topic).await?;
        info!(topic = %self.config.response_topic, "inbound router started");
        *router = Some(tokio::spawn(route_inbound(
            inbound,
            self.control_registry.clone(),
            self.fetch_registry.clone(),
            self.pushed_tx.clone(),
        )));
        Ok(())
    }

    async fn fetch_page(&self, cursor: &str) -> AgentResult<PagingResponse> {
        self.fetch(Some(cursor)).await
    }

    async fn poll(&self) -> AgentResult<PagingResponse> {
        Ok(self.fetch(None).await?.retain_tasks())
    }

    async fn submit_result(&self, result: &TaskResult) -> AgentResult<()> {
        let stamped = result.clone().with_namespace(&self.config.namespace);
        let body = serde_json::to_vec(&stamped)?;
        self.publish_request(&CoaRequest::submit_result(body)).await
    }

    async fn update_topology(&self, topology: &[u8]) -> AgentResult<()> {
        info!(
            target = %self.config.target,
            namespace = %self.config.namespace,
            "sending topology update"
        );
        let request = CoaRequest::update_topology(
            &self.config.target,
            &self.config.namespace,
            topology.to_vec(),
        );
        let response = self
            .round_trip(&self.control_registry, request, self.config.topology_timeout)
            .await?;

        if response.state.is_success() {
            info!(state = response.state.code(), "topology update confirmed");
            Ok(())
        } else {
            Err(AgentError::TopologyUpdate(format!(
                "state {}: {}",
                response.state.code(),
                String::from_utf8_lossy(&response.body)
            )))
        }
    }

    fn take_pushed_tasks(&self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.pushed_rx.lock().ok()?.take()
    }
}

async fn route_inbound(
    mut inbound: mpsc::Receiver<Vec<u8>>,
    control: CorrelationRegistry,
    fetch: CorrelationRegistry,
    pushed: mpsc::Sender<Vec<u8>>,
) {
    while let Some(raw) = inbound.recv().await {
        let response: CoaResponse = match serde_json::from_slice(&raw) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "discarding undecodable inbound message");
                continue;
            }
        };

        let Some(request_id) = response.request_id().map(str::to_string) else {
            let body = if response.body.is_empty() { raw } else { response.body };
            forward_pushed(&pushed, &body);
            continue;
        };

        let response = match control.try_resolve(&request_id, response).await {
            Ok(()) => continue,
            Err(unmatched) => unmatched,
        };
        if fetch.try_resolve(&request_id, response).await.is_err() {
            metrics::counter!("remote_agent_correlation_misses_total").increment(1);
            debug!(request_id = %request_id, "reply matches no outstanding request, ignored");
        }
    }
    debug!("inbound channel closed, router exiting");
}

/// 推送的单个任务或一页任务
fn forward_pushed(pushed: &mpsc::Sender<Vec<u8>>, body: &[u8]) {
    let envelopes = match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) if value.get("operationID").is_some_and(|id| id.is_string()) => {
            vec![body.to_vec()]
        }
        Ok(value) if value.get("requestList").is_some() => {
            match serde_json::from_value::<PagingResponse>(value) {
                Ok(page) => page.retain_tasks().into_envelopes(),
                Err(e) => {
                    warn!(error = %e, "discarding malformed pushed page");
                    return;
                }
            }
        }
        _ => {
            debug!("inbound message without request-id is not a task, ignored");
            return;
        }
    };

    for envelope in envelopes {
        metrics::counter!("remote_agent_pushed_tasks_total").increment(1);
        if let Err(e) = pushed.try_send(envelope) {
            metrics::counter!("remote_agent_pushed_tasks_dropped_total").increment(1);
            warn!(error = %e, "push queue unavailable, pushed task dropped");
        }
    }
}
