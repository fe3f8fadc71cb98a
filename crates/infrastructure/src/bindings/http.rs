use std::time::Duration;

use agent_config::AgentConfig;
use agent_core::{
    models::{wire_preindex, PagingResponse, TaskResult},
    traits::TransportBinding,
    AgentError, AgentResult,
};
use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::timeout::with_timeout;

#[derive(Debug, Clone)]
pub struct HttpBindingConfig {
    pub request_endpoint: String,
    pub response_endpoint: String,
    pub base_url: String,
    pub target: String,
    pub namespace: String,
    pub request_timeout: Duration,
    pub fetch_timeout: Duration,
    pub publish_timeout: Duration,
    pub topology_timeout: Duration,
}

impl HttpBindingConfig {
    pub fn from_agent_config(config: &AgentConfig) -> Self {
        let http = &config.transport.http;
        Self {
            request_endpoint: http.request_endpoint.clone(),
            response_endpoint: http.response_endpoint.clone(),
            base_url: http.base_url.trim_end_matches('/').to_string(),
            target: config.target_name.clone(),
            namespace: config.namespace.clone(),
            request_timeout: Duration::from_secs(http.request_timeout_seconds),
            fetch_timeout: config.scheduler.fetch_timeout(),
            publish_timeout: config.scheduler.publish_timeout(),
            topology_timeout: config.scheduler.topology_timeout(),
        }
    }
}

/// HTTP 轮询绑定
///
/// 每次请求/应答都是一次独立的 HTTP 往返，不需要关联表，编排器不会主动推送。
pub struct HttpBinding {
    client: Client,
    config: HttpBindingConfig,
}

impl HttpBinding {
    pub fn new(config: HttpBindingConfig) -> AgentResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AgentError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: HttpBindingConfig) -> Self {
        Self { client, config }
    }

    fn target_query(&self) -> [(&'static str, &str); 2] {
        [
            ("target", self.config.target.as_str()),
            ("namespace", self.config.namespace.as_str()),
        ]
    }

    async fn get_page(&self, page: Option<&str>) -> AgentResult<PagingResponse> {
        let mut request = self
            .client
            .get(&self.config.request_endpoint)
            .query(&self.target_query());
        if let Some(cursor) = page {
            request = request.query(&[("getAll", "true"), ("preindex", wire_preindex(cursor))]);
        }

        let fetch = async {
            let response = request.send().await.map_err(transport_error)?;
            let status = response.status();
            let body = response.bytes().await.map_err(transport_error)?;
            if !status.is_success() {
                return Err(AgentError::Transport(format!(
                    "task fetch failed with status {status}: {}",
                    String::from_utf8_lossy(&body)
                )));
            }
            PagingResponse::from_body(&body)
        };
        with_timeout("fetch tasks", self.config.fetch_timeout, fetch).await
    }
}

fn transport_error(err: reqwest::Error) -> AgentError {
    AgentError::Transport(err.to_string())
}

#[async_trait]
impl TransportBinding for HttpBinding {
    async fn start(&self) -> AgentResult<()> {
        Ok(())
    }

    async fn fetch_page(&self, cursor: &str) -> AgentResult<PagingResponse> {
        self.get_page(Some(cursor)).await
    }

    async fn poll(&self) -> AgentResult<PagingResponse> {
        Ok(self.get_page(None).await?.retain_tasks())
    }

    async fn submit_result(&self, result: &TaskResult) -> AgentResult<()> {
        let stamped = result.clone().with_namespace(&self.config.namespace);
        let body = serde_json::to_vec(&stamped)?;
        let request = self
            .client
            .post(&self.config.response_endpoint)
            .query(&self.target_query())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);

        let submit = async {
            let response = request.send().await.map_err(transport_error)?;
            let status = response.status();
            if !status.is_success() {
                return Err(AgentError::Transport(format!(
                    "result submission failed with status {status}"
                )));
            }
            debug!(operation_id = %result.operation_id, %status, "result delivered");
            Ok(())
        };
        with_timeout("submit result", self.config.publish_timeout, submit).await
    }

    async fn update_topology(&self, topology: &[u8]) -> AgentResult<()> {
        let url = format!(
            "{}/targets/updatetopology/{}",
            self.config.base_url, self.config.target
        );
        info!(url = %url, "sending topology update via HTTP");
        let request = self
            .client
            .post(&url)
            .query(&[("namespace", self.config.namespace.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(topology.to_vec());

        let update = async {
            let response = request.send().await.map_err(transport_error)?;
            let status = response.status();
            if status.is_success() {
                info!(%status, "topology updated");
                return Ok(());
            }
            let body = response.text().await.unwrap_or_default();
            Err(AgentError::TopologyUpdate(format!(
                "status {}: {body}",
                status.as_u16()
            )))
        };
        with_timeout("topology update", self.config.topology_timeout, update).await
    }

    fn take_pushed_tasks(&self) -> Option<mpsc::Receiver<Vec<u8>>> {
        None
    }
}
