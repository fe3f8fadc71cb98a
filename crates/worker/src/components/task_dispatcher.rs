use std::time::Instant;

use agent_core::{
    models::{AgentRequest, ProviderApplyRequest, ProviderGetRequest, TaskAction, TaskResult},
    AgentError, AgentResult, ProviderRegistry, TaskLog,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info_span, warn, Instrument};

/// 任务分发器
///
/// 解码一个任务信封，按名称找到提供者，调用对应的提供者方法并编码结果。
/// 所有路径都返回 `TaskResult`，错误不会越过这一层。
pub struct TaskDispatcher {
    registry: ProviderRegistry,
}

impl TaskDispatcher {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub async fn handle(&self, raw: &[u8]) -> TaskResult {
        let header: AgentRequest = match serde_json::from_slice(raw) {
            Ok(header) => header,
            Err(e) => {
                let operation_id = partial_operation_id(raw);
                warn!(operation_id = %operation_id, error = %e, "malformed task envelope");
                metrics::counter!("remote_agent_tasks_total", "outcome" => "malformed")
                    .increment(1);
                return TaskResult::failure(
                    operation_id,
                    &AgentError::MalformedRequest(e.to_string()),
                );
            }
        };

        let span = info_span!(
            "dispatch",
            operation_id = %header.operation_id,
            provider = %header.provider,
            action = %header.action,
            correlation_id = %header.activity_correlation_id(),
        );

        async {
            let started = Instant::now();
            let log = TaskLog::new();
            let outcome = log.scope(self.dispatch(&header, raw)).await;
            let result = match outcome {
                Ok(body) => {
                    debug!(elapsed_ms = started.elapsed().as_millis() as u64, "task completed");
                    metrics::counter!("remote_agent_tasks_total", "outcome" => "success")
                        .increment(1);
                    TaskResult::success(header.operation_id.clone(), body)
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "task failed"
                    );
                    metrics::counter!("remote_agent_tasks_total", "outcome" => "failure")
                        .increment(1);
                    TaskResult::failure(header.operation_id.clone(), &e)
                }
            };
            result.with_logs(log.take())
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, header: &AgentRequest, raw: &[u8]) -> AgentResult<Vec<u8>> {
        let action: TaskAction = header.action.parse()?;
        let provider = self
            .registry
            .get(&header.provider)
            .ok_or_else(|| AgentError::ProviderNotFound(header.provider.clone()))?;

        match action {
            TaskAction::Get => {
                let request: ProviderGetRequest = decode_payload(action, raw)?;
                let components = provider
                    .get(&request.deployment, &request.references)
                    .await?;
                encode(&components)
            }
            TaskAction::Apply => {
                let request: ProviderApplyRequest = decode_payload(action, raw)?;
                let results = provider
                    .apply(&request.deployment, &request.step, request.is_dry_run)
                    .await?;
                encode(&results)
            }
            TaskAction::GetValidationRule => {
                let rule = provider.get_validation_rule().await?;
                encode(&rule)
            }
        }
    }
}

/// 尽量从无法完整解码的信封中取出 `operationID`
fn partial_operation_id(raw: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(raw)
        .ok()
        .and_then(|value| {
            value
                .get("operationID")
                .and_then(|id| id.as_str())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

fn decode_payload<T: DeserializeOwned>(action: TaskAction, raw: &[u8]) -> AgentResult<T> {
    serde_json::from_slice(raw).map_err(|e| AgentError::InvalidPayload {
        action: action.to_string(),
        message: e.to_string(),
    })
}

fn encode<T: Serialize>(value: &T) -> AgentResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}
