//! 网络等待统一加超时

use std::future::Future;
use std::time::Duration;

use agent_core::{AgentError, AgentResult};
use tracing::warn;

/// 在 `duration` 内执行 `operation`，超时返回 [`AgentError::Timeout`]
pub async fn with_timeout<F, T>(operation_name: &str, duration: Duration, operation: F) -> AgentResult<T>
where
    F: Future<Output = AgentResult<T>>,
{
    match tokio::time::timeout(duration, operation).await {
        Ok(result) => result,
        Err(_) => {
            warn!("操作 '{operation_name}' 超时 (超时时间: {duration:?})");
            Err(AgentError::timeout(operation_name, duration))
        }
    }
}
