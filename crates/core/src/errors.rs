use thiserror::Error;

/// 远程代理错误类型定义
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("请求格式错误: {0}")]
    MalformedRequest(String),

    #[error("提供者不存在: {0}")]
    ProviderNotFound(String),

    #[error("不支持的动作: {0}")]
    ActionNotFound(String),

    #[error("动作 {action} 的负载无效: {message}")]
    InvalidPayload { action: String, message: String },

    #[error("提供者执行失败: {0}")]
    Provider(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("传输错误: {0}")]
    Transport(String),

    #[error("操作超时: 等待 {operation} 超过 {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("拓扑更新失败: {0}")]
    TopologyUpdate(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl AgentError {
    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type AgentResult<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timeout_error_reports_millis() {
        let err = AgentError::timeout("topology update", Duration::from_secs(30));
        assert!(err.is_timeout());
        assert_eq!(
            err.to_string(),
            "操作超时: 等待 topology update 超过 30000ms"
        );
    }

    #[test]
    fn test_json_error_maps_to_serialization() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: AgentError = json_err.into();
        assert!(matches!(err, AgentError::Serialization(_)));
    }
}
