use std::fmt;

use serde::{Deserialize, Serialize};

use super::message::base64_bytes;
use crate::AgentError;

/// 结果错误码，供编排器按类别处理失败任务
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MalformedRequest,
    ProviderNotFound,
    ActionNotFound,
    InvalidPayload,
    ProviderError,
    SerializationError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::MalformedRequest => "malformed_request",
            ErrorCode::ProviderNotFound => "provider_not_found",
            ErrorCode::ActionNotFound => "action_not_found",
            ErrorCode::InvalidPayload => "invalid_payload",
            ErrorCode::ProviderError => "provider_error",
            ErrorCode::SerializationError => "serialization_error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&AgentError> for ErrorDescriptor {
    fn from(err: &AgentError) -> Self {
        let code = match err {
            AgentError::MalformedRequest(_) => ErrorCode::MalformedRequest,
            AgentError::ProviderNotFound(_) => ErrorCode::ProviderNotFound,
            AgentError::ActionNotFound(_) => ErrorCode::ActionNotFound,
            AgentError::InvalidPayload { .. } => ErrorCode::InvalidPayload,
            AgentError::Serialization(_) => ErrorCode::SerializationError,
            _ => ErrorCode::ProviderError,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

/// 任务执行结果，回传给编排器
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(rename = "operationID")]
    pub operation_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, with = "base64_bytes")]
    pub body: Vec<u8>,
    #[serde(default)]
    pub error: Option<ErrorDescriptor>,
    /// 执行期间收集的提供者输出
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
}

impl TaskResult {
    pub fn success(operation_id: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            operation_id: operation_id.into(),
            body,
            ..Default::default()
        }
    }

    pub fn failure(operation_id: impl Into<String>, err: &AgentError) -> Self {
        Self {
            operation_id: operation_id.into(),
            error: Some(ErrorDescriptor::from(err)),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn with_logs(mut self, logs: Vec<String>) -> Self {
        self.logs = logs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_carries_stable_code() {
        let result = TaskResult::failure("op1", &AgentError::ProviderNotFound("nope".into()));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["operationID"], "op1");
        assert_eq!(value["error"]["code"], "provider_not_found");
        assert_eq!(value["body"], "");
        assert!(!result.is_success());
    }

    #[test]
    fn test_success_has_null_error() {
        let result = TaskResult::success("op2", b"[]".to_vec()).with_namespace("default");
        let value = serde_json::to_value(&result).unwrap();
        assert!(value["error"].is_null());
        assert_eq!(value["namespace"], "default");
        assert_eq!(value["body"], "W10=");
    }

    #[test]
    fn test_logs_are_omitted_when_empty() {
        let quiet = serde_json::to_value(TaskResult::success("op3", Vec::new())).unwrap();
        assert!(quiet.get("logs").is_none());

        let noisy = TaskResult::success("op4", Vec::new())
            .with_logs(vec!["[stdout] deployed".to_string()]);
        let value = serde_json::to_value(&noisy).unwrap();
        assert_eq!(value["logs"][0], "[stdout] deployed");
    }

    #[test]
    fn test_timeout_maps_to_provider_error() {
        let err = AgentError::timeout("script", std::time::Duration::from_secs(1));
        assert_eq!(ErrorDescriptor::from(&err).code, ErrorCode::ProviderError);
    }
}
