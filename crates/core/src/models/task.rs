use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use super::deployment::{ComponentStep, DeploymentSpec, DeploymentStep};
use crate::AgentError;

/// 任务信封中携带编排器活动关联 ID 的字段
pub const ACTIVITY_CORRELATION_ID_KEY: &str = "X-Activity-correlationId";

/// 信封未携带关联 ID 时使用的占位值
pub const MOCK_CORRELATION_ID: &str = "00000000-0000-0000-0000-000000000000";

/// 任务信封请求的提供者动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskAction {
    #[serde(rename = "get")]
    Get,
    #[serde(rename = "apply")]
    Apply,
    #[serde(rename = "getValidationRule")]
    GetValidationRule,
}

impl TaskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskAction::Get => "get",
            TaskAction::Apply => "apply",
            TaskAction::GetValidationRule => "getValidationRule",
        }
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskAction {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "get" => Ok(TaskAction::Get),
            "apply" => Ok(TaskAction::Apply),
            "getValidationRule" => Ok(TaskAction::GetValidationRule),
            other => Err(AgentError::ActionNotFound(other.to_string())),
        }
    }
}

/// 所有任务信封共用的头部。`action` 保持为字符串，未知动作报告为
/// `ActionNotFound` 而不是解码失败。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    #[serde(rename = "operationID", default)]
    pub operation_id: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub action: String,
    #[serde(
        rename = "X-Activity-correlationId",
        default,
        deserialize_with = "lenient_correlation_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_id: Option<String>,
}

/// 关联 ID 不是字符串时按缺失处理，任务照常执行
fn lenient_correlation_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(id)) => Some(id),
        _ => None,
    })
}

impl AgentRequest {
    pub fn activity_correlation_id(&self) -> &str {
        self.correlation_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(MOCK_CORRELATION_ID)
    }
}

/// `get` 信封的负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderGetRequest {
    #[serde(flatten)]
    pub header: AgentRequest,
    pub deployment: DeploymentSpec,
    #[serde(default)]
    pub references: Vec<ComponentStep>,
}

/// `apply` 信封的负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderApplyRequest {
    #[serde(flatten)]
    pub header: AgentRequest,
    pub deployment: DeploymentSpec,
    pub step: DeploymentStep,
    #[serde(rename = "isDryRun", default)]
    pub is_dry_run: bool,
}

/// 编排器积压任务的一页
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PagingResponse {
    #[serde(rename = "requestList", default)]
    pub request_list: Vec<serde_json::Value>,
    #[serde(rename = "lastMessageID", default)]
    pub last_message_id: String,
}

impl PagingResponse {
    /// 空应答体视为空页
    pub fn from_body(body: &[u8]) -> crate::AgentResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        Ok(serde_json::from_slice(body)?)
    }

    pub fn has_more(&self) -> bool {
        !self.last_message_id.is_empty()
    }

    /// 丢弃不带 `operationID` 的条目，其余按原样编码为任务信封
    pub fn retain_tasks(mut self) -> Self {
        self.request_list
            .retain(|req| req.get("operationID").is_some_and(|id| id.is_string()));
        self
    }

    pub fn into_envelopes(self) -> Vec<Vec<u8>> {
        self.request_list
            .iter()
            .filter_map(|req| serde_json::to_vec(req).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_parsing() {
        assert_eq!("get".parse::<TaskAction>().unwrap(), TaskAction::Get);
        assert_eq!(
            "getValidationRule".parse::<TaskAction>().unwrap(),
            TaskAction::GetValidationRule
        );
        let err = "remove".parse::<TaskAction>().unwrap_err();
        assert!(matches!(err, AgentError::ActionNotFound(ref a) if a == "remove"));
    }

    #[test]
    fn test_apply_request_decodes_from_flat_envelope() {
        let raw = json!({
            "operationID": "op1",
            "provider": "script",
            "action": "apply",
            "deployment": {"instance": {"name": "i1"}},
            "step": {"Target": "t1", "Role": "script", "IsFirst": true, "Components": []},
            "isDryRun": true
        });
        let request: ProviderApplyRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(request.header.operation_id, "op1");
        assert_eq!(request.step.target, "t1");
        assert!(request.is_dry_run);
    }

    #[test]
    fn test_missing_correlation_id_falls_back_to_mock() {
        let header: AgentRequest =
            serde_json::from_value(json!({"operationID": "op1"})).unwrap();
        assert_eq!(header.activity_correlation_id(), MOCK_CORRELATION_ID);
    }

    #[test]
    fn test_non_string_correlation_id_is_ignored() {
        for id in [json!(42), json!({"nested": true}), json!(null)] {
            let header: AgentRequest = serde_json::from_value(json!({
                "operationID": "op1",
                "X-Activity-correlationId": id
            }))
            .unwrap();
            assert_eq!(header.operation_id, "op1");
            assert_eq!(header.correlation_id, None);
            assert_eq!(header.activity_correlation_id(), MOCK_CORRELATION_ID);
        }

        let header: AgentRequest = serde_json::from_value(json!({
            "operationID": "op2",
            "X-Activity-correlationId": "act-7"
        }))
        .unwrap();
        assert_eq!(header.activity_correlation_id(), "act-7");
    }

    #[test]
    fn test_paging_response_cursor() {
        let page: PagingResponse = serde_json::from_value(json!({
            "requestList": [{"operationID": "a"}],
            "lastMessageID": "m-1"
        }))
        .unwrap();
        assert!(page.has_more());
        assert_eq!(page.request_list.len(), 1);

        let last: PagingResponse = serde_json::from_value(json!({"requestList": []})).unwrap();
        assert!(!last.has_more());
    }

    #[test]
    fn test_poll_body_drops_entries_without_operation_id() {
        let page = PagingResponse::from_body(
            br#"{"requestList":[{"operationID":"a"},{"provider":"x"},{"operationID":7}],"lastMessageID":""}"#,
        )
        .unwrap()
        .retain_tasks();
        let envelopes = page.into_envelopes();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0], br#"{"operationID":"a"}"#.to_vec());

        assert_eq!(PagingResponse::from_body(b"").unwrap(), PagingResponse::default());
    }
}
