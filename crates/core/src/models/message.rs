use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 发布订阅传输中携带关联键的元数据字段
pub const REQUEST_ID_KEY: &str = "request-id";

pub const ROUTE_TASKS: &str = "tasks";
pub const ROUTE_GET_RESULT: &str = "getResult";
pub const ROUTE_UPDATE_TOPOLOGY: &str = "updatetopology";

/// 发往编排器的请求信封
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoaRequest {
    #[serde(default)]
    pub route: String,
    #[serde(default)]
    pub method: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    #[serde(rename = "contentType", default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub body: Vec<u8>,
}

/// 编排器返回的应答信封
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoaResponse {
    #[serde(rename = "contentType", default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    #[serde(default, with = "base64_bytes")]
    pub body: Vec<u8>,
    #[serde(default)]
    pub state: State,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// 与编排器约定的整数状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Ok,
    Accepted,
    BadRequest,
    Unauthorized,
    NotFound,
    InternalError,
    Updated,
    Deleted,
    UpdateFailed,
    DeleteFailed,
    Other(u16),
}

impl State {
    pub fn code(self) -> u16 {
        match self {
            State::Ok => 200,
            State::Accepted => 202,
            State::BadRequest => 400,
            State::Unauthorized => 401,
            State::NotFound => 404,
            State::InternalError => 500,
            State::Updated => 8001,
            State::Deleted => 8002,
            State::UpdateFailed => 8003,
            State::DeleteFailed => 8004,
            State::Other(code) => code,
        }
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            200 => State::Ok,
            202 => State::Accepted,
            400 => State::BadRequest,
            401 => State::Unauthorized,
            404 => State::NotFound,
            500 => State::InternalError,
            8001 => State::Updated,
            8002 => State::Deleted,
            8003 => State::UpdateFailed,
            8004 => State::DeleteFailed,
            other => State::Other(other),
        }
    }

    /// 控制操作中 OK 和 Accepted 均视为成功
    pub fn is_success(self) -> bool {
        matches!(self, State::Ok | State::Accepted)
    }
}

impl Default for State {
    fn default() -> Self {
        State::Ok
    }
}

impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.code())
    }
}

impl<'de> Deserialize<'de> for State {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u16::deserialize(deserializer)?;
        Ok(State::from_code(code))
    }
}

impl CoaRequest {
    /// 拉取任务请求。`get_all` 为真时附带分页游标。
    pub fn fetch_tasks(target: &str, namespace: &str, page: Option<&str>) -> Self {
        let mut parameters = HashMap::from([
            ("target".to_string(), target.to_string()),
            ("namespace".to_string(), namespace.to_string()),
        ]);
        if let Some(cursor) = page {
            parameters.insert("getAll".to_string(), "true".to_string());
            parameters.insert("preindex".to_string(), wire_preindex(cursor).to_string());
        }
        Self {
            route: ROUTE_TASKS.to_string(),
            method: "GET".to_string(),
            parameters,
            ..Default::default()
        }
    }

    /// 结果回传请求
    pub fn submit_result(body: Vec<u8>) -> Self {
        Self {
            route: ROUTE_GET_RESULT.to_string(),
            method: "POST".to_string(),
            content_type: "application/json".to_string(),
            body,
            ..Default::default()
        }
    }

    /// 拓扑更新请求
    pub fn update_topology(target: &str, namespace: &str, topology: Vec<u8>) -> Self {
        Self {
            route: ROUTE_UPDATE_TOPOLOGY.to_string(),
            method: "POST".to_string(),
            parameters: HashMap::from([
                ("target".to_string(), target.to_string()),
                ("__name".to_string(), target.to_string()),
                ("namespace".to_string(), namespace.to_string()),
                ("Component".to_string(), "default".to_string()),
            ]),
            content_type: "application/json".to_string(),
            body: topology,
            ..Default::default()
        }
    }

    pub fn with_request_id(mut self, request_id: &str) -> Self {
        self.metadata
            .insert(REQUEST_ID_KEY.to_string(), request_id.to_string());
        self
    }
}

impl CoaResponse {
    pub fn request_id(&self) -> Option<&str> {
        self.metadata
            .get(REQUEST_ID_KEY)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }
}

/// 首页游标在线上写作 `0` 而不是空串
pub fn wire_preindex(cursor: &str) -> &str {
    if cursor.is_empty() {
        "0"
    } else {
        cursor
    }
}

/// 字节负载在 JSON 信封中以 base64 编码
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        match encoded {
            Some(s) if !s.is_empty() => STANDARD.decode(s).map_err(serde::de::Error::custom),
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_tasks_first_page_uses_zero_preindex() {
        let request = CoaRequest::fetch_tasks("edge-1", "default", Some(""));
        assert_eq!(request.route, "tasks");
        assert_eq!(request.method, "GET");
        assert_eq!(request.parameters["getAll"], "true");
        assert_eq!(request.parameters["preindex"], "0");
    }

    #[test]
    fn test_fetch_tasks_without_paging_omits_cursor() {
        let request = CoaRequest::fetch_tasks("edge-1", "default", None);
        assert!(!request.parameters.contains_key("getAll"));
        assert!(!request.parameters.contains_key("preindex"));
        assert_eq!(request.parameters["target"], "edge-1");
    }

    #[test]
    fn test_body_is_base64_on_the_wire() {
        let request = CoaRequest::submit_result(b"{\"a\":1}".to_vec()).with_request_id("k1");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["body"], "eyJhIjoxfQ==");
        assert_eq!(json["metadata"]["request-id"], "k1");
        assert_eq!(json["contentType"], "application/json");
    }

    #[test]
    fn test_response_decodes_state_and_request_id() {
        let raw = r#"{"state":202,"body":"","metadata":{"request-id":"abc"}}"#;
        let response: CoaResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.state, State::Accepted);
        assert!(response.state.is_success());
        assert_eq!(response.request_id(), Some("abc"));
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_unknown_state_code_is_preserved() {
        let response: CoaResponse = serde_json::from_str(r#"{"state":9999}"#).unwrap();
        assert_eq!(response.state, State::Other(9999));
        assert!(!response.state.is_success());
        assert_eq!(serde_json::to_value(response.state).unwrap(), 9999);
    }
}
