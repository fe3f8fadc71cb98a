use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::message::State;

/// 部署描述。代理只透传给提供者，不解析其结构。
pub type DeploymentSpec = serde_json::Value;

/// 组件定义
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub component_type: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, serde_json::Value>,
}

impl ComponentSpec {
    /// 读取字符串类型的组件属性
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentStep {
    pub action: String,
    pub component: ComponentSpec,
}

impl ComponentStep {
    pub fn is_update(&self) -> bool {
        self.action == "update"
    }
}

/// 部署步骤。字段名沿用编排器的大写形式。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStep {
    #[serde(rename = "Target", default)]
    pub target: String,
    #[serde(rename = "Components", default)]
    pub components: Vec<ComponentStep>,
    #[serde(rename = "Role", default)]
    pub role: String,
    #[serde(rename = "IsFirst", default)]
    pub is_first: bool,
}

/// 单个组件的执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentResultSpec {
    pub status: State,
    #[serde(default)]
    pub message: String,
}

impl ComponentResultSpec {
    pub fn new(status: State, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// 提供者声明的组件校验规则
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(rename = "requiredType", default)]
    pub required_component_type: String,
    #[serde(rename = "componentValidationRule", default)]
    pub component_validation_rule: ComponentValidationRule,
    #[serde(rename = "allowSidecar", default)]
    pub allow_sidecar: bool,
    #[serde(rename = "scopeIsolation", default)]
    pub scope_isolation: bool,
    #[serde(rename = "instanceIsolation", default)]
    pub instance_isolation: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentValidationRule {
    #[serde(rename = "requiredComponentType", default)]
    pub required_component_type: String,
    #[serde(rename = "changeDetectionProperties", default)]
    pub change_detection_properties: Vec<PropertyDesc>,
    #[serde(rename = "requiredProperties", default)]
    pub required_properties: Vec<String>,
    #[serde(rename = "optionalProperties", default)]
    pub optional_properties: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyDesc {
    pub name: String,
    #[serde(rename = "ignoreCase", default)]
    pub ignore_case: bool,
    #[serde(rename = "skipIfMissing", default)]
    pub skip_if_missing: bool,
}
