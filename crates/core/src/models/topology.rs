use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 目标拓扑：声明本节点上启用的提供者
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologySpec {
    #[serde(default)]
    pub bindings: Vec<BindingSpec>,
}

/// 角色到提供者实现的绑定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindingSpec {
    pub role: String,
    pub provider: String,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

impl TopologySpec {
    pub fn from_slice(bytes: &[u8]) -> crate::AgentResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
