use std::sync::Arc;
use std::time::Duration;

use agent_core::{
    models::{BindingSpec, TopologySpec},
    traits::TargetProvider,
    AgentError, AgentResult, ProviderRegistry,
};
use tracing::{info, warn};

use crate::providers::{
    HttpTargetProvider, MockTargetProvider, ScriptProvider, ScriptProviderConfig,
};

pub const SCRIPT_PROVIDER: &str = "providers.target.script";
pub const HTTP_PROVIDER: &str = "providers.target.http";
pub const MOCK_PROVIDER: &str = "providers.target.mock";

/// 编排器认识、但本代理不提供的提供者类型。绑定到这些类型的角色被跳过。
pub const UNSUPPORTED_PROVIDERS: &[&str] = &[
    "providers.target.docker",
    "providers.target.remote-agent",
    "providers.target.win10.sideload",
];

/// 根据拓扑文件中的绑定创建提供者，按角色名登记
pub struct ProviderFactory {
    http_timeout: Duration,
}

impl ProviderFactory {
    pub fn new(http_timeout: Duration) -> Self {
        Self { http_timeout }
    }

    /// 创建单个提供者。未知类型返回 `None`。
    pub fn create(&self, binding: &BindingSpec) -> AgentResult<Option<Arc<dyn TargetProvider>>> {
        let provider: Arc<dyn TargetProvider> = match binding.provider.as_str() {
            SCRIPT_PROVIDER => {
                let config = ScriptProviderConfig::from_map(&binding.config)?;
                Arc::new(ScriptProvider::new(config))
            }
            HTTP_PROVIDER => Arc::new(HttpTargetProvider::new(self.http_timeout)?),
            MOCK_PROVIDER => Arc::new(MockTargetProvider::new(binding.role.clone())),
            _ => return Ok(None),
        };
        Ok(Some(provider))
    }

    pub fn build_registry(&self, topology: &TopologySpec) -> AgentResult<ProviderRegistry> {
        let mut registry = ProviderRegistry::new();
        for binding in &topology.bindings {
            if binding.role.is_empty() {
                warn!(provider = %binding.provider, "binding without role skipped");
                continue;
            }
            match self.create(binding) {
                Ok(Some(provider)) => {
                    info!(role = %binding.role, provider = %binding.provider, "provider registered");
                    registry.register(binding.role.clone(), provider);
                }
                Ok(None) if UNSUPPORTED_PROVIDERS.contains(&binding.provider.as_str()) => {
                    warn!(
                        role = %binding.role,
                        provider = %binding.provider,
                        "provider type not supported by this agent, skipped"
                    );
                }
                Ok(None) => {
                    warn!(
                        role = %binding.role,
                        provider = %binding.provider,
                        "unknown provider type, skipped"
                    );
                }
                Err(e) => {
                    return Err(AgentError::Configuration(format!(
                        "failed to create provider for role '{}': {e}",
                        binding.role
                    )));
                }
            }
        }
        Ok(registry)
    }
}

impl Default for ProviderFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
