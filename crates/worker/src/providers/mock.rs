use std::collections::HashMap;

use agent_core::{
    models::{
        ComponentResultSpec, ComponentSpec, ComponentStep, DeploymentSpec, DeploymentStep, State,
        ValidationRule,
    },
    traits::TargetProvider,
    AgentResult,
};
use async_trait::async_trait;
use tracing::debug;

/// 回显提供者，用于本地运行和测试
///
/// `get` 原样返回引用的组件，`apply` 按组件名回显每个步骤。
#[derive(Debug, Default)]
pub struct MockTargetProvider {
    name: String,
}

impl MockTargetProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl TargetProvider for MockTargetProvider {
    async fn get_validation_rule(&self) -> AgentResult<ValidationRule> {
        Ok(ValidationRule::default())
    }

    async fn get(
        &self,
        _deployment: &DeploymentSpec,
        references: &[ComponentStep],
    ) -> AgentResult<Vec<ComponentSpec>> {
        debug!(provider = %self.name, references = references.len(), "mock get");
        Ok(references.iter().map(|r| r.component.clone()).collect())
    }

    async fn apply(
        &self,
        _deployment: &DeploymentSpec,
        step: &DeploymentStep,
        is_dry_run: bool,
    ) -> AgentResult<HashMap<String, ComponentResultSpec>> {
        debug!(provider = %self.name, components = step.components.len(), is_dry_run, "mock apply");
        Ok(step
            .components
            .iter()
            .map(|c| {
                let status = if c.is_update() {
                    State::Updated
                } else {
                    State::Deleted
                };
                (
                    c.component.name.clone(),
                    ComponentResultSpec::new(status, format!("{} {}", c.action, c.component.name)),
                )
            })
            .collect())
    }
}
