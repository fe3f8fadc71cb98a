use std::collections::HashMap;
use std::time::Duration;

use agent_core::{
    models::{
        ComponentResultSpec, ComponentSpec, ComponentStep, ComponentValidationRule,
        DeploymentSpec, DeploymentStep, State, ValidationRule,
    },
    traits::TargetProvider,
    AgentError, AgentResult,
};
use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::{error, info};

const URL_PROPERTY: &str = "http.url";
const METHOD_PROPERTY: &str = "http.method";
const BODY_PROPERTY: &str = "http.body";

/// HTTP 目标提供者
///
/// 对每个更新步骤的组件，按其 `http.url`/`http.method`/`http.body` 属性发起一次请求。
/// 提供者不记录状态，`get` 总是返回空列表。
pub struct HttpTargetProvider {
    client: Client,
}

impl HttpTargetProvider {
    pub fn new(timeout: Duration) -> AgentResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn invoke(&self, component: &ComponentSpec) -> AgentResult<()> {
        let url = component
            .property_str(URL_PROPERTY)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                AgentError::Provider(format!(
                    "component {} doesn't have a {URL_PROPERTY} property",
                    component.name
                ))
            })?;
        let method = component
            .property_str(METHOD_PROPERTY)
            .filter(|m| !m.is_empty())
            .unwrap_or("POST");
        let method = Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|e| AgentError::Provider(format!("invalid HTTP method {method}: {e}")))?;

        let body = match component.properties.get(BODY_PROPERTY) {
            Some(serde_json::Value::String(body)) => body.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };

        info!(component = %component.name, %method, url, "invoking component endpoint");
        let response = self
            .client
            .request(method, url)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/json; charset=UTF-8",
            )
            .body(body)
            .send()
            .await
            .map_err(|e| AgentError::Provider(format!("component {}: {e}", component.name)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(AgentError::Provider(format!(
                "component {}: HTTP request didn't respond 200 OK (got {status})",
                component.name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TargetProvider for HttpTargetProvider {
    async fn get_validation_rule(&self) -> AgentResult<ValidationRule> {
        Ok(ValidationRule {
            component_validation_rule: ComponentValidationRule {
                required_properties: vec![URL_PROPERTY.to_string()],
                optional_properties: vec![METHOD_PROPERTY.to_string(), BODY_PROPERTY.to_string()],
                ..Default::default()
            },
            ..Default::default()
        })
    }

    async fn get(
        &self,
        _deployment: &DeploymentSpec,
        _references: &[ComponentStep],
    ) -> AgentResult<Vec<ComponentSpec>> {
        Ok(Vec::new())
    }

    async fn apply(
        &self,
        _deployment: &DeploymentSpec,
        step: &DeploymentStep,
        is_dry_run: bool,
    ) -> AgentResult<HashMap<String, ComponentResultSpec>> {
        let mut results = HashMap::new();
        if let Some(missing) = step
            .components
            .iter()
            .filter(|c| c.is_update())
            .find(|c| c.component.property_str(URL_PROPERTY).is_none())
        {
            return Err(AgentError::Provider(format!(
                "component {} is missing required property {URL_PROPERTY}",
                missing.component.name
            )));
        }
        if is_dry_run {
            return Ok(results);
        }

        for component in step.components.iter().filter(|c| c.is_update()) {
            if let Err(e) = self.invoke(&component.component).await {
                error!(component = %component.component.name, error = %e, "HTTP target apply failed");
                return Err(e);
            }
            results.insert(
                component.component.name.clone(),
                ComponentResultSpec::new(State::Updated, ""),
            );
        }
        Ok(results)
    }
}
