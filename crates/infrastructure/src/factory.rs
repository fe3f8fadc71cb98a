use std::sync::Arc;
use std::time::Duration;

use agent_config::{AgentConfig, TransportProtocol};
use agent_core::{traits::TransportBinding, AgentResult};
use tracing::{debug, info};

use crate::bindings::{HttpBinding, HttpBindingConfig, PubSubBinding, PubSubBindingConfig};
use crate::correlation::{CorrelationConfig, CorrelationRegistry};
use crate::transport::MqttTransport;

/// 关联表参数取自调度配置
pub fn correlation_config(config: &AgentConfig) -> CorrelationConfig {
    let scheduler = &config.scheduler;
    CorrelationConfig {
        ttl: Duration::from_secs(scheduler.correlation_ttl_seconds),
        max_entries: scheduler.correlation_max_entries,
        sweep_interval: Duration::from_secs(scheduler.correlation_sweep_interval_seconds),
    }
}

pub struct BindingFactory;

impl BindingFactory {
    /// 按协议创建传输绑定。关联表只在发布订阅绑定中创建，其后台任务需要 tokio 运行时。
    pub fn create(config: &AgentConfig) -> AgentResult<Arc<dyn TransportBinding>> {
        debug!("Creating transport binding with protocol: {}", config.transport.protocol);

        match config.transport.protocol {
            TransportProtocol::Http => {
                info!(
                    request = %config.transport.http.request_endpoint,
                    response = %config.transport.http.response_endpoint,
                    "Initializing HTTP binding"
                );
                let binding = HttpBinding::new(HttpBindingConfig::from_agent_config(config))?;
                Ok(Arc::new(binding))
            }
            TransportProtocol::Mqtt => {
                let binding_config = PubSubBindingConfig::from_agent_config(config);
                info!(
                    request_topic = %binding_config.request_topic,
                    response_topic = %binding_config.response_topic,
                    "Initializing MQTT binding"
                );
                let transport = Arc::new(MqttTransport::from_config(config)?);
                let correlation = correlation_config(config);
                Ok(Arc::new(PubSubBinding::new(
                    transport,
                    binding_config,
                    CorrelationRegistry::spawn("fetch", correlation.clone()),
                    CorrelationRegistry::spawn("control", correlation),
                )))
            }
        }
    }
}
