use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    logging::LogConfig,
    observability::ObservabilityConfig,
    scheduler::SchedulerConfig,
    transport::{MqttTransportConfig, TransportConfig},
};
use crate::validation::{ConfigValidator, ValidationUtils};

/// 环境变量前缀，例如 `REMOTE_AGENT_SCHEDULER__CONCURRENT_JOBS=5`
pub const ENV_PREFIX: &str = "REMOTE_AGENT";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub target_name: String,
    pub namespace: String,
    pub topology_path: String,
    pub transport: TransportConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LogConfig,
    pub observability: ObservabilityConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            target_name: "remote-target".to_string(),
            namespace: "default".to_string(),
            topology_path: "topology.json".to_string(),
            transport: TransportConfig::default(),
            scheduler: SchedulerConfig::default(),
            logging: LogConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AgentConfig {
    /// 加载配置：配置文件（TOML 或 JSON，按扩展名）叠加环境变量
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let config = Self::load_unvalidated(config_path)?;
        config.validate()?;
        Ok(config)
    }

    /// 只合并配置来源，不做校验。调用方覆盖字段后自行调用 `validate`。
    pub fn load_unvalidated(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, Self::file_format(path)));
        } else {
            let default_paths = ["config/remote-agent.toml", "remote-agent.toml", "config.json"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, Self::file_format(path)));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AgentConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AgentConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    fn file_format(path: &str) -> FileFormat {
        match Path::new(path).extension().and_then(|ext| ext.to_str()) {
            Some("json") => FileFormat::Json,
            _ => FileFormat::Toml,
        }
    }

    /// 主题后缀，目标名小写
    pub fn topic_suffix(&self) -> String {
        self.target_name.to_lowercase()
    }

    pub fn mqtt(&self) -> &MqttTransportConfig {
        &self.transport.mqtt
    }

    pub fn mqtt_client_id(&self) -> String {
        self.transport
            .mqtt
            .client_id
            .clone()
            .unwrap_or_else(|| self.topic_suffix())
    }

    pub fn mqtt_request_topic(&self) -> String {
        self.transport
            .mqtt
            .request_topic
            .clone()
            .unwrap_or_else(|| format!("symphony/request/{}", self.topic_suffix()))
    }

    pub fn mqtt_response_topic(&self) -> String {
        self.transport
            .mqtt
            .response_topic
            .clone()
            .unwrap_or_else(|| format!("symphony/response/{}", self.topic_suffix()))
    }
}

impl ConfigValidator for AgentConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.target_name, "target_name")?;
        ValidationUtils::validate_not_empty(&self.namespace, "namespace")?;
        ValidationUtils::validate_not_empty(&self.topology_path, "topology_path")?;
        self.transport.validate()?;
        self.scheduler.validate()?;
        self.logging.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}
