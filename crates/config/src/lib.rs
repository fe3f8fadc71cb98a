pub mod models;
pub mod validation;

pub use models::{
    AgentConfig, HttpTransportConfig, LogConfig, LogLevel, MqttTransportConfig, ObservabilityConfig,
    OutputFormat, SchedulerConfig, TransportConfig, TransportProtocol,
};
pub use validation::{ConfigValidator, ValidationUtils};

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 配置错误。文件读取和解析失败由 `AgentConfig::load` 以 anyhow 上下文报告，
/// 这里只描述字段校验失败。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("配置校验失败: {0}")]
    Validation(String),
}
