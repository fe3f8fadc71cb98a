use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    #[default]
    Http,
    Mqtt,
}

impl std::str::FromStr for TransportProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(TransportProtocol::Http),
            "mqtt" => Ok(TransportProtocol::Mqtt),
            _ => Err(format!("Invalid protocol: {s}. Valid protocols: http, mqtt")),
        }
    }
}

impl std::fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportProtocol::Http => write!(f, "http"),
            TransportProtocol::Mqtt => write!(f, "mqtt"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub protocol: TransportProtocol,
    pub http: HttpTransportConfig,
    pub mqtt: MqttTransportConfig,
}

impl ConfigValidator for TransportConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        match self.protocol {
            TransportProtocol::Http => self.http.validate(),
            TransportProtocol::Mqtt => self.mqtt.validate(),
        }
    }
}

/// HTTP 轮询端点
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpTransportConfig {
    pub request_endpoint: String,
    pub response_endpoint: String,
    pub base_url: String,
    pub request_timeout_seconds: u64,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            request_endpoint: String::new(),
            response_endpoint: String::new(),
            base_url: String::new(),
            request_timeout_seconds: 30,
        }
    }
}

impl ConfigValidator for HttpTransportConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_url(&self.request_endpoint, "transport.http.request_endpoint")?;
        ValidationUtils::validate_url(
            &self.response_endpoint,
            "transport.http.response_endpoint",
        )?;
        ValidationUtils::validate_url(&self.base_url, "transport.http.base_url")?;
        ValidationUtils::validate_timeout(
            self.request_timeout_seconds,
            "transport.http.request_timeout_seconds",
        )?;
        Ok(())
    }
}

/// MQTT 连接与主题。客户端ID和主题为空时由目标名派生。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttTransportConfig {
    pub broker: String,
    pub port: u16,
    pub client_id: Option<String>,
    pub request_topic: Option<String>,
    pub response_topic: Option<String>,
    pub keep_alive_seconds: u64,
    pub channel_capacity: usize,
    /// 设置后使用 TLS 连接
    pub ca_cert_path: Option<String>,
    pub client_cert_path: Option<String>,
    pub client_key_path: Option<String>,
}

impl Default for MqttTransportConfig {
    fn default() -> Self {
        Self {
            broker: "127.0.0.1".to_string(),
            port: 8883,
            client_id: None,
            request_topic: None,
            response_topic: None,
            keep_alive_seconds: 30,
            channel_capacity: 64,
            ca_cert_path: None,
            client_cert_path: None,
            client_key_path: None,
        }
    }
}

impl ConfigValidator for MqttTransportConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.broker, "transport.mqtt.broker")?;
        ValidationUtils::validate_port(self.port, "transport.mqtt.port")?;
        ValidationUtils::validate_timeout(
            self.keep_alive_seconds,
            "transport.mqtt.keep_alive_seconds",
        )?;
        ValidationUtils::validate_count(
            self.channel_capacity,
            "transport.mqtt.channel_capacity",
            10000,
        )?;

        if self.client_cert_path.is_some() != self.client_key_path.is_some() {
            return Err(crate::ConfigError::Validation(
                "transport.mqtt.client_cert_path and client_key_path must be set together"
                    .to_string(),
            ));
        }
        if self.client_cert_path.is_some() && self.ca_cert_path.is_none() {
            return Err(crate::ConfigError::Validation(
                "transport.mqtt.client_cert_path requires ca_cert_path".to_string(),
            ));
        }

        Ok(())
    }
}

impl MqttTransportConfig {
    pub fn uses_tls(&self) -> bool {
        self.ca_cert_path.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parsing() {
        assert_eq!("MQTT".parse::<TransportProtocol>().unwrap(), TransportProtocol::Mqtt);
        assert!("amqp".parse::<TransportProtocol>().is_err());
    }

    #[test]
    fn test_http_requires_endpoints() {
        let config = TransportConfig::default();
        assert!(config.validate().is_err());

        let config = TransportConfig {
            http: HttpTransportConfig {
                request_endpoint: "http://localhost:8082/v1alpha2/solution/tasks".into(),
                response_endpoint: "http://localhost:8082/v1alpha2/solution/task/getResult".into(),
                base_url: "http://localhost:8082/v1alpha2".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mqtt_client_cert_needs_key() {
        let config = MqttTransportConfig {
            ca_cert_path: Some("ca.pem".into()),
            client_cert_path: Some("client.pem".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(MqttTransportConfig::default().validate().is_ok());
    }
}
