use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};

/// 指标导出。启用后在 `metrics_listen_address` 上提供 Prometheus 抓取端点。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
    pub metrics_listen_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_listen_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn metrics_socket_addr(&self) -> crate::ConfigResult<SocketAddr> {
        self.metrics_listen_address.parse().map_err(|_| {
            crate::ConfigError::Validation(format!(
                "observability.metrics_listen_address is not a socket address: {}",
                self.metrics_listen_address
            ))
        })
    }
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if self.metrics_enabled {
            ValidationUtils::validate_not_empty(
                &self.metrics_listen_address,
                "observability.metrics_listen_address",
            )?;
            self.metrics_socket_addr()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_exporter_skips_address_check() {
        let config = ObservabilityConfig {
            metrics_listen_address: "not an address".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_enabled_exporter_needs_socket_address() {
        let mut config = ObservabilityConfig {
            metrics_enabled: true,
            ..Default::default()
        };
        assert_eq!(config.metrics_socket_addr().unwrap().port(), 9090);
        assert!(config.validate().is_ok());

        config.metrics_listen_address = "localhost".to_string();
        assert!(matches!(
            config.validate(),
            Err(crate::ConfigError::Validation(ref msg)) if msg.contains("metrics_listen_address")
        ));
    }
}
