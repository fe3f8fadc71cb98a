use std::io::Write;

use agent_config::{AgentConfig, ConfigError, TransportProtocol};
use tempfile::Builder;

fn write_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_json_config_file() {
    let file = write_config(
        ".json",
        r#"{
            "target_name": "edge-json",
            "transport": {
                "protocol": "http",
                "http": {
                    "request_endpoint": "http://localhost:8082/v1alpha2/solution/tasks",
                    "response_endpoint": "http://localhost:8082/v1alpha2/solution/task/getResult",
                    "base_url": "http://localhost:8082/v1alpha2"
                }
            }
        }"#,
    );

    let config = AgentConfig::load(file.path().to_str()).unwrap();
    assert_eq!(config.target_name, "edge-json");
    assert_eq!(config.transport.protocol, TransportProtocol::Http);
    assert_eq!(config.transport.http.request_timeout_seconds, 30);
    assert_eq!(config.namespace, "default");
}

#[test]
fn test_environment_overrides_file() {
    let file = write_config(
        ".toml",
        r#"
target_name = "edge-env"

[transport]
protocol = "mqtt"

[scheduler]
concurrent_jobs = 2
"#,
    );

    std::env::set_var("REMOTE_AGENT_SCHEDULER__FETCH_TIMEOUT_SECONDS", "45");
    let config = AgentConfig::load(file.path().to_str()).unwrap();
    std::env::remove_var("REMOTE_AGENT_SCHEDULER__FETCH_TIMEOUT_SECONDS");

    assert_eq!(config.scheduler.fetch_timeout_seconds, 45);
    assert_eq!(config.scheduler.concurrent_jobs, 2);
    assert_eq!(config.transport.mqtt.port, 8883);
}

#[test]
fn test_missing_file_is_an_error() {
    let err = AgentConfig::load(Some("/nonexistent/remote-agent.toml")).unwrap_err();
    assert!(err.to_string().contains("配置文件不存在"));
}

#[test]
fn test_invalid_values_fail_validation() {
    let file = write_config(
        ".toml",
        r#"
[transport]
protocol = "mqtt"

[scheduler]
publish_timeout_seconds = 0
"#,
    );
    let err = AgentConfig::load(file.path().to_str()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::Validation(msg)) if msg.contains("publish_timeout_seconds")
    ));
}

#[test]
fn test_unvalidated_load_allows_later_overrides() {
    use agent_config::ConfigValidator;

    let file = write_config(".toml", "target_name = \"edge-cli\"\n");
    assert!(AgentConfig::load(file.path().to_str()).is_err());

    let mut config = AgentConfig::load_unvalidated(file.path().to_str()).unwrap();
    config.transport.protocol = TransportProtocol::Mqtt;
    assert!(config.validate().is_ok());
    assert_eq!(config.mqtt_request_topic(), "symphony/request/edge-cli");
}

#[test]
fn test_metrics_exporter_section_is_loaded() {
    let file = write_config(
        ".toml",
        r#"
[transport]
protocol = "mqtt"

[observability]
metrics_enabled = true
metrics_listen_address = "127.0.0.1:9464"
"#,
    );
    let config = AgentConfig::load(file.path().to_str()).unwrap();
    assert!(config.observability.metrics_enabled);
    assert_eq!(config.observability.metrics_socket_addr().unwrap().port(), 9464);

    let bad = write_config(
        ".toml",
        r#"
[transport]
protocol = "mqtt"

[observability]
metrics_enabled = true
metrics_listen_address = "nowhere"
"#,
    );
    assert!(AgentConfig::load(bad.path().to_str()).is_err());
}
