use std::sync::Arc;
use std::time::Duration;

use agent_config::{AgentConfig, ConfigValidator, LogLevel, OutputFormat, TransportProtocol};
use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use remote_agent::{observability::init_metrics, supervise, Application, ShutdownManager};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("remote-agent")
        .version(env!("CARGO_PKG_VERSION"))
        .about("边缘远程代理")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径 (TOML 或 JSON)"),
        )
        .arg(
            Arg::new("target-name")
                .short('t')
                .long("target-name")
                .value_name("NAME")
                .help("目标名，同时决定 MQTT 主题后缀"),
        )
        .arg(
            Arg::new("namespace")
                .short('n')
                .long("namespace")
                .value_name("NAMESPACE")
                .help("命名空间"),
        )
        .arg(
            Arg::new("topology")
                .long("topology")
                .value_name("FILE")
                .help("拓扑文件路径"),
        )
        .arg(
            Arg::new("protocol")
                .short('p')
                .long("protocol")
                .value_name("PROTOCOL")
                .help("传输协议")
                .value_parser(["http", "mqtt"]),
        )
        .arg(
            Arg::new("metrics-addr")
                .long("metrics-addr")
                .value_name("ADDR")
                .help("启用Prometheus指标导出并监听该地址"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");
    let mut config = AgentConfig::load_unvalidated(config_path.map(String::as_str))
        .with_context(|| {
            format!("加载配置失败: {}", config_path.map_or("<default>", String::as_str))
        })?;
    apply_overrides(&mut config, &matches)?;
    config.validate().context("命令行参数覆盖后配置无效")?;

    init_logging(
        &config.logging.level.to_string(),
        &config.logging.format.to_string(),
    )?;
    init_metrics(&config.observability)?;

    info!("启动远程代理");
    info!("目标: {} 命名空间: {}", config.target_name, config.namespace);
    info!("传输协议: {}", config.transport.protocol);
    info!("拓扑文件: {}", config.topology_path);

    let app = Arc::new(Application::new(config).await?);
    supervise(
        app,
        ShutdownManager::new(),
        wait_for_shutdown_signal(),
        Duration::from_secs(30),
    )
    .await?;

    info!("远程代理已退出");
    Ok(())
}

/// 命令行参数覆盖配置文件中的值
fn apply_overrides(config: &mut AgentConfig, matches: &ArgMatches) -> Result<()> {
    if let Some(name) = matches.get_one::<String>("target-name") {
        config.target_name = name.clone();
    }
    if let Some(namespace) = matches.get_one::<String>("namespace") {
        config.namespace = namespace.clone();
    }
    if let Some(path) = matches.get_one::<String>("topology") {
        config.topology_path = path.clone();
    }
    if let Some(protocol) = matches.get_one::<String>("protocol") {
        config.transport.protocol = protocol
            .parse::<TransportProtocol>()
            .map_err(anyhow::Error::msg)?;
    }
    if let Some(addr) = matches.get_one::<String>("metrics-addr") {
        config.observability.metrics_enabled = true;
        config.observability.metrics_listen_address = addr.clone();
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.parse::<LogLevel>().map_err(anyhow::Error::msg)?;
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.logging.format = format.parse::<OutputFormat>().map_err(anyhow::Error::msg)?;
    }
    Ok(())
}

/// 初始化日志系统
fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("安装Ctrl+C信号处理器失败");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("安装SIGTERM信号处理器失败")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
