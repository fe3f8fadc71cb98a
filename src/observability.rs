use agent_config::ObservabilityConfig;
use anyhow::{Context, Result};
use metrics::{describe_counter, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// 按配置安装 Prometheus 指标导出器，返回是否已安装
///
/// 未启用时不安装全局记录器，各组件的计数调用不产生数据。
pub fn init_metrics(config: &ObservabilityConfig) -> Result<bool> {
    if !config.metrics_enabled {
        info!("指标导出未启用");
        return Ok(false);
    }

    let addr = config.metrics_socket_addr()?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("安装Prometheus指标导出器失败: {addr}"))?;
    describe_metrics();

    info!(%addr, "Prometheus指标导出器已启动");
    Ok(true)
}

/// 登记代理上报的计数器说明
pub fn describe_metrics() {
    describe_counter!(
        "remote_agent_tasks_total",
        Unit::Count,
        "按结果分类的已分发任务数"
    );
    describe_counter!(
        "remote_agent_results_total",
        Unit::Count,
        "按是否送达分类的结果回传数"
    );
    describe_counter!(
        "remote_agent_pushed_tasks_total",
        Unit::Count,
        "编排器主动推送的任务数"
    );
    describe_counter!(
        "remote_agent_pushed_tasks_dropped_total",
        Unit::Count,
        "推送队列不可用时丢弃的任务数"
    );
    describe_counter!(
        "remote_agent_correlation_misses_total",
        Unit::Count,
        "找不到等待方的应答数"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_exporter_installs_nothing() {
        let config = ObservabilityConfig {
            metrics_listen_address: "unused".to_string(),
            ..Default::default()
        };
        assert!(!init_metrics(&config).unwrap());
    }
}
