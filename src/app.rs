use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use agent_config::AgentConfig;
use agent_core::{traits::TransportBinding, ProviderRegistry, TopologySpec};
use agent_infrastructure::BindingFactory;
use agent_worker::{
    ProviderFactory, SchedulerLoop, SchedulerLoopConfig, TaskDispatcher, TopologyReporter,
};
use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::shutdown::ShutdownManager;

/// 远程代理应用
///
/// 启动顺序：启动传输绑定，上报拓扑（未确认则重试），再进入调度循环。
pub struct Application {
    config: AgentConfig,
    binding: Arc<dyn TransportBinding>,
    dispatcher: Arc<TaskDispatcher>,
    topology: Vec<u8>,
}

impl Application {
    /// 读取拓扑文件，创建提供者和传输绑定
    pub async fn new(config: AgentConfig) -> Result<Self> {
        info!(
            target_name = %config.target_name,
            namespace = %config.namespace,
            protocol = %config.transport.protocol,
            "初始化远程代理"
        );

        let topology = tokio::fs::read(&config.topology_path)
            .await
            .with_context(|| format!("读取拓扑文件失败: {}", config.topology_path))?;
        let spec = TopologySpec::from_slice(&topology)
            .with_context(|| format!("解析拓扑文件失败: {}", config.topology_path))?;

        let registry = ProviderFactory::new(Duration::from_secs(
            config.transport.http.request_timeout_seconds,
        ))
        .build_registry(&spec)
        .context("创建目标提供者失败")?;
        if registry.is_empty() {
            warn!("拓扑中没有可用的提供者，所有任务都将返回 provider_not_found");
        }

        let binding = BindingFactory::create(&config).context("创建传输绑定失败")?;

        Ok(Self::from_parts(config, binding, registry, topology))
    }

    /// 使用现成的绑定和提供者组装应用
    pub fn from_parts(
        config: AgentConfig,
        binding: Arc<dyn TransportBinding>,
        registry: ProviderRegistry,
        topology: Vec<u8>,
    ) -> Self {
        Self {
            config,
            binding,
            dispatcher: Arc::new(TaskDispatcher::new(registry)),
            topology,
        }
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.binding.start().await.context("启动传输绑定失败")?;
        info!(
            providers = ?self.dispatcher.registry().list_providers(),
            "传输绑定已启动"
        );

        let reporter = TopologyReporter::new(
            Arc::clone(&self.binding),
            self.config.scheduler.topology_retry_interval(),
        );
        if let Err(e) = reporter.report(&self.topology, &mut shutdown_rx).await {
            warn!(error = %e, "拓扑未确认，代理退出");
            return Ok(());
        }

        let scheduler = SchedulerLoop::new(
            Arc::clone(&self.binding),
            Arc::clone(&self.dispatcher),
            SchedulerLoopConfig::from_scheduler_config(&self.config.scheduler),
        );
        scheduler.run(shutdown_rx).await;

        info!("远程代理已停止");
        Ok(())
    }
}

/// 运行应用，直到收到停止信号或应用自行退出
///
/// 应用先于信号返回错误时立即向上传递，进程以非零状态退出。收到信号后广播停止，
/// 在 `grace` 内等待在途任务收尾。
pub async fn supervise<S>(
    app: Arc<Application>,
    shutdown: ShutdownManager,
    signal: S,
    grace: Duration,
) -> Result<()>
where
    S: Future<Output = ()>,
{
    let mut app_handle = {
        let shutdown_rx = shutdown.subscribe().await;
        let app = Arc::clone(&app);
        tokio::spawn(async move { app.run(shutdown_rx).await })
    };

    tokio::select! {
        joined = &mut app_handle => {
            return match joined {
                Ok(Ok(())) => {
                    info!("代理已自行退出");
                    Ok(())
                }
                Ok(Err(e)) => Err(e.context("代理运行失败")),
                Err(e) => Err(anyhow::anyhow!("代理任务异常终止: {e}")),
            };
        }
        _ = signal => {
            info!("收到关闭信号，开始优雅关闭...");
        }
    }

    shutdown.shutdown().await;
    match tokio::time::timeout(grace, app_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("代理已优雅关闭");
            Ok(())
        }
        Ok(Ok(Err(e))) => Err(e.context("代理关闭时发生错误")),
        Ok(Err(e)) => Err(anyhow::anyhow!("代理任务异常终止: {e}")),
        Err(_) => {
            warn!("代理关闭超时，强制退出");
            Ok(())
        }
    }
}
