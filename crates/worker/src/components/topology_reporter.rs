use std::sync::Arc;
use std::time::Duration;

use agent_core::{traits::TransportBinding, AgentError, AgentResult};
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{info, warn};

/// 启动时上报拓扑，未确认则按固定间隔重试，直到成功或收到停止信号
pub struct TopologyReporter {
    binding: Arc<dyn TransportBinding>,
    retry_interval: Duration,
}

impl TopologyReporter {
    pub fn new(binding: Arc<dyn TransportBinding>, retry_interval: Duration) -> Self {
        Self {
            binding,
            retry_interval,
        }
    }

    pub async fn report(
        &self,
        topology: &[u8],
        shutdown: &mut broadcast::Receiver<()>,
    ) -> AgentResult<()> {
        let mut attempt = 1u32;
        loop {
            match self.binding.update_topology(topology).await {
                Ok(()) => {
                    info!(attempt, "topology reported");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        retry_in_secs = self.retry_interval.as_secs(),
                        "topology update failed"
                    );
                }
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    return Err(AgentError::TopologyUpdate(
                        "stopped before topology was confirmed".to_string(),
                    ));
                }
                _ = sleep(self.retry_interval) => {}
            }
            attempt += 1;
        }
    }
}
