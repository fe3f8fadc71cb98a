use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    models::{PagingResponse, TaskResult},
    AgentResult,
};

/// 物理传输抽象：按主题发布和订阅字节消息
#[async_trait]
pub trait Transport: Send + Sync {
    /// 发布消息。返回即代表传输层已确认，不代表对端已处理。
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> AgentResult<()>;

    /// 订阅主题，入站消息通过返回的通道投递
    async fn subscribe(&self, topic: &str) -> AgentResult<mpsc::Receiver<Vec<u8>>>;
}

/// 代理与编排器之间的传输绑定
///
/// 上层（分页客户端、调度循环）只依赖此接口，不关心底层是 HTTP 轮询还是
/// 发布订阅。任务信封以原始 JSON 字节交给分发器。
#[async_trait]
pub trait TransportBinding: Send + Sync {
    /// 建立入站订阅。必须在任何需要应答的请求之前调用。
    async fn start(&self) -> AgentResult<()>;

    /// 拉取积压任务的一页，`cursor` 为空表示从头开始
    async fn fetch_page(&self, cursor: &str) -> AgentResult<PagingResponse>;

    /// 周期性轮询，不带分页参数。应答与分页格式相同。
    async fn poll(&self) -> AgentResult<PagingResponse>;

    /// 回传任务结果。最多投递一次，超时即放弃。
    async fn submit_result(&self, result: &TaskResult) -> AgentResult<()>;

    /// 控制操作：上报拓扑并等待编排器确认
    async fn update_topology(&self, topology: &[u8]) -> AgentResult<()>;

    /// 编排器主动推送的单个任务。只能取走一次。
    fn take_pushed_tasks(&self) -> Option<mpsc::Receiver<Vec<u8>>>;
}
