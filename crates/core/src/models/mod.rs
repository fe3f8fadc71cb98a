//! # 数据模型
//!
//! 远程代理与编排器之间交换的数据结构。
//!
//! - [`message`] - 传输层信封 `CoaRequest` / `CoaResponse` 及状态码
//! - [`task`] - 任务信封头部与各动作的负载
//! - [`task_result`] - 回传给编排器的任务结果
//! - [`deployment`] - 提供者消费的部署模型
//! - [`topology`] - 本节点的提供者拓扑
//!
//! 字节字段在 JSON 中以 base64 编码，与编排器一致。部署快照本身保持为不透明的
//! JSON 值，由提供者自行解释。

pub mod deployment;
pub mod message;
pub mod task;
pub mod task_result;
pub mod topology;

pub use deployment::*;
pub use message::*;
pub use task::*;
pub use task_result::*;
pub use topology::*;
