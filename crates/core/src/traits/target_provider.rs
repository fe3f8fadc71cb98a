//! 目标提供者接口定义
//!
//! 提供者针对某种部署目标技术执行单个任务。代理按拓扑中的角色名精确查找提供者，
//! 每个任务只调用一次提供者方法。
//!
//! ## 实现要求
//!
//! - 同一任务可能被重复投递，`apply` 必须是幂等的
//! - 调用不会被中途取消，实现者自行处理内部超时
//! - 错误通过 [`crate::AgentError::Provider`] 返回，不得 panic
//!
//! ```rust,ignore
//! use agent_core::traits::TargetProvider;
//!
//! pub struct NoopProvider;
//!
//! #[async_trait]
//! impl TargetProvider for NoopProvider {
//!     async fn get_validation_rule(&self) -> AgentResult<ValidationRule> {
//!         Ok(ValidationRule::default())
//!     }
//!     async fn get(&self, _: &DeploymentSpec, _: &[ComponentStep]) -> AgentResult<Vec<ComponentSpec>> {
//!         Ok(vec![])
//!     }
//!     async fn apply(&self, _: &DeploymentSpec, _: &DeploymentStep, _: bool)
//!         -> AgentResult<HashMap<String, ComponentResultSpec>> {
//!         Ok(HashMap::new())
//!     }
//! }
//! ```

use std::collections::HashMap;

use async_trait::async_trait;

use crate::{
    models::{
        ComponentResultSpec, ComponentSpec, ComponentStep, DeploymentSpec, DeploymentStep,
        ValidationRule,
    },
    AgentResult,
};

/// 目标提供者核心接口
#[async_trait]
pub trait TargetProvider: Send + Sync {
    /// 提供者声明的组件校验规则
    async fn get_validation_rule(&self) -> AgentResult<ValidationRule>;

    /// 读取目标上组件的当前状态
    async fn get(
        &self,
        deployment: &DeploymentSpec,
        references: &[ComponentStep],
    ) -> AgentResult<Vec<ComponentSpec>>;

    /// 执行一个部署步骤，返回每个组件的结果
    async fn apply(
        &self,
        deployment: &DeploymentSpec,
        step: &DeploymentStep,
        is_dry_run: bool,
    ) -> AgentResult<HashMap<String, ComponentResultSpec>>;
}
