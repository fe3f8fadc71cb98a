pub mod errors;
pub mod models;
pub mod provider_registry;
pub mod task_log;
pub mod traits;

pub use errors::*;
pub use models::{
    CoaRequest, CoaResponse, PagingResponse, State, TaskAction, TaskResult, TopologySpec,
};
pub use provider_registry::ProviderRegistry;
pub use task_log::TaskLog;
pub use traits::{TargetProvider, Transport, TransportBinding};
