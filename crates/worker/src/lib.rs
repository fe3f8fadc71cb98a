pub mod components;
pub mod provider_factory;
pub mod providers;

pub use components::{
    FetchOutcome, LoopState, PagingClient, SchedulerLoop, SchedulerLoopConfig, TaskDispatcher,
    TopologyReporter,
};
pub use provider_factory::ProviderFactory;
pub use providers::{HttpTargetProvider, MockTargetProvider, ScriptProvider, ScriptProviderConfig};
