pub mod paging_client;
pub mod scheduler_loop;
pub mod task_dispatcher;
pub mod topology_reporter;

pub use paging_client::{FetchOutcome, PagingClient};
pub use scheduler_loop::{LoopState, SchedulerLoop, SchedulerLoopConfig};
pub use task_dispatcher::TaskDispatcher;
pub use topology_reporter::TopologyReporter;
