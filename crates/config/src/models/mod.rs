pub mod agent_config;
pub mod logging;
pub mod observability;
pub mod scheduler;
pub mod transport;

pub use agent_config::*;
pub use logging::*;
pub use observability::*;
pub use scheduler::*;
pub use transport::*;
