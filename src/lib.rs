pub mod app;
pub mod observability;
pub mod shutdown;

pub use app::{supervise, Application};
pub use shutdown::ShutdownManager;
