pub mod target_provider;
pub mod transport;

pub use target_provider::*;
pub use transport::*;
