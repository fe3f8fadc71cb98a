pub mod http;
pub mod pubsub;

pub use http::{HttpBinding, HttpBindingConfig};
pub use pubsub::{PubSubBinding, PubSubBindingConfig};
