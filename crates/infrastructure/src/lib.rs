pub mod bindings;
pub mod correlation;
pub mod factory;
pub mod timeout;
pub mod transport;

pub use bindings::{HttpBinding, HttpBindingConfig, PubSubBinding, PubSubBindingConfig};
pub use correlation::{CorrelationConfig, CorrelationRegistry, PendingReply};
pub use factory::{correlation_config, BindingFactory};
pub use transport::{InMemoryTransport, MqttTransport};
