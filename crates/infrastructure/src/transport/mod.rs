pub mod in_memory;
pub mod mqtt;

pub use in_memory::InMemoryTransport;
pub use mqtt::MqttTransport;
