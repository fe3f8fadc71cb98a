pub mod http;
pub mod mock;
pub mod script;

pub use http::HttpTargetProvider;
pub use mock::MockTargetProvider;
pub use script::{ScriptEngine, ScriptProvider, ScriptProviderConfig};
