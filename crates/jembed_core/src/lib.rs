//! jembed core
//!
//! Glue between a host process and one embedded scripting runtime:
//! - Binding model for values crossing the boundary
//! - Engine bridge traits implemented by `jembed_script`
//! - Process-wide runtime lifecycle (start once, use, stop)
//! - Headless script adapter
//!
//! The windowed adapter lives in `jembed_gui`.

pub mod bindings;
pub mod config;
pub mod containers;
pub mod engine;
pub mod error;
pub mod headless;
pub mod lifecycle;
pub mod window;

pub use bindings::{BindingSet, BindingValue, ObjectRef, OutputShape};
pub use config::EngineConfig;
pub use containers::{Element, ElementError, ElementType, NumericMatrix, NumericVector};
pub use engine::{Engine, EngineInstance, ExecutionMode, Script};
pub use error::{BridgeError, Result, StartFailure};
pub use headless::HeadlessApp;
pub use lifecycle::{run, runtime_active, start_runtime, RuntimeHandle};
pub use window::{WindowId, WindowRequest, WindowRequests, WindowSpec};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
