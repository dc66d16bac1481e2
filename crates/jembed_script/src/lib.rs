//! jembed engine bridges
//!
//! - **quickjs:** embedded QuickJS via `rquickjs`, always available
//! - **jvm:** embedded JVM via the JNI invocation API (`jvm` feature),
//!   scripts run through `javax.script`
//!
//! Both implement [`jembed_core::Engine`].

pub mod quickjs;

#[cfg(feature = "jvm")]
pub mod jvm;

pub use quickjs::{QuickJsEngine, QuickJsInstance};

#[cfg(feature = "jvm")]
pub use jvm::{JvmEngine, JvmInstance};

pub use rquickjs;
