//! Bridge between the host and an embedded scripting runtime
//!
//! An [`Engine`] knows how to boot a runtime; the [`EngineInstance`] it
//! returns evaluates scripts against named bindings until it is shut down.
//! Scheduling work onto the GUI thread lives with the GUI toolkit, not here.

use crate::bindings::{BindingSet, BindingValue, ObjectRef};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::window::WindowRequests;
use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

/// How a runtime is used by its adapter
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// No GUI thread involvement
    Headless,
    /// Scripts run from inside a GUI event loop
    Windowed,
}

impl ExecutionMode {
    pub fn is_headless(self) -> bool {
        matches!(self, ExecutionMode::Headless)
    }
}

/// Immutable script text in the engine's dialect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    name: Cow<'static, str>,
    source: Arc<str>,
}

impl Script {
    pub fn inline(source: impl Into<Arc<str>>) -> Self {
        Self {
            name: Cow::Borrowed("<inline>"),
            source: source.into(),
        }
    }

    pub fn named(name: impl Into<String>, source: impl Into<Arc<str>>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            source: source.into(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Ok(Self::named(path.display().to_string(), source))
    }

    /// Origin used in diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl From<&str> for Script {
    fn from(source: &str) -> Self {
        Script::inline(source)
    }
}

impl From<String> for Script {
    fn from(source: String) -> Self {
        Script::inline(source)
    }
}

/// A running embedded runtime.
///
/// Object safe so GUI work items can receive `&mut dyn EngineInstance`.
pub trait EngineInstance {
    /// Expose `inputs` as globals, evaluate `script`, then overwrite every
    /// entry of `outputs` with the global of the same name.
    ///
    /// `outputs` is left untouched when evaluation fails.
    fn evaluate(
        &mut self,
        script: &Script,
        inputs: &BindingSet,
        outputs: &mut BindingSet,
    ) -> Result<BindingValue>;

    /// Prepare the runtime for scripts that open windows. Window requests
    /// raised by scripts go to `windows`.
    fn activate_gui_integration(&mut self, windows: WindowRequests) -> Result<()>;

    /// Visible top-level windows the engine opened without going through
    /// [`WindowRequests`]. The event loop stays up while this is non-zero.
    fn engine_windows(&mut self) -> Result<usize> {
        Ok(0)
    }

    /// Forget the engine object behind `handle`. Returns `false` for an
    /// unknown handle.
    fn release(&mut self, handle: ObjectRef) -> Result<bool>;

    /// Release the runtime. Later calls fail with `RuntimeNotActive`.
    fn shutdown(&mut self) -> Result<()>;
}

/// Factory for runtime instances
pub trait Engine {
    type Instance: EngineInstance;

    fn name(&self) -> &'static str;

    fn start_instance(&self, config: &EngineConfig) -> Result<Self::Instance>;
}
