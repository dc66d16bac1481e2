//! Runtime lifecycle
//!
//! At most one embedded runtime is active per process. [`start_runtime`]
//! claims the process-wide slot and hands back an owned [`RuntimeHandle`];
//! the slot is released by [`RuntimeHandle::stop`] or when the handle drops.
//!
//! ```text
//! Inactive --start--> Active --stop/drop--> Inactive
//! ```

use crate::bindings::{BindingSet, BindingValue};
use crate::config::EngineConfig;
use crate::engine::{Engine, EngineInstance, ExecutionMode, Script};
use crate::error::{BridgeError, Result, StartFailure};
use std::sync::atomic::{AtomicBool, Ordering};

static ACTIVE: AtomicBool = AtomicBool::new(false);

/// Whether any runtime handle is active in this process.
pub fn runtime_active() -> bool {
    ACTIVE.load(Ordering::SeqCst)
}

/// Owned handle to the single active runtime instance
///
/// Not `Clone`: whoever holds the handle decides when the runtime stops.
pub struct RuntimeHandle<I: EngineInstance> {
    instance: Option<I>,
    mode: ExecutionMode,
    engine: &'static str,
}

/// Start a runtime instance of `engine`.
///
/// Fails with `RuntimeStart(AlreadyActive)` while another handle is active.
pub fn start_runtime<E: Engine>(
    engine: &E,
    config: &EngineConfig,
) -> Result<RuntimeHandle<E::Instance>> {
    if ACTIVE
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(StartFailure::AlreadyActive.into());
    }

    let mode = if config.headless {
        ExecutionMode::Headless
    } else {
        ExecutionMode::Windowed
    };

    match engine.start_instance(config) {
        Ok(instance) => {
            tracing::info!(engine = engine.name(), ?mode, "runtime started");
            Ok(RuntimeHandle {
                instance: Some(instance),
                mode,
                engine: engine.name(),
            })
        }
        Err(err) => {
            ACTIVE.store(false, Ordering::SeqCst);
            Err(err)
        }
    }
}

impl<I: EngineInstance> RuntimeHandle<I> {
    pub fn is_active(&self) -> bool {
        self.instance.is_some()
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine
    }

    pub fn instance_mut(&mut self) -> Result<&mut I> {
        self.instance.as_mut().ok_or(BridgeError::RuntimeNotActive)
    }

    /// Shut the instance down and release the process-wide slot.
    ///
    /// The slot is released even when the engine reports a shutdown error.
    pub fn stop(&mut self) -> Result<()> {
        let mut instance = self.instance.take().ok_or(BridgeError::RuntimeNotActive)?;
        let result = instance.shutdown();
        ACTIVE.store(false, Ordering::SeqCst);
        tracing::info!(engine = self.engine, "runtime stopped");
        result
    }
}

impl<I: EngineInstance> Drop for RuntimeHandle<I> {
    fn drop(&mut self) {
        if self.is_active() {
            if let Err(err) = self.stop() {
                tracing::warn!(engine = self.engine, %err, "runtime shutdown failed on drop");
            }
        }
    }
}

impl<I: EngineInstance> std::fmt::Debug for RuntimeHandle<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("engine", &self.engine)
            .field("mode", &self.mode)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Evaluate `script` on an active runtime, writing declared outputs back.
pub fn run<I: EngineInstance>(
    handle: &mut RuntimeHandle<I>,
    script: &Script,
    inputs: &BindingSet,
    outputs: &mut BindingSet,
) -> Result<BindingValue> {
    let instance = handle.instance_mut()?;
    tracing::debug!(
        script = script.name(),
        inputs = inputs.len(),
        outputs = outputs.len(),
        "evaluating script"
    );
    instance.evaluate(script, inputs, outputs)
}
