//! Headless script adapter
//!
//! Starts the runtime eagerly and evaluates scripts synchronously on the
//! caller's thread.

use crate::bindings::{BindingSet, BindingValue, ObjectRef};
use crate::config::EngineConfig;
use crate::engine::{Engine, EngineInstance, Script};
use crate::error::Result;
use crate::lifecycle::{self, RuntimeHandle};

pub struct HeadlessApp<E: Engine> {
    handle: RuntimeHandle<E::Instance>,
    echo_result: bool,
}

impl<E: Engine> HeadlessApp<E> {
    /// Start a headless runtime; `config.headless` is forced on.
    pub fn new(engine: &E, config: &EngineConfig) -> Result<Self> {
        let config = config.clone().with_headless(true);
        let handle = lifecycle::start_runtime(engine, &config)?;
        Ok(Self {
            handle,
            echo_result: config.echo_result,
        })
    }

    /// Evaluate `script` and overwrite each entry of `outputs` with the
    /// script variable of the same name.
    pub fn start(
        &mut self,
        script: impl Into<Script>,
        inputs: &BindingSet,
        outputs: &mut BindingSet,
    ) -> Result<BindingValue> {
        let script = script.into();
        let result = lifecycle::run(&mut self.handle, &script, inputs, outputs)?;
        if self.echo_result {
            println!("{result}");
        }
        Ok(result)
    }

    pub fn handle(&self) -> &RuntimeHandle<E::Instance> {
        &self.handle
    }

    /// Let go of an object a script handed back. Unreleased objects live
    /// as long as the runtime.
    pub fn release(&mut self, object: ObjectRef) -> Result<bool> {
        self.handle.instance_mut()?.release(object)
    }

    /// Stop the runtime. Later `start` calls fail with `RuntimeNotActive`.
    pub fn shutdown(&mut self) -> Result<()> {
        self.handle.stop()
    }
}
