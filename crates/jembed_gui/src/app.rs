//! Windowed script adapter
//!
//! The runtime is started in windowed mode up front. Each [`WindowedApp::start`]
//! activates the engine's GUI integration, creates a hidden bootstrap window so
//! the GUI is initialised, schedules the script on the GUI thread and then
//! blocks in the toolkit's event loop.
//!
//! Output bindings are not read back in this mode.

use crate::error::GuiError;
use crate::toolkit::GuiToolkit;
use jembed_core::{
    lifecycle, BindingSet, Engine, EngineConfig, EngineInstance, RuntimeHandle, Script, WindowSpec,
};

pub struct WindowedApp<E: Engine, T: GuiToolkit> {
    handle: RuntimeHandle<E::Instance>,
    toolkit: T,
    echo_result: bool,
}

impl<E: Engine, T: GuiToolkit> WindowedApp<E, T> {
    /// Start the runtime for GUI use; `config.headless` is forced off.
    pub fn new(engine: &E, toolkit: T, config: &EngineConfig) -> Result<Self, GuiError> {
        let config = config.clone().with_headless(false);
        let handle = lifecycle::start_runtime(engine, &config)?;
        Ok(Self {
            handle,
            toolkit,
            echo_result: config.echo_result,
        })
    }

    /// Run `script` on the GUI thread and block until the event loop exits.
    pub fn start(&mut self, script: impl Into<Script>, inputs: &BindingSet) -> Result<(), GuiError> {
        let instance = self.handle.instance_mut()?;
        instance.activate_gui_integration(self.toolkit.window_requests())?;
        self.toolkit.create_top_level_window(WindowSpec::hidden())?;

        let script = script.into();
        let inputs = inputs.clone();
        let echo_result = self.echo_result;
        self.toolkit.dispatcher().submit(move |engine: &mut dyn EngineInstance| {
            let result = engine.evaluate(&script, &inputs, &mut BindingSet::new())?;
            tracing::debug!(script = script.name(), %result, "windowed script evaluated");
            if echo_result {
                println!("{result}");
            }
            Ok(())
        })?;

        self.toolkit.run_event_loop(instance)
    }

    pub fn toolkit(&self) -> &T {
        &self.toolkit
    }

    pub fn handle(&self) -> &RuntimeHandle<E::Instance> {
        &self.handle
    }

    /// Stop the runtime. Later `start` calls fail with `RuntimeNotActive`.
    pub fn shutdown(&mut self) -> Result<(), GuiError> {
        Ok(self.handle.stop()?)
    }
}
