//! Jembed GUI
//!
//! Event loop integration for windowed scripts: the run-on-GUI-thread
//! dispatcher, the toolkit seam with winit and offscreen backends, and the
//! windowed adapter.

pub mod app;
pub mod dispatch;
pub mod error;
pub mod offscreen;
pub mod toolkit;
pub mod winit_toolkit;

pub use app::WindowedApp;
pub use dispatch::{Drain, UiDispatcher, UiQueue, WorkItem};
pub use error::GuiError;
pub use offscreen::{CloseBehavior, OffscreenEvent, OffscreenToolkit};
pub use toolkit::GuiToolkit;
pub use winit_toolkit::{window_attributes, WinitToolkit};

pub use winit;

#[cfg(test)]
pub(crate) mod test_support {
    use jembed_core::{
        BindingSet, BindingValue, EngineInstance, ObjectRef, Result, Script, WindowRequests,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Engine whose windows bypass the window requests, the way AWT frames
    /// opened by JVM scripts do.
    #[derive(Default)]
    pub struct OwnWindows {
        pub showing: Arc<AtomicUsize>,
    }

    impl EngineInstance for OwnWindows {
        fn evaluate(
            &mut self,
            _script: &Script,
            _inputs: &BindingSet,
            _outputs: &mut BindingSet,
        ) -> Result<BindingValue> {
            Ok(BindingValue::Null)
        }

        fn activate_gui_integration(&mut self, _windows: WindowRequests) -> Result<()> {
            Ok(())
        }

        fn engine_windows(&mut self) -> Result<usize> {
            Ok(self.showing.load(Ordering::SeqCst))
        }

        fn release(&mut self, _handle: ObjectRef) -> Result<bool> {
            Ok(false)
        }

        fn shutdown(&mut self) -> Result<()> {
            Ok(())
        }
    }
}
