//! Native windows via winit
//!
//! Windows can only be created while the loop runs (winit 0.30), so window
//! requests are applied from inside the `ApplicationHandler` callbacks.
//! Queued work wakes the loop through an `EventLoopProxy`.

use crate::dispatch::{self, UiDispatcher};
use crate::error::GuiError;
use crate::toolkit::{self, Flow, GuiToolkit, LoopDriver, WindowBackend};
use jembed_core::{EngineInstance, WindowId, WindowRequests, WindowSpec};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{StartCause, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes, WindowId as NativeId},
};

/// User event sent through the loop proxy
#[derive(Debug, Clone, Copy)]
pub(crate) enum UiEvent {
    Wake,
}

/// Create window attributes from a window spec
pub fn window_attributes(spec: &WindowSpec) -> WindowAttributes {
    Window::default_attributes()
        .with_title(spec.title.clone())
        .with_inner_size(LogicalSize::new(spec.width, spec.height))
        .with_visible(spec.visible)
}

/// Toolkit backed by a winit event loop.
///
/// Construct it on the main thread. A winit event loop cannot be recreated,
/// so the toolkit runs its loop at most once.
pub struct WinitToolkit {
    event_loop: Option<EventLoop<UiEvent>>,
    dispatcher: UiDispatcher,
    driver: LoopDriver,
}

impl WinitToolkit {
    pub fn new() -> Result<Self, GuiError> {
        let event_loop = EventLoop::<UiEvent>::with_user_event().build()?;
        let proxy = Mutex::new(event_loop.create_proxy());
        let (dispatcher, queue) = dispatch::channel(Arc::new(move || {
            if proxy.lock().send_event(UiEvent::Wake).is_err() {
                tracing::trace!("event loop gone, wake dropped");
            }
        }));

        Ok(Self {
            event_loop: Some(event_loop),
            dispatcher,
            driver: LoopDriver::new(queue, WindowRequests::new()),
        })
    }
}

impl GuiToolkit for WinitToolkit {
    fn dispatcher(&self) -> UiDispatcher {
        self.dispatcher.clone()
    }

    fn window_requests(&self) -> WindowRequests {
        self.driver.requests().clone()
    }

    fn run_event_loop(&mut self, instance: &mut dyn EngineInstance) -> Result<(), GuiError> {
        let _gate = toolkit::event_loop_gate();
        let event_loop = self.event_loop.take().ok_or_else(|| {
            GuiError::EventLoop("winit event loop has already run and cannot be recreated".into())
        })?;

        self.driver.begin();
        let mut app = WinitApp {
            driver: &mut self.driver,
            instance,
            windows: NativeWindows::default(),
            resumed: false,
        };
        tracing::info!("winit event loop started");
        event_loop.run_app(&mut app)?;
        drop(app);
        tracing::info!("winit event loop exited");

        self.driver.take_outcome()
    }
}

#[derive(Default)]
struct NativeWindows {
    by_id: HashMap<WindowId, Window>,
    by_native: HashMap<NativeId, WindowId>,
}

impl NativeWindows {
    fn remove(&mut self, id: WindowId) {
        if let Some(window) = self.by_id.remove(&id) {
            self.by_native.remove(&window.id());
        }
    }
}

/// Window backend for one callback, borrowing the active loop
struct Native<'a> {
    event_loop: &'a ActiveEventLoop,
    windows: &'a mut NativeWindows,
}

impl WindowBackend for Native<'_> {
    fn open(&mut self, id: WindowId, spec: &WindowSpec) -> Result<(), GuiError> {
        let window = self.event_loop.create_window(window_attributes(spec))?;
        self.windows.by_native.insert(window.id(), id);
        self.windows.by_id.insert(id, window);
        Ok(())
    }

    fn set_visible(&mut self, id: WindowId, visible: bool) {
        if let Some(window) = self.windows.by_id.get(&id) {
            window.set_visible(visible);
        }
    }

    fn close(&mut self, id: WindowId) {
        self.windows.remove(id);
    }
}

struct WinitApp<'a> {
    driver: &'a mut LoopDriver,
    instance: &'a mut dyn EngineInstance,
    windows: NativeWindows,
    resumed: bool,
}

impl WinitApp<'_> {
    fn pump(&mut self, event_loop: &ActiveEventLoop) {
        if !self.resumed {
            return;
        }
        let mut native = Native {
            event_loop,
            windows: &mut self.windows,
        };
        let flow = self.driver.pump(&mut *self.instance, &mut native);
        follow(event_loop, flow);
    }
}

fn follow(event_loop: &ActiveEventLoop, flow: Flow) {
    match flow {
        Flow::Continue => event_loop.set_control_flow(ControlFlow::Wait),
        Flow::Poll => event_loop.set_control_flow(ControlFlow::WaitUntil(
            Instant::now() + toolkit::ENGINE_WINDOW_POLL,
        )),
        Flow::Exit => event_loop.exit(),
    }
}

impl ApplicationHandler<UiEvent> for WinitApp<'_> {
    fn new_events(&mut self, event_loop: &ActiveEventLoop, cause: StartCause) {
        if !matches!(cause, StartCause::Init) {
            self.pump(event_loop);
        }
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        self.resumed = true;
        self.pump(event_loop);
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, _event: UiEvent) {
        self.pump(event_loop);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: NativeId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                let Some(id) = self.windows.by_native.get(&window_id).copied() else {
                    return;
                };
                self.windows.remove(id);
                tracing::debug!(?id, "window closed");
                follow(event_loop, self.driver.window_closed(id));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_attributes() {
        let attrs = window_attributes(&WindowSpec::new("Demo").with_size(800, 600).visible(true));
        assert_eq!(attrs.title, "Demo");
        assert!(attrs.visible);
        assert_eq!(
            attrs.inner_size,
            Some(LogicalSize::new(800u32, 600u32).into())
        );
    }
}
