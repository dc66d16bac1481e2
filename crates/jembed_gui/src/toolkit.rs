//! GUI toolkit seam
//!
//! A toolkit owns the event loop and the native windows. Every backend runs
//! the same [`LoopDriver`] on each turn of its loop:
//!
//! 1. realise the window requests already queued, so windows created before
//!    a work item was submitted exist when it runs
//! 2. run the work accepted by the [`UiDispatcher`]
//! 3. apply the window requests scripts raised while doing so
//! 4. exit on `Quit` or on the first failing work item. Also exit once no
//!    visible window is left, counting windows the engine opened itself
//!
//! Backends poll while only engine-owned windows keep the loop up, since
//! closing those produces no event the backend sees.
//!
//! Only one event loop runs per process. A second `run_event_loop` blocks
//! until the first one returns.

use crate::dispatch::{Drain, UiDispatcher, UiQueue};
use crate::error::GuiError;
use jembed_core::{EngineInstance, WindowId, WindowRequest, WindowRequests, WindowSpec};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::time::Duration;

/// Re-check interval while engine-owned windows are open
pub(crate) const ENGINE_WINDOW_POLL: Duration = Duration::from_millis(50);

static EVENT_LOOP: Mutex<()> = Mutex::new(());

/// Hold the process-wide event loop slot for the duration of a loop.
pub(crate) fn event_loop_gate() -> MutexGuard<'static, ()> {
    if let Some(guard) = EVENT_LOOP.try_lock() {
        return guard;
    }
    tracing::debug!("event loop already running, waiting for it to exit");
    EVENT_LOOP.lock()
}

pub trait GuiToolkit {
    /// Handle for scheduling work onto the GUI thread
    fn dispatcher(&self) -> UiDispatcher;

    /// Queue that engines push window requests into
    fn window_requests(&self) -> WindowRequests;

    /// Create a top-level window. It is realised on the next loop turn,
    /// before any work queued after this call runs.
    fn create_top_level_window(&mut self, spec: WindowSpec) -> Result<WindowId, GuiError> {
        Ok(self.window_requests().open(spec))
    }

    /// Run the event loop on the calling thread until it exits.
    ///
    /// Returns the error of the first failing work item, if any.
    fn run_event_loop(&mut self, instance: &mut dyn EngineInstance) -> Result<(), GuiError>;
}

/// Native side of window requests
pub(crate) trait WindowBackend {
    fn open(&mut self, id: WindowId, spec: &WindowSpec) -> Result<(), GuiError>;
    fn set_visible(&mut self, id: WindowId, visible: bool);
    fn close(&mut self, id: WindowId);
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    /// Keep running, but turn again after [`ENGINE_WINDOW_POLL`]
    Poll,
    Exit,
}

/// Loop state shared by every backend
pub(crate) struct LoopDriver {
    queue: UiQueue,
    requests: WindowRequests,
    /// Open windows and whether each is visible
    windows: HashMap<WindowId, bool>,
    /// Showing windows the engine reported on the last turn
    engine_windows: usize,
    outcome: Option<Result<(), GuiError>>,
}

impl LoopDriver {
    pub fn new(queue: UiQueue, requests: WindowRequests) -> Self {
        Self {
            queue,
            requests,
            windows: HashMap::new(),
            engine_windows: 0,
            outcome: None,
        }
    }

    pub fn requests(&self) -> &WindowRequests {
        &self.requests
    }

    /// Reset per-run state before entering a loop.
    pub fn begin(&mut self) {
        self.windows.clear();
        self.engine_windows = 0;
        self.outcome = None;
    }

    pub fn queue_mut(&mut self) -> &mut UiQueue {
        &mut self.queue
    }

    /// One loop turn: apply pending requests, drain work, apply the
    /// requests the work raised.
    pub fn pump(
        &mut self,
        instance: &mut dyn EngineInstance,
        backend: &mut dyn WindowBackend,
    ) -> Flow {
        if self.outcome.is_some() {
            return Flow::Exit;
        }

        if self.apply_requests(backend) == Flow::Exit {
            return Flow::Exit;
        }

        match self.queue.drain(&mut *instance) {
            Ok(Drain::Continue) => {}
            Ok(Drain::Quit) => return self.finish(Ok(())),
            Err(err) => {
                tracing::error!(%err, "gui work item failed");
                return self.finish(Err(err));
            }
        }

        if self.apply_requests(backend) == Flow::Exit {
            return Flow::Exit;
        }

        match instance.engine_windows() {
            Ok(count) => self.engine_windows = count,
            Err(err) => return self.finish(Err(err.into())),
        }
        self.check_idle()
    }

    fn apply_requests(&mut self, backend: &mut dyn WindowBackend) -> Flow {
        for request in self.requests.drain() {
            match request {
                WindowRequest::Open { id, spec } => {
                    if let Err(err) = backend.open(id, &spec) {
                        return self.finish(Err(err));
                    }
                    tracing::debug!(?id, title = %spec.title, visible = spec.visible, "window opened");
                    self.windows.insert(id, spec.visible);
                }
                WindowRequest::SetVisible { id, visible } => match self.windows.get_mut(&id) {
                    Some(shown) => {
                        *shown = visible;
                        backend.set_visible(id, visible);
                    }
                    None => tracing::warn!(?id, "visibility change for unknown window"),
                },
                WindowRequest::Close { id } => {
                    if self.windows.remove(&id).is_some() {
                        backend.close(id);
                    }
                }
                WindowRequest::Quit => return self.finish(Ok(())),
            }
        }
        Flow::Continue
    }

    /// A window was closed from outside the driver (user, backend policy).
    pub fn window_closed(&mut self, id: WindowId) -> Flow {
        self.windows.remove(&id);
        if self.outcome.is_some() {
            return Flow::Exit;
        }
        self.check_idle()
    }

    /// Record a failure raised by the backend itself.
    pub fn fail(&mut self, err: GuiError) -> Flow {
        self.finish(Err(err))
    }

    /// Outcome of the finished loop.
    pub fn take_outcome(&mut self) -> Result<(), GuiError> {
        self.outcome.take().unwrap_or(Ok(()))
    }

    fn check_idle(&mut self) -> Flow {
        let any_visible = self.windows.values().any(|shown| *shown);
        if any_visible || !self.queue.is_empty() || !self.requests.is_empty() {
            return Flow::Continue;
        }
        if self.engine_windows > 0 {
            return Flow::Poll;
        }
        tracing::debug!("no visible window left");
        self.finish(Ok(()))
    }

    fn finish(&mut self, outcome: Result<(), GuiError>) -> Flow {
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
        }
        Flow::Exit
    }
}
