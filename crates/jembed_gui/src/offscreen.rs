//! Toolkit without native windows
//!
//! Windows live in an in-memory table, so windowed scripts run on hosts
//! with no display. [`CloseBehavior::Immediately`] closes every window the
//! moment it becomes visible, which lets a windowed run finish on its own.

use crate::dispatch::{self, UiDispatcher};
use crate::error::GuiError;
use crate::toolkit::{self, Flow, GuiToolkit, LoopDriver, WindowBackend};
use jembed_core::{EngineInstance, WindowId, WindowRequests, WindowSpec};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum CloseBehavior {
    /// Close a window as soon as it is shown
    #[default]
    Immediately,
    /// Keep windows until a script closes them or the loop stops
    Never,
}

/// What happened to an offscreen window
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OffscreenEvent {
    Opened { id: WindowId, title: String, visible: bool },
    Shown(WindowId),
    Hidden(WindowId),
    Closed(WindowId),
}

#[derive(Default)]
struct WindowTable {
    behavior: CloseBehavior,
    open: BTreeMap<WindowId, WindowSpec>,
    history: Vec<OffscreenEvent>,
    closing: Vec<WindowId>,
}

impl WindowTable {
    fn shown(&mut self, id: WindowId) {
        if self.behavior == CloseBehavior::Immediately {
            self.closing.push(id);
        }
    }
}

impl WindowBackend for WindowTable {
    fn open(&mut self, id: WindowId, spec: &WindowSpec) -> Result<(), GuiError> {
        self.history.push(OffscreenEvent::Opened {
            id,
            title: spec.title.clone(),
            visible: spec.visible,
        });
        self.open.insert(id, spec.clone());
        if spec.visible {
            self.shown(id);
        }
        Ok(())
    }

    fn set_visible(&mut self, id: WindowId, visible: bool) {
        let Some(spec) = self.open.get_mut(&id) else {
            return;
        };
        spec.visible = visible;
        if visible {
            self.history.push(OffscreenEvent::Shown(id));
            self.shown(id);
        } else {
            self.history.push(OffscreenEvent::Hidden(id));
        }
    }

    fn close(&mut self, id: WindowId) {
        if self.open.remove(&id).is_some() {
            self.history.push(OffscreenEvent::Closed(id));
        }
    }
}

pub struct OffscreenToolkit {
    dispatcher: UiDispatcher,
    driver: LoopDriver,
    table: WindowTable,
}

impl OffscreenToolkit {
    pub fn new(behavior: CloseBehavior) -> Self {
        // Idle waits block on the queue itself, so there is nothing to wake.
        let (dispatcher, queue) = dispatch::channel(Arc::new(|| {}));
        Self {
            dispatcher,
            driver: LoopDriver::new(queue, WindowRequests::new()),
            table: WindowTable {
                behavior,
                ..WindowTable::default()
            },
        }
    }

    pub fn history(&self) -> &[OffscreenEvent] {
        &self.table.history
    }

    /// Windows still open, in id order
    pub fn open_windows(&self) -> impl Iterator<Item = (WindowId, &WindowSpec)> {
        self.table.open.iter().map(|(id, spec)| (*id, spec))
    }

    /// Close every window scheduled for closing, reporting each to the driver.
    fn settle(&mut self, mut flow: Flow) -> Flow {
        for id in std::mem::take(&mut self.table.closing) {
            if !self.table.open.contains_key(&id) {
                continue;
            }
            self.table.close(id);
            flow = self.driver.window_closed(id);
        }
        flow
    }
}

impl Default for OffscreenToolkit {
    fn default() -> Self {
        Self::new(CloseBehavior::default())
    }
}

impl GuiToolkit for OffscreenToolkit {
    fn dispatcher(&self) -> UiDispatcher {
        self.dispatcher.clone()
    }

    fn window_requests(&self) -> WindowRequests {
        self.driver.requests().clone()
    }

    fn run_event_loop(&mut self, instance: &mut dyn EngineInstance) -> Result<(), GuiError> {
        let _gate = toolkit::event_loop_gate();
        self.driver.begin();
        for id in std::mem::take(&mut self.table.open).into_keys() {
            self.table.history.push(OffscreenEvent::Closed(id));
        }
        self.table.closing.clear();
        tracing::debug!(behavior = ?self.table.behavior, "offscreen event loop started");

        loop {
            let mut flow = self.driver.pump(&mut *instance, &mut self.table);
            if flow != Flow::Exit {
                flow = self.settle(flow);
            }
            let waited = match flow {
                Flow::Exit => break,
                Flow::Continue => self.driver.queue_mut().wait(),
                Flow::Poll => self.driver.queue_mut().wait_timeout(toolkit::ENGINE_WINDOW_POLL),
            };
            if let Err(err) = waited {
                self.driver.fail(err);
                break;
            }
        }

        tracing::debug!("offscreen event loop exited");
        self.driver.take_outcome()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::OwnWindows;
    use jembed_core::{BindingSet, BridgeError, Script};
    use jembed_script::QuickJsInstance;
    use parking_lot::Mutex;
    use std::sync::atomic::Ordering;
    use std::thread;
    use std::time::Duration;

    fn gui_instance(toolkit: &OffscreenToolkit) -> QuickJsInstance {
        let mut js = QuickJsInstance::new().unwrap();
        js.activate_gui_integration(toolkit.window_requests()).unwrap();
        js
    }

    fn submit_script(toolkit: &OffscreenToolkit, source: &'static str) {
        toolkit
            .dispatcher()
            .submit(move |engine| {
                engine
                    .evaluate(&Script::inline(source), &BindingSet::new(), &mut BindingSet::new())
                    .map(drop)
            })
            .unwrap();
    }

    #[test]
    fn test_shown_window_closes_immediately() {
        let mut toolkit = OffscreenToolkit::new(CloseBehavior::Immediately);
        let mut js = gui_instance(&toolkit);
        toolkit.create_top_level_window(WindowSpec::hidden()).unwrap();
        submit_script(&toolkit, "gui.showWindow('Hello', 320, 200)");

        toolkit.run_event_loop(&mut js).unwrap();

        let history = toolkit.history();
        assert_eq!(history.len(), 3);
        assert!(matches!(&history[1], OffscreenEvent::Opened { title, visible: true, .. } if title == "Hello"));
        assert!(matches!(history[2], OffscreenEvent::Closed(_)));
        assert_eq!(toolkit.open_windows().count(), 1);
    }

    #[test]
    fn test_script_closes_its_own_window() {
        let mut toolkit = OffscreenToolkit::new(CloseBehavior::Never);
        let mut js = gui_instance(&toolkit);
        submit_script(
            &toolkit,
            "var w = gui.createWindow('late'); gui.setVisible(w, true); gui.closeWindow(w);",
        );

        toolkit.run_event_loop(&mut js).unwrap();
        let id = WindowId(1);
        assert_eq!(
            toolkit.history(),
            &[
                OffscreenEvent::Opened { id, title: "late".into(), visible: false },
                OffscreenEvent::Shown(id),
                OffscreenEvent::Closed(id),
            ]
        );
    }

    #[test]
    fn test_stop_from_another_thread() {
        let mut toolkit = OffscreenToolkit::new(CloseBehavior::Never);
        let mut js = gui_instance(&toolkit);
        submit_script(&toolkit, "gui.showWindow('stays open')");

        let dispatcher = toolkit.dispatcher();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            dispatcher.stop().unwrap();
        });

        toolkit.run_event_loop(&mut js).unwrap();
        stopper.join().unwrap();
        assert_eq!(toolkit.open_windows().count(), 1);
    }

    #[test]
    fn test_quit_from_script() {
        let mut toolkit = OffscreenToolkit::new(CloseBehavior::Never);
        let mut js = gui_instance(&toolkit);
        submit_script(&toolkit, "gui.showWindow('a'); gui.quit();");
        toolkit.run_event_loop(&mut js).unwrap();
    }

    #[test]
    fn test_script_error_is_returned() {
        let mut toolkit = OffscreenToolkit::new(CloseBehavior::Never);
        let mut js = gui_instance(&toolkit);
        submit_script(&toolkit, "gui.showWindow('a'); throw new Error('window script failed')");

        let err = toolkit.run_event_loop(&mut js).unwrap_err();
        match err {
            GuiError::Bridge(BridgeError::ScriptEvaluation { message }) => {
                assert!(message.contains("window script failed"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_loop_waits_for_engine_windows() {
        let mut toolkit = OffscreenToolkit::new(CloseBehavior::Immediately);
        let mut engine = OwnWindows::default();
        engine.showing.store(1, Ordering::SeqCst);

        let showing = engine.showing.clone();
        let closer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            showing.store(0, Ordering::SeqCst);
        });

        toolkit.create_top_level_window(WindowSpec::hidden()).unwrap();
        toolkit.run_event_loop(&mut engine).unwrap();
        assert_eq!(engine.showing.load(Ordering::SeqCst), 0);
        closer.join().unwrap();
    }

    #[test]
    fn test_second_loop_waits_for_the_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (running_tx, running_rx) = crossbeam::channel::bounded(1);

        let first_log = log.clone();
        let first = thread::spawn(move || {
            let mut toolkit = OffscreenToolkit::new(CloseBehavior::Never);
            let mut js = gui_instance(&toolkit);
            submit_script(&toolkit, "gui.showWindow('first')");
            let dispatcher = toolkit.dispatcher();
            toolkit
                .dispatcher()
                .submit(move |_| {
                    first_log.lock().push("first runs");
                    running_tx.send(dispatcher).ok();
                    Ok(())
                })
                .unwrap();
            toolkit.run_event_loop(&mut js).unwrap();
        });
        let first_dispatcher = running_rx.recv().unwrap();

        let second_log = log.clone();
        let second = thread::spawn(move || {
            let mut toolkit = OffscreenToolkit::new(CloseBehavior::Immediately);
            let mut js = gui_instance(&toolkit);
            toolkit
                .dispatcher()
                .submit(move |_| {
                    second_log.lock().push("second runs");
                    Ok(())
                })
                .unwrap();
            toolkit.run_event_loop(&mut js).unwrap();
        });

        thread::sleep(Duration::from_millis(50));
        log.lock().push("first stopped");
        first_dispatcher.stop().unwrap();

        first.join().unwrap();
        second.join().unwrap();
        assert_eq!(*log.lock(), vec!["first runs", "first stopped", "second runs"]);
    }
}
