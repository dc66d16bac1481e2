//! Run-on-GUI-thread primitive
//!
//! A [`UiDispatcher`] hands work items to the thread that owns the event
//! loop. Items are accepted into the queue before `submit` returns and run in
//! submission order; the loop drains every accepted item before it looks at
//! further GUI events.

use crate::error::GuiError;
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use jembed_core::EngineInstance;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Unit of work executed on the GUI thread against the running engine
pub type WorkItem = Box<dyn FnOnce(&mut dyn EngineInstance) -> jembed_core::Result<()> + Send>;

pub(crate) type Waker = Arc<dyn Fn() + Send + Sync>;

pub(crate) enum UiMessage {
    Run(WorkItem),
    Quit,
}

/// Sending side, cloneable across threads
#[derive(Clone)]
pub struct UiDispatcher {
    sender: Sender<UiMessage>,
    waker: Waker,
}

impl UiDispatcher {
    /// Schedule `work` on the GUI thread.
    ///
    /// Returns once the item is queued; it does not wait for the item to run.
    pub fn submit<F>(&self, work: F) -> Result<(), GuiError>
    where
        F: FnOnce(&mut dyn EngineInstance) -> jembed_core::Result<()> + Send + 'static,
    {
        self.send(UiMessage::Run(Box::new(work)))
    }

    /// Ask the event loop to exit after the work queued so far.
    pub fn stop(&self) -> Result<(), GuiError> {
        self.send(UiMessage::Quit)
    }

    fn send(&self, message: UiMessage) -> Result<(), GuiError> {
        self.sender.send(message).map_err(|_| GuiError::LoopClosed)?;
        (self.waker)();
        Ok(())
    }
}

impl std::fmt::Debug for UiDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiDispatcher")
            .field("queued", &self.sender.len())
            .finish()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Drain {
    Continue,
    Quit,
}

/// Receiving side, owned by the event loop
pub struct UiQueue {
    receiver: Receiver<UiMessage>,
    parked: VecDeque<UiMessage>,
}

pub(crate) fn channel(waker: Waker) -> (UiDispatcher, UiQueue) {
    let (sender, receiver) = crossbeam::channel::unbounded();
    (
        UiDispatcher { sender, waker },
        UiQueue {
            receiver,
            parked: VecDeque::new(),
        },
    )
}

impl UiQueue {
    /// Run every accepted work item in order.
    ///
    /// Stops at a quit request or at the first failing item; anything queued
    /// behind it stays queued.
    pub fn drain(&mut self, instance: &mut dyn EngineInstance) -> Result<Drain, GuiError> {
        loop {
            let message = match self.parked.pop_front() {
                Some(message) => message,
                None => match self.receiver.try_recv() {
                    Ok(message) => message,
                    Err(_) => return Ok(Drain::Continue),
                },
            };
            match message {
                UiMessage::Run(work) => work(&mut *instance)?,
                UiMessage::Quit => {
                    tracing::debug!("event loop stop requested");
                    return Ok(Drain::Quit);
                }
            }
        }
    }

    /// Block until a message is queued, without running it.
    pub fn wait(&mut self) -> Result<(), GuiError> {
        if self.parked.is_empty() {
            let message = self.receiver.recv().map_err(|_| GuiError::LoopClosed)?;
            self.parked.push_back(message);
        }
        Ok(())
    }

    /// [`wait`](Self::wait), giving up after `timeout`.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<(), GuiError> {
        if self.parked.is_empty() {
            match self.receiver.recv_timeout(timeout) {
                Ok(message) => self.parked.push_back(message),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Err(GuiError::LoopClosed),
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.parked.is_empty() && self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jembed_core::{BindingSet, BindingValue, BridgeError, Script};
    use jembed_script::QuickJsInstance;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_channel() -> (UiDispatcher, UiQueue, Arc<AtomicUsize>) {
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = wakes.clone();
        let (dispatcher, queue) = channel(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        (dispatcher, queue, wakes)
    }

    #[test]
    fn test_work_runs_in_submission_order() {
        let (dispatcher, mut queue, wakes) = counting_channel();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let seen = seen.clone();
            dispatcher
                .submit(move |_| {
                    seen.lock().push(i);
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(wakes.load(Ordering::SeqCst), 3);
        assert!(seen.lock().is_empty());

        let mut js = QuickJsInstance::new().unwrap();
        assert_eq!(queue.drain(&mut js).unwrap(), Drain::Continue);
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_work_sees_the_engine() {
        let (dispatcher, mut queue, _) = counting_channel();
        let result = Arc::new(Mutex::new(BindingValue::Null));

        let slot = result.clone();
        dispatcher
            .submit(move |engine| {
                let script = Script::inline("20 + 22");
                let value = engine.evaluate(&script, &BindingSet::new(), &mut BindingSet::new())?;
                *slot.lock() = value;
                Ok(())
            })
            .unwrap();

        let mut js = QuickJsInstance::new().unwrap();
        queue.drain(&mut js).unwrap();
        assert_eq!(*result.lock(), BindingValue::Int(42));
    }

    #[test]
    fn test_first_error_stops_the_drain() {
        let (dispatcher, mut queue, _) = counting_channel();
        let ran = Arc::new(AtomicUsize::new(0));

        dispatcher
            .submit(|_| Err(BridgeError::evaluation("broken")))
            .unwrap();
        let counter = ran.clone();
        dispatcher
            .submit(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        let mut js = QuickJsInstance::new().unwrap();
        let err = queue.drain(&mut js).unwrap_err();
        assert!(matches!(err, GuiError::Bridge(BridgeError::ScriptEvaluation { .. })));
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        queue.drain(&mut js).unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_and_wait() {
        let (dispatcher, mut queue, _) = counting_channel();
        let remote = dispatcher.clone();
        std::thread::spawn(move || remote.stop().unwrap())
            .join()
            .unwrap();

        queue.wait().unwrap();
        let mut js = QuickJsInstance::new().unwrap();
        assert_eq!(queue.drain(&mut js).unwrap(), Drain::Quit);
    }

    #[test]
    fn test_wait_timeout_returns_when_idle() {
        let (dispatcher, mut queue, _) = counting_channel();
        queue.wait_timeout(Duration::from_millis(5)).unwrap();
        assert!(queue.is_empty());

        dispatcher.submit(|_| Ok(())).unwrap();
        queue.wait_timeout(Duration::from_millis(5)).unwrap();
        assert!(!queue.is_empty());

        drop(dispatcher);
        let mut js = QuickJsInstance::new().unwrap();
        queue.drain(&mut js).unwrap();
        assert!(matches!(
            queue.wait_timeout(Duration::from_millis(5)),
            Err(GuiError::LoopClosed)
        ));
    }

    #[test]
    fn test_submit_after_queue_dropped() {
        let (dispatcher, queue, _) = counting_channel();
        drop(queue);
        assert!(matches!(dispatcher.submit(|_| Ok(())), Err(GuiError::LoopClosed)));
    }
}
