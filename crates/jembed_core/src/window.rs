//! Window requests raised by scripts
//!
//! Engines cannot touch native windows themselves: a script asks for a window
//! by pushing a [`WindowRequest`], and the GUI toolkit applies the queued
//! requests on the thread that owns the event loop.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifier of a top-level window, allocated by [`WindowRequests`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u64);

/// Top-level window description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub visible: bool,
}

impl WindowSpec {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Never-shown window that only marks the GUI subsystem as initialised.
    pub fn hidden() -> Self {
        Self {
            title: String::new(),
            width: 1,
            height: 1,
            visible: false,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            title: "jembed".to_string(),
            width: 640,
            height: 480,
            visible: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowRequest {
    Open { id: WindowId, spec: WindowSpec },
    SetVisible { id: WindowId, visible: bool },
    Close { id: WindowId },
    /// Stop the event loop
    Quit,
}

#[derive(Debug, Default)]
struct Shared {
    next_id: AtomicU64,
    pending: Mutex<VecDeque<WindowRequest>>,
}

/// Cloneable queue of window requests shared by an engine and a toolkit
#[derive(Debug, Clone, Default)]
pub struct WindowRequests {
    shared: Arc<Shared>,
}

impl WindowRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a new window and return its id.
    pub fn open(&self, spec: WindowSpec) -> WindowId {
        let id = WindowId(self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.push(WindowRequest::Open { id, spec });
        id
    }

    pub fn set_visible(&self, id: WindowId, visible: bool) {
        self.push(WindowRequest::SetVisible { id, visible });
    }

    pub fn close(&self, id: WindowId) {
        self.push(WindowRequest::Close { id });
    }

    pub fn quit(&self) {
        self.push(WindowRequest::Quit);
    }

    pub fn push(&self, request: WindowRequest) {
        tracing::trace!(?request, "window request queued");
        self.shared.pending.lock().push_back(request);
    }

    /// Take every queued request in submission order.
    pub fn drain(&self) -> Vec<WindowRequest> {
        self.shared.pending.lock().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.pending.lock().is_empty()
    }
}
