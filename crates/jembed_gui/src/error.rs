use jembed_core::BridgeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuiError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("gui event loop is closed")]
    LoopClosed,

    #[error("event loop error: {0}")]
    EventLoop(String),

    #[error("failed to create window: {0}")]
    Window(String),
}

impl From<winit::error::EventLoopError> for GuiError {
    fn from(err: winit::error::EventLoopError) -> Self {
        GuiError::EventLoop(err.to_string())
    }
}

impl From<winit::error::OsError> for GuiError {
    fn from(err: winit::error::OsError) -> Self {
        GuiError::Window(err.to_string())
    }
}
