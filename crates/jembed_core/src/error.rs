use thiserror::Error;

/// Why an embedded runtime could not be started.
#[derive(Debug, Error)]
pub enum StartFailure {
    #[error("an embedded runtime is already active in this process")]
    AlreadyActive,

    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("engine cannot be restarted in this process: {0}")]
    Restart(String),
}

/// Errors raised across the host/runtime boundary.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to start runtime: {0}")]
    RuntimeStart(#[from] StartFailure),

    #[error("runtime is not active")]
    RuntimeNotActive,

    #[error("script evaluation failed: {message}")]
    ScriptEvaluation { message: String },

    #[error("binding '{name}' cannot be marshalled: {reason}")]
    BindingMarshal { name: String, reason: String },

    #[error("runtime shutdown failed: {0}")]
    Shutdown(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    ConfigFormat(#[from] serde_json::Error),
}

impl BridgeError {
    pub fn evaluation(message: impl Into<String>) -> Self {
        BridgeError::ScriptEvaluation {
            message: message.into(),
        }
    }

    pub fn marshal(name: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::BindingMarshal {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
