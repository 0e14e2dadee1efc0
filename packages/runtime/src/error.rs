//! Error types for the nux runtime.

use nux_host::Fault;
use thiserror::Error;

/// Errors that can occur while loading or running a guest.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The wasm engine rejected an operation.
    #[error("wasmtime {operation} failed: {message}")]
    Wasm {
        operation: &'static str,
        message: String,
    },

    /// A host import faulted and the guest was trapped.
    #[error("guest fault: {0}")]
    Fault(#[from] Fault),

    /// The guest trapped on its own (unreachable, stack overflow, ...).
    #[error("guest trapped in {export}: {message}")]
    Trap { export: String, message: String },

    /// A required export is missing or has the wrong type.
    #[error("export not found: {0}")]
    ExportNotFound(String),

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration or input script could not be parsed.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

impl RuntimeError {
    pub fn wasm(operation: &'static str, error: impl std::fmt::Display) -> Self {
        RuntimeError::Wasm {
            operation,
            message: error.to_string(),
        }
    }
}

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
