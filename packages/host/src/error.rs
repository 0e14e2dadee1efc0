//! Error types for the nux host.
//!
//! Errors come in two tiers. [`Error`] holds the recoverable, guest-visible
//! kinds that an import call turns into a return code. [`Fault`] holds the
//! conditions that end the session: once the guest hands the host a pointer
//! outside its own memory, nothing it asks for afterwards can be trusted.

use thiserror::Error;

use crate::slot::{ResourceKind, Slot};

/// Errors from the GPU backend behind the command/resource protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("gpu backend {operation} failed: {message}")]
pub struct BackendError {
    /// The backend call that failed.
    pub operation: &'static str,
    /// Backend-specific description.
    pub message: String,
}

impl BackendError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Conditions that terminate the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// A pointer/length pair reaches outside guest linear memory.
    #[error("guest memory access out of bounds: offset {offset} + len {len} > memory size {memory_size}")]
    MemoryOutOfBounds {
        offset: u64,
        len: u64,
        memory_size: usize,
    },

    /// A pointer or length argument was negative.
    #[error("negative {argument} passed to {call}: {value}")]
    NegativeArgument {
        call: &'static str,
        argument: &'static str,
        value: i32,
    },

    /// The guest has no linear memory to read from or write to.
    #[error("guest has no linear memory")]
    NoMemory,

    /// The GPU backend failed; backend state can no longer be trusted.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors from host operations.
///
/// Everything except [`Error::Fault`] is recoverable and reported to the
/// guest as a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The path is not in the virtual file catalogue.
    #[error("file not found: {path}")]
    NotFound { path: String },

    /// The slot is out of range or holds no live resource.
    #[error("invalid {kind} handle: {slot}")]
    InvalidHandle { kind: ResourceKind, slot: i64 },

    /// The slot requested for a new resource is already live.
    #[error("{kind} slot {slot} is already in use")]
    SlotInUse { kind: ResourceKind, slot: Slot },

    /// Every slot of this kind is live.
    #[error("no free {kind} slot")]
    Full { kind: ResourceKind },

    /// A create descriptor is malformed.
    #[error("invalid {kind} descriptor: {reason}")]
    InvalidDescriptor {
        kind: ResourceKind,
        reason: String,
    },

    /// An update region lies outside the resource's extent.
    #[error("{kind} update out of bounds: {reason}")]
    OutOfBounds {
        kind: ResourceKind,
        reason: String,
    },

    /// A command batch is malformed.
    #[error("invalid command {index}: {reason}")]
    InvalidCommand { index: usize, reason: String },

    /// A seek target lies outside the file.
    #[error("seek to {offset} outside file of {size} bytes")]
    OutOfRange { offset: i64, size: usize },

    /// A file's size does not fit the guest's `i32` stat record.
    #[error("file of {size} bytes is too large to stat")]
    FileTooLarge { size: usize },

    /// The operation is not supported on virtual files.
    #[error("unsupported operation: {operation}")]
    Unsupported { operation: &'static str },

    /// A session-terminating fault.
    #[error(transparent)]
    Fault(#[from] Fault),
}

impl Error {
    pub fn invalid_handle(kind: ResourceKind, slot: impl Into<i64>) -> Self {
        Error::InvalidHandle {
            kind,
            slot: slot.into(),
        }
    }

    pub fn invalid_descriptor(kind: ResourceKind, reason: impl Into<String>) -> Self {
        Error::InvalidDescriptor {
            kind,
            reason: reason.into(),
        }
    }

    pub fn out_of_bounds(kind: ResourceKind, reason: impl Into<String>) -> Self {
        Error::OutOfBounds {
            kind,
            reason: reason.into(),
        }
    }

    /// Whether this error must end the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fault(_))
    }
}

impl From<BackendError> for Error {
    fn from(error: BackendError) -> Self {
        Error::Fault(Fault::Backend(error))
    }
}

/// Result type alias for host operations.
pub type Result<T> = std::result::Result<T, Error>;
