//! # nux runtime
//!
//! Runs a nux guest module under wasmtime. The host side of the contract
//! (slots, files, GPU protocol, input, logging, frame scheduling) lives in
//! `nux-host`; this crate links those imports into a wasmtime instance and
//! drives it either as fast as possible for a fixed number of frames or on
//! the wall clock.
//!
//! The guest's linear memory may be exported as `memory` or imported as
//! `env.memory`. Imports the host does not provide are linked as traps, so a
//! module with extra, unused imports still instantiates.

pub mod config;
pub mod error;
pub mod guest;
pub mod linker;
pub mod runtime;

pub use config::RuntimeConfig;
pub use error::{Result, RuntimeError};
pub use guest::WasmGuest;
pub use linker::{add_to_linker, HostState};
pub use runtime::{RunSummary, Runtime};
