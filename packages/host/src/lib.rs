//! # nux host
//!
//! A small virtual operating system for one sandboxed WebAssembly guest.
//! The guest has no ambient authority: everything it can do goes through a
//! fixed set of imported functions, and everything it can name is a small
//! integer slot the host hands out.
//!
//! ## Core Concepts
//!
//! ### Slots
//!
//! Open files, pipelines, framebuffers, textures and buffers each live in
//! their own [`SlotTable`]. The guest picks the slot for a new resource and
//! uses it in later calls; the host maps it to the real object. Slots are
//! scoped per kind, so texture 0 and buffer 0 are unrelated.
//!
//! ### Files
//!
//! The [`VirtualFs`] exposes host-supplied blobs under flat names. The cart
//! is one of them (`cart.bin` by default). Files are read-only.
//!
//! ### GPU
//!
//! [`GpuResources`] validates descriptors and forwards object creation to a
//! [`GpuBackend`]. Drawing happens through command batches: the guest writes
//! fixed-size records into its memory and submits them in one call. A batch
//! is checked in full before any of it reaches the backend.
//!
//! ### Frames
//!
//! The [`FrameScheduler`] calls the guest's init entry point once and its
//! update entry point once per tick, refreshing input just before.
//!
//! ## Faults
//!
//! Most failures are ordinary return codes the guest is expected to handle.
//! A pointer outside guest memory, a negative length, or a failing backend
//! is different: it is a [`Fault`], the guest is trapped, and the session
//! ends.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────── Session ─────────────────────────┐
//! │                                                          │
//! │  imports ──► GuestMemory (bounds checks)                 │
//! │     │                                                    │
//! │     ├──► VirtualFs ──── SlotTable<FileHandle>            │
//! │     ├──► GpuResources ─ SlotTable<..> ──► GpuBackend     │
//! │     ├──► command::submit ──────────────► GpuBackend      │
//! │     ├──► InputBridge ◄── InputSource                     │
//! │     └──► log::forward ─► LogSink                         │
//! │                                                          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! This crate has no WebAssembly engine in it. The `nux-runtime` crate links
//! these imports into wasmtime and drives the scheduler.

pub mod abi;
pub mod command;
pub mod config;
pub mod error;
pub mod gpu;
pub mod imports;
pub mod input;
pub mod log;
pub mod memory;
pub mod scheduler;
pub mod session;
pub mod slot;
pub mod vfs;

pub use command::{Command, CommandRecord};
pub use config::HostConfig;
pub use error::{BackendError, Error, Fault, Result};
pub use gpu::{GpuBackend, GpuResources, HeadlessBackend};
pub use input::{Buttons, InputBridge, InputSnapshot, InputSource, NoInput, ScriptedInput};
pub use log::{LogLevel, LogSink, RecordingSink, TracingSink};
pub use memory::GuestMemory;
pub use scheduler::{
    FixedStep, FrameHost, FrameScheduler, FrameTime, SchedulerState, StopHandle, StopReason, Tick,
    TickSource,
};
pub use session::{Session, SessionId, Teardown};
pub use slot::{Placement, ResourceKind, Slot, SlotTable};
pub use vfs::{FileStat, OpenMode, VirtualFs};
