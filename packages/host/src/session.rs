//! One guest session.
//!
//! A [`Session`] owns everything a single guest instance can reach: the
//! file catalogue and open files, the GPU resources, the input bridge and
//! the log sink. There is no process-wide state; two sessions never share
//! a slot.

use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Span};
use uuid::Uuid;

use crate::config::HostConfig;
use crate::error::Fault;
use crate::gpu::{GpuBackend, GpuResources};
use crate::input::{InputBridge, InputSource, NoInput};
use crate::log::{LogSink, TracingSink};
use crate::vfs::VirtualFs;

/// Unique identifier of a session, used to correlate diagnostics.
pub type SessionId = Uuid;

/// What `teardown` released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Teardown {
    pub files_closed: usize,
    pub gpu_released: usize,
}

pub struct Session {
    id: SessionId,
    config: HostConfig,
    span: Span,
    pub vfs: VirtualFs,
    pub gpu: GpuResources,
    pub input: InputBridge,
    pub log: Box<dyn LogSink>,
    started: bool,
    torn_down: bool,
}

impl Session {
    /// A session with no input devices that logs guest messages to `tracing`.
    pub fn new(config: HostConfig, backend: Box<dyn GpuBackend>) -> Self {
        let id = Uuid::new_v4();
        let span = info_span!("session", %id);
        Self {
            id,
            vfs: VirtualFs::new(config.slot_capacity),
            gpu: GpuResources::new(&config, backend),
            input: InputBridge::new(Box::new(NoInput)),
            log: Box::new(TracingSink),
            config,
            span,
            started: false,
            torn_down: false,
        }
    }

    pub fn with_input(mut self, source: Box<dyn InputSource>) -> Self {
        self.input = InputBridge::new(source);
        self
    }

    pub fn with_log_sink(mut self, sink: Box<dyn LogSink>) -> Self {
        self.log = sink;
        self
    }

    /// Register a named blob in the file catalogue.
    pub fn with_file(mut self, name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        self.vfs.insert(name, data);
        self
    }

    /// Register the cart under the configured cart name.
    pub fn with_cart(self, data: impl Into<Arc<[u8]>>) -> Self {
        let name = self.config.cart_name.clone();
        self.with_file(name, data)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// The span all work for this session runs under.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Prepare the display before the guest runs: clear the screen once.
    pub fn start(&mut self) -> Result<(), Fault> {
        if self.started {
            return Ok(());
        }
        let _enter = self.span.enter();
        self.gpu.clear_screen(self.config.clear_color)?;
        self.started = true;
        info!(clear_color = ?self.config.clear_color, "session started");
        Ok(())
    }

    /// Close every file and release every GPU object.
    ///
    /// Safe to call more than once; later calls release nothing.
    pub fn teardown(&mut self) -> Teardown {
        let _enter = self.span.enter();
        let files_closed = self.vfs.close_all();
        let gpu_released = match self.gpu.release_all() {
            Ok(released) => released,
            Err(e) => {
                warn!(error = %e, "gpu backend failed during teardown");
                0
            }
        };
        if !self.torn_down {
            debug!(files_closed, gpu_released, "session torn down");
        }
        self.torn_down = true;
        Teardown {
            files_closed,
            gpu_released,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("vfs", &self.vfs)
            .field("gpu", &self.gpu)
            .field("input", &self.input)
            .finish()
    }
}
