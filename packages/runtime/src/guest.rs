//! Loading and running a guest module with wasmtime.

use nux_host::abi::{IMPORT_MODULE, MEMORY};
use nux_host::scheduler::{FrameHost, FrameTime};
use nux_host::{Fault, GuestMemory, Session};
use tracing::debug;
use wasmtime::{Engine, ExternType, Linker, Memory, Module, Store, TypedFunc};

use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::linker::{add_to_linker, HostState};

/// An instantiated guest bound to one session.
pub struct WasmGuest {
    store: Store<HostState>,
    init: TypedFunc<(), ()>,
    update: TypedFunc<(), ()>,
    init_export: String,
    update_export: String,
}

impl WasmGuest {
    /// Compile and instantiate `wasm` (binary or text format) against `session`.
    pub fn new(wasm: &[u8], session: Session, config: &RuntimeConfig) -> Result<Self> {
        let engine = Engine::default();
        let module = Module::new(&engine, wasm).map_err(|e| RuntimeError::wasm("compile", e))?;

        let mut linker = Linker::<HostState>::new(&engine);
        add_to_linker(&mut linker).map_err(|e| RuntimeError::wasm("linker", e))?;

        let mut store = Store::new(&engine, HostState::new(session));

        // A guest that imports its memory gets one built from the declared type.
        let imported = module
            .imports()
            .find(|import| import.module() == IMPORT_MODULE && import.name() == MEMORY)
            .and_then(|import| match import.ty() {
                ExternType::Memory(ty) => Some(ty),
                _ => None,
            });
        if let Some(ty) = imported {
            let memory =
                Memory::new(&mut store, ty).map_err(|e| RuntimeError::wasm("memory", e))?;
            linker
                .define(&store, IMPORT_MODULE, MEMORY, memory)
                .map_err(|e| RuntimeError::wasm("linker", e))?;
            store.data_mut().memory = Some(memory);
        }

        linker
            .define_unknown_imports_as_traps(&module)
            .map_err(|e| RuntimeError::wasm("linker", e))?;

        // A start function may call imports, and those may fault.
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| match e.downcast_ref::<Fault>() {
                Some(fault) => RuntimeError::Fault(fault.clone()),
                None => RuntimeError::wasm("instantiate", format!("{:#}", e)),
            })?;

        if store.data().memory.is_none() {
            store.data_mut().memory = instance.get_memory(&mut store, MEMORY);
        }
        if tracing::enabled!(tracing::Level::DEBUG) {
            let exports: Vec<String> = instance
                .exports(&mut store)
                .map(|export| export.name().to_string())
                .collect();
            debug!(?exports, has_memory = store.data().memory.is_some(), "guest instantiated");
        }

        let init = instance
            .get_typed_func::<(), ()>(&mut store, &config.init_export)
            .map_err(|_| RuntimeError::ExportNotFound(config.init_export.clone()))?;
        let update = instance
            .get_typed_func::<(), ()>(&mut store, &config.update_export)
            .map_err(|_| RuntimeError::ExportNotFound(config.update_export.clone()))?;

        Ok(Self {
            store,
            init,
            update,
            init_export: config.init_export.clone(),
            update_export: config.update_export.clone(),
        })
    }

    /// Load a module from a file.
    pub fn from_file(
        path: impl AsRef<std::path::Path>,
        session: Session,
        config: &RuntimeConfig,
    ) -> Result<Self> {
        let wasm = std::fs::read(path)?;
        Self::new(&wasm, session, config)
    }

    pub fn session(&self) -> &Session {
        &self.store.data().session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.store.data_mut().session
    }

    fn call(&mut self, export: &str, func: TypedFunc<(), ()>) -> Result<()> {
        func.call(&mut self.store, ()).map_err(|e| match e.downcast_ref::<Fault>() {
            Some(fault) => RuntimeError::Fault(fault.clone()),
            None => RuntimeError::Trap {
                export: export.to_string(),
                message: format!("{:#}", e),
            },
        })
    }
}

impl FrameHost for WasmGuest {
    type Error = RuntimeError;

    fn init(&mut self) -> Result<()> {
        self.session_mut().start()?;
        let (export, func) = (self.init_export.clone(), self.init.clone());
        self.call(&export, func)
    }

    fn refresh_input(&mut self, _time: &FrameTime) {
        let Some(memory) = self.store.data().memory else {
            return;
        };
        let (bytes, state) = memory.data_and_store_mut(&mut self.store);
        state.session.input.refresh(&mut GuestMemory::new(bytes));
    }

    fn update(&mut self, _time: &FrameTime) -> Result<()> {
        let (export, func) = (self.update_export.clone(), self.update.clone());
        self.call(&export, func)
    }
}

impl std::fmt::Debug for WasmGuest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmGuest")
            .field("session", self.session())
            .field("init_export", &self.init_export)
            .field("update_export", &self.update_export)
            .finish()
    }
}
