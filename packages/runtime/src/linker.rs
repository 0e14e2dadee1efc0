//! Wiring the host imports into a wasmtime [`Linker`].

use nux_host::abi::{self, IMPORT_MODULE, MEMORY};
use nux_host::imports::{self, Outcome};
use nux_host::{Fault, GuestMemory, Session};
use tracing::error;
use wasmtime::{Caller, Extern, Linker, Memory};

/// Per-instance state held by the wasmtime store.
pub struct HostState {
    pub session: Session,

    /// The guest's linear memory, once known.
    pub memory: Option<Memory>,
}

impl HostState {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            memory: None,
        }
    }
}

fn trap(fault: Fault) -> wasmtime::Error {
    error!(%fault, "trapping guest");
    wasmtime::Error::new(fault)
}

/// The guest's memory. An exported memory is looked up on first use, so
/// imports called from a wasm start function see it before instantiation
/// returns.
fn guest_memory(caller: &mut Caller<'_, HostState>) -> Option<Memory> {
    if let Some(memory) = caller.data().memory {
        return Some(memory);
    }
    let memory = caller.get_export(MEMORY).and_then(Extern::into_memory)?;
    caller.data_mut().memory = Some(memory);
    Some(memory)
}

/// Run `f` with the session and a view of guest memory.
fn with_memory<R>(
    caller: &mut Caller<'_, HostState>,
    f: impl FnOnce(&mut Session, &mut GuestMemory<'_>) -> Outcome<R>,
) -> wasmtime::Result<R> {
    let memory = guest_memory(caller).ok_or(Fault::NoMemory).map_err(trap)?;
    let (bytes, state) = memory.data_and_store_mut(&mut *caller);
    let mut memory = GuestMemory::new(bytes);
    f(&mut state.session, &mut memory).map_err(trap)
}

/// Run `f` with the session only.
fn with_session<R>(
    caller: &mut Caller<'_, HostState>,
    f: impl FnOnce(&mut Session) -> Outcome<R>,
) -> wasmtime::Result<R> {
    f(&mut caller.data_mut().session).map_err(trap)
}

/// Define every host import in `linker`.
pub fn add_to_linker(linker: &mut Linker<HostState>) -> wasmtime::Result<()> {
    linker.func_wrap(
        IMPORT_MODULE,
        abi::RUNTIME_LOG,
        |mut caller: Caller<'_, HostState>, level: i32, ptr: i32, len: i32| {
            with_memory(&mut caller, |session, memory| {
                imports::runtime_log(session, memory, level, ptr, len)
            })
        },
    )?;

    // Files
    linker.func_wrap(
        IMPORT_MODULE,
        abi::FILE_OPEN,
        |mut caller: Caller<'_, HostState>,
         userdata: i32,
         slot: i32,
         path_ptr: i32,
         path_len: i32,
         mode: i32| {
            with_memory(&mut caller, |session, memory| {
                imports::file_open(session, memory, userdata, slot, path_ptr, path_len, mode)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        abi::FILE_CLOSE,
        |mut caller: Caller<'_, HostState>, userdata: i32, slot: i32| {
            imports::file_close(&mut caller.data_mut().session, userdata, slot);
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        abi::FILE_STAT,
        |mut caller: Caller<'_, HostState>, userdata: i32, slot: i32, stat_ptr: i32| {
            with_memory(&mut caller, |session, memory| {
                imports::file_stat(session, memory, userdata, slot, stat_ptr)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        abi::FILE_SEEK,
        |mut caller: Caller<'_, HostState>, userdata: i32, slot: i32, cursor: i32| {
            with_session(&mut caller, |session| {
                imports::file_seek(session, userdata, slot, cursor)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        abi::FILE_READ,
        |mut caller: Caller<'_, HostState>, userdata: i32, slot: i32, dst_ptr: i32, n: i32| {
            with_memory(&mut caller, |session, memory| {
                imports::file_read(session, memory, userdata, slot, dst_ptr, n)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        abi::FILE_WRITE,
        |mut caller: Caller<'_, HostState>, userdata: i32, slot: i32, ptr: i32, n: i32| {
            with_memory(&mut caller, |session, memory| {
                imports::file_write(session, memory, userdata, slot, ptr, n)
            })
        },
    )?;

    // GPU resources
    linker.func_wrap(
        IMPORT_MODULE,
        abi::PIPELINE_CREATE,
        |mut caller: Caller<'_, HostState>, userdata: i32, slot: i32, info_ptr: i32| {
            with_memory(&mut caller, |session, memory| {
                imports::pipeline_create(session, memory, userdata, slot, info_ptr)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        abi::PIPELINE_DELETE,
        |mut caller: Caller<'_, HostState>, userdata: i32, slot: i32| {
            with_session(&mut caller, |session| {
                imports::pipeline_delete(session, userdata, slot)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        abi::FRAMEBUFFER_CREATE,
        |mut caller: Caller<'_, HostState>, userdata: i32, slot: i32, texture: i32| {
            with_session(&mut caller, |session| {
                imports::framebuffer_create(session, userdata, slot, texture)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        abi::FRAMEBUFFER_DELETE,
        |mut caller: Caller<'_, HostState>, userdata: i32, slot: i32| {
            with_session(&mut caller, |session| {
                imports::framebuffer_delete(session, userdata, slot)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        abi::TEXTURE_CREATE,
        |mut caller: Caller<'_, HostState>, userdata: i32, slot: i32, info_ptr: i32| {
            with_memory(&mut caller, |session, memory| {
                imports::texture_create(session, memory, userdata, slot, info_ptr)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        abi::TEXTURE_DELETE,
        |mut caller: Caller<'_, HostState>, userdata: i32, slot: i32| {
            with_session(&mut caller, |session| {
                imports::texture_delete(session, userdata, slot)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        abi::TEXTURE_UPDATE,
        |mut caller: Caller<'_, HostState>,
         userdata: i32,
         slot: i32,
         x: i32,
         y: i32,
         w: i32,
         h: i32,
         data_ptr: i32| {
            with_memory(&mut caller, |session, memory| {
                imports::texture_update(session, memory, userdata, slot, x, y, w, h, data_ptr)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        abi::BUFFER_CREATE,
        |mut caller: Caller<'_, HostState>, userdata: i32, slot: i32, ty: i32, size: i32| {
            with_session(&mut caller, |session| {
                imports::buffer_create(session, userdata, slot, ty, size)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        abi::BUFFER_DELETE,
        |mut caller: Caller<'_, HostState>, userdata: i32, slot: i32| {
            with_session(&mut caller, |session| {
                imports::buffer_delete(session, userdata, slot)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        abi::BUFFER_UPDATE,
        |mut caller: Caller<'_, HostState>,
         userdata: i32,
         slot: i32,
         offset: i32,
         size: i32,
         data_ptr: i32| {
            with_memory(&mut caller, |session, memory| {
                imports::buffer_update(session, memory, userdata, slot, offset, size, data_ptr)
            })
        },
    )?;

    // Commands and input
    linker.func_wrap(
        IMPORT_MODULE,
        abi::GPU_SUBMIT,
        |mut caller: Caller<'_, HostState>, userdata: i32, commands_ptr: i32, count: i32| {
            with_memory(&mut caller, |session, memory| {
                imports::gpu_submit(session, memory, userdata, commands_ptr, count)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        abi::INPUT_UPDATE,
        |mut caller: Caller<'_, HostState>, userdata: i32, buttons_ptr: i32, axes_ptr: i32| {
            with_memory(&mut caller, |session, memory| {
                imports::input_update(session, memory, userdata, buttons_ptr, axes_ptr)
            })
        },
    )?;

    Ok(())
}
