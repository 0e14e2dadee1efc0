//! Host import handlers.
//!
//! One function per import. Each takes the session, the guest memory view
//! where it needs one, and the raw `i32` arguments. Recoverable errors are
//! logged at debug level and become a failure return code; a [`Fault`]
//! is returned as `Err` and must trap the guest.
//!
//! Guest memory is always checked before any host state changes, so a
//! faulting call has no other effect.

use tracing::debug;

use crate::abi::{self, StatRecord, FAILURE, READ_ERROR, SUCCESS};
use crate::command::{self, CommandRecord};
use crate::error::{Error, Fault, Result};
use crate::gpu::{BufferDesc, PipelineInfo, TextureInfo};
use crate::log;
use crate::memory::{non_negative, GuestMemory};
use crate::session::Session;
use crate::slot::{Placement, ResourceKind, Slot};
use crate::vfs::OpenMode;

/// What an import hands back to the linker: a return code, or a fault.
pub type Outcome<T = i32> = std::result::Result<T, Fault>;

fn status(call: &'static str, userdata: i32, result: Result<()>) -> Outcome {
    match result {
        Ok(()) => Ok(SUCCESS),
        Err(Error::Fault(fault)) => Err(fault),
        Err(error) => {
            debug!(call, userdata, %error, "import failed");
            Ok(FAILURE)
        }
    }
}

fn at(kind: ResourceKind, slot: i32) -> Result<Placement> {
    Slot::from_guest(kind, slot).map(Placement::At)
}

pub fn runtime_log(
    session: &mut Session,
    memory: &GuestMemory<'_>,
    level: i32,
    ptr: i32,
    len: i32,
) -> Outcome<()> {
    log::forward(session.log.as_mut(), memory, level, ptr, len)
}

pub fn file_open(
    session: &mut Session,
    memory: &GuestMemory<'_>,
    userdata: i32,
    slot: i32,
    path_ptr: i32,
    path_len: i32,
    mode: i32,
) -> Outcome {
    let path = memory.bytes(abi::FILE_OPEN, path_ptr, path_len)?;
    let result = match std::str::from_utf8(path) {
        Ok(path) => at(ResourceKind::File, slot).and_then(|placement| {
            session
                .vfs
                .open_with(placement, path, OpenMode::from_guest(mode))
                .map(|_| ())
        }),
        Err(_) => Err(Error::NotFound {
            path: String::from_utf8_lossy(path).into_owned(),
        }),
    };
    status(abi::FILE_OPEN, userdata, result)
}

pub fn file_close(session: &mut Session, userdata: i32, slot: i32) {
    let result = Slot::from_guest(ResourceKind::File, slot).and_then(|slot| session.vfs.close(slot));
    if let Err(error) = result {
        debug!(call = abi::FILE_CLOSE, userdata, %error, "import failed");
    }
}

pub fn file_stat(
    session: &mut Session,
    memory: &mut GuestMemory<'_>,
    userdata: i32,
    slot: i32,
    stat_ptr: i32,
) -> Outcome {
    memory.range(abi::FILE_STAT, stat_ptr, StatRecord::SIZE as i32)?;
    let result = Slot::from_guest(ResourceKind::File, slot)
        .and_then(|slot| session.vfs.stat(slot))
        .and_then(StatRecord::try_from);
    match result {
        Ok(record) => {
            memory.write_pod(abi::FILE_STAT, stat_ptr, &record)?;
            Ok(SUCCESS)
        }
        Err(e) => status(abi::FILE_STAT, userdata, Err(e)),
    }
}

pub fn file_seek(
    session: &mut Session,
    userdata: i32,
    slot: i32,
    cursor: i32,
) -> Outcome {
    let result = Slot::from_guest(ResourceKind::File, slot)
        .and_then(|slot| session.vfs.seek(slot, i64::from(cursor)));
    status(abi::FILE_SEEK, userdata, result)
}

/// Returns the number of bytes read, or `-1` on a recoverable error.
///
/// The whole destination range must lie in guest memory even if fewer
/// bytes remain in the file.
pub fn file_read(
    session: &mut Session,
    memory: &mut GuestMemory<'_>,
    userdata: i32,
    slot: i32,
    dst_ptr: i32,
    n: i32,
) -> Outcome {
    let dst = memory.bytes_mut(abi::FILE_READ, dst_ptr, n)?;
    let result = Slot::from_guest(ResourceKind::File, slot).and_then(|slot| session.vfs.read(slot, dst));
    match result {
        // Never more than `n`, so it fits.
        Ok(read) => Ok(read as i32),
        Err(Error::Fault(fault)) => Err(fault),
        Err(error) => {
            debug!(call = abi::FILE_READ, userdata, %error, "import failed");
            Ok(READ_ERROR)
        }
    }
}

/// Virtual files are read-only; this always fails.
pub fn file_write(
    session: &mut Session,
    memory: &GuestMemory<'_>,
    userdata: i32,
    slot: i32,
    ptr: i32,
    n: i32,
) -> Outcome {
    let data = memory.bytes(abi::FILE_WRITE, ptr, n)?;
    let result = Slot::from_guest(ResourceKind::File, slot)
        .and_then(|slot| session.vfs.write(slot, data))
        .map(|_| ());
    status(abi::FILE_WRITE, userdata, result)
}

pub fn pipeline_create(
    session: &mut Session,
    memory: &GuestMemory<'_>,
    userdata: i32,
    slot: i32,
    info_ptr: i32,
) -> Outcome {
    let info: PipelineInfo = memory.read_pod(abi::PIPELINE_CREATE, info_ptr)?;
    let result = at(ResourceKind::Pipeline, slot)
        .and_then(|placement| session.gpu.create_pipeline(placement, &info))
        .map(|_| ());
    status(abi::PIPELINE_CREATE, userdata, result)
}

pub fn pipeline_delete(
    session: &mut Session,
    userdata: i32,
    slot: i32,
) -> Outcome {
    let result = Slot::from_guest(ResourceKind::Pipeline, slot)
        .and_then(|slot| session.gpu.delete_pipeline(slot));
    status(abi::PIPELINE_DELETE, userdata, result)
}

pub fn framebuffer_create(
    session: &mut Session,
    userdata: i32,
    slot: i32,
    texture: i32,
) -> Outcome {
    let result = at(ResourceKind::Framebuffer, slot)
        .and_then(|placement| {
            let color = Slot::from_guest(ResourceKind::Texture, texture)?;
            session.gpu.create_framebuffer(placement, color)
        })
        .map(|_| ());
    status(abi::FRAMEBUFFER_CREATE, userdata, result)
}

pub fn framebuffer_delete(
    session: &mut Session,
    userdata: i32,
    slot: i32,
) -> Outcome {
    let result = Slot::from_guest(ResourceKind::Framebuffer, slot)
        .and_then(|slot| session.gpu.delete_framebuffer(slot));
    status(abi::FRAMEBUFFER_DELETE, userdata, result)
}

pub fn texture_create(
    session: &mut Session,
    memory: &GuestMemory<'_>,
    userdata: i32,
    slot: i32,
    info_ptr: i32,
) -> Outcome {
    let info: TextureInfo = memory.read_pod(abi::TEXTURE_CREATE, info_ptr)?;
    let result = at(ResourceKind::Texture, slot)
        .and_then(|placement| session.gpu.create_texture(placement, &info))
        .map(|_| ());
    status(abi::TEXTURE_CREATE, userdata, result)
}

pub fn texture_delete(
    session: &mut Session,
    userdata: i32,
    slot: i32,
) -> Outcome {
    let result = Slot::from_guest(ResourceKind::Texture, slot)
        .and_then(|slot| session.gpu.delete_texture(slot));
    status(abi::TEXTURE_DELETE, userdata, result)
}

/// Upload `w * h` pixels, tightly packed, from `data_ptr`.
#[allow(clippy::too_many_arguments)]
pub fn texture_update(
    session: &mut Session,
    memory: &GuestMemory<'_>,
    userdata: i32,
    slot: i32,
    x: i32,
    y: i32,
    w: i32,
    h: i32,
    data_ptr: i32,
) -> Outcome {
    let checked = Slot::from_guest(ResourceKind::Texture, slot).and_then(|slot| {
        let (region, len) = session.gpu.texture_region(slot, x, y, w, h)?;
        Ok((slot, region, len))
    });
    let (slot, region, len) = match checked {
        Ok(checked) => checked,
        Err(e) => return status(abi::TEXTURE_UPDATE, userdata, Err(e)),
    };
    let data = memory.bytes_sized(abi::TEXTURE_UPDATE, data_ptr, len)?;
    let result = session.gpu.update_texture(slot, region, data);
    status(abi::TEXTURE_UPDATE, userdata, result)
}

pub fn buffer_create(
    session: &mut Session,
    userdata: i32,
    slot: i32,
    ty: i32,
    size: i32,
) -> Outcome {
    let result = at(ResourceKind::Buffer, slot)
        .and_then(|placement| {
            let desc = BufferDesc::from_guest(ty, size, session.config())?;
            session.gpu.create_buffer(placement, desc)
        })
        .map(|_| ());
    status(abi::BUFFER_CREATE, userdata, result)
}

pub fn buffer_delete(
    session: &mut Session,
    userdata: i32,
    slot: i32,
) -> Outcome {
    let result =
        Slot::from_guest(ResourceKind::Buffer, slot).and_then(|slot| session.gpu.delete_buffer(slot));
    status(abi::BUFFER_DELETE, userdata, result)
}

pub fn buffer_update(
    session: &mut Session,
    memory: &GuestMemory<'_>,
    userdata: i32,
    slot: i32,
    offset: i32,
    size: i32,
    data_ptr: i32,
) -> Outcome {
    let data = memory.bytes(abi::BUFFER_UPDATE, data_ptr, size)?;
    let result = Slot::from_guest(ResourceKind::Buffer, slot).and_then(|slot| {
        let (offset, _) = session.gpu.buffer_range(slot, offset, size)?;
        session.gpu.update_buffer(slot, offset, data)
    });
    status(abi::BUFFER_UPDATE, userdata, result)
}

pub fn gpu_submit(
    session: &mut Session,
    memory: &GuestMemory<'_>,
    userdata: i32,
    commands_ptr: i32,
    count: i32,
) -> Outcome {
    let count = non_negative(abi::GPU_SUBMIT, "count", count)? as usize;
    if let Err(e) = command::check_batch_len(&session.gpu, count) {
        return status(abi::GPU_SUBMIT, userdata, Err(e));
    }
    let bytes = memory.bytes_sized(abi::GPU_SUBMIT, commands_ptr, count * CommandRecord::SIZE)?;
    let records = command::decode_records(bytes);
    let result = command::submit(&mut session.gpu, &records).map(|_| ());
    status(abi::GPU_SUBMIT, userdata, result)
}

pub fn input_update(
    session: &mut Session,
    memory: &mut GuestMemory<'_>,
    _userdata: i32,
    buttons_ptr: i32,
    axes_ptr: i32,
) -> Outcome {
    session.input.update_guest(memory, buttons_ptr, axes_ptr)?;
    Ok(SUCCESS)
}
