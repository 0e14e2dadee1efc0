//! Names, status codes and memory layouts shared with the guest.

use bytemuck::{Pod, Zeroable};

use crate::error::Error;
use crate::vfs::FileStat;

/// Module every host import lives in.
pub const IMPORT_MODULE: &str = "env";

/// Name of the guest's linear memory, exported or imported.
pub const MEMORY: &str = "memory";

pub const RUNTIME_LOG: &str = "runtime_log";
pub const FILE_OPEN: &str = "nux_os_file_open";
pub const FILE_CLOSE: &str = "nux_os_file_close";
pub const FILE_STAT: &str = "nux_os_file_stat";
pub const FILE_SEEK: &str = "nux_os_file_seek";
pub const FILE_READ: &str = "nux_os_file_read";
pub const FILE_WRITE: &str = "nux_os_file_write";
pub const PIPELINE_CREATE: &str = "nux_os_pipeline_create";
pub const PIPELINE_DELETE: &str = "nux_os_pipeline_delete";
pub const FRAMEBUFFER_CREATE: &str = "nux_os_framebuffer_create";
pub const FRAMEBUFFER_DELETE: &str = "nux_os_framebuffer_delete";
pub const TEXTURE_CREATE: &str = "nux_os_texture_create";
pub const TEXTURE_DELETE: &str = "nux_os_texture_delete";
pub const TEXTURE_UPDATE: &str = "nux_os_texture_update";
pub const BUFFER_CREATE: &str = "nux_os_buffer_create";
pub const BUFFER_DELETE: &str = "nux_os_buffer_delete";
pub const BUFFER_UPDATE: &str = "nux_os_buffer_update";
pub const GPU_SUBMIT: &str = "nux_os_gpu_submit";
pub const INPUT_UPDATE: &str = "nux_os_input_update";

/// Every import the host provides.
pub const IMPORTS: [&str; 19] = [
    RUNTIME_LOG,
    FILE_OPEN,
    FILE_CLOSE,
    FILE_STAT,
    FILE_SEEK,
    FILE_READ,
    FILE_WRITE,
    PIPELINE_CREATE,
    PIPELINE_DELETE,
    FRAMEBUFFER_CREATE,
    FRAMEBUFFER_DELETE,
    TEXTURE_CREATE,
    TEXTURE_DELETE,
    TEXTURE_UPDATE,
    BUFFER_CREATE,
    BUFFER_DELETE,
    BUFFER_UPDATE,
    GPU_SUBMIT,
    INPUT_UPDATE,
];

pub const SUCCESS: i32 = 1;
pub const FAILURE: i32 = 0;

/// `file_read` result for a recoverable error.
pub const READ_ERROR: i32 = -1;

/// The record `file_stat` writes: four little-endian `i32`s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct StatRecord {
    pub size: i32,
    pub reserved: [i32; 3],
}

impl StatRecord {
    pub const SIZE: usize = std::mem::size_of::<StatRecord>();
}

impl TryFrom<FileStat> for StatRecord {
    type Error = Error;

    fn try_from(stat: FileStat) -> Result<Self, Self::Error> {
        let size = i32::try_from(stat.size).map_err(|_| Error::FileTooLarge { size: stat.size })?;
        Ok(StatRecord {
            size,
            reserved: [0; 3],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_names_are_unique() {
        let mut names = IMPORTS.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), IMPORTS.len());
    }

    #[test]
    fn stat_record_is_16_bytes() {
        assert_eq!(StatRecord::SIZE, 16);
    }

    #[test]
    fn stat_sizes_past_i32_are_rejected() {
        let largest = FileStat {
            size: i32::MAX as usize,
        };
        assert_eq!(StatRecord::try_from(largest).unwrap().size, i32::MAX);

        let too_large = FileStat {
            size: i32::MAX as usize + 1,
        };
        assert_eq!(
            StatRecord::try_from(too_large),
            Err(Error::FileTooLarge {
                size: i32::MAX as usize + 1
            })
        );
    }
}
