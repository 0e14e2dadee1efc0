//! Bounds-checked access to guest linear memory.
//!
//! Every import call that touches guest memory goes through [`GuestMemory`].
//! The guest passes pointers and lengths as `i32`; they are checked here,
//! once, against the current memory size. Any violation is a [`Fault`].

use std::ops::Range;

use bytemuck::Pod;

use crate::error::Fault;

// Records cross the boundary in host byte order; wasm memory is little-endian.
#[cfg(target_endian = "big")]
compile_error!("nux-host supports little-endian hosts only");

/// A view of the guest's linear memory for the duration of one import call.
pub struct GuestMemory<'a> {
    bytes: &'a mut [u8],
}

impl<'a> GuestMemory<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    /// Size of linear memory in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Validate `[ptr, ptr + len)` and return it as a host range.
    pub fn range(&self, call: &'static str, ptr: i32, len: i32) -> Result<Range<usize>, Fault> {
        let offset = non_negative(call, "pointer", ptr)?;
        let len = non_negative(call, "length", len)?;
        self.checked_range(offset, len)
    }

    fn checked_range(&self, offset: u64, len: u64) -> Result<Range<usize>, Fault> {
        let memory_size = self.bytes.len();
        match offset.checked_add(len) {
            Some(end) if end <= memory_size as u64 => Ok(offset as usize..end as usize),
            _ => Err(Fault::MemoryOutOfBounds {
                offset,
                len,
                memory_size,
            }),
        }
    }

    pub fn bytes(&self, call: &'static str, ptr: i32, len: i32) -> Result<&[u8], Fault> {
        let range = self.range(call, ptr, len)?;
        Ok(&self.bytes[range])
    }

    /// Like [`bytes`](Self::bytes), for a length the host computed itself.
    pub fn bytes_sized(&self, call: &'static str, ptr: i32, len: usize) -> Result<&[u8], Fault> {
        let offset = non_negative(call, "pointer", ptr)?;
        let range = self.checked_range(offset, len as u64)?;
        Ok(&self.bytes[range])
    }

    pub fn bytes_mut(&mut self, call: &'static str, ptr: i32, len: i32) -> Result<&mut [u8], Fault> {
        let range = self.range(call, ptr, len)?;
        Ok(&mut self.bytes[range])
    }

    /// Copy `data` into guest memory at `ptr`.
    pub fn write_bytes(&mut self, call: &'static str, ptr: i32, data: &[u8]) -> Result<(), Fault> {
        let offset = non_negative(call, "pointer", ptr)?;
        let range = self.checked_range(offset, data.len() as u64)?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    /// Read a plain-old-data record at `ptr`. No alignment is required.
    pub fn read_pod<T: Pod>(&self, call: &'static str, ptr: i32) -> Result<T, Fault> {
        let offset = non_negative(call, "pointer", ptr)?;
        let range = self.checked_range(offset, std::mem::size_of::<T>() as u64)?;
        Ok(bytemuck::pod_read_unaligned(&self.bytes[range]))
    }

    /// Write a plain-old-data record at `ptr`.
    pub fn write_pod<T: Pod>(&mut self, call: &'static str, ptr: i32, value: &T) -> Result<(), Fault> {
        self.write_bytes(call, ptr, bytemuck::bytes_of(value))
    }
}

pub(crate) fn non_negative(call: &'static str, argument: &'static str, value: i32) -> Result<u64, Fault> {
    u64::try_from(value).map_err(|_| Fault::NegativeArgument {
        call,
        argument,
        value,
    })
}
