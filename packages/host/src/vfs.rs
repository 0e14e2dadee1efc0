//! The virtual file system.
//!
//! The guest sees a flat namespace of read-only files. Each name maps to an
//! immutable blob the host supplied at startup; the guest can open a name
//! only if it already knows it. Open files live in a [`SlotTable`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::slot::{Placement, ResourceKind, Slot, SlotTable};

/// File open modes understood by `file_open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

impl OpenMode {
    pub fn from_guest(raw: i32) -> Self {
        if raw == 0 {
            OpenMode::Read
        } else {
            OpenMode::Write
        }
    }
}

/// File metadata reported by `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: usize,
}

/// An open virtual file.
#[derive(Debug, Clone)]
pub struct FileHandle {
    data: Arc<[u8]>,
    cursor: usize,
}

impl FileHandle {
    fn new(data: Arc<[u8]>) -> Self {
        Self { data, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bytes between the cursor and the end of the file.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        self.cursor = (self.cursor + n).min(self.data.len());
    }
}

/// The host-supplied catalogue plus the table of open files.
#[derive(Debug)]
pub struct VirtualFs {
    catalogue: BTreeMap<String, Arc<[u8]>>,
    open: SlotTable<FileHandle>,
}

impl VirtualFs {
    pub fn new(slot_capacity: usize) -> Self {
        Self {
            catalogue: BTreeMap::new(),
            open: SlotTable::new(ResourceKind::File, slot_capacity),
        }
    }

    /// Register `data` under `name`, replacing any earlier blob of that name.
    ///
    /// Files already open keep reading the blob they were opened with.
    pub fn insert(&mut self, name: impl Into<String>, data: impl Into<Arc<[u8]>>) {
        self.catalogue.insert(name.into(), data.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.catalogue.contains_key(name)
    }

    /// Number of open files.
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Open `path` in the lowest free slot.
    pub fn open(&mut self, path: &str) -> Result<Slot> {
        self.open_with(Placement::Lowest, path, OpenMode::Read)
    }

    /// Open `path` at `placement` in `mode`.
    ///
    /// Fails with `NotFound` for names outside the catalogue and with
    /// `Unsupported` for write modes. No slot is touched on failure.
    pub fn open_with(&mut self, placement: Placement, path: &str, mode: OpenMode) -> Result<Slot> {
        if mode == OpenMode::Write {
            return Err(Error::Unsupported {
                operation: "open for writing",
            });
        }
        let data = self
            .catalogue
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                path: path.to_string(),
            })?;
        self.open.insert(placement, FileHandle::new(data))
    }

    pub fn handle(&self, slot: Slot) -> Result<&FileHandle> {
        self.open.get(slot)
    }

    pub fn stat(&self, slot: Slot) -> Result<FileStat> {
        Ok(FileStat {
            size: self.open.get(slot)?.len(),
        })
    }

    /// Move the cursor of `slot` to `offset`.
    ///
    /// Offsets outside `0..=size` are rejected and leave the cursor alone.
    pub fn seek(&mut self, slot: Slot, offset: i64) -> Result<()> {
        let file = self.open.get_mut(slot)?;
        let size = file.len();
        match usize::try_from(offset) {
            Ok(cursor) if cursor <= size => {
                file.cursor = cursor;
                Ok(())
            }
            _ => Err(Error::OutOfRange { offset, size }),
        }
    }

    /// Copy up to `dst.len()` bytes from the cursor into `dst`.
    ///
    /// Returns the number of bytes copied; zero at end of file.
    pub fn read(&mut self, slot: Slot, dst: &mut [u8]) -> Result<usize> {
        let file = self.open.get_mut(slot)?;
        let remaining = file.remaining();
        let n = dst.len().min(remaining.len());
        dst[..n].copy_from_slice(&remaining[..n]);
        file.advance(n);
        Ok(n)
    }

    /// Virtual files are read-only.
    pub fn write(&mut self, slot: Slot, _data: &[u8]) -> Result<usize> {
        self.open.get(slot)?;
        Err(Error::Unsupported {
            operation: "file_write",
        })
    }

    pub fn close(&mut self, slot: Slot) -> Result<()> {
        self.open.release(slot).map(|_| ())
    }

    /// Close every open file.
    pub fn close_all(&mut self) -> usize {
        self.open.drain().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vfs() -> VirtualFs {
        let mut vfs = VirtualFs::new(4);
        vfs.insert("cart.bin", b"0123456789".to_vec());
        vfs
    }

    #[test]
    fn open_known_path() {
        let mut vfs = vfs();
        let slot = vfs.open("cart.bin").unwrap();
        assert_eq!(vfs.stat(slot).unwrap().size, 10);
        assert_eq!(vfs.handle(slot).unwrap().cursor(), 0);
    }

    #[test]
    fn open_unknown_path_allocates_nothing() {
        let mut vfs = vfs();
        for path in ["", "cart", "CART.BIN", "cart.bin/", "/cart.bin", "../cart.bin"] {
            assert!(matches!(vfs.open(path), Err(Error::NotFound { .. })));
        }
        assert_eq!(vfs.open_count(), 0);
    }

    #[test]
    fn open_for_writing_is_unsupported() {
        let mut vfs = vfs();
        let result = vfs.open_with(Placement::Lowest, "cart.bin", OpenMode::Write);
        assert!(matches!(result, Err(Error::Unsupported { .. })));
        assert_eq!(vfs.open_count(), 0);
    }

    #[test]
    fn read_after_seek() {
        let mut vfs = vfs();
        let slot = vfs.open("cart.bin").unwrap();
        for k in 0..=10i64 {
            for n in [0usize, 1, 3, 10, 20] {
                vfs.seek(slot, k).unwrap();
                let mut dst = vec![0u8; n];
                let read = vfs.read(slot, &mut dst).unwrap();
                let expected = n.min(10 - k as usize);
                assert_eq!(read, expected);
                assert_eq!(&dst[..read], &b"0123456789"[k as usize..k as usize + read]);
                assert_eq!(vfs.handle(slot).unwrap().cursor(), k as usize + read);
            }
        }
    }

    #[test]
    fn read_at_eof_is_idempotent() {
        let mut vfs = vfs();
        let slot = vfs.open("cart.bin").unwrap();
        let mut dst = [0u8; 16];
        assert_eq!(vfs.read(slot, &mut dst).unwrap(), 10);
        for _ in 0..3 {
            assert_eq!(vfs.read(slot, &mut dst).unwrap(), 0);
            assert_eq!(vfs.handle(slot).unwrap().cursor(), 10);
        }
    }

    #[test]
    fn seek_outside_file_is_rejected() {
        let mut vfs = vfs();
        let slot = vfs.open("cart.bin").unwrap();
        vfs.seek(slot, 4).unwrap();
        assert_eq!(
            vfs.seek(slot, 11),
            Err(Error::OutOfRange {
                offset: 11,
                size: 10
            })
        );
        assert!(matches!(
            vfs.seek(slot, -1),
            Err(Error::OutOfRange { .. })
        ));
        assert_eq!(vfs.handle(slot).unwrap().cursor(), 4);
        vfs.seek(slot, 10).unwrap();
    }

    #[test]
    fn closed_handle_is_invalid() {
        let mut vfs = vfs();
        let slot = vfs.open("cart.bin").unwrap();
        vfs.close(slot).unwrap();
        assert!(matches!(vfs.stat(slot), Err(Error::InvalidHandle { .. })));
        assert!(matches!(vfs.seek(slot, 0), Err(Error::InvalidHandle { .. })));
        assert!(matches!(
            vfs.read(slot, &mut [0u8; 4]),
            Err(Error::InvalidHandle { .. })
        ));
        assert!(matches!(vfs.close(slot), Err(Error::InvalidHandle { .. })));
    }

    #[test]
    fn write_is_unsupported() {
        let mut vfs = vfs();
        let slot = vfs.open("cart.bin").unwrap();
        assert!(matches!(
            vfs.write(slot, b"x"),
            Err(Error::Unsupported { .. })
        ));
        assert!(matches!(
            vfs.write(Slot::new(3), b"x"),
            Err(Error::InvalidHandle { .. })
        ));
    }

    #[test]
    fn replaced_blob_does_not_affect_open_files() {
        let mut vfs = vfs();
        let slot = vfs.open("cart.bin").unwrap();
        vfs.insert("cart.bin", b"xy".to_vec());
        assert_eq!(vfs.stat(slot).unwrap().size, 10);
        let other = vfs.open("cart.bin").unwrap();
        assert_eq!(vfs.stat(other).unwrap().size, 2);
    }
}
