//! The GPU backend seam.
//!
//! The host never rasterizes anything itself. It validates what the guest
//! asks for and hands typed requests to a [`GpuBackend`]. The real backend
//! lives outside this crate; [`HeadlessBackend`] keeps object state in
//! memory so the protocol can run without a graphics device.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::command::Command;
use crate::error::BackendError;
use crate::gpu::descriptor::{BufferDesc, FramebufferDesc, PipelineDesc, TextureDesc};
use crate::slot::ResourceKind;

/// Identifier of a backend-owned object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendId(pub u64);

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A texture sub-rectangle, already checked against the texture extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Operations the host forwards to the real GPU.
///
/// Calls are synchronous: when a method returns, the backend has finished
/// with any borrowed data. An error is fatal for the session.
pub trait GpuBackend {
    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<BackendId, BackendError>;

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<BackendId, BackendError>;

    /// Upload `data`, row-major and tightly packed, into `region`.
    fn update_texture(
        &mut self,
        texture: BackendId,
        region: &TextureRegion,
        data: &[u8],
    ) -> Result<(), BackendError>;

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BackendId, BackendError>;

    fn update_buffer(
        &mut self,
        buffer: BackendId,
        offset: u32,
        data: &[u8],
    ) -> Result<(), BackendError>;

    fn create_framebuffer(
        &mut self,
        color: BackendId,
        desc: &FramebufferDesc,
    ) -> Result<BackendId, BackendError>;

    /// Release an object created by one of the `create_*` methods.
    fn release(&mut self, kind: ResourceKind, id: BackendId) -> Result<(), BackendError>;

    /// Execute one validated command batch, in order.
    fn submit(&mut self, commands: &[Command]) -> Result<(), BackendError>;

    /// Clear the default framebuffer.
    fn clear_screen(&mut self, color: [f32; 4]) -> Result<(), BackendError>;
}

/// An object held by the headless backend.
#[derive(Debug, Clone, PartialEq)]
pub enum HeadlessObject {
    Pipeline(PipelineDesc),
    Texture { desc: TextureDesc, pixels: Vec<u8> },
    Buffer { desc: BufferDesc, bytes: Vec<u8> },
    Framebuffer { color: BackendId, desc: FramebufferDesc },
}

impl HeadlessObject {
    pub fn kind(&self) -> ResourceKind {
        match self {
            HeadlessObject::Pipeline(_) => ResourceKind::Pipeline,
            HeadlessObject::Texture { .. } => ResourceKind::Texture,
            HeadlessObject::Buffer { .. } => ResourceKind::Buffer,
            HeadlessObject::Framebuffer { .. } => ResourceKind::Framebuffer,
        }
    }
}

/// Everything the headless backend has seen.
#[derive(Debug, Default)]
pub struct HeadlessState {
    next_id: u64,
    pub objects: BTreeMap<BackendId, HeadlessObject>,
    pub batches: Vec<Vec<Command>>,
    pub screen_clears: Vec<[f32; 4]>,
    pub released: Vec<BackendId>,
}

impl HeadlessState {
    fn insert(&mut self, object: HeadlessObject) -> BackendId {
        self.next_id += 1;
        let id = BackendId(self.next_id);
        self.objects.insert(id, object);
        id
    }

    /// Total commands executed across all batches.
    pub fn command_count(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }
}

/// An in-memory backend.
///
/// Clones share state, so a caller can keep one clone for inspection while
/// the session owns another.
#[derive(Debug, Clone, Default)]
pub struct HeadlessBackend {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the backend state.
    pub fn inspect<T>(&self, f: impl FnOnce(&HeadlessState) -> T) -> T {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut HeadlessState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

fn missing(operation: &'static str, id: BackendId) -> BackendError {
    BackendError::new(operation, format!("no live object {}", id))
}

impl GpuBackend for HeadlessBackend {
    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<BackendId, BackendError> {
        Ok(self.with_state(|s| s.insert(HeadlessObject::Pipeline(*desc))))
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<BackendId, BackendError> {
        let pixels = vec![0; desc.byte_len() as usize];
        Ok(self.with_state(|s| s.insert(HeadlessObject::Texture { desc: *desc, pixels })))
    }

    fn update_texture(
        &mut self,
        texture: BackendId,
        region: &TextureRegion,
        data: &[u8],
    ) -> Result<(), BackendError> {
        self.with_state(|s| match s.objects.get_mut(&texture) {
            Some(HeadlessObject::Texture { desc, pixels }) => {
                let bpp = desc.format.bytes_per_pixel() as usize;
                let row_len = region.width as usize * bpp;
                let stride = desc.width as usize * bpp;
                for (row, src) in data.chunks_exact(row_len.max(1)).enumerate() {
                    let y = region.y as usize + row;
                    if y >= (region.y + region.height) as usize {
                        break;
                    }
                    let start = y * stride + region.x as usize * bpp;
                    pixels[start..start + row_len].copy_from_slice(src);
                }
                Ok(())
            }
            _ => Err(missing("update_texture", texture)),
        })
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BackendId, BackendError> {
        let bytes = vec![0; desc.size as usize];
        Ok(self.with_state(|s| s.insert(HeadlessObject::Buffer { desc: *desc, bytes })))
    }

    fn update_buffer(
        &mut self,
        buffer: BackendId,
        offset: u32,
        data: &[u8],
    ) -> Result<(), BackendError> {
        self.with_state(|s| match s.objects.get_mut(&buffer) {
            Some(HeadlessObject::Buffer { bytes, .. }) => {
                let start = offset as usize;
                bytes[start..start + data.len()].copy_from_slice(data);
                Ok(())
            }
            _ => Err(missing("update_buffer", buffer)),
        })
    }

    fn create_framebuffer(
        &mut self,
        color: BackendId,
        desc: &FramebufferDesc,
    ) -> Result<BackendId, BackendError> {
        self.with_state(|s| match s.objects.get(&color) {
            Some(HeadlessObject::Texture { .. }) => Ok(s.insert(HeadlessObject::Framebuffer {
                color,
                desc: *desc,
            })),
            _ => Err(missing("create_framebuffer", color)),
        })
    }

    fn release(&mut self, kind: ResourceKind, id: BackendId) -> Result<(), BackendError> {
        self.with_state(|s| match s.objects.get(&id) {
            Some(object) if object.kind() == kind => {
                s.objects.remove(&id);
                s.released.push(id);
                Ok(())
            }
            _ => Err(missing("release", id)),
        })
    }

    fn submit(&mut self, commands: &[Command]) -> Result<(), BackendError> {
        self.with_state(|s| {
            if let Some(id) = commands
                .iter()
                .flat_map(Command::referenced)
                .find(|id| !s.objects.contains_key(id))
            {
                return Err(missing("submit", id));
            }
            s.batches.push(commands.to_vec());
            Ok(())
        })
    }

    fn clear_screen(&mut self, color: [f32; 4]) -> Result<(), BackendError> {
        self.with_state(|s| s.screen_clears.push(color));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::descriptor::{BufferType, TextureFilter, TextureFormat};

    fn texture_desc(width: u32, height: u32) -> TextureDesc {
        TextureDesc {
            format: TextureFormat::Index8,
            filter: TextureFilter::Nearest,
            width,
            height,
        }
    }

    #[test]
    fn texture_update_writes_region_rows() {
        let mut backend = HeadlessBackend::new();
        let id = backend.create_texture(&texture_desc(4, 3)).unwrap();
        let region = TextureRegion {
            x: 1,
            y: 1,
            width: 2,
            height: 2,
        };
        backend.update_texture(id, &region, &[1, 2, 3, 4]).unwrap();

        backend.inspect(|s| match &s.objects[&id] {
            HeadlessObject::Texture { pixels, .. } => {
                assert_eq!(pixels, &vec![0, 0, 0, 0, 0, 1, 2, 0, 0, 3, 4, 0]);
            }
            other => panic!("unexpected object {:?}", other),
        });
    }

    #[test]
    fn buffer_update_writes_at_offset() {
        let mut backend = HeadlessBackend::new();
        let id = backend
            .create_buffer(&BufferDesc {
                ty: BufferType::Storage,
                size: 8,
            })
            .unwrap();
        backend.update_buffer(id, 6, &[9, 9]).unwrap();
        backend.inspect(|s| match &s.objects[&id] {
            HeadlessObject::Buffer { bytes, .. } => assert_eq!(bytes, &vec![0, 0, 0, 0, 0, 0, 9, 9]),
            other => panic!("unexpected object {:?}", other),
        });
    }

    #[test]
    fn release_checks_kind() {
        let mut backend = HeadlessBackend::new();
        let id = backend.create_texture(&texture_desc(1, 1)).unwrap();
        assert!(backend.release(ResourceKind::Buffer, id).is_err());
        backend.release(ResourceKind::Texture, id).unwrap();
        assert!(backend.release(ResourceKind::Texture, id).is_err());
        backend.inspect(|s| assert_eq!(s.released, vec![id]));
    }

    #[test]
    fn clones_share_state() {
        let backend = HeadlessBackend::new();
        let mut owned = backend.clone();
        owned.clear_screen([0.2, 0.0, 0.0, 1.0]).unwrap();
        backend.inspect(|s| assert_eq!(s.screen_clears.len(), 1));
    }
}
