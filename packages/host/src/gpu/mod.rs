//! GPU resource management.
//!
//! Pipelines, framebuffers, textures and buffers each live in their own
//! [`SlotTable`]. Every slot records the backend object behind it, so the
//! guest can keep naming a resource by a small stable integer while the
//! backend is free to do what it likes with the real object.

pub mod backend;
pub mod descriptor;

use tracing::debug;

use crate::config::HostConfig;
use crate::error::{BackendError, Error, Result};
use crate::slot::{Placement, ResourceKind, Slot, SlotTable};

pub use backend::{BackendId, GpuBackend, HeadlessBackend, HeadlessObject, TextureRegion};
pub use descriptor::{
    BufferDesc, BufferType, FramebufferDesc, PipelineDesc, PipelineInfo, PipelineKind, Primitive,
    TextureDesc, TextureFilter, TextureFormat, TextureInfo,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pipeline {
    pub backend: BackendId,
    pub desc: PipelineDesc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Texture {
    pub backend: BackendId,
    pub desc: TextureDesc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Buffer {
    pub backend: BackendId,
    pub desc: BufferDesc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framebuffer {
    pub backend: BackendId,
    /// Texture slot of the colour attachment.
    pub color: Slot,
    pub desc: FramebufferDesc,
}

/// The GPU resources of one session and the backend they live on.
pub struct GpuResources {
    config: HostConfig,
    backend: Box<dyn GpuBackend>,
    pipelines: SlotTable<Pipeline>,
    framebuffers: SlotTable<Framebuffer>,
    textures: SlotTable<Texture>,
    buffers: SlotTable<Buffer>,
}

impl GpuResources {
    pub fn new(config: &HostConfig, backend: Box<dyn GpuBackend>) -> Self {
        let capacity = config.slot_capacity;
        Self {
            config: config.clone(),
            backend,
            pipelines: SlotTable::new(ResourceKind::Pipeline, capacity),
            framebuffers: SlotTable::new(ResourceKind::Framebuffer, capacity),
            textures: SlotTable::new(ResourceKind::Texture, capacity),
            buffers: SlotTable::new(ResourceKind::Buffer, capacity),
        }
    }

    pub fn pipeline(&self, slot: Slot) -> Result<&Pipeline> {
        self.pipelines.get(slot)
    }

    pub fn framebuffer(&self, slot: Slot) -> Result<&Framebuffer> {
        self.framebuffers.get(slot)
    }

    pub fn texture(&self, slot: Slot) -> Result<&Texture> {
        self.textures.get(slot)
    }

    pub fn buffer(&self, slot: Slot) -> Result<&Buffer> {
        self.buffers.get(slot)
    }

    /// Number of live resources of `kind`.
    pub fn live(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::Pipeline => self.pipelines.len(),
            ResourceKind::Framebuffer => self.framebuffers.len(),
            ResourceKind::Texture => self.textures.len(),
            ResourceKind::Buffer => self.buffers.len(),
            ResourceKind::File => 0,
        }
    }

    pub fn create_pipeline(&mut self, placement: Placement, info: &PipelineInfo) -> Result<Slot> {
        let desc = info.validate()?;
        let slot = self.pipelines.reserve(placement)?;
        let backend = self.backend.create_pipeline(&desc)?;
        debug!(%slot, %backend, ?desc, "pipeline created");
        self.pipelines
            .insert(Placement::At(slot), Pipeline { backend, desc })
    }

    pub fn delete_pipeline(&mut self, slot: Slot) -> Result<()> {
        let pipeline = self.pipelines.release(slot)?;
        self.backend
            .release(ResourceKind::Pipeline, pipeline.backend)?;
        Ok(())
    }

    pub fn create_texture(&mut self, placement: Placement, info: &TextureInfo) -> Result<Slot> {
        let desc = info.validate(&self.config)?;
        let slot = self.textures.reserve(placement)?;
        let backend = self.backend.create_texture(&desc)?;
        debug!(%slot, %backend, ?desc, "texture created");
        self.textures
            .insert(Placement::At(slot), Texture { backend, desc })
    }

    /// Check a guest-supplied update rectangle against texture `slot`.
    ///
    /// Returns the region and the number of source bytes it needs.
    pub fn texture_region(
        &self,
        slot: Slot,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> Result<(TextureRegion, usize)> {
        let texture = self.textures.get(slot)?;
        let region = match (
            u32::try_from(x),
            u32::try_from(y),
            u32::try_from(width),
            u32::try_from(height),
        ) {
            (Ok(x), Ok(y), Ok(width), Ok(height)) => TextureRegion {
                x,
                y,
                width,
                height,
            },
            _ => {
                return Err(Error::out_of_bounds(
                    ResourceKind::Texture,
                    format!("negative region ({}, {}, {}, {})", x, y, width, height),
                ))
            }
        };
        let len = region_len(&texture.desc, &region)?;
        Ok((region, len))
    }

    pub fn update_texture(&mut self, slot: Slot, region: TextureRegion, data: &[u8]) -> Result<()> {
        let texture = *self.textures.get(slot)?;
        let len = region_len(&texture.desc, &region)?;
        if data.len() != len {
            return Err(Error::out_of_bounds(
                ResourceKind::Texture,
                format!("expected {} bytes of pixel data, got {}", len, data.len()),
            ));
        }
        if len == 0 {
            return Ok(());
        }
        self.backend
            .update_texture(texture.backend, &region, data)?;
        Ok(())
    }

    /// Delete texture `slot`.
    ///
    /// Framebuffers drawing into it stay allocated but can no longer be
    /// bound; commands naming them are rejected.
    pub fn delete_texture(&mut self, slot: Slot) -> Result<()> {
        let texture = self.textures.release(slot)?;
        self.backend.release(ResourceKind::Texture, texture.backend)?;
        Ok(())
    }

    pub fn create_buffer(&mut self, placement: Placement, desc: BufferDesc) -> Result<Slot> {
        if desc.size == 0 || desc.size > self.config.max_buffer_size {
            return Err(Error::invalid_descriptor(
                ResourceKind::Buffer,
                format!("size {} outside 1..={}", desc.size, self.config.max_buffer_size),
            ));
        }
        let slot = self.buffers.reserve(placement)?;
        let backend = self.backend.create_buffer(&desc)?;
        debug!(%slot, %backend, ?desc, "buffer created");
        self.buffers.insert(Placement::At(slot), Buffer { backend, desc })
    }

    /// Check a guest-supplied `[offset, offset + size)` against buffer `slot`.
    pub fn buffer_range(&self, slot: Slot, offset: i32, size: i32) -> Result<(u32, usize)> {
        let buffer = self.buffers.get(slot)?;
        match (u32::try_from(offset), u32::try_from(size)) {
            (Ok(offset), Ok(size)) => {
                check_buffer_range(&buffer.desc, offset, size as u64)?;
                Ok((offset, size as usize))
            }
            _ => Err(Error::out_of_bounds(
                ResourceKind::Buffer,
                format!("negative range {}+{}", offset, size),
            )),
        }
    }

    pub fn update_buffer(&mut self, slot: Slot, offset: u32, data: &[u8]) -> Result<()> {
        let buffer = *self.buffers.get(slot)?;
        check_buffer_range(&buffer.desc, offset, data.len() as u64)?;
        if data.is_empty() {
            return Ok(());
        }
        self.backend.update_buffer(buffer.backend, offset, data)?;
        Ok(())
    }

    pub fn delete_buffer(&mut self, slot: Slot) -> Result<()> {
        let buffer = self.buffers.release(slot)?;
        self.backend.release(ResourceKind::Buffer, buffer.backend)?;
        Ok(())
    }

    /// Create a framebuffer drawing into the `rgba8` texture at `color`.
    pub fn create_framebuffer(&mut self, placement: Placement, color: Slot) -> Result<Slot> {
        let texture = *self.textures.get(color)?;
        if texture.desc.format != TextureFormat::Rgba8 {
            return Err(Error::invalid_descriptor(
                ResourceKind::Framebuffer,
                format!(
                    "colour texture {} has format {:?}, expected Rgba8",
                    color, texture.desc.format
                ),
            ));
        }
        let desc = FramebufferDesc {
            width: texture.desc.width,
            height: texture.desc.height,
        };
        let slot = self.framebuffers.reserve(placement)?;
        let backend = self.backend.create_framebuffer(texture.backend, &desc)?;
        debug!(%slot, %backend, %color, "framebuffer created");
        self.framebuffers.insert(
            Placement::At(slot),
            Framebuffer {
                backend,
                color,
                desc,
            },
        )
    }

    pub fn delete_framebuffer(&mut self, slot: Slot) -> Result<()> {
        let framebuffer = self.framebuffers.release(slot)?;
        self.backend
            .release(ResourceKind::Framebuffer, framebuffer.backend)?;
        Ok(())
    }

    pub(crate) fn backend_mut(&mut self) -> &mut dyn GpuBackend {
        self.backend.as_mut()
    }

    pub(crate) fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn clear_screen(&mut self, color: [f32; 4]) -> std::result::Result<(), BackendError> {
        self.backend.clear_screen(color)
    }

    /// Release every live resource, framebuffers first.
    ///
    /// All slots are cleared even if the backend fails; the first backend
    /// error is returned.
    pub fn release_all(&mut self) -> std::result::Result<usize, BackendError> {
        let mut live = Vec::new();
        live.extend(
            self.framebuffers
                .drain()
                .map(|(_, r)| (ResourceKind::Framebuffer, r.backend)),
        );
        live.extend(
            self.textures
                .drain()
                .map(|(_, r)| (ResourceKind::Texture, r.backend)),
        );
        live.extend(
            self.buffers
                .drain()
                .map(|(_, r)| (ResourceKind::Buffer, r.backend)),
        );
        live.extend(
            self.pipelines
                .drain()
                .map(|(_, r)| (ResourceKind::Pipeline, r.backend)),
        );

        let released = live.len();
        let mut first_error = None;
        for (kind, id) in live {
            if let Err(e) = self.backend.release(kind, id) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(released),
        }
    }
}

/// Bytes of source data `region` needs, if it lies inside the texture.
fn region_len(desc: &TextureDesc, region: &TextureRegion) -> Result<usize> {
    let fits = |start: u32, len: u32, extent: u32| start as u64 + len as u64 <= extent as u64;
    if !fits(region.x, region.width, desc.width) || !fits(region.y, region.height, desc.height) {
        return Err(Error::out_of_bounds(
            ResourceKind::Texture,
            format!(
                "region ({}, {}, {}, {}) outside {}x{}",
                region.x, region.y, region.width, region.height, desc.width, desc.height
            ),
        ));
    }
    let len = region.width as u64 * region.height as u64 * desc.format.bytes_per_pixel();
    Ok(len as usize)
}

fn check_buffer_range(desc: &BufferDesc, offset: u32, len: u64) -> Result<()> {
    if offset as u64 + len <= desc.size as u64 {
        Ok(())
    } else {
        Err(Error::out_of_bounds(
            ResourceKind::Buffer,
            format!(
                "range {}+{} outside buffer of {} bytes",
                offset, len, desc.size
            ),
        ))
    }
}

impl std::fmt::Debug for GpuResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuResources")
            .field("pipelines", &self.pipelines.len())
            .field("framebuffers", &self.framebuffers.len())
            .field("textures", &self.textures.len())
            .field("buffers", &self.buffers.len())
            .finish()
    }
}
