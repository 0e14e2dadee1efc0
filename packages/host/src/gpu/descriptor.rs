//! Creation descriptors for GPU resources.
//!
//! The `*Info` records are the raw little-endian layouts the guest writes
//! into its memory. `validate` turns them into the typed `*Desc` values the
//! backend receives.

use bytemuck::{Pod, Zeroable};

use crate::config::HostConfig;
use crate::error::{Error, Result};
use crate::slot::ResourceKind;

/// Raw pipeline descriptor as laid out in guest memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct PipelineInfo {
    pub kind: u32,
    pub primitive: u32,
    pub blend: u32,
    pub depth_test: u32,
}

/// Raw texture descriptor as laid out in guest memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct TextureInfo {
    pub format: u32,
    pub filter: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    Uber,
    Canvas,
    Blit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Triangles,
    Lines,
    Points,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8,
    Index8,
    Depth,
}

impl TextureFormat {
    pub fn bytes_per_pixel(&self) -> u64 {
        match self {
            TextureFormat::Rgba8 | TextureFormat::Depth => 4,
            TextureFormat::Index8 => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFilter {
    Linear,
    Nearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferType {
    Uniforms,
    Storage,
    Vertices,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineDesc {
    pub kind: PipelineKind,
    pub primitive: Primitive,
    pub blend: bool,
    pub depth_test: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub format: TextureFormat,
    pub filter: TextureFilter,
    pub width: u32,
    pub height: u32,
}

impl TextureDesc {
    /// Size of the full texture in bytes.
    pub fn byte_len(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.format.bytes_per_pixel()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub ty: BufferType,
    pub size: u32,
}

/// A framebuffer renders into the colour texture it was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferDesc {
    pub width: u32,
    pub height: u32,
}

fn flag(kind: ResourceKind, name: &str, raw: u32) -> Result<bool> {
    match raw {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(Error::invalid_descriptor(
            kind,
            format!("{} must be 0 or 1, got {}", name, other),
        )),
    }
}

impl PipelineInfo {
    pub fn validate(&self) -> Result<PipelineDesc> {
        let kind = match self.kind {
            0 => PipelineKind::Uber,
            1 => PipelineKind::Canvas,
            2 => PipelineKind::Blit,
            other => {
                return Err(Error::invalid_descriptor(
                    ResourceKind::Pipeline,
                    format!("unknown pipeline kind {}", other),
                ))
            }
        };
        let primitive = match self.primitive {
            0 => Primitive::Triangles,
            1 => Primitive::Lines,
            2 => Primitive::Points,
            other => {
                return Err(Error::invalid_descriptor(
                    ResourceKind::Pipeline,
                    format!("unknown primitive {}", other),
                ))
            }
        };
        Ok(PipelineDesc {
            kind,
            primitive,
            blend: flag(ResourceKind::Pipeline, "blend", self.blend)?,
            depth_test: flag(ResourceKind::Pipeline, "depth_test", self.depth_test)?,
        })
    }
}

impl TextureInfo {
    pub fn validate(&self, config: &HostConfig) -> Result<TextureDesc> {
        let format = match self.format {
            0 => TextureFormat::Rgba8,
            1 => TextureFormat::Index8,
            2 => TextureFormat::Depth,
            other => {
                return Err(Error::invalid_descriptor(
                    ResourceKind::Texture,
                    format!("unknown texture format {}", other),
                ))
            }
        };
        let filter = match self.filter {
            0 => TextureFilter::Linear,
            1 => TextureFilter::Nearest,
            other => {
                return Err(Error::invalid_descriptor(
                    ResourceKind::Texture,
                    format!("unknown texture filter {}", other),
                ))
            }
        };
        let max = config.max_texture_size;
        if self.width == 0 || self.height == 0 || self.width > max || self.height > max {
            return Err(Error::invalid_descriptor(
                ResourceKind::Texture,
                format!(
                    "size {}x{} outside 1..={}",
                    self.width, self.height, max
                ),
            ));
        }
        Ok(TextureDesc {
            format,
            filter,
            width: self.width,
            height: self.height,
        })
    }
}

impl BufferDesc {
    /// Validate the raw `buffer_create` arguments.
    pub fn from_guest(ty: i32, size: i32, config: &HostConfig) -> Result<Self> {
        let ty = match ty {
            0 => BufferType::Uniforms,
            1 => BufferType::Storage,
            2 => BufferType::Vertices,
            other => {
                return Err(Error::invalid_descriptor(
                    ResourceKind::Buffer,
                    format!("unknown buffer type {}", other),
                ))
            }
        };
        match u32::try_from(size) {
            Ok(size) if size > 0 && size <= config.max_buffer_size => Ok(Self { ty, size }),
            _ => Err(Error::invalid_descriptor(
                ResourceKind::Buffer,
                format!("size {} outside 1..={}", size, config.max_buffer_size),
            )),
        }
    }
}
