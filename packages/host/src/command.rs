//! The command submission channel.
//!
//! The guest writes a run of fixed-size [`CommandRecord`]s into its memory
//! and hands the host a pointer and a count. The whole batch is decoded and
//! every slot it names is resolved to a backend object before anything is
//! forwarded, so a batch either runs in full or not at all.

use bytemuck::{Pod, Zeroable};

use crate::error::{Error, Result};
use crate::gpu::{BackendId, GpuResources};
use crate::slot::Slot;

/// Number of buffer and texture binding points.
pub const MAX_BINDINGS: u32 = 8;

/// Framebuffer slot value that selects the screen.
pub const DEFAULT_FRAMEBUFFER: u32 = u32::MAX;

/// Command opcodes.
pub mod opcode {
    pub const BIND_FRAMEBUFFER: u32 = 0;
    pub const BIND_PIPELINE: u32 = 1;
    pub const BIND_BUFFER: u32 = 2;
    pub const BIND_TEXTURE: u32 = 3;
    pub const PUSH_CONSTANT: u32 = 4;
    pub const CLEAR: u32 = 5;
    pub const VIEWPORT: u32 = 6;
    pub const DRAW: u32 = 7;
}

/// One command as laid out in guest memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct CommandRecord {
    pub opcode: u32,
    pub args: [u32; 7],
}

impl CommandRecord {
    pub const SIZE: usize = std::mem::size_of::<CommandRecord>();

    /// A record with the leading `args` filled in and the rest zero.
    ///
    /// # Panics
    ///
    /// If `args` holds more than seven values.
    pub fn new(opcode: u32, args: &[u32]) -> Self {
        assert!(
            args.len() <= 7,
            "command records carry at most 7 args, got {}",
            args.len()
        );
        let mut record = Self {
            opcode,
            ..Self::default()
        };
        record.args[..args.len()].copy_from_slice(args);
        record
    }
}

/// A validated command with every slot resolved to its backend object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `None` binds the screen.
    BindFramebuffer(Option<BackendId>),
    BindPipeline(BackendId),
    BindBuffer { binding: u32, buffer: BackendId },
    BindTexture { binding: u32, texture: BackendId },
    PushConstant { index: u32, value: u32 },
    Clear { rgba: u32 },
    Viewport { x: u32, y: u32, width: u32, height: u32 },
    Draw { first: u32, count: u32 },
}

impl Command {
    /// The backend object this command refers to, if any.
    pub fn referenced(&self) -> Option<BackendId> {
        match *self {
            Command::BindFramebuffer(id) => id,
            Command::BindPipeline(id) => Some(id),
            Command::BindBuffer { buffer, .. } => Some(buffer),
            Command::BindTexture { texture, .. } => Some(texture),
            _ => None,
        }
    }

    /// Decode and resolve one record against the live resources.
    pub fn resolve(index: usize, record: &CommandRecord, gpu: &GpuResources) -> Result<Self> {
        let args = record.args;
        let binding = |raw: u32| {
            if raw < MAX_BINDINGS {
                Ok(raw)
            } else {
                Err(Error::InvalidCommand {
                    index,
                    reason: format!("binding {} outside 0..{}", raw, MAX_BINDINGS),
                })
            }
        };

        let command = match record.opcode {
            opcode::BIND_FRAMEBUFFER if args[0] == DEFAULT_FRAMEBUFFER => {
                Command::BindFramebuffer(None)
            }
            opcode::BIND_FRAMEBUFFER => {
                let framebuffer = gpu.framebuffer(Slot::new(args[0]))?;
                // The colour texture may have been deleted since.
                gpu.texture(framebuffer.color).map_err(|_| Error::InvalidCommand {
                    index,
                    reason: format!(
                        "framebuffer {} draws into deleted texture {}",
                        args[0], framebuffer.color
                    ),
                })?;
                Command::BindFramebuffer(Some(framebuffer.backend))
            }
            opcode::BIND_PIPELINE => {
                Command::BindPipeline(gpu.pipeline(Slot::new(args[0]))?.backend)
            }
            opcode::BIND_BUFFER => Command::BindBuffer {
                binding: binding(args[0])?,
                buffer: gpu.buffer(Slot::new(args[1]))?.backend,
            },
            opcode::BIND_TEXTURE => Command::BindTexture {
                binding: binding(args[0])?,
                texture: gpu.texture(Slot::new(args[1]))?.backend,
            },
            opcode::PUSH_CONSTANT => Command::PushConstant {
                index: args[0],
                value: args[1],
            },
            opcode::CLEAR => Command::Clear { rgba: args[0] },
            opcode::VIEWPORT => Command::Viewport {
                x: args[0],
                y: args[1],
                width: args[2],
                height: args[3],
            },
            opcode::DRAW => Command::Draw {
                first: args[0],
                count: args[1],
            },
            other => {
                return Err(Error::InvalidCommand {
                    index,
                    reason: format!("unknown opcode {}", other),
                })
            }
        };
        Ok(command)
    }
}

/// Validate `records` and forward them, in order, to the backend.
///
/// Returns the number of commands executed. On any error nothing reaches
/// the backend.
pub fn submit(gpu: &mut GpuResources, records: &[CommandRecord]) -> Result<usize> {
    check_batch_len(gpu, records.len())?;
    if records.is_empty() {
        return Ok(0);
    }

    let resources: &GpuResources = gpu;
    let commands = records
        .iter()
        .enumerate()
        .map(|(index, record)| Command::resolve(index, record, resources))
        .collect::<Result<Vec<_>>>()?;

    gpu.backend_mut().submit(&commands)?;
    Ok(commands.len())
}

/// Reject batches longer than `max_commands_per_submit`.
pub fn check_batch_len(gpu: &GpuResources, len: usize) -> Result<()> {
    let limit = gpu.config().max_commands_per_submit;
    if len > limit {
        return Err(Error::InvalidCommand {
            index: limit,
            reason: format!("batch of {} exceeds limit of {}", len, limit),
        });
    }
    Ok(())
}

/// Split raw guest bytes into command records.
pub fn decode_records(bytes: &[u8]) -> Vec<CommandRecord> {
    bytes
        .chunks_exact(CommandRecord::SIZE)
        .map(bytemuck::pod_read_unaligned::<CommandRecord>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use crate::gpu::{HeadlessBackend, PipelineInfo, TextureInfo};
    use crate::slot::{Placement, ResourceKind};

    const RGBA: TextureInfo = TextureInfo {
        format: 0,
        filter: 0,
        width: 4,
        height: 4,
    };

    fn setup() -> (GpuResources, HeadlessBackend) {
        let backend = HeadlessBackend::new();
        let gpu = GpuResources::new(&HostConfig::default(), Box::new(backend.clone()));
        (gpu, backend)
    }

    #[test]
    fn record_layout_is_32_bytes() {
        assert_eq!(CommandRecord::SIZE, 32);
    }

    #[test]
    fn record_args_are_zero_padded() {
        let record = CommandRecord::new(opcode::VIEWPORT, &[1, 2, 3, 4]);
        assert_eq!(record.args, [1, 2, 3, 4, 0, 0, 0]);
    }

    #[test]
    #[should_panic(expected = "at most 7 args")]
    fn record_with_too_many_args_panics() {
        CommandRecord::new(opcode::DRAW, &[0; 8]);
    }

    #[test]
    fn batch_is_forwarded_in_order() {
        let (mut gpu, backend) = setup();
        let pipeline = gpu
            .create_pipeline(Placement::Lowest, &PipelineInfo::default())
            .unwrap();
        let texture = gpu.create_texture(Placement::Lowest, &RGBA).unwrap();
        let pipeline_id = gpu.pipeline(pipeline).unwrap().backend;
        let texture_id = gpu.texture(texture).unwrap().backend;

        let records = [
            CommandRecord::new(opcode::BIND_FRAMEBUFFER, &[DEFAULT_FRAMEBUFFER]),
            CommandRecord::new(opcode::CLEAR, &[0xff00_00ff]),
            CommandRecord::new(opcode::BIND_PIPELINE, &[pipeline.as_u32()]),
            CommandRecord::new(opcode::BIND_TEXTURE, &[1, texture.as_u32()]),
            CommandRecord::new(opcode::DRAW, &[0, 6]),
        ];
        assert_eq!(submit(&mut gpu, &records).unwrap(), 5);

        backend.inspect(|s| {
            assert_eq!(
                s.batches,
                vec![vec![
                    Command::BindFramebuffer(None),
                    Command::Clear { rgba: 0xff00_00ff },
                    Command::BindPipeline(pipeline_id),
                    Command::BindTexture {
                        binding: 1,
                        texture: texture_id
                    },
                    Command::Draw { first: 0, count: 6 },
                ]]
            );
        });
    }

    #[test]
    fn invalid_handle_rejects_whole_batch() {
        let (mut gpu, backend) = setup();
        let pipeline = gpu
            .create_pipeline(Placement::Lowest, &PipelineInfo::default())
            .unwrap();
        let texture = gpu.create_texture(Placement::Lowest, &RGBA).unwrap();
        gpu.delete_texture(texture).unwrap();

        let records = [
            CommandRecord::new(opcode::BIND_PIPELINE, &[pipeline.as_u32()]),
            CommandRecord::new(opcode::BIND_TEXTURE, &[0, texture.as_u32()]),
            CommandRecord::new(opcode::DRAW, &[0, 3]),
        ];
        assert!(matches!(
            submit(&mut gpu, &records),
            Err(Error::InvalidHandle {
                kind: ResourceKind::Texture,
                ..
            })
        ));
        backend.inspect(|s| assert!(s.batches.is_empty()));
    }

    #[test]
    fn framebuffer_with_deleted_texture_is_rejected() {
        let (mut gpu, backend) = setup();
        let color = gpu.create_texture(Placement::Lowest, &RGBA).unwrap();
        let fb = gpu.create_framebuffer(Placement::Lowest, color).unwrap();
        gpu.delete_texture(color).unwrap();

        let records = [CommandRecord::new(opcode::BIND_FRAMEBUFFER, &[fb.as_u32()])];
        assert!(matches!(
            submit(&mut gpu, &records),
            Err(Error::InvalidCommand { index: 0, .. })
        ));
        backend.inspect(|s| assert!(s.batches.is_empty()));
    }

    #[test]
    fn unknown_opcode_and_binding_are_rejected() {
        let (mut gpu, _) = setup();
        let texture = gpu.create_texture(Placement::Lowest, &RGBA).unwrap();

        let unknown = [CommandRecord::new(99, &[])];
        assert!(matches!(
            submit(&mut gpu, &unknown),
            Err(Error::InvalidCommand { index: 0, .. })
        ));

        let binding = [
            CommandRecord::new(opcode::CLEAR, &[0]),
            CommandRecord::new(opcode::BIND_TEXTURE, &[MAX_BINDINGS, texture.as_u32()]),
        ];
        assert!(matches!(
            submit(&mut gpu, &binding),
            Err(Error::InvalidCommand { index: 1, .. })
        ));
    }

    #[test]
    fn empty_batch_does_not_reach_backend() {
        let (mut gpu, backend) = setup();
        assert_eq!(submit(&mut gpu, &[]).unwrap(), 0);
        backend.inspect(|s| assert!(s.batches.is_empty()));
    }

    #[test]
    fn oversized_batch_is_rejected() {
        let backend = HeadlessBackend::new();
        let config = HostConfig {
            max_commands_per_submit: 2,
            ..HostConfig::default()
        };
        let mut gpu = GpuResources::new(&config, Box::new(backend.clone()));
        let records = [CommandRecord::new(opcode::DRAW, &[0, 3]); 3];
        assert!(matches!(
            submit(&mut gpu, &records),
            Err(Error::InvalidCommand { .. })
        ));
        backend.inspect(|s| assert_eq!(s.command_count(), 0));
    }

    #[test]
    fn decode_records_reads_little_endian_fields() {
        let mut bytes = vec![0u8; 64];
        bytes[0..4].copy_from_slice(&opcode::DRAW.to_le_bytes());
        bytes[4..8].copy_from_slice(&2u32.to_le_bytes());
        bytes[8..12].copy_from_slice(&9u32.to_le_bytes());
        bytes[32..36].copy_from_slice(&opcode::CLEAR.to_le_bytes());
        let records = decode_records(&bytes);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], CommandRecord::new(opcode::DRAW, &[2, 9]));
        assert_eq!(records[1].opcode, opcode::CLEAR);
    }
}
