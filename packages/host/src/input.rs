//! The input bridge.
//!
//! Once per frame the host polls its input source and copies the result
//! into guest memory in a fixed layout:
//!
//! - buttons: `MAX_PLAYERS` little-endian `u32` bitmasks
//! - axes: `MAX_PLAYERS * AXIS_COUNT` little-endian `f32` values in `[-1, 1]`
//!
//! The guest only ever reads this data; the host never reads it back.

use std::collections::VecDeque;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Fault;
use crate::memory::GuestMemory;

pub const MAX_PLAYERS: usize = 4;
pub const AXIS_COUNT: usize = 6;

bitflags! {
    /// Controller buttons, one bit each.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Buttons: u32 {
        const A = 1 << 0;
        const X = 1 << 1;
        const Y = 1 << 2;
        const B = 1 << 3;
        const UP = 1 << 4;
        const DOWN = 1 << 5;
        const LEFT = 1 << 6;
        const RIGHT = 1 << 7;
        const LB = 1 << 8;
        const RB = 1 << 9;
    }
}

/// Analog axes, in layout order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    LeftX = 0,
    LeftY = 1,
    RightX = 2,
    RightY = 3,
    RightTrigger = 4,
    LeftTrigger = 5,
}

/// The state of one player's controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerInput {
    pub buttons: Buttons,
    pub axes: [f32; AXIS_COUNT],
}

impl PlayerInput {
    pub fn axis(&self, axis: Axis) -> f32 {
        self.axes[axis as usize]
    }

    fn clamped(mut self) -> Self {
        for value in &mut self.axes {
            *value = if value.is_nan() {
                0.0
            } else {
                value.clamp(-1.0, 1.0)
            };
        }
        self
    }
}

/// Input for every player at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputSnapshot {
    pub players: [PlayerInput; MAX_PLAYERS],
}

impl InputSnapshot {
    /// The all-zero snapshot reported when no device is connected.
    pub fn neutral() -> Self {
        Self::default()
    }

    fn buttons(&self) -> [u32; MAX_PLAYERS] {
        self.players.map(|player| player.buttons.bits())
    }

    fn axes(&self) -> [f32; MAX_PLAYERS * AXIS_COUNT] {
        let mut axes = [0.0; MAX_PLAYERS * AXIS_COUNT];
        for (chunk, player) in axes.chunks_exact_mut(AXIS_COUNT).zip(&self.players) {
            chunk.copy_from_slice(&player.clamped().axes);
        }
        axes
    }
}

/// A source of controller state.
pub trait InputSource {
    /// Current device state, or `None` when nothing is connected.
    fn poll(&mut self) -> Option<InputSnapshot>;
}

/// An input source with no devices attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInput;

impl InputSource for NoInput {
    fn poll(&mut self) -> Option<InputSnapshot> {
        None
    }
}

/// Replays a fixed sequence of snapshots, one per poll.
///
/// Once the script runs out the source reports no devices.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    frames: VecDeque<InputSnapshot>,
}

#[derive(Deserialize)]
struct ScriptFrame {
    #[serde(default)]
    players: Vec<PlayerInput>,
}

impl ScriptedInput {
    pub fn new(frames: impl IntoIterator<Item = InputSnapshot>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    /// Parse a script of the form `[{"players": [{"buttons": "A | UP", "axes": [..]}]}, ..]`.
    ///
    /// Players missing from a frame are neutral; players beyond
    /// `MAX_PLAYERS` are ignored.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let frames: Vec<ScriptFrame> = serde_json::from_str(json)?;
        Ok(Self::new(frames.into_iter().map(|frame| {
            let mut snapshot = InputSnapshot::neutral();
            for (slot, player) in snapshot.players.iter_mut().zip(frame.players) {
                *slot = player;
            }
            snapshot
        })))
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl InputSource for ScriptedInput {
    fn poll(&mut self) -> Option<InputSnapshot> {
        self.frames.pop_front()
    }
}

/// Guest addresses the snapshot is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputTarget {
    pub buttons_ptr: i32,
    pub axes_ptr: i32,
}

/// Polls the input source and keeps guest memory up to date.
pub struct InputBridge {
    source: Box<dyn InputSource>,
    latest: InputSnapshot,
    target: Option<InputTarget>,
}

impl InputBridge {
    pub fn new(source: Box<dyn InputSource>) -> Self {
        Self {
            source,
            latest: InputSnapshot::neutral(),
            target: None,
        }
    }

    pub fn latest(&self) -> &InputSnapshot {
        &self.latest
    }

    pub fn target(&self) -> Option<InputTarget> {
        self.target
    }

    /// Poll the source and write the snapshot to the registered target.
    ///
    /// Never fails. A target that can no longer be written is dropped.
    pub fn refresh(&mut self, memory: &mut GuestMemory<'_>) {
        self.latest = self.source.poll().unwrap_or_default();
        if let Some(target) = self.target {
            if let Err(fault) = write_snapshot(&self.latest, memory, target) {
                warn!(%fault, ?target, "dropping unwritable input target");
                self.target = None;
            }
        }
    }

    /// Service `input_update`: write the latest snapshot to the given
    /// addresses and keep them as the target for later refreshes.
    pub fn update_guest(
        &mut self,
        memory: &mut GuestMemory<'_>,
        buttons_ptr: i32,
        axes_ptr: i32,
    ) -> Result<(), Fault> {
        let target = InputTarget {
            buttons_ptr,
            axes_ptr,
        };
        write_snapshot(&self.latest, memory, target)?;
        self.target = Some(target);
        Ok(())
    }
}

impl std::fmt::Debug for InputBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputBridge")
            .field("latest", &self.latest)
            .field("target", &self.target)
            .finish()
    }
}

const BUTTONS_LEN: i32 = (MAX_PLAYERS * 4) as i32;
const AXES_LEN: i32 = (MAX_PLAYERS * AXIS_COUNT * 4) as i32;

fn write_snapshot(
    snapshot: &InputSnapshot,
    memory: &mut GuestMemory<'_>,
    target: InputTarget,
) -> Result<(), Fault> {
    // Check both ranges before writing either.
    memory.range("input_update", target.buttons_ptr, BUTTONS_LEN)?;
    memory.range("input_update", target.axes_ptr, AXES_LEN)?;

    let buttons = snapshot.buttons();
    let axes = snapshot.axes();
    memory.write_bytes("input_update", target.buttons_ptr, bytemuck::cast_slice(&buttons))?;
    memory.write_bytes("input_update", target.axes_ptr, bytemuck::cast_slice(&axes))?;
    Ok(())
}
