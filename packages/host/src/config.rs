//! Host configuration.

use serde::{Deserialize, Serialize};

/// Default slot capacity per resource kind.
pub const DEFAULT_SLOT_CAPACITY: usize = 64;

/// Name under which the cart blob is exposed to the guest.
pub const DEFAULT_CART_NAME: &str = "cart.bin";

/// Limits and defaults for one host session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Number of slots in each resource table.
    pub slot_capacity: usize,

    /// Largest command batch accepted by one `gpu_submit` call.
    pub max_commands_per_submit: usize,

    /// Largest texture width or height.
    pub max_texture_size: u32,

    /// Largest buffer size in bytes.
    pub max_buffer_size: u32,

    /// Virtual file name of the cart blob.
    pub cart_name: String,

    /// Colour the screen is cleared to when the session starts.
    pub clear_color: [f32; 4],
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            slot_capacity: DEFAULT_SLOT_CAPACITY,
            max_commands_per_submit: 4096,
            max_texture_size: 4096,
            max_buffer_size: 16 * 1024 * 1024,
            cart_name: DEFAULT_CART_NAME.to_string(),
            clear_color: [0.2, 0.0, 0.0, 1.0],
        }
    }
}

impl HostConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
