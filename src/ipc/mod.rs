//! Local IPC for single-instance coordination
//!
//! - `channel`: scheme-named Unix socket transport (probe / send / serve)
//! - `lock`: exclusive per-scheme claim deciding primary vs. secondary

pub mod channel;
pub mod lock;

pub use channel::{default_channel_dir, Channel, ServerHandle, MAX_MESSAGE_LEN};
pub use lock::InstanceLock;
