//! Peer: the public RPC surface and its dispatch loop.

pub mod config;
pub mod core;

pub use config::PeerConfig;
pub use core::{ErrorHook, Peer};
