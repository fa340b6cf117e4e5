//! Pulse Loopback Library
//!
//! Virtual loopback audio device: what one process plays through the output
//! stream comes back out of the input stream for another process to capture.

pub mod audio;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod plugin;
pub mod system;

pub use config::DeviceConfig;
pub use device::LoopbackDevice;
pub use error::{ConfigError, HalError};
