//! Radon bridge: environment discovery and log collection for a running
//! Radon IDE / React Native development session.
//!
//! Everything here is request-scoped. Discovery produces a fresh
//! [`RadonContext`] per call, collectors hold no state between calls, and
//! every subprocess, socket and temp file is released on every exit path.

pub mod detector;
pub mod device_log;
pub mod errors;
pub mod metro;
pub mod pagination;
pub mod simctl;
pub mod validators;

pub use detector::{DeviceHandle, ProcessLister, PsProcessLister, RadonContext};
pub use errors::BridgeError;
pub use metro::{LogChunk, MetroClient, MetroStatus};
pub use pagination::{run_window, WindowMode, WindowParams, WindowResult};
