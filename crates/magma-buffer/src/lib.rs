//! # MAGMA Buffer Resources
//!
//! GPU-visible buffers whose contents can be mapped for CPU access.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                              Device                               │
//! │  ┌──────────────┐  ┌────────────────┐  ┌───────────────────────┐  │
//! │  │ DeviceBackend│  │ CompletionQueue│  │     StagingPool       │  │
//! │  └──────┬───────┘  └───────▲────────┘  └──────────▲────────────┘  │
//! │         │ create_buffer    │ MapRequestTask       │ staging       │
//! │  ┌──────▼──────────────────┴──────────────────────┴────────────┐  │
//! │  │                          Buffer                             │  │
//! │  │   Unmapped ──map_async──► Mapped ──unmap──► Unmapped        │  │
//! │  │   MappedAtCreation ──unmap (copy-back)──► Unmapped          │  │
//! │  │   any ──destroy──► Destroyed                                │  │
//! │  └─────────────────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Map Flow
//!
//! 1. `map_async` validates and moves the buffer to `Mapped`
//! 2. A [`MapRequestTask`] is tracked at the pending serial
//! 3. `Device::tick` completes the serial and runs the task
//! 4. The callback receives `Success`, after which `get_mapped_range`
//!    returns pointers into the mapped window
//! 5. `unmap` returns the buffer to device-only access
//!
//! Validation failures never change buffer state. They are logged, appended
//! to the device error log and reported through the callback.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod buffer;
pub mod config;
pub mod descriptor;
pub mod device;
mod error_buffer;
pub mod host;
pub mod task;

// Re-exports
pub use buffer::{Buffer, BufferState, MapCallback, MapWindow};
pub use config::{DeviceConfig, Toggles};
pub use descriptor::{implied_usage, validate_buffer_descriptor};
pub use device::Device;
pub use host::{DirectMapping, HostBackend, HostBackendConfig, HostStats, HostStatsHandle};
pub use task::MapRequestTask;
