//! # MAGMA Command System
//!
//! Submission serial timeline and completion task tracking.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                       Completion Pipeline                         │
//! │                                                                   │
//! │  ┌──────────────┐    ┌──────────────────┐    ┌────────────────┐   │
//! │  │ track_task   │    │  CompletionQueue │    │  GPU timeline  │   │
//! │  │ (at pending  │───▶│  (serial, task)  │◀───│  (completed    │   │
//! │  │   serial)    │    │   FIFO by serial │    │    serial)     │   │
//! │  └──────────────┘    └────────┬─────────┘    └────────────────┘   │
//! │                               │                                   │
//! │                  ┌────────────┴────────────┐                      │
//! │                  ▼                         ▼                      │
//! │          TaskInFlight::finish   TaskInFlight::handle_device_loss  │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Completion Flow
//!
//! 1. A task is tracked at the pending serial
//! 2. The pending serial is submitted
//! 3. The GPU reports a completed serial
//! 4. Ready tasks are returned in serial order and run by the caller
//! 5. On device loss every remaining task is drained instead

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod queue;

// Re-exports
pub use queue::{CompletionQueue, QueueStats, TaskInFlight};
