//! # MAGMA Memory Management
//!
//! Host-visible staging memory for buffers the CPU cannot write directly.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MAGMA Staging Memory                       │
//! │                                                                 │
//! │   allocate(size) ──► StagingBuffer ──► copy into device buffer  │
//! │        ▲                                      │                 │
//! │        │                                      ▼                 │
//! │  ┌─────┴───────┐   reclaim(completed)  ┌──────────────┐         │
//! │  │ Cached free │ ◄──────────────────── │  In flight   │         │
//! │  │   blocks    │                       │ (by serial)  │         │
//! │  └─────────────┘                       └──────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A staging block released at serial `s` may still be read by the copy
//! recorded at `s`, so it only becomes reusable once the completed serial
//! reaches `s`.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod staging;

// Re-exports
pub use staging::{try_alloc_zeroed, StagingBuffer, StagingConfig, StagingPool, StagingStats};
