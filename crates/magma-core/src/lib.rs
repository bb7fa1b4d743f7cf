//! # MAGMA Core
//!
//! Foundational types and traits shared by the buffer resource stack.
//!
//! This crate holds everything the other crates agree on: the error
//! taxonomy, strongly typed serials and request ids, buffer usage and map
//! mode flags, and the capability traits a backend implements to provide
//! real device memory.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      magma-core                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │   Traits    │  │   Types     │  │     Error           │  │
//! │  │ (Backend,   │  │ (Serial,    │  │   Handling          │  │
//! │  │  Buffer)    │  │  MapReqId)  │  │                     │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │  Memory: BufferUsage, MapMode, BufferDescriptor,      │  │
//! │  │          MapAsyncStatus                               │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::new_without_default)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod error;
pub mod memory;
pub mod traits;
pub mod types;

// Re-exports for convenience
pub use error::{Error, Result};
pub use memory::*;
pub use traits::*;
pub use types::*;
