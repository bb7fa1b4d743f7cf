//! # MAGMA Error Handling
//!
//! Error types for the buffer resource stack.
//!
//! Errors fall into three groups:
//! - Validation errors: synchronous, recoverable, never mutate state
//! - Device errors: device loss and allocation failure
//! - Backend errors: a backend primitive could not complete
//!
//! Programming-contract violations are not represented here; they panic.

use core::fmt;

use crate::memory::{BufferUsage, MapMode};

// =============================================================================
// RESULT TYPE
// =============================================================================

/// MAGMA Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// MAGMA unified error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Device Errors
    // =========================================================================
    /// The device was lost or destroyed
    DeviceLost,
    /// The object is an error object (failed creation)
    InvalidObject,
    /// Out of host or device memory
    OutOfMemory,

    // =========================================================================
    // Descriptor Errors
    // =========================================================================
    /// An extension struct was chained that this implementation does not know
    UnsupportedExtension {
        /// Structure type of the chained struct
        s_type: u32,
    },
    /// Usage contains bits outside the public usage set
    InvalidUsage {
        /// Offending usage
        usage: BufferUsage,
    },
    /// MAP_WRITE combined with something other than COPY_SRC
    InvalidMapWriteUsage {
        /// Offending usage
        usage: BufferUsage,
    },
    /// MAP_READ combined with something other than COPY_DST
    InvalidMapReadUsage {
        /// Offending usage
        usage: BufferUsage,
    },
    /// Mapped at creation with a size that is not a multiple of 4
    MappedAtCreationSizeUnaligned {
        /// Requested size
        size: u64,
    },

    // =========================================================================
    // Mapping Errors
    // =========================================================================
    /// Map offset is past the end of the buffer
    MapOffsetOutOfBounds {
        /// Requested offset
        offset: u64,
        /// Buffer size
        buffer_size: u64,
    },
    /// Map offset is not a multiple of 8
    MapOffsetUnaligned {
        /// Requested offset
        offset: u64,
    },
    /// Map size is not a multiple of 4
    MapSizeUnaligned {
        /// Requested size
        size: u64,
    },
    /// Map range does not fit in the buffer
    MapRangeOutOfBounds {
        /// Requested offset
        offset: u64,
        /// Requested size
        size: u64,
        /// Buffer size
        buffer_size: u64,
    },
    /// Buffer is already mapped
    AlreadyMapped,
    /// Buffer is not mapped
    NotMapped,
    /// Buffer is destroyed
    Destroyed,
    /// Map mode is not exactly one of READ or WRITE
    InvalidMapMode {
        /// Offending mode
        mode: MapMode,
    },
    /// Buffer usage lacks the capability required by the map mode
    MissingMapUsage {
        /// Buffer usage
        usage: BufferUsage,
        /// Required usage bit
        required: BufferUsage,
    },

    // =========================================================================
    // Queue Errors
    // =========================================================================
    /// Buffer used in a submit while mapped
    UsedWhileMapped,
    /// Buffer used in a submit while destroyed
    UsedWhileDestroyed,

    // =========================================================================
    // Backend Errors
    // =========================================================================
    /// Backend memory mapping failed
    MappingFailed,
    /// Staging copy range is outside the source or destination
    CopyOutOfBounds {
        /// Copy offset that overflowed
        offset: u64,
        /// Copy size
        size: u64,
    },
}

impl Error {
    /// Check if this error reports device loss
    #[inline]
    pub const fn is_device_lost(&self) -> bool {
        matches!(self, Self::DeviceLost)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Device
            Self::DeviceLost => write!(f, "device is lost"),
            Self::InvalidObject => write!(f, "object is invalid"),
            Self::OutOfMemory => write!(f, "out of memory"),

            // Descriptor
            Self::UnsupportedExtension { s_type } => {
                write!(f, "unsupported chained struct (sType {:#x})", s_type)
            }
            Self::InvalidUsage { usage } => {
                write!(f, "buffer usage ({:?}) contains unknown or internal bits", usage)
            }
            Self::InvalidMapWriteUsage { usage } => write!(
                f,
                "buffer usage ({:?}) contains MAP_WRITE but is not a subset of MAP_WRITE | COPY_SRC",
                usage
            ),
            Self::InvalidMapReadUsage { usage } => write!(
                f,
                "buffer usage ({:?}) contains MAP_READ but is not a subset of MAP_READ | COPY_DST",
                usage
            ),
            Self::MappedAtCreationSizeUnaligned { size } => write!(
                f,
                "buffer is mapped at creation but its size ({}) is not a multiple of 4",
                size
            ),

            // Mapping
            Self::MapOffsetOutOfBounds { offset, buffer_size } => write!(
                f,
                "mapping offset ({}) is larger than the buffer size ({})",
                offset, buffer_size
            ),
            Self::MapOffsetUnaligned { offset } => {
                write!(f, "mapping offset ({}) must be a multiple of 8", offset)
            }
            Self::MapSizeUnaligned { size } => {
                write!(f, "mapping size ({}) must be a multiple of 4", size)
            }
            Self::MapRangeOutOfBounds {
                offset,
                size,
                buffer_size,
            } => write!(
                f,
                "mapping range (offset: {}, size: {}) doesn't fit in the buffer size ({})",
                offset, size, buffer_size
            ),
            Self::AlreadyMapped => write!(f, "buffer is already mapped"),
            Self::NotMapped => write!(f, "buffer is unmapped"),
            Self::Destroyed => write!(f, "buffer is destroyed"),
            Self::InvalidMapMode { mode } => {
                write!(f, "map mode ({:?}) is not one of READ or WRITE", mode)
            }
            Self::MissingMapUsage { usage, required } => write!(
                f,
                "buffer usage ({:?}) does not contain {:?}",
                usage, required
            ),

            // Queue
            Self::UsedWhileMapped => write!(f, "buffer used in submit while mapped"),
            Self::UsedWhileDestroyed => write!(f, "buffer used in submit while destroyed"),

            // Backend
            Self::MappingFailed => write!(f, "memory mapping failed"),
            Self::CopyOutOfBounds { offset, size } => write!(
                f,
                "staging copy (offset: {}, size: {}) is out of bounds",
                offset, size
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn test_display_carries_values() {
        let err = Error::MapRangeOutOfBounds {
            offset: 8,
            size: 16,
            buffer_size: 16,
        };
        assert_eq!(
            err.to_string(),
            "mapping range (offset: 8, size: 16) doesn't fit in the buffer size (16)"
        );
        assert_eq!(
            Error::MapOffsetUnaligned { offset: 4 }.to_string(),
            "mapping offset (4) must be a multiple of 8"
        );
    }

    #[test]
    fn test_device_lost_classification() {
        assert!(Error::DeviceLost.is_device_lost());
        assert!(!Error::AlreadyMapped.is_device_lost());
        assert!(!Error::InvalidObject.is_device_lost());
    }
}
