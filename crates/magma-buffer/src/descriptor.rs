//! # Descriptor Validation
//!
//! Creation-time checks and the usages a buffer gains implicitly.

use magma_core::{is_aligned, BufferDescriptor, BufferUsage, Error, Result};

/// Validate a buffer descriptor
///
/// Checks run in order and stop at the first failure.
pub fn validate_buffer_descriptor(desc: &BufferDescriptor) -> Result<()> {
    if let Some(chained) = desc.next_in_chain {
        return Err(Error::UnsupportedExtension {
            s_type: chained.s_type,
        });
    }

    let usage = desc.usage;
    if !BufferUsage::PUBLIC.contains(usage) {
        return Err(Error::InvalidUsage { usage });
    }

    if usage.contains(BufferUsage::MAP_WRITE) && !BufferUsage::MAP_WRITE_ALLOWED.contains(usage) {
        return Err(Error::InvalidMapWriteUsage { usage });
    }

    if usage.contains(BufferUsage::MAP_READ) && !BufferUsage::MAP_READ_ALLOWED.contains(usage) {
        return Err(Error::InvalidMapReadUsage { usage });
    }

    if desc.mapped_at_creation && !is_aligned(desc.size, 4) {
        return Err(Error::MappedAtCreationSizeUnaligned { size: desc.size });
    }

    Ok(())
}

/// Usage a buffer actually carries once created
///
/// Only ever adds bits.
pub fn implied_usage(usage: BufferUsage, validation_enabled: bool) -> BufferUsage {
    let mut usage = usage;

    if usage.contains(BufferUsage::STORAGE) {
        usage |= BufferUsage::READ_ONLY_STORAGE;
    }

    // Timestamp conversion binds resolve targets in an internal compute pass
    if usage.contains(BufferUsage::QUERY_RESOLVE) {
        usage |= BufferUsage::INTERNAL_STORAGE;
    }

    // Indirect validation binds the buffer the same way
    if usage.contains(BufferUsage::INDIRECT) && validation_enabled {
        usage |= BufferUsage::INTERNAL_STORAGE;
    }

    usage
}
