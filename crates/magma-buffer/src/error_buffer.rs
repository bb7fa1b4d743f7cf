//! # Error Buffer Backing
//!
//! Storage behind a buffer whose creation failed.
//!
//! An error buffer still honors `mapped_at_creation`: the caller gets a
//! writable host scratch region sized to the requested size, so failed
//! creation needs no special casing. Nothing else about the buffer reaches
//! a backend.

use alloc::boxed::Box;
use core::ptr::NonNull;

use magma_core::BufferDescriptor;
use magma_mem::try_alloc_zeroed;

/// Host scratch standing in for device memory
#[derive(Debug)]
pub(crate) struct ErrorBacking {
    fake_mapped_data: Option<Box<[u8]>>,
}

impl ErrorBacking {
    /// Allocate scratch if the descriptor asks to be mapped at creation
    ///
    /// Zero or unrepresentable sizes get no scratch; neither does a failed
    /// host allocation.
    pub(crate) fn new(desc: &BufferDescriptor) -> Self {
        let is_valid_size = desc.size != 0 && desc.size < usize::MAX as u64;
        let fake_mapped_data = if desc.mapped_at_creation && is_valid_size {
            try_alloc_zeroed(desc.size).ok()
        } else {
            None
        };

        Self { fake_mapped_data }
    }

    /// Pointer to the scratch region
    pub(crate) fn mapped_pointer(&mut self) -> Option<NonNull<u8>> {
        self.fake_mapped_data
            .as_deref_mut()
            .map(|data| NonNull::from(data).cast())
    }

    /// Release the scratch region
    pub(crate) fn clear_mapped_data(&mut self) {
        self.fake_mapped_data = None;
    }

    #[cfg(test)]
    pub(crate) fn has_mapped_data(&self) -> bool {
        self.fake_mapped_data.is_some()
    }
}
