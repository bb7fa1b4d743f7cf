//! # Staging Pool
//!
//! Host-visible staging blocks with deferred reuse.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ptr::NonNull;

use magma_core::{ByteSize, Error, Result, Serial};

// =============================================================================
// HOST ALLOCATION
// =============================================================================

/// Allocate `len` zeroed bytes, reporting failure instead of aborting
pub fn try_alloc_zeroed(len: u64) -> Result<Box<[u8]>> {
    let len = usize::try_from(len).map_err(|_| Error::OutOfMemory)?;
    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|_| Error::OutOfMemory)?;
    data.resize(len, 0u8);
    Ok(data.into_boxed_slice())
}

// =============================================================================
// STAGING CONFIGURATION
// =============================================================================

/// Staging pool configuration
#[derive(Debug, Clone)]
pub struct StagingConfig {
    /// Released bytes kept around for reuse
    pub max_cached_bytes: ByteSize,
    /// Pool name for debugging
    pub name: &'static str,
}

impl StagingConfig {
    /// Pool that caches up to `max_cached_bytes`
    pub const fn new(max_cached_bytes: ByteSize) -> Self {
        Self {
            max_cached_bytes,
            name: "staging_pool",
        }
    }

    /// Pool that frees every block as soon as it is reclaimed
    pub const fn uncached() -> Self {
        Self {
            max_cached_bytes: ByteSize::ZERO,
            name: "staging_uncached",
        }
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self::new(ByteSize::from_mib(4))
    }
}

// =============================================================================
// STAGING BUFFER
// =============================================================================

/// A host-visible staging block
///
/// Owned by exactly one holder at a time: the pool, a buffer being
/// mapped at creation, or the in-flight list.
#[derive(Debug)]
pub struct StagingBuffer {
    data: Box<[u8]>,
}

impl StagingBuffer {
    /// Size in bytes
    #[inline]
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Contents
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Mutable contents
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Host pointer to the first byte
    #[inline]
    pub fn mapped_pointer(&mut self) -> NonNull<u8> {
        NonNull::from(&mut *self.data).cast()
    }
}

// =============================================================================
// STAGING POOL
// =============================================================================

/// A block released at a serial, waiting for the GPU to pass it
#[derive(Debug)]
struct PendingRelease {
    buffer: StagingBuffer,
    serial: Serial,
}

/// Staging pool statistics
#[derive(Debug, Clone, Default)]
pub struct StagingStats {
    /// Fresh host allocations
    pub allocations: u64,
    /// Allocations served from the cache
    pub reuses: u64,
    /// Blocks handed back
    pub releases: u64,
    /// Blocks that passed their serial
    pub reclaims: u64,
    /// High water mark of blocks in flight
    pub peak_in_flight: usize,
}

/// Staging allocator with serial-deferred reuse
#[derive(Debug)]
pub struct StagingPool {
    /// Configuration
    config: StagingConfig,
    /// Reclaimed blocks available for reuse
    cached: Vec<StagingBuffer>,
    /// Total size of `cached`
    cached_bytes: u64,
    /// Released blocks the GPU may still read
    in_flight: Vec<PendingRelease>,
    /// Statistics
    stats: StagingStats,
}

impl StagingPool {
    /// Create a new staging pool
    pub fn new(config: StagingConfig) -> Self {
        Self {
            config,
            cached: Vec::new(),
            cached_bytes: 0,
            in_flight: Vec::new(),
            stats: StagingStats::default(),
        }
    }

    /// Get a zeroed staging block of exactly `size` bytes
    pub fn allocate(&mut self, size: u64) -> Result<StagingBuffer> {
        if let Some(index) = self.cached.iter().position(|b| b.size() == size) {
            let mut buffer = self.cached.swap_remove(index);
            self.cached_bytes -= size;
            buffer.as_mut_slice().fill(0);
            self.stats.reuses += 1;
            log::trace!("{}: reused {} block", self.config.name, ByteSize::from_bytes(size));
            return Ok(buffer);
        }

        let data = try_alloc_zeroed(size)?;
        self.stats.allocations += 1;
        log::debug!("{}: allocated {} block", self.config.name, ByteSize::from_bytes(size));
        Ok(StagingBuffer { data })
    }

    /// Hand a block back; it becomes reusable once `serial` completes
    pub fn release(&mut self, buffer: StagingBuffer, serial: Serial) {
        self.in_flight.push(PendingRelease { buffer, serial });
        self.stats.releases += 1;
        self.stats.peak_in_flight = self.stats.peak_in_flight.max(self.in_flight.len());
    }

    /// Reclaim every block whose serial is at or before `completed`
    ///
    /// Returns the number of blocks reclaimed.
    pub fn reclaim(&mut self, completed: Serial) -> usize {
        let mut reclaimed = 0;
        let mut i = 0;

        while i < self.in_flight.len() {
            if self.in_flight[i].serial <= completed {
                let pending = self.in_flight.swap_remove(i);
                let size = pending.buffer.size();
                if self.cached_bytes + size <= self.config.max_cached_bytes.as_bytes() {
                    self.cached_bytes += size;
                    self.cached.push(pending.buffer);
                }
                reclaimed += 1;
            } else {
                i += 1;
            }
        }

        if reclaimed > 0 {
            self.stats.reclaims += reclaimed as u64;
            log::debug!(
                "{}: reclaimed {} blocks through {}",
                self.config.name,
                reclaimed,
                completed
            );
        }

        reclaimed
    }

    /// Drop every cached and in-flight block
    pub fn clear(&mut self) {
        self.cached.clear();
        self.cached_bytes = 0;
        self.in_flight.clear();
    }

    /// Get statistics
    pub fn stats(&self) -> &StagingStats {
        &self.stats
    }

    /// Bytes currently cached for reuse
    pub fn cached_bytes(&self) -> ByteSize {
        ByteSize::from_bytes(self.cached_bytes)
    }

    /// Number of blocks waiting on a serial
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Get pool name
    pub fn name(&self) -> &'static str {
        self.config.name
    }
}

static_assertions::assert_impl_all!(StagingBuffer: Send, Sync);
static_assertions::assert_impl_all!(StagingPool: Send, Sync);
