//! # Buffer
//!
//! A GPU buffer and its CPU mapping state machine.
//!
//! ```text
//!                 map_async                 unmap
//!   Unmapped ───────────────────► Mapped ───────────► Unmapped
//!      ▲                                                  │
//!      │ unmap (staging copy-back or direct unmap)        │
//!   MappedAtCreation                                      │
//!      │                                                  │
//!      └──────────── destroy (from any state) ──────► Destroyed
//! ```
//!
//! At most one map request is outstanding. Its callback is taken out of the
//! buffer before it runs, so a callback that unmaps or destroys the buffer
//! never sees itself fire twice.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;
use core::ptr::{self, NonNull};
use core::slice;

use spin::Mutex;

use magma_core::{
    is_aligned, BufferBackend, BufferDescriptor, BufferId, BufferUsage, ByteSize, Error,
    MapAsyncStatus, MapMode, MapRequestId, Result, WHOLE_MAP_SIZE,
};
use magma_mem::StagingBuffer;

use crate::config::Toggles;
use crate::device::Device;
use crate::error_buffer::ErrorBacking;
use crate::task::MapRequestTask;

/// Callback receiving the outcome of a map request
pub type MapCallback = Box<dyn FnOnce(MapAsyncStatus) + Send>;

/// Required alignment of map and mapped-range offsets
const MAP_OFFSET_ALIGNMENT: u64 = 8;
/// Required alignment of map and mapped-range sizes
const MAP_SIZE_ALIGNMENT: u64 = 4;

/// Address handed out for ranges of zero-sized buffers; never dereferenced
const ZERO_SIZED_MAPPING: usize = 0xCAFE_D00D;

// =============================================================================
// STATE
// =============================================================================

/// Buffer mapping state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferState {
    /// Device-only access
    Unmapped,
    /// Created mapped; always writable
    MappedAtCreation,
    /// Mapped by a map request
    Mapped,
    /// Terminal
    Destroyed,
}

/// Currently mappable sub-range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapWindow {
    /// Access mode
    pub mode: MapMode,
    /// Offset in bytes
    pub offset: u64,
    /// Size in bytes
    pub size: u64,
}

/// What backs the buffer
enum Backing {
    Device(Box<dyn BufferBackend>),
    Error(ErrorBacking),
}

impl Backing {
    /// Backend primitives; unreachable for error buffers
    fn backend(&mut self) -> &mut dyn BufferBackend {
        match self {
            Self::Device(backend) => backend.as_mut(),
            Self::Error(_) => unreachable!("backend operation on an error buffer"),
        }
    }

    fn mapped_pointer(&mut self) -> Option<NonNull<u8>> {
        match self {
            Self::Device(backend) => backend.mapped_pointer(),
            Self::Error(scratch) => scratch.mapped_pointer(),
        }
    }
}

/// Why a mapping is being released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    Unmap,
    Destroy,
}

impl Release {
    fn callback_status(self) -> MapAsyncStatus {
        match self {
            Self::Unmap => MapAsyncStatus::UnmappedBeforeCallback,
            Self::Destroy => MapAsyncStatus::DestroyedBeforeCallback,
        }
    }
}

struct BufferInner {
    state: BufferState,
    /// `Some` iff mapped or mapped at creation
    window: Option<MapWindow>,
    backing: Backing,
    /// Stands in for the allocation while mapped at creation
    staging: Option<StagingBuffer>,
    last_map_id: MapRequestId,
    callback: Option<MapCallback>,
    is_data_initialized: bool,
}

impl BufferInner {
    fn set_unmapped(&mut self) {
        self.state = BufferState::Unmapped;
        self.window = None;
    }
}

// =============================================================================
// BUFFER
// =============================================================================

/// A GPU buffer resource
pub struct Buffer {
    device: Arc<Device>,
    id: BufferId,
    size: u64,
    usage: BufferUsage,
    label: Option<String>,
    is_error: bool,
    /// Set by the backend at creation; `None` for error buffers
    allocated_size: Option<u64>,
    inner: Mutex<BufferInner>,
}

impl Buffer {
    /// Wrap a backend allocation; `desc.usage` already carries implied usage
    pub(crate) fn new(
        device: Arc<Device>,
        id: BufferId,
        desc: &BufferDescriptor,
        backend: Box<dyn BufferBackend>,
    ) -> Self {
        let allocated_size = backend.allocated_size();
        log::debug!(
            "{}: created {:?} size {} (allocated {}) usage {:?}",
            id,
            desc.label,
            ByteSize::from_bytes(desc.size),
            ByteSize::from_bytes(allocated_size),
            desc.usage
        );

        Self {
            device,
            id,
            size: desc.size,
            usage: desc.usage,
            label: desc.label.clone(),
            is_error: false,
            allocated_size: Some(allocated_size),
            inner: Mutex::new(BufferInner {
                state: BufferState::Unmapped,
                window: None,
                backing: Backing::Device(backend),
                staging: None,
                last_map_id: MapRequestId::default(),
                callback: None,
                is_data_initialized: false,
            }),
        }
    }

    /// Error buffer for a descriptor that failed creation
    pub(crate) fn new_error(device: Arc<Device>, id: BufferId, desc: &BufferDescriptor) -> Self {
        let (state, window) = if desc.mapped_at_creation {
            let window = MapWindow {
                mode: MapMode::WRITE,
                offset: 0,
                size: desc.size,
            };
            (BufferState::MappedAtCreation, Some(window))
        } else {
            (BufferState::Unmapped, None)
        };
        log::debug!("{}: created error buffer {:?}", id, desc.label);

        Self {
            device,
            id,
            size: desc.size,
            usage: desc.usage,
            label: desc.label.clone(),
            is_error: true,
            allocated_size: None,
            inner: Mutex::new(BufferInner {
                state,
                window,
                backing: Backing::Error(ErrorBacking::new(desc)),
                staging: None,
                last_map_id: MapRequestId::default(),
                callback: None,
                is_data_initialized: false,
            }),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Device-unique id
    #[inline]
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Owning device
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Nominal size in bytes
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Usage including implied internal usage
    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Debug label
    #[inline]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Check if creation failed
    #[inline]
    pub fn is_error(&self) -> bool {
        self.is_error
    }

    /// Physical size chosen by the backend
    ///
    /// # Panics
    ///
    /// Panics for error buffers, which have no backend allocation.
    pub fn allocated_size(&self) -> u64 {
        match self.allocated_size {
            Some(size) => size,
            None => panic!("{}: allocated size queried on an error buffer", self.id),
        }
    }

    /// Current state
    pub fn state(&self) -> BufferState {
        self.inner.lock().state
    }

    /// Current map window
    pub fn map_window(&self) -> Option<MapWindow> {
        self.inner.lock().window
    }

    /// Check if contents were cleared or fully written
    pub fn is_data_initialized(&self) -> bool {
        self.inner.lock().is_data_initialized
    }

    /// Mark contents initialized
    pub fn set_is_data_initialized(&self) {
        self.inner.lock().is_data_initialized = true;
    }

    /// Check if the range covers the whole buffer
    #[inline]
    pub fn is_full_buffer_range(&self, offset: u64, size: u64) -> bool {
        offset == 0 && size == self.size
    }

    /// Check that the buffer may be used by a submission right now
    pub fn validate_can_use_on_queue_now(&self) -> Result<()> {
        assert!(!self.is_error, "{}: queue use of an error buffer", self.id);
        match self.inner.lock().state {
            BufferState::Destroyed => Err(Error::UsedWhileDestroyed),
            BufferState::Mapped | BufferState::MappedAtCreation => Err(Error::UsedWhileMapped),
            BufferState::Unmapped => Ok(()),
        }
    }

    fn validate_object(&self) -> Result<()> {
        if self.is_error {
            return Err(Error::InvalidObject);
        }
        Ok(())
    }

    // =========================================================================
    // Creation-time mapping
    // =========================================================================

    /// Enter `MappedAtCreation` with a writable window over the whole buffer
    ///
    /// On failure the buffer is left unmapped.
    pub(crate) fn map_at_creation(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        debug_assert!(!self.is_error);

        inner.state = BufferState::MappedAtCreation;
        inner.window = Some(MapWindow {
            mode: MapMode::WRITE,
            offset: 0,
            size: self.size,
        });

        // Zero-sized buffers never reach the backend
        if self.size == 0 {
            return Ok(());
        }

        let result = self.map_at_creation_internal(&mut inner);
        if result.is_err() {
            inner.staging = None;
            inner.set_unmapped();
        }
        result
    }

    fn map_at_creation_internal(&self, inner: &mut BufferInner) -> Result<()> {
        let allocated_size = self.allocated_size();

        let backend = inner.backing.backend();
        if backend.is_cpu_writable_at_creation() {
            backend.map_at_creation()?;
        } else {
            inner.staging = Some(self.device.create_staging_buffer(allocated_size)?);
        }

        let region: &mut [u8] = match inner.staging.as_mut() {
            Some(staging) => staging.as_mut_slice(),
            None => {
                let base = inner
                    .backing
                    .backend()
                    .mapped_pointer()
                    .ok_or(Error::MappingFailed)?;
                let len = usize::try_from(allocated_size).map_err(|_| Error::OutOfMemory)?;
                // SAFETY: a mapped backend pointer covers `allocated_size` bytes
                // and the buffer lock is held.
                unsafe { slice::from_raw_parts_mut(base.as_ptr(), len) }
            }
        };

        if self
            .device
            .is_toggle_enabled(Toggles::LAZY_CLEAR_RESOURCE_ON_FIRST_USE)
        {
            region.fill(0);
            inner.is_data_initialized = true;
            self.device.increment_lazy_clear_count_for_testing();
        } else if self
            .device
            .is_toggle_enabled(Toggles::NONZERO_CLEAR_RESOURCES_ON_CREATION_FOR_TESTING)
        {
            region.fill(1);
        }

        Ok(())
    }

    // =========================================================================
    // Asynchronous mapping
    // =========================================================================

    /// Request CPU access to `[offset, offset + size)`
    ///
    /// `size` may be [`WHOLE_MAP_SIZE`]; `0` is a deprecated alias for it.
    /// The callback fires exactly once: synchronously when validation fails,
    /// otherwise when the request completes, is unmapped, is destroyed or
    /// the device is lost.
    pub fn map_async(
        self: &Arc<Self>,
        mode: MapMode,
        offset: u64,
        size: u64,
        callback: Option<MapCallback>,
    ) {
        let mut size = size;
        if size == 0 {
            size = WHOLE_MAP_SIZE;
            self.device.emit_deprecation_warning(
                "map_async with size 0 as the default mapping size; use WHOLE_MAP_SIZE",
            );
        }
        if size == WHOLE_MAP_SIZE && offset <= self.size {
            size = self.size - offset;
        }

        let mut inner = self.inner.lock();
        if let Err(err) = self.validate_map_async(&inner, mode, offset, size) {
            drop(inner);
            let status = MapAsyncStatus::from_validation_error(&err);
            self.device.consume_error(err, "map_async");
            if let Some(callback) = callback {
                callback(status);
            }
            return;
        }

        inner.last_map_id = inner.last_map_id.next();
        inner.window = Some(MapWindow { mode, offset, size });
        inner.callback = callback;
        inner.state = BufferState::Mapped;
        let id = inner.last_map_id;

        if let Err(err) = inner.backing.backend().map_async(mode, offset, size) {
            inner.set_unmapped();
            let callback = inner.callback.take();
            drop(inner);
            self.device.consume_error(err, "map_async");
            if let Some(callback) = callback {
                callback(MapAsyncStatus::DeviceLost);
            }
            return;
        }
        drop(inner);

        let serial = self.device.pending_command_serial();
        log::debug!(
            "{}: map {:?} [{}, +{}) as {:?} at {}",
            self.id,
            mode,
            offset,
            size,
            id,
            serial
        );
        self.device
            .track_task(Box::new(MapRequestTask::new(self, id)), serial);
    }

    fn validate_map_async(
        &self,
        inner: &BufferInner,
        mode: MapMode,
        offset: u64,
        size: u64,
    ) -> Result<()> {
        self.device.validate_is_alive()?;
        self.validate_object()?;

        if offset > self.size {
            return Err(Error::MapOffsetOutOfBounds {
                offset,
                buffer_size: self.size,
            });
        }
        if !is_aligned(offset, MAP_OFFSET_ALIGNMENT) {
            return Err(Error::MapOffsetUnaligned { offset });
        }
        if !is_aligned(size, MAP_SIZE_ALIGNMENT) {
            return Err(Error::MapSizeUnaligned { size });
        }
        if size > self.size - offset {
            return Err(Error::MapRangeOutOfBounds {
                offset,
                size,
                buffer_size: self.size,
            });
        }

        match inner.state {
            BufferState::Mapped | BufferState::MappedAtCreation => {
                return Err(Error::AlreadyMapped)
            }
            BufferState::Destroyed => return Err(Error::Destroyed),
            BufferState::Unmapped => {}
        }

        if !mode.is_single_access() {
            return Err(Error::InvalidMapMode { mode });
        }
        let required = mode.required_usage();
        if !self.usage.contains(required) {
            return Err(Error::MissingMapUsage {
                usage: self.usage,
                required,
            });
        }

        Ok(())
    }

    /// Resolve request `id`; stale ids are dropped
    pub(crate) fn on_map_request_completed(&self, id: MapRequestId, status: MapAsyncStatus) {
        let callback = {
            let mut inner = self.inner.lock();
            if id == inner.last_map_id {
                inner.callback.take()
            } else {
                None
            }
        };

        match callback {
            Some(callback) => self.deliver(callback, status),
            None => log::trace!("{}: dropped completion of {:?}", self.id, id),
        }
    }

    /// Invoke a callback taken out of the buffer; the lock must not be held
    fn deliver(&self, callback: MapCallback, status: MapAsyncStatus) {
        let status = if self.device.is_lost() {
            MapAsyncStatus::DeviceLost
        } else {
            status
        };
        log::trace!("{}: map callback {:?}", self.id, status);
        callback(status);
    }

    // =========================================================================
    // Mapped ranges
    // =========================================================================

    /// Writable pointer to `[offset, offset + size)` of the mapping
    ///
    /// Device loss is not checked: a pointer stays valid until unmap.
    pub fn get_mapped_range(&self, offset: u64, size: u64) -> Option<NonNull<u8>> {
        self.mapped_range(offset, size, true)
    }

    /// Read-only pointer to `[offset, offset + size)` of the mapping
    pub fn get_const_mapped_range(&self, offset: u64, size: u64) -> Option<*const u8> {
        self.mapped_range(offset, size, false)
            .map(|ptr| ptr.as_ptr().cast_const())
    }

    fn mapped_range(&self, offset: u64, size: u64, writable: bool) -> Option<NonNull<u8>> {
        let mut inner = self.inner.lock();
        if !Self::can_get_mapped_range(&inner, writable, offset, size) {
            return None;
        }
        let offset = usize::try_from(offset).ok()?;

        if let Some(staging) = inner.staging.as_mut() {
            // SAFETY: the window lies inside the buffer and staging covers the
            // whole allocation.
            return Some(unsafe { staging.mapped_pointer().add(offset) });
        }
        if self.size == 0 {
            return NonNull::new(ptr::without_provenance_mut(ZERO_SIZED_MAPPING));
        }

        let base = inner.backing.mapped_pointer()?;
        // SAFETY: mapped pointers cover at least `size` bytes and the window
        // ends at or before `size`.
        Some(unsafe { base.add(offset) })
    }

    fn can_get_mapped_range(inner: &BufferInner, writable: bool, offset: u64, size: u64) -> bool {
        if !is_aligned(offset, MAP_OFFSET_ALIGNMENT) || !is_aligned(size, MAP_SIZE_ALIGNMENT) {
            return false;
        }

        let Some(window) = inner.window else {
            return false;
        };
        if size > window.size || offset < window.offset {
            return false;
        }
        if offset - window.offset > window.size - size {
            return false;
        }

        match inner.state {
            BufferState::MappedAtCreation => true,
            BufferState::Mapped => !writable || window.mode.contains(MapMode::WRITE),
            BufferState::Unmapped | BufferState::Destroyed => false,
        }
    }

    // =========================================================================
    // Unmap / destroy
    // =========================================================================

    /// Return the buffer to device-only access
    ///
    /// A still-pending callback fires with `UnmappedBeforeCallback`. Data
    /// written while mapped at creation reaches the buffer here.
    pub fn unmap(&self) {
        if self.is_error {
            let mut inner = self.inner.lock();
            if let Backing::Error(scratch) = &mut inner.backing {
                scratch.clear_mapped_data();
            }
            if inner.state != BufferState::Destroyed {
                inner.set_unmapped();
            }
        }

        let validation = {
            let inner = self.inner.lock();
            self.validate_unmap(&inner)
        };
        if let Err(err) = validation {
            self.device.consume_error(err, "unmap");
            return;
        }

        self.release_mapping(Release::Unmap);
    }

    fn validate_unmap(&self, inner: &BufferInner) -> Result<()> {
        self.device.validate_is_alive()?;
        self.validate_object()?;

        match inner.state {
            BufferState::Mapped | BufferState::MappedAtCreation => Ok(()),
            BufferState::Unmapped => Err(Error::NotMapped),
            BufferState::Destroyed => Err(Error::Destroyed),
        }
    }

    /// Drop the current mapping and end `Unmapped`
    ///
    /// The pending callback fires first with no lock held; the state is
    /// re-read afterwards since the callback may have unmapped, destroyed or
    /// remapped the buffer itself.
    fn release_mapping(&self, reason: Release) {
        let (id, callback) = {
            let mut inner = self.inner.lock();
            let callback = if inner.state == BufferState::Mapped {
                inner.callback.take()
            } else {
                None
            };
            (inner.last_map_id, callback)
        };
        if let Some(callback) = callback {
            self.deliver(callback, reason.callback_status());
        }

        let mut inner = self.inner.lock();
        if inner.last_map_id != id {
            return;
        }

        match inner.state {
            BufferState::Mapped => inner.backing.backend().unmap(),
            BufferState::MappedAtCreation => {
                if let Some(staging) = inner.staging.take() {
                    if reason == Release::Unmap {
                        self.copy_from_staging(&mut inner, staging);
                    }
                } else if self.size != 0 {
                    inner.backing.backend().unmap();
                }
            }
            BufferState::Unmapped | BufferState::Destroyed => return,
        }

        inner.set_unmapped();
        log::trace!("{}: unmapped", self.id);
    }

    /// Write staged creation data into the allocation and hand the staging
    /// block back to the device
    fn copy_from_staging(&self, inner: &mut BufferInner, staging: StagingBuffer) {
        let copied = self.device.copy_from_staging_to_buffer(
            &staging,
            0,
            inner.backing.backend(),
            0,
            self.allocated_size(),
        );

        match copied {
            Ok(()) => self.device.release_staging_buffer(staging),
            Err(err) => self.device.consume_error(err, "unmap"),
        }
    }

    /// Destroy the buffer
    ///
    /// A still-pending callback fires with `DestroyedBeforeCallback`, staged
    /// creation data is discarded and backend memory is released once.
    pub fn destroy(&self) {
        if self.is_error {
            let mut inner = self.inner.lock();
            if let Backing::Error(scratch) = &mut inner.backing {
                scratch.clear_mapped_data();
            }
            inner.state = BufferState::Destroyed;
            inner.window = None;
        }

        if let Err(err) = self.validate_object() {
            self.device.consume_error(err, "destroy");
            return;
        }

        self.destroy_internal();
    }

    /// Destroy without validation; also used on device teardown
    pub(crate) fn destroy_internal(&self) {
        if self.is_error {
            return;
        }

        // A callback may remap the buffer, so release until nothing is mapped
        while matches!(
            self.state(),
            BufferState::Mapped | BufferState::MappedAtCreation
        ) {
            self.release_mapping(Release::Destroy);
        }

        let mut inner = self.inner.lock();
        if inner.state != BufferState::Destroyed {
            inner.backing.backend().destroy();
            log::debug!("{}: destroyed", self.id);
        }
        inner.state = BufferState::Destroyed;
        inner.window = None;
        inner.staging = None;
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        let lost = self.device.is_lost();
        let inner = self.inner.get_mut();

        if inner.state == BufferState::Mapped {
            if let Some(callback) = inner.callback.take() {
                callback(if lost {
                    MapAsyncStatus::DeviceLost
                } else {
                    MapAsyncStatus::DestroyedBeforeCallback
                });
            }
        }

        if self.is_error || inner.state == BufferState::Destroyed {
            return;
        }

        let mapped_directly = match inner.state {
            BufferState::Mapped => true,
            BufferState::MappedAtCreation => inner.staging.is_none() && self.size != 0,
            BufferState::Unmapped | BufferState::Destroyed => false,
        };
        if mapped_directly {
            inner.backing.backend().unmap();
        }
        inner.staging = None;
        inner.backing.backend().destroy();
        inner.state = BufferState::Destroyed;
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("size", &self.size)
            .field("usage", &self.usage)
            .field("is_error", &self.is_error)
            .field("state", &self.inner.try_lock().map(|inner| inner.state))
            .finish()
    }
}

static_assertions::assert_impl_all!(Buffer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::host::{DirectMapping, HostBackend, HostBackendConfig, HostStatsHandle};
    use magma_core::{DeviceBackend, Serial};
    use std::vec;
    use std::vec::Vec;

    type Log = Arc<Mutex<Vec<MapAsyncStatus>>>;

    fn record(log: &Log) -> Option<MapCallback> {
        let log = log.clone();
        Some(Box::new(move |status| log.lock().push(status)))
    }

    fn setup(mapping: DirectMapping, toggles: Toggles) -> (Arc<Device>, HostStatsHandle) {
        let backend = HostBackend::new(HostBackendConfig::new(mapping));
        let stats = backend.stats_handle();
        let device = Device::new(Box::new(backend), DeviceConfig::new().toggles(toggles));
        (device, stats)
    }

    fn device() -> Arc<Device> {
        setup(
            DirectMapping::MappableUsageOnly,
            Toggles::LAZY_CLEAR_RESOURCE_ON_FIRST_USE,
        )
        .0
    }

    // =========================================================================
    // map_async
    // =========================================================================

    #[test]
    fn test_completed_map_covers_exact_range() {
        let device = device();
        for (offset, size) in [(0, 64), (0, 4), (8, 16), (16, 48), (56, 8), (64, 0), (24, 0)] {
            let buffer = device.create_buffer(&BufferDescriptor::readback(64));
            let log = Log::default();

            // Zero-length windows go through WHOLE_MAP_SIZE; a literal 0 means whole
            let request = if size == 0 { WHOLE_MAP_SIZE } else { size };
            let expected = if size == 0 { 64 - offset } else { size };
            buffer.map_async(MapMode::READ, offset, request, record(&log));
            device.tick();
            assert_eq!(*log.lock(), [MapAsyncStatus::Success]);
            assert_eq!(
                buffer.map_window(),
                Some(MapWindow {
                    mode: MapMode::READ,
                    offset,
                    size: expected,
                })
            );

            let start = buffer.get_const_mapped_range(offset, expected).unwrap();
            assert!(buffer.get_const_mapped_range(offset, expected + 4).is_none());
            if offset >= 8 {
                assert!(buffer.get_const_mapped_range(offset - 8, 4).is_none());
            }
            if expected >= 8 {
                let inner = buffer.get_const_mapped_range(offset + 8, expected - 8).unwrap();
                assert_eq!(inner as usize, start as usize + 8);
            }
        }
        assert!(device.take_errors().is_empty());
    }

    #[test]
    fn test_second_map_fails_already_mapped() {
        let device = device();
        let buffer = device.create_buffer(&BufferDescriptor::readback(16));
        let first = Log::default();
        let second = Log::default();

        buffer.map_async(MapMode::READ, 0, 16, record(&first));
        buffer.map_async(MapMode::READ, 0, 16, record(&second));
        assert_eq!(*second.lock(), [MapAsyncStatus::Error]);
        assert!(first.lock().is_empty());

        device.tick();
        assert_eq!(*first.lock(), [MapAsyncStatus::Success]);

        buffer.map_async(MapMode::READ, 0, 16, record(&second));
        assert_eq!(
            *second.lock(),
            [MapAsyncStatus::Error, MapAsyncStatus::Error]
        );
        assert_eq!(
            device.take_errors(),
            vec![Error::AlreadyMapped, Error::AlreadyMapped]
        );
    }

    #[test]
    fn test_unmap_before_completion() {
        let device = device();
        let buffer = device.create_buffer(&BufferDescriptor::upload(16));
        let log = Log::default();

        buffer.map_async(MapMode::WRITE, 0, 16, record(&log));
        buffer.unmap();
        assert_eq!(*log.lock(), [MapAsyncStatus::UnmappedBeforeCallback]);
        assert_eq!(buffer.state(), BufferState::Unmapped);
        assert_eq!(buffer.map_window(), None);

        device.tick();
        assert_eq!(log.lock().len(), 1);
        assert!(device.take_errors().is_empty());
    }

    #[test]
    fn test_destroy_while_mapped() {
        let device = device();
        let buffer = device.create_buffer(&BufferDescriptor::upload(16));
        let log = Log::default();

        buffer.map_async(MapMode::WRITE, 0, 16, record(&log));
        buffer.destroy();
        assert_eq!(*log.lock(), [MapAsyncStatus::DestroyedBeforeCallback]);
        assert_eq!(buffer.state(), BufferState::Destroyed);
        assert!(buffer.get_mapped_range(0, 16).is_none());
        assert!(buffer.get_const_mapped_range(0, 16).is_none());

        device.tick();
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_map_with_missing_usage_fails_synchronously() {
        let device = device();
        let buffer = device.create_buffer(&BufferDescriptor::readback(16));
        let log = Log::default();

        buffer.map_async(MapMode::WRITE, 0, 16, record(&log));
        assert_eq!(*log.lock(), [MapAsyncStatus::Error]);
        assert_eq!(buffer.state(), BufferState::Unmapped);
        assert_eq!(
            device.take_errors(),
            vec![Error::MissingMapUsage {
                usage: BufferUsage::MAP_READ | BufferUsage::COPY_DST,
                required: BufferUsage::MAP_WRITE,
            }]
        );
    }

    #[test]
    fn test_map_validation_order() {
        let device = device();
        let buffer = device.create_buffer(&BufferDescriptor::readback(16));
        let cases = [
            (MapMode::READ, 24, 4, Error::MapOffsetOutOfBounds { offset: 24, buffer_size: 16 }),
            (MapMode::READ, 4, 6, Error::MapOffsetUnaligned { offset: 4 }),
            (MapMode::READ, 0, 6, Error::MapSizeUnaligned { size: 6 }),
            (
                MapMode::READ,
                8,
                16,
                Error::MapRangeOutOfBounds { offset: 8, size: 16, buffer_size: 16 },
            ),
            (
                MapMode::READ | MapMode::WRITE,
                0,
                16,
                Error::InvalidMapMode { mode: MapMode::READ | MapMode::WRITE },
            ),
            (MapMode::empty(), 0, 16, Error::InvalidMapMode { mode: MapMode::empty() }),
        ];

        for (mode, offset, size, expected) in cases {
            let log = Log::default();
            buffer.map_async(mode, offset, size, record(&log));
            assert_eq!(*log.lock(), [MapAsyncStatus::Error]);
            assert_eq!(device.take_errors(), vec![expected]);
            assert_eq!(buffer.state(), BufferState::Unmapped);
        }

        buffer.destroy();
        let log = Log::default();
        buffer.map_async(MapMode::READ, 0, 16, record(&log));
        assert_eq!(*log.lock(), [MapAsyncStatus::Error]);
        assert_eq!(device.take_errors(), vec![Error::Destroyed]);
    }

    #[test]
    fn test_map_on_lost_device_reports_device_lost() {
        let device = device();
        let buffer = device.create_buffer(&BufferDescriptor::readback(16));
        device.lose();

        let log = Log::default();
        buffer.map_async(MapMode::READ, 0, 16, record(&log));
        assert_eq!(*log.lock(), [MapAsyncStatus::DeviceLost]);
        assert_eq!(device.take_errors(), vec![Error::DeviceLost]);
    }

    #[test]
    fn test_map_on_error_buffer_reports_error() {
        let device = device();
        let buffer = device.create_error_buffer(&BufferDescriptor::readback(16));

        let log = Log::default();
        buffer.map_async(MapMode::READ, 0, 16, record(&log));
        assert_eq!(*log.lock(), [MapAsyncStatus::Error]);
        assert_eq!(device.take_errors(), vec![Error::InvalidObject]);
    }

    #[test]
    fn test_size_zero_is_deprecated_whole_size() {
        let device = device();
        let buffer = device.create_buffer(&BufferDescriptor::readback(16));

        buffer.map_async(MapMode::READ, 8, 0, None);
        assert_eq!(device.deprecation_warning_count(), 1);
        assert_eq!(buffer.map_window().map(|w| (w.offset, w.size)), Some((8, 8)));
        buffer.unmap();

        buffer.map_async(MapMode::READ, 8, WHOLE_MAP_SIZE, None);
        assert_eq!(device.deprecation_warning_count(), 1);
        assert_eq!(buffer.map_window().map(|w| (w.offset, w.size)), Some((8, 8)));
    }

    #[test]
    fn test_device_lost_overrides_success() {
        let device = device();
        let buffer = device.create_buffer(&BufferDescriptor::readback(16));
        let log = Log::default();

        buffer.map_async(MapMode::READ, 0, 16, record(&log));
        device.lose();
        assert_eq!(*log.lock(), [MapAsyncStatus::DeviceLost]);

        // Pointers stay queryable after loss
        assert!(buffer.get_const_mapped_range(0, 16).is_some());
    }

    #[test]
    fn test_callback_may_unmap_reentrantly() {
        let (device, stats) = setup(DirectMapping::MappableUsageOnly, Toggles::empty());
        let buffer = device.create_buffer(&BufferDescriptor::readback(16));
        let log = Log::default();

        let this = buffer.clone();
        let sink = log.clone();
        buffer.map_async(
            MapMode::READ,
            0,
            16,
            Some(Box::new(move |status| {
                sink.lock().push(status);
                this.unmap();
            })),
        );
        device.tick();

        assert_eq!(*log.lock(), [MapAsyncStatus::Success]);
        assert_eq!(buffer.state(), BufferState::Unmapped);
        assert_eq!(stats.get().unmaps, 1);
        assert!(device.take_errors().is_empty());
    }

    #[test]
    fn test_unmap_inside_unmap_callback_unmaps_once() {
        let (device, stats) = setup(DirectMapping::MappableUsageOnly, Toggles::empty());
        let buffer = device.create_buffer(&BufferDescriptor::readback(16));
        let log = Log::default();

        let this = buffer.clone();
        let sink = log.clone();
        buffer.map_async(
            MapMode::READ,
            0,
            16,
            Some(Box::new(move |status| {
                sink.lock().push(status);
                this.unmap();
            })),
        );
        buffer.unmap();

        assert_eq!(*log.lock(), [MapAsyncStatus::UnmappedBeforeCallback]);
        assert_eq!(buffer.state(), BufferState::Unmapped);
        assert_eq!(stats.get().unmaps, 1);
        assert!(device.take_errors().is_empty());
    }

    #[test]
    fn test_callback_may_remap_during_destroy() {
        let device = device();
        let buffer = device.create_buffer(&BufferDescriptor::readback(16));
        let first = Log::default();
        let second = Log::default();

        let this = buffer.clone();
        let sink = first.clone();
        let next = record(&second);
        buffer.map_async(
            MapMode::READ,
            0,
            16,
            Some(Box::new(move |status| {
                sink.lock().push(status);
                this.unmap();
                this.map_async(MapMode::READ, 0, 16, next);
            })),
        );
        buffer.destroy();

        assert_eq!(*first.lock(), [MapAsyncStatus::DestroyedBeforeCallback]);
        assert_eq!(*second.lock(), [MapAsyncStatus::DestroyedBeforeCallback]);
        assert_eq!(buffer.state(), BufferState::Destroyed);

        device.tick();
        assert_eq!(second.lock().len(), 1);
    }

    // =========================================================================
    // Mapped ranges
    // =========================================================================

    #[test]
    fn test_mapped_range_window_boundaries() {
        let device = device();
        let buffer = device.create_buffer(&BufferDescriptor::upload(32));
        buffer.map_async(MapMode::WRITE, 8, 16, None);
        device.tick();

        assert!(buffer.get_mapped_range(8, 16).is_some());
        assert!(buffer.get_mapped_range(16, 8).is_some());
        assert!(buffer.get_mapped_range(16, 12).is_none());
        assert!(buffer.get_mapped_range(0, 8).is_none());
        assert!(buffer.get_mapped_range(8, 20).is_none());
        assert!(buffer.get_mapped_range(12, 4).is_none());
        assert!(buffer.get_mapped_range(8, 6).is_none());
    }

    #[test]
    fn test_read_mapping_is_not_writable() {
        let device = device();
        let buffer = device.create_buffer(&BufferDescriptor::readback(16));
        buffer.map_async(MapMode::READ, 0, 16, None);
        device.tick();

        assert!(buffer.get_mapped_range(0, 16).is_none());
        assert!(buffer.get_const_mapped_range(0, 16).is_some());
    }

    #[test]
    fn test_no_range_while_unmapped() {
        let device = device();
        let buffer = device.create_buffer(&BufferDescriptor::upload(16));
        assert!(buffer.get_mapped_range(0, 16).is_none());
        assert!(buffer.get_const_mapped_range(0, 0).is_none());
    }

    // =========================================================================
    // Mapped at creation
    // =========================================================================

    #[test]
    fn test_zero_size_mapped_at_creation() {
        let (device, stats) = setup(DirectMapping::Never, Toggles::LAZY_CLEAR_RESOURCE_ON_FIRST_USE);
        let buffer = device.create_buffer(&BufferDescriptor::upload(0).mapped_at_creation(true));

        assert!(!buffer.is_error());
        assert_eq!(buffer.state(), BufferState::MappedAtCreation);
        assert_eq!(device.lazy_clear_count_for_testing(), 0);
        assert_eq!(stats.get().maps, 0);

        let ptr = buffer.get_mapped_range(0, 0).unwrap();
        assert_eq!(ptr.as_ptr() as usize, ZERO_SIZED_MAPPING);

        buffer.unmap();
        assert_eq!(buffer.state(), BufferState::Unmapped);
        assert_eq!(stats.get().unmaps, 0);
        assert_eq!(stats.get().staging_writes, 0);
    }

    #[test]
    fn test_direct_mapping_at_creation() {
        let (device, stats) = setup(DirectMapping::MappableUsageOnly, Toggles::empty());
        let buffer = device.create_buffer(&BufferDescriptor::upload(16).mapped_at_creation(true));

        assert_eq!(buffer.state(), BufferState::MappedAtCreation);
        assert_eq!(
            buffer.map_window(),
            Some(MapWindow { mode: MapMode::WRITE, offset: 0, size: 16 })
        );
        assert!(buffer.get_mapped_range(0, 16).is_some());
        assert_eq!(stats.get().maps, 1);

        buffer.unmap();
        assert_eq!(stats.get().unmaps, 1);
        assert_eq!(stats.get().staging_writes, 0);
    }

    #[test]
    fn test_staging_copy_back_on_unmap() {
        let (device, stats) = setup(DirectMapping::Never, Toggles::empty());
        let buffer = device.create_buffer(&BufferDescriptor::readback(16).mapped_at_creation(true));

        let ptr = buffer.get_mapped_range(0, 16).unwrap();
        // SAFETY: the range is mapped and 16 bytes long
        let bytes = unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), 16) };
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }

        buffer.unmap();
        assert_eq!(stats.get().staging_writes, 1);
        assert_eq!(buffer.state(), BufferState::Unmapped);

        buffer.map_async(MapMode::READ, 0, 16, None);
        device.tick();
        let ptr = buffer.get_const_mapped_range(0, 16).unwrap();
        // SAFETY: the range is mapped and 16 bytes long
        let bytes = unsafe { slice::from_raw_parts(ptr, 16) };
        assert_eq!(bytes, &(0u8..16).collect::<Vec<_>>()[..]);
    }

    #[test]
    fn test_staging_released_to_pool_on_unmap() {
        let (device, _) = setup(DirectMapping::Never, Toggles::empty());
        let buffer = device.create_buffer(&BufferDescriptor::new(16, BufferUsage::VERTEX).mapped_at_creation(true));
        buffer.unmap();
        assert!(device.take_errors().is_empty());

        device.tick();
        let again = device.create_buffer(&BufferDescriptor::new(16, BufferUsage::VERTEX).mapped_at_creation(true));
        assert!(!again.is_error());
        assert!(device.take_errors().is_empty());
    }

    #[test]
    fn test_lazy_clear_at_creation() {
        let (device, _) = setup(DirectMapping::Always, Toggles::LAZY_CLEAR_RESOURCE_ON_FIRST_USE);
        let buffer = device.create_buffer(&BufferDescriptor::new(16, BufferUsage::STORAGE).mapped_at_creation(true));

        assert!(buffer.is_data_initialized());
        assert_eq!(device.lazy_clear_count_for_testing(), 1);
        let ptr = buffer.get_const_mapped_range(0, 16).unwrap();
        // SAFETY: the range is mapped and 16 bytes long
        assert!(unsafe { slice::from_raw_parts(ptr, 16) }.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_nonzero_clear_at_creation() {
        let toggles = Toggles::NONZERO_CLEAR_RESOURCES_ON_CREATION_FOR_TESTING;
        let (device, _) = setup(DirectMapping::Never, toggles);
        let buffer = device.create_buffer(&BufferDescriptor::new(12, BufferUsage::STORAGE).mapped_at_creation(true));

        assert!(!buffer.is_data_initialized());
        assert_eq!(device.lazy_clear_count_for_testing(), 0);
        let ptr = buffer.get_const_mapped_range(0, 12).unwrap();
        // SAFETY: the range is mapped and 12 bytes long
        assert!(unsafe { slice::from_raw_parts(ptr, 12) }.iter().all(|&b| b == 1));
    }

    #[test]
    fn test_map_while_mapped_at_creation_fails() {
        let device = device();
        let buffer = device.create_buffer(&BufferDescriptor::upload(16).mapped_at_creation(true));
        let log = Log::default();

        buffer.map_async(MapMode::WRITE, 0, 16, record(&log));
        assert_eq!(*log.lock(), [MapAsyncStatus::Error]);
        assert_eq!(device.take_errors(), vec![Error::AlreadyMapped]);
        assert_eq!(buffer.state(), BufferState::MappedAtCreation);
        assert!(buffer.get_mapped_range(0, 16).is_some());
    }

    #[test]
    fn test_destroy_direct_mapped_at_creation_unmaps() {
        let (device, stats) = setup(DirectMapping::MappableUsageOnly, Toggles::empty());
        let buffer = device.create_buffer(&BufferDescriptor::upload(16).mapped_at_creation(true));
        assert_eq!(stats.get().maps, 1);

        buffer.destroy();
        assert_eq!(buffer.state(), BufferState::Destroyed);
        assert_eq!(buffer.map_window(), None);
        assert_eq!(stats.get().unmaps, 1);
        assert_eq!(stats.get().destroyed, 1);
        assert_eq!(stats.get().staging_writes, 0);
        assert!(device.take_errors().is_empty());
    }

    #[test]
    fn test_destroy_discards_staging() {
        let (device, stats) = setup(DirectMapping::Never, Toggles::empty());
        let buffer = device.create_buffer(&BufferDescriptor::upload(16).mapped_at_creation(true));

        buffer.destroy();
        assert_eq!(buffer.state(), BufferState::Destroyed);
        assert_eq!(stats.get().staging_writes, 0);
        assert_eq!(stats.get().destroyed, 1);

        buffer.destroy();
        assert_eq!(stats.get().destroyed, 1);
        assert!(device.take_errors().is_empty());
    }

    // =========================================================================
    // Error buffers
    // =========================================================================

    #[test]
    fn test_error_buffer_honors_mapped_at_creation() {
        let device = device();
        let usage = BufferUsage::MAP_WRITE | BufferUsage::VERTEX;
        let buffer = device.create_buffer(&BufferDescriptor::new(16, usage).mapped_at_creation(true));

        assert!(buffer.is_error());
        assert_eq!(buffer.state(), BufferState::MappedAtCreation);
        let ptr = buffer.get_mapped_range(0, 16).unwrap();
        // SAFETY: the scratch region is 16 bytes
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0x5A, 16) };

        buffer.unmap();
        assert_eq!(buffer.state(), BufferState::Unmapped);
        assert!(buffer.get_mapped_range(0, 16).is_none());
        assert_eq!(
            device.take_errors(),
            vec![Error::InvalidMapWriteUsage { usage }, Error::InvalidObject]
        );
    }

    #[test]
    fn test_error_buffer_destroy_releases_scratch() {
        let device = device();
        let buffer = device.create_error_buffer(&BufferDescriptor::upload(8).mapped_at_creation(true));
        assert!(buffer.get_mapped_range(0, 8).is_some());

        buffer.destroy();
        assert_eq!(buffer.state(), BufferState::Destroyed);
        assert!(buffer.get_mapped_range(0, 8).is_none());
        assert_eq!(device.take_errors(), vec![Error::InvalidObject]);

        buffer.unmap();
        assert_eq!(buffer.state(), BufferState::Destroyed);
    }

    #[test]
    fn test_error_buffer_reports_descriptor() {
        let device = device();
        let buffer = device.create_error_buffer(&BufferDescriptor::readback(24).label("broken"));
        assert_eq!(buffer.size(), 24);
        assert_eq!(buffer.usage(), BufferUsage::MAP_READ | BufferUsage::COPY_DST);
        assert_eq!(buffer.label(), Some("broken"));
        assert_eq!(buffer.state(), BufferState::Unmapped);
    }

    #[test]
    #[should_panic]
    fn test_error_buffer_has_no_allocated_size() {
        let device = device();
        let buffer = device.create_error_buffer(&BufferDescriptor::upload(16));
        buffer.allocated_size();
    }

    // =========================================================================
    // Unmap validation and queue use
    // =========================================================================

    #[test]
    fn test_unmap_validation() {
        let device = device();
        let buffer = device.create_buffer(&BufferDescriptor::upload(16));

        buffer.unmap();
        assert_eq!(device.take_errors(), vec![Error::NotMapped]);

        buffer.destroy();
        buffer.unmap();
        assert_eq!(device.take_errors(), vec![Error::Destroyed]);

        let other = device.create_buffer(&BufferDescriptor::upload(16));
        other.map_async(MapMode::WRITE, 0, 16, None);
        device.lose();
        other.unmap();
        assert_eq!(device.take_errors(), vec![Error::DeviceLost]);
        assert_eq!(other.state(), BufferState::Mapped);
    }

    #[test]
    fn test_validate_can_use_on_queue_now() {
        let device = device();
        let buffer = device.create_buffer(&BufferDescriptor::upload(16).mapped_at_creation(true));
        assert_eq!(buffer.validate_can_use_on_queue_now(), Err(Error::UsedWhileMapped));

        buffer.unmap();
        assert_eq!(buffer.validate_can_use_on_queue_now(), Ok(()));

        buffer.destroy();
        assert_eq!(
            buffer.validate_can_use_on_queue_now(),
            Err(Error::UsedWhileDestroyed)
        );
    }

    #[test]
    fn test_full_buffer_range_and_initialization() {
        let device = device();
        let buffer = device.create_buffer(&BufferDescriptor::new(16, BufferUsage::COPY_DST));
        assert!(buffer.is_full_buffer_range(0, 16));
        assert!(!buffer.is_full_buffer_range(0, 8));
        assert!(!buffer.is_full_buffer_range(8, 8));

        assert!(!buffer.is_data_initialized());
        buffer.set_is_data_initialized();
        assert!(buffer.is_data_initialized());
        assert_eq!(buffer.allocated_size(), 16);
    }

    // =========================================================================
    // Backend failure and drop
    // =========================================================================

    #[derive(Debug)]
    struct FailingMapBackend;

    #[derive(Debug)]
    struct FailingMapBuffer;

    impl BufferBackend for FailingMapBuffer {
        fn allocated_size(&self) -> u64 {
            16
        }

        fn is_cpu_writable_at_creation(&self) -> bool {
            true
        }

        fn map_at_creation(&mut self) -> Result<()> {
            Err(Error::MappingFailed)
        }

        fn map_async(&mut self, _mode: MapMode, _offset: u64, _size: u64) -> Result<()> {
            Err(Error::MappingFailed)
        }

        fn mapped_pointer(&mut self) -> Option<NonNull<u8>> {
            None
        }

        fn unmap(&mut self) {}

        fn destroy(&mut self) {}

        fn write_from_staging(&mut self, _src: &[u8], _dst_offset: u64) -> Result<()> {
            Ok(())
        }
    }

    impl DeviceBackend for FailingMapBackend {
        fn create_buffer(&self, _desc: &BufferDescriptor) -> Result<Box<dyn BufferBackend>> {
            Ok(Box::new(FailingMapBuffer))
        }

        fn poll_completed_serial(&self, last_submitted: Serial) -> Serial {
            last_submitted
        }
    }

    #[test]
    fn test_backend_map_failure_rolls_back() {
        let device = Device::new(Box::new(FailingMapBackend), DeviceConfig::default());
        let buffer = device.create_buffer(&BufferDescriptor::readback(16));
        let log = Log::default();

        buffer.map_async(MapMode::READ, 0, 16, record(&log));
        assert_eq!(*log.lock(), [MapAsyncStatus::DeviceLost]);
        assert_eq!(buffer.state(), BufferState::Unmapped);
        assert_eq!(device.take_errors(), vec![Error::MappingFailed]);

        device.tick();
        assert_eq!(log.lock().len(), 1);
        assert_eq!(device.completed_serial(), Serial::ZERO);
    }

    #[test]
    fn test_failed_map_at_creation_yields_error_buffer() {
        let device = Device::new(Box::new(FailingMapBackend), DeviceConfig::default());
        let buffer = device.create_buffer(&BufferDescriptor::upload(16).mapped_at_creation(true));

        assert!(buffer.is_error());
        assert_eq!(buffer.state(), BufferState::MappedAtCreation);
        assert!(buffer.get_mapped_range(0, 16).is_some());
        assert_eq!(device.take_errors(), vec![Error::MappingFailed]);
    }

    #[test]
    fn test_drop_releases_backend_once() {
        let (device, stats) = setup(DirectMapping::MappableUsageOnly, Toggles::empty());

        let buffer = device.create_buffer(&BufferDescriptor::readback(16));
        buffer.map_async(MapMode::READ, 0, 16, None);
        device.tick();
        drop(buffer);
        assert_eq!(stats.get().unmaps, 1);
        assert_eq!(stats.get().destroyed, 1);

        let buffer = device.create_buffer(&BufferDescriptor::upload(16));
        buffer.destroy();
        drop(buffer);
        assert_eq!(stats.get().destroyed, 2);
    }

    #[test]
    fn test_dropping_handles_with_pending_map() {
        let (device, stats) = setup(DirectMapping::MappableUsageOnly, Toggles::empty());
        let buffer = device.create_buffer(&BufferDescriptor::readback(16));
        let log = Log::default();

        buffer.map_async(MapMode::READ, 0, 16, record(&log));
        let weak_buffer = Arc::downgrade(&buffer);
        let weak_device = Arc::downgrade(&device);

        drop(buffer);
        assert_eq!(*log.lock(), [MapAsyncStatus::DestroyedBeforeCallback]);
        assert_eq!(weak_buffer.strong_count(), 0);
        assert_eq!(stats.get().unmaps, 1);
        assert_eq!(stats.get().destroyed, 1);

        // The queued task outlives the buffer and resolves nothing
        device.tick();
        assert_eq!(log.lock().len(), 1);

        drop(device);
        assert_eq!(weak_device.strong_count(), 0);
    }

    #[test]
    fn test_dropping_device_first_with_pending_map() {
        let (device, stats) = setup(DirectMapping::MappableUsageOnly, Toggles::empty());
        let buffer = device.create_buffer(&BufferDescriptor::readback(16));
        let log = Log::default();

        buffer.map_async(MapMode::READ, 0, 16, record(&log));
        let weak_device = Arc::downgrade(&device);

        drop(device);
        assert_eq!(weak_device.strong_count(), 1);
        assert!(log.lock().is_empty());

        drop(buffer);
        assert_eq!(*log.lock(), [MapAsyncStatus::DestroyedBeforeCallback]);
        assert_eq!(weak_device.strong_count(), 0);
        assert_eq!(stats.get().destroyed, 1);
    }
}
