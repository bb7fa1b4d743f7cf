//! # Device
//!
//! Owns the backend, the submission timeline, staging memory and the error
//! log that buffers report into.

use alloc::boxed::Box;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use spin::Mutex;

use magma_cmd::{CompletionQueue, TaskInFlight};
use magma_core::{
    BufferBackend, BufferDescriptor, BufferId, ByteSize, DeviceBackend, Error, Result, Serial,
};
use magma_mem::{StagingBuffer, StagingPool};

use crate::buffer::Buffer;
use crate::config::{DeviceConfig, Toggles};
use crate::descriptor::{implied_usage, validate_buffer_descriptor};

/// A logical GPU device
pub struct Device {
    backend: Box<dyn DeviceBackend>,
    toggles: Toggles,
    lost: AtomicBool,
    queue: Mutex<CompletionQueue>,
    staging: Mutex<StagingPool>,
    /// Consumed errors, oldest first
    errors: Mutex<Vec<Error>>,
    /// Live buffers, destroyed on device teardown
    buffers: Mutex<Vec<Weak<Buffer>>>,
    next_buffer_id: AtomicU64,
    deprecation_warnings: AtomicU64,
    lazy_clears: AtomicU64,
}

impl Device {
    /// Create a device over `backend`
    pub fn new(backend: Box<dyn DeviceBackend>, config: DeviceConfig) -> Arc<Self> {
        log::debug!("device: created with toggles {:?}", config.toggles);
        Arc::new(Self {
            backend,
            toggles: config.toggles,
            lost: AtomicBool::new(false),
            queue: Mutex::new(CompletionQueue::new()),
            staging: Mutex::new(StagingPool::new(config.staging)),
            errors: Mutex::new(Vec::new()),
            buffers: Mutex::new(Vec::new()),
            next_buffer_id: AtomicU64::new(1),
            deprecation_warnings: AtomicU64::new(0),
            lazy_clears: AtomicU64::new(0),
        })
    }

    // =========================================================================
    // Buffer creation
    // =========================================================================

    /// Create a buffer
    ///
    /// Never fails: any validation or allocation error is consumed and an
    /// error buffer is returned instead.
    pub fn create_buffer(self: &Arc<Self>, desc: &BufferDescriptor) -> Arc<Buffer> {
        match self.try_create_buffer(desc) {
            Ok(buffer) => {
                let mut buffers = self.buffers.lock();
                buffers.retain(|b| b.strong_count() > 0);
                buffers.push(Arc::downgrade(&buffer));
                buffer
            }
            Err(err) => {
                self.consume_error(err, "create_buffer");
                self.create_error_buffer(desc)
            }
        }
    }

    fn try_create_buffer(self: &Arc<Self>, desc: &BufferDescriptor) -> Result<Arc<Buffer>> {
        self.validate_is_alive()?;
        if self.is_validation_enabled() {
            validate_buffer_descriptor(desc)?;
        }

        let mut internal = desc.clone();
        internal.usage = implied_usage(desc.usage, self.is_validation_enabled());
        let backend = self.backend.create_buffer(&internal)?;

        let buffer = Arc::new(Buffer::new(
            self.clone(),
            self.next_buffer_id(),
            &internal,
            backend,
        ));

        if desc.mapped_at_creation {
            // A failed buffer is dropped here, which releases its backend
            buffer.map_at_creation()?;
        }

        Ok(buffer)
    }

    /// Create an error buffer for a descriptor that failed
    pub fn create_error_buffer(self: &Arc<Self>, desc: &BufferDescriptor) -> Arc<Buffer> {
        Arc::new(Buffer::new_error(self.clone(), self.next_buffer_id(), desc))
    }

    fn next_buffer_id(&self) -> BufferId {
        BufferId::new(self.next_buffer_id.fetch_add(1, Ordering::Relaxed))
    }

    // =========================================================================
    // Liveness
    // =========================================================================

    /// Check if the device can still accept work
    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.is_lost()
    }

    /// Check if the device was lost or destroyed
    #[inline]
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Fail with [`Error::DeviceLost`] if the device is lost
    pub fn validate_is_alive(&self) -> Result<()> {
        if self.is_lost() {
            return Err(Error::DeviceLost);
        }
        Ok(())
    }

    /// Lose the device
    ///
    /// Every tracked task is resolved through its device-loss path and
    /// staging memory is released.
    pub fn lose(&self) {
        if !self.lost.swap(true, Ordering::AcqRel) {
            log::error!("device: lost");
        }

        let drained = self.queue.lock().drain();
        self.staging.lock().clear();

        for task in drained {
            task.handle_device_loss();
        }
    }

    /// Tear the device down
    ///
    /// Live buffers are destroyed first, so their pending callbacks see
    /// `DestroyedBeforeCallback`. The device is then lost.
    pub fn destroy(&self) {
        let live: Vec<Arc<Buffer>> = self
            .buffers
            .lock()
            .drain(..)
            .filter_map(|b| b.upgrade())
            .collect();

        log::debug!("device: destroying {} live buffers", live.len());
        for buffer in live {
            buffer.destroy_internal();
        }

        self.lose();
    }

    // =========================================================================
    // Toggles
    // =========================================================================

    /// Check if a toggle is enabled
    #[inline]
    pub fn is_toggle_enabled(&self, toggle: Toggles) -> bool {
        self.toggles.contains(toggle)
    }

    /// Check if validation is active
    #[inline]
    pub fn is_validation_enabled(&self) -> bool {
        !self.is_toggle_enabled(Toggles::SKIP_VALIDATION)
    }

    // =========================================================================
    // Submission timeline
    // =========================================================================

    /// Serial the next submission will carry
    pub fn pending_command_serial(&self) -> Serial {
        self.queue.lock().pending_serial()
    }

    /// Last submitted serial
    pub fn last_submitted_serial(&self) -> Serial {
        self.queue.lock().last_submitted()
    }

    /// Last completed serial
    pub fn completed_serial(&self) -> Serial {
        self.queue.lock().completed()
    }

    /// Submit the pending serial
    pub fn submit(&self) -> Serial {
        self.queue.lock().submit()
    }

    /// Attach `task` to `serial`
    ///
    /// On a lost device the task is resolved through its device-loss path
    /// immediately.
    pub fn track_task(&self, task: Box<dyn TaskInFlight>, serial: Serial) {
        if self.is_lost() {
            task.handle_device_loss();
            return;
        }
        self.queue.lock().track_task(task, serial);
    }

    /// Flush pending work, advance the completed serial and run every task
    /// that became ready, in order
    pub fn tick(&self) {
        if self.is_lost() {
            return;
        }

        let (completed, ready) = {
            let mut queue = self.queue.lock();
            // Staging released since the last submission waits on the pending serial
            let needs_submit = queue.has_unsubmitted_tasks()
                || (self.staging.lock().in_flight_count() > 0
                    && queue.completed() == queue.last_submitted());
            if needs_submit {
                queue.submit();
            }
            let completed = self.backend.poll_completed_serial(queue.last_submitted());
            let ready = queue.complete_through(completed);
            (queue.completed(), ready)
        };

        self.staging.lock().reclaim(completed);

        for task in ready {
            task.finish();
        }
    }

    // =========================================================================
    // Staging
    // =========================================================================

    /// Get a staging block of `size` bytes
    pub fn create_staging_buffer(&self, size: u64) -> Result<StagingBuffer> {
        self.staging.lock().allocate(size)
    }

    /// Copy `size` bytes from `staging` at `src_offset` into `dst` at
    /// `dst_offset`
    pub fn copy_from_staging_to_buffer(
        &self,
        staging: &StagingBuffer,
        src_offset: u64,
        dst: &mut dyn BufferBackend,
        dst_offset: u64,
        size: u64,
    ) -> Result<()> {
        let out_of_bounds = Error::CopyOutOfBounds {
            offset: src_offset,
            size,
        };
        let end = src_offset
            .checked_add(size)
            .filter(|&end| end <= staging.size())
            .ok_or(out_of_bounds)?;

        let src = &staging.as_slice()[src_offset as usize..end as usize];
        dst.write_from_staging(src, dst_offset)?;

        log::trace!("device: staged {} into buffer", ByteSize::from_bytes(size));
        Ok(())
    }

    /// Return a staging block; it is reused once the pending serial completes
    pub fn release_staging_buffer(&self, staging: StagingBuffer) {
        let serial = self.pending_command_serial();
        self.staging.lock().release(staging, serial);
    }

    // =========================================================================
    // Errors and diagnostics
    // =========================================================================

    /// Log `error` and append it to the error log
    pub(crate) fn consume_error(&self, error: Error, context: &str) {
        log::warn!("{}: {}", context, error);
        self.errors.lock().push(error);
    }

    /// Take every consumed error, oldest first
    pub fn take_errors(&self) -> Vec<Error> {
        core::mem::take(&mut *self.errors.lock())
    }

    /// Log a deprecation notice
    pub fn emit_deprecation_warning(&self, message: &str) {
        self.deprecation_warnings.fetch_add(1, Ordering::Relaxed);
        log::warn!("deprecated: {}", message);
    }

    /// Number of deprecation notices emitted
    pub fn deprecation_warning_count(&self) -> u64 {
        self.deprecation_warnings.load(Ordering::Relaxed)
    }

    pub(crate) fn increment_lazy_clear_count_for_testing(&self) {
        self.lazy_clears.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of lazy clears performed
    pub fn lazy_clear_count_for_testing(&self) -> u64 {
        self.lazy_clears.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("toggles", &self.toggles)
            .field("lost", &self.is_lost())
            .field("queue", &*self.queue.lock())
            .field("errors", &self.errors.lock().len())
            .finish()
    }
}

static_assertions::assert_impl_all!(Device: Send, Sync);
