//! # Map Request Task
//!
//! Completion work queued by `Buffer::map_async`.

use alloc::boxed::Box;
use alloc::sync::{Arc, Weak};

use magma_cmd::TaskInFlight;
use magma_core::{MapAsyncStatus, MapRequestId};

use crate::buffer::Buffer;

/// Resolves one map request when its serial completes
///
/// Holds a weak reference: the device owns the queue and every buffer owns
/// the device. A buffer dropped with a request pending resolves it itself.
#[derive(Debug)]
pub struct MapRequestTask {
    buffer: Weak<Buffer>,
    id: MapRequestId,
}

impl MapRequestTask {
    /// Create a task for request `id` on `buffer`
    pub fn new(buffer: &Arc<Buffer>, id: MapRequestId) -> Self {
        Self {
            buffer: Arc::downgrade(buffer),
            id,
        }
    }

    fn complete(self, status: MapAsyncStatus) {
        match self.buffer.upgrade() {
            Some(buffer) => buffer.on_map_request_completed(self.id, status),
            None => log::trace!("map task {:?}: buffer already dropped", self.id),
        }
    }

    /// Request this task resolves
    pub fn id(&self) -> MapRequestId {
        self.id
    }
}

impl TaskInFlight for MapRequestTask {
    fn finish(self: Box<Self>) {
        self.complete(MapAsyncStatus::Success);
    }

    fn handle_device_loss(self: Box<Self>) {
        self.complete(MapAsyncStatus::DeviceLost);
    }
}
