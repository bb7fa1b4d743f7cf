//! # Completion Queue
//!
//! Serial timeline with tasks that run once their serial completes.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::fmt;

use magma_core::Serial;

// =============================================================================
// TASK IN FLIGHT
// =============================================================================

/// Deferred work bound to a submission serial
///
/// Exactly one of the two methods is called, exactly once.
pub trait TaskInFlight: Send {
    /// The serial completed normally
    fn finish(self: Box<Self>);

    /// The device was lost before the serial completed
    fn handle_device_loss(self: Box<Self>);
}

// =============================================================================
// COMPLETION QUEUE
// =============================================================================

/// A task waiting on a serial
struct TrackedTask {
    serial: Serial,
    task: Box<dyn TaskInFlight>,
}

/// Queue statistics
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    /// Total submissions
    pub submissions: u64,
    /// Total tasks tracked
    pub tasks_tracked: u64,
    /// Tasks released by normal completion
    pub tasks_completed: u64,
    /// Tasks released by a device-loss drain
    pub tasks_drained: u64,
}

/// Submission timeline with completion tasks
///
/// The queue never runs tasks itself: ready tasks are handed back so the
/// caller can invoke them after releasing any lock around the queue.
pub struct CompletionQueue {
    /// Tasks ordered by serial, FIFO within a serial
    tasks: VecDeque<TrackedTask>,
    /// Last submitted serial
    last_submitted: Serial,
    /// Last completed serial
    completed: Serial,
    /// Statistics
    stats: QueueStats,
}

impl CompletionQueue {
    /// Create an empty queue with nothing submitted
    pub fn new() -> Self {
        Self {
            tasks: VecDeque::new(),
            last_submitted: Serial::ZERO,
            completed: Serial::ZERO,
            stats: QueueStats::default(),
        }
    }

    /// Serial the next submission will carry
    #[inline]
    pub fn pending_serial(&self) -> Serial {
        self.last_submitted.next()
    }

    /// Last submitted serial
    #[inline]
    pub fn last_submitted(&self) -> Serial {
        self.last_submitted
    }

    /// Last completed serial
    #[inline]
    pub fn completed(&self) -> Serial {
        self.completed
    }

    /// Check if any task is waiting
    #[inline]
    pub fn has_pending_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Number of waiting tasks
    #[inline]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Check if a task is waiting on the not yet submitted serial
    pub fn has_unsubmitted_tasks(&self) -> bool {
        self.tasks
            .back()
            .is_some_and(|t| t.serial > self.last_submitted)
    }

    /// Attach `task` to `serial`
    pub fn track_task(&mut self, task: Box<dyn TaskInFlight>, serial: Serial) {
        let index = self.tasks.partition_point(|t| t.serial <= serial);
        self.tasks.insert(index, TrackedTask { serial, task });
        self.stats.tasks_tracked += 1;
    }

    /// Submit the pending serial
    pub fn submit(&mut self) -> Serial {
        self.last_submitted = self.last_submitted.next();
        self.stats.submissions += 1;
        log::debug!("queue: submitted {}", self.last_submitted);
        self.last_submitted
    }

    /// Advance the completed serial and return the tasks now ready
    ///
    /// The completed serial never passes the last submitted serial and never
    /// moves backwards.
    pub fn complete_through(&mut self, serial: Serial) -> Vec<Box<dyn TaskInFlight>> {
        let serial = serial.min(self.last_submitted);
        if serial > self.completed {
            self.completed = serial;
            log::debug!("queue: completed through {}", serial);
        }

        let mut ready = Vec::new();
        while self
            .tasks
            .front()
            .is_some_and(|t| t.serial <= self.completed)
        {
            if let Some(tracked) = self.tasks.pop_front() {
                ready.push(tracked.task);
            }
        }
        self.stats.tasks_completed += ready.len() as u64;
        ready
    }

    /// Remove every task regardless of serial, in order
    pub fn drain(&mut self) -> Vec<Box<dyn TaskInFlight>> {
        let drained: Vec<_> = self.tasks.drain(..).map(|t| t.task).collect();
        self.stats.tasks_drained += drained.len() as u64;
        drained
    }

    /// Get queue statistics
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

impl Default for CompletionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompletionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionQueue")
            .field("tasks", &self.tasks.len())
            .field("last_submitted", &self.last_submitted)
            .field("completed", &self.completed)
            .field("stats", &self.stats)
            .finish()
    }
}

static_assertions::assert_impl_all!(CompletionQueue: Send);
