//! Deferred-turn scheduler
//!
//! Single-threaded cooperative scheduling as an explicit task queue.
//! "Defer to the next turn" replaces the implicit next-tick of an event
//! loop, so delivery ordering is deterministic and directly testable.
//!
//! A turn runs exactly the tasks that were queued before the turn started;
//! tasks deferred from within a running task execute in a later turn.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

type Task = Box<dyn FnOnce() + Send>;

struct DeferredTask {
    debug_hint: String,
    task: Task,
}

struct SchedulerState {
    queue: VecDeque<DeferredTask>,
}

/// Handle to a shared deferred-task queue.
///
/// Cloning yields another handle to the same queue. Producers and consumers
/// created against the same scheduler share one timeline of turns.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Mutex<SchedulerState>>,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SchedulerState {
                queue: VecDeque::new(),
            })),
        }
    }

    /// Queue a task for a later turn
    pub fn defer(&self, debug_hint: &str, task: impl FnOnce() + Send + 'static) {
        tracing::trace!(hint = debug_hint, "scheduler.defer");
        let mut state = self.inner.lock();
        state.queue.push_back(DeferredTask {
            debug_hint: debug_hint.to_string(),
            task: Box::new(task),
        });
    }

    /// Number of tasks waiting for a future turn
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Whether no tasks are waiting
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    /// Run one turn.
    ///
    /// Executes exactly the tasks queued before this call, in queue order.
    /// Tasks deferred during the turn stay queued for a later turn.
    /// Returns the number of tasks executed.
    pub fn run_turn(&self) -> usize {
        let batch: Vec<DeferredTask> = {
            let mut state = self.inner.lock();
            state.queue.drain(..).collect()
        };

        let count = batch.len();
        for deferred in batch {
            tracing::trace!(hint = %deferred.debug_hint, "scheduler.run task");
            (deferred.task)();
        }
        count
    }

    /// Run turns until no tasks remain.
    ///
    /// Returns the total number of tasks executed. Terminates as soon as a
    /// turn ends with an empty queue, so it only runs forever if the tasks
    /// themselves re-defer unconditionally.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.run_turn();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scheduler(pending={})", self.pending())
    }
}
