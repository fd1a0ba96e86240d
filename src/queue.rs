//! Blocking FIFO task queue shared by a worker pool
//!
//! A single lock guards the pending items, the `stopping` flag, the completion
//! counter and the pool's worker bookkeeping. The lock is only held for the
//! structural change itself; callers do their I/O after it is released.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::thread::JoinHandle;

struct QueueState<T> {
    items: VecDeque<T>,
    stopping: bool,
    completed: usize,
    workers: Vec<JoinHandle<()>>,
    live: usize,
}

pub struct TaskQueue<T> {
    state: Mutex<QueueState<T>>,
    ready: Condvar,
    idle: Condvar,
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        TaskQueue {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                stopping: false,
                completed: 0,
                workers: Vec::new(),
                live: 0,
            }),
            ready: Condvar::new(),
            idle: Condvar::new(),
        }
    }

    /// Append a task and wake one waiting consumer.
    ///
    /// Once the queue is stopping the task is handed back so the producer can
    /// release whatever it holds.
    pub fn enqueue(&self, task: T) -> Result<(), T> {
        let mut state = self.state.lock();
        if state.stopping {
            return Err(task);
        }
        state.items.push_back(task);
        self.ready.notify_one();
        Ok(())
    }

    /// Block until a task is available, or until the queue is stopping and
    /// empty, in which case `None` tells the worker to exit.
    pub fn dequeue_blocking(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(task) = state.items.pop_front() {
                return Some(task);
            }
            if state.stopping {
                return None;
            }
            self.ready.wait(&mut state);
        }
    }

    /// Set `stopping` and wake every consumer. Queued tasks are left in place
    /// and still get processed.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.stopping = true;
        self.ready.notify_all();
    }

    /// Set `stopping`, wake every consumer and hand each task that was still
    /// queued to `abort`. Returns how many tasks were drained.
    pub fn shutdown_drain<F: FnMut(T)>(&self, mut abort: F) -> usize {
        let drained: Vec<T> = {
            let mut state = self.state.lock();
            state.stopping = true;
            self.ready.notify_all();
            state.items.drain(..).collect()
        };
        let count = drained.len();
        for task in drained {
            abort(task);
        }
        count
    }

    /// Count one finished task. When `target` is reached the queue switches
    /// to stopping and every waiting consumer is woken.
    pub fn complete_one(&self, target: Option<usize>) -> usize {
        let mut state = self.state.lock();
        state.completed += 1;
        if let Some(target) = target {
            if state.completed >= target {
                state.stopping = true;
                self.ready.notify_all();
            }
        }
        state.completed
    }

    pub fn completed(&self) -> usize {
        self.state.lock().completed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn is_stopping(&self) -> bool {
        self.state.lock().stopping
    }

    pub(crate) fn register_worker(&self, handle: JoinHandle<()>) {
        self.state.lock().workers.push(handle);
    }

    /// Remove the worker handles so that only one caller ever joins them.
    pub(crate) fn take_workers(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut self.state.lock().workers)
    }

    /// Count a worker before its thread is spawned.
    pub(crate) fn worker_starting(&self) {
        self.state.lock().live += 1;
    }

    pub(crate) fn worker_exited(&self) {
        let mut state = self.state.lock();
        state.live = state.live.saturating_sub(1);
        if state.live == 0 {
            self.idle.notify_all();
        }
    }

    /// Block until every counted worker has left its loop.
    pub(crate) fn wait_workers_exited(&self) {
        let mut state = self.state.lock();
        while state.live > 0 {
            self.idle.wait(&mut state);
        }
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
