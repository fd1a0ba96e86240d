//! Fixed-size worker pool draining a shared `TaskQueue`
//!
//! Each worker runs dequeue → process → count until the queue reports
//! stopping with nothing left. Failures stay inside the task that caused them;
//! only a `TransferError::Fatal` brings the whole pool down.

use anyhow::{anyhow, Context, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::thread;

use crate::error::TransferError;
use crate::logger::Logger;
use crate::queue::TaskQueue;

pub trait TaskHandler<T>: Send + Sync + 'static {
    /// Run one task to completion. The task is consumed on every path.
    fn process(&self, task: T) -> Result<(), TransferError>;

    /// Release a task that was drained from the queue without being run.
    fn abort(&self, task: T);
}

#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub threads: usize,
    /// Stop once this many tasks have completed (client batches).
    pub target: Option<usize>,
    /// Thread name prefix.
    pub name: String,
}

impl PoolConfig {
    pub fn new(threads: usize, name: impl Into<String>) -> Self {
        PoolConfig {
            threads,
            target: None,
            name: name.into(),
        }
    }

    pub fn with_target(mut self, target: usize) -> Self {
        self.target = Some(target);
        self
    }
}

struct Shared<T> {
    queue: Arc<TaskQueue<T>>,
    handler: Arc<dyn TaskHandler<T>>,
    logger: Arc<dyn Logger>,
    target: Option<usize>,
    fatal: OnceLock<TransferError>,
}

pub struct WorkerPool<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    size: usize,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Spawn `config.threads` workers (at least one).
    pub fn start<H: TaskHandler<T>>(
        config: PoolConfig,
        handler: H,
        logger: Arc<dyn Logger>,
    ) -> Result<Self> {
        let size = config.threads.max(1);
        let shared = Arc::new(Shared {
            queue: Arc::new(TaskQueue::new()),
            handler: Arc::new(handler),
            logger,
            target: config.target,
            fatal: OnceLock::new(),
        });

        for i in 0..size {
            let worker = Arc::clone(&shared);
            let name = format!("{}-{}", config.name, i);
            shared.queue.worker_starting();
            let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
                let _live = LiveWorker(&*worker.queue);
                worker_loop(&name, &worker)
            });
            match spawned {
                Ok(handle) => shared.queue.register_worker(handle),
                Err(e) => {
                    shared.queue.worker_exited();
                    shared.queue.stop();
                    join_all(&shared);
                    return Err(e).with_context(|| format!("Failed to spawn worker {}", i));
                }
            }
        }

        Ok(WorkerPool { shared, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn queue(&self) -> &Arc<TaskQueue<T>> {
        &self.shared.queue
    }

    pub fn submit(&self, task: T) -> Result<(), T> {
        self.shared.queue.enqueue(task)
    }

    /// Wait for the workers to exit on their own (target reached or the
    /// queue stopped elsewhere). Returns the completion count.
    pub fn join(&self) -> Result<usize> {
        join_all(&self.shared);
        self.finish()
    }

    /// Stop the pool: queued tasks are aborted, in-flight tasks run to the
    /// end, every worker is joined. Safe to call more than once.
    pub fn stop_and_join(&self) -> Result<usize> {
        let handler = &self.shared.handler;
        self.shared.queue.shutdown_drain(|task| handler.abort(task));
        join_all(&self.shared);
        self.finish()
    }

    fn finish(&self) -> Result<usize> {
        match self.shared.fatal.get() {
            Some(e) => Err(anyhow!("worker pool stopped after fatal error: {}", e)),
            None => Ok(self.shared.queue.completed()),
        }
    }
}

/// Join the handles this caller managed to take, then wait for workers whose
/// handles another caller is joining.
fn join_all<T: Send + 'static>(shared: &Shared<T>) {
    for handle in shared.queue.take_workers() {
        let name = handle.thread().name().unwrap_or("worker").to_string();
        if handle.join().is_err() {
            shared.logger.worker_error(&name, "worker thread panicked");
        }
    }
    shared.queue.wait_workers_exited();
}

/// Marks the worker as gone on every exit path, unwinding included.
struct LiveWorker<'a, T>(&'a TaskQueue<T>);

impl<T> Drop for LiveWorker<'_, T> {
    fn drop(&mut self) {
        self.0.worker_exited();
    }
}

fn worker_loop<T: Send + 'static>(name: &str, shared: &Shared<T>) {
    while let Some(task) = shared.queue.dequeue_blocking() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| shared.handler.process(task)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_fatal() => {
                shared.logger.worker_error(name, &e.to_string());
                let _ = shared.fatal.set(e);
                let handler = &shared.handler;
                shared.queue.shutdown_drain(|t| handler.abort(t));
                return;
            }
            Ok(Err(e)) => shared.logger.worker_error(name, &e.to_string()),
            Err(payload) => {
                shared
                    .logger
                    .worker_error(name, &format!("task panicked: {}", panic_message(&*payload)));
            }
        }
        shared.queue.complete_one(shared.target);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
