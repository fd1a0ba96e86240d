//! Shutdown coordination
//!
//! Asynchronous notifications (Ctrl-C, SIGTERM, a finished batch) only
//! `trigger` a `ShutdownSignal`. Teardown itself runs on the thread that owns
//! the `ShutdownCoordinator`, after `wait` returns.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use crate::pool::WorkerPool;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reason {
    /// Termination requested from outside the process.
    Interrupted,
    /// The client batch reached its target.
    BatchComplete,
}

#[derive(Clone)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
    tx: Sender<Reason>,
}

impl ShutdownSignal {
    /// Returns `true` for the call that actually flipped the flag.
    pub fn trigger(&self, reason: Reason) -> bool {
        if self.flag.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = self.tx.send(reason);
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub struct ShutdownCoordinator {
    signal: ShutdownSignal,
    rx: Receiver<Reason>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        ShutdownCoordinator {
            signal: ShutdownSignal {
                flag: Arc::new(AtomicBool::new(false)),
                tx,
            },
            rx,
        }
    }

    pub fn signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Route SIGINT, SIGTERM and SIGHUP into the signal (ctrlc's
    /// `termination` feature). A second one while the first is still being
    /// handled exits immediately with 130.
    pub fn install_ctrlc(&self) -> Result<()> {
        let signal = self.signal();
        ctrlc::set_handler(move || {
            if !signal.trigger(Reason::Interrupted) {
                eprintln!("\nInterrupted again. Exiting (Ctrl-C)...");
                std::process::exit(130);
            }
            eprintln!("\nInterrupted. Finishing in-flight transfers...");
        })
        .context("Error setting Ctrl-C handler")
    }

    /// Block until the first trigger and return its reason.
    pub fn wait(&self) -> Reason {
        // The coordinator holds a sender, so recv cannot disconnect.
        self.rx.recv().unwrap_or(Reason::Interrupted)
    }

    /// Drain the pool, aborting what is still queued, and join its workers.
    pub fn shutdown<T: Send + 'static>(&self, pool: &WorkerPool<T>) -> Result<usize> {
        pool.stop_and_join()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
