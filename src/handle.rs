//! Ownership handoff for per-request transfer handles
//!
//! The accept thread owns a `HandleSlot`. `detach` moves the handle out, which
//! leaves the slot empty for good; the `Detached` value travels inside the task
//! and exposes no I/O. The worker that dequeues the task calls `attach` to get
//! the `Attached` view it sends through.

use std::io;

use crate::protocol::Status;
use crate::transfer::ResponseHandle;

pub struct HandleSlot<H> {
    handle: Option<H>,
}

impl<H> HandleSlot<H> {
    pub fn new(handle: H) -> Self {
        HandleSlot {
            handle: Some(handle),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.handle.is_some()
    }

    pub fn detach(&mut self) -> Option<Detached<H>> {
        self.handle.take().map(|handle| Detached { handle })
    }

    /// Used by the accept loop to answer requests the entry point refused.
    pub fn take(&mut self) -> Option<H> {
        self.handle.take()
    }
}

/// A handle in transit between threads.
pub struct Detached<H> {
    handle: H,
}

impl<H: ResponseHandle> Detached<H> {
    pub fn attach(self) -> Attached<H> {
        Attached {
            handle: self.handle,
        }
    }

    /// Release a handle that will never be served.
    pub fn abort(self) {
        self.handle.abort();
    }
}

/// A handle bound to the worker currently serving it.
pub struct Attached<H> {
    handle: H,
}

impl<H: ResponseHandle> Attached<H> {
    pub fn send_header(&mut self, status: Status, len: u64) -> io::Result<()> {
        self.handle.send_header(status, len)
    }

    pub fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        self.handle.send(data)
    }

    pub fn abort(self) {
        self.handle.abort();
    }

    pub fn finish(self) {
        self.handle.finish();
    }
}
