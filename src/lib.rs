//! gfpool library
//!
//! Bounded-thread GETFILE transfers: a shared task queue and worker pool,
//! the client batch downloader, and the server-side request dispatcher.

pub mod cli;
pub mod config;
pub mod content;
pub mod dispatch;
pub mod download;
pub mod error;
pub mod handle;
pub mod log;
pub mod logger;
pub mod net;
pub mod pool;
pub mod protocol;
pub mod queue;
pub mod shutdown;
pub mod stream;
pub mod transfer;
pub mod workload;

#[cfg(test)]
pub(crate) mod testing;
