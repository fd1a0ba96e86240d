//! Transfer library surface consumed by the workers
//!
//! The client side is a blocking `Transport::perform` driven through a
//! per-request `FetchContext`; the server side is a per-connection
//! `ResponseHandle`. `net` provides the TCP implementations.

use std::fmt;
use std::io::{self, Write};

use crate::error::TransferError;
use crate::protocol::Status;

/// Server address shared read-only by every task of a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Request parameters plus the write callback for one fetch. Created per task
/// and dropped when the task is done with it.
pub struct FetchContext<'a> {
    path: &'a str,
    endpoint: &'a Endpoint,
    sink: &'a mut dyn Write,
    status: Status,
    file_len: u64,
    bytes_received: u64,
}

impl<'a> FetchContext<'a> {
    pub fn new(path: &'a str, endpoint: &'a Endpoint, sink: &'a mut dyn Write) -> Self {
        FetchContext {
            path,
            endpoint,
            sink,
            status: Status::Invalid,
            file_len: 0,
            bytes_received: 0,
        }
    }

    pub fn path(&self) -> &str {
        self.path
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.endpoint
    }

    /// Record the status and declared length from the response header.
    pub fn set_response(&mut self, status: Status, file_len: u64) {
        self.status = status;
        self.file_len = file_len;
    }

    /// Write callback: hands one received chunk to the sink.
    pub fn deliver(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.sink.write_all(chunk)?;
        self.bytes_received += chunk.len() as u64;
        Ok(())
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }
}

pub trait Transport: Send + Sync + 'static {
    /// Blocking fetch. `Err` is a local or transport failure; an application
    /// level outcome such as `FILE_NOT_FOUND` is reported through
    /// `ctx.status()` with `Ok(())`.
    fn perform(&self, ctx: &mut FetchContext<'_>) -> Result<(), TransferError>;
}

/// One in-flight response owned by exactly one thread at a time.
pub trait ResponseHandle: Send + Sized + 'static {
    fn send_header(&mut self, status: Status, len: u64) -> io::Result<()>;

    /// Returns how many bytes were actually sent.
    fn send(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Tear down the connection. Consumes the handle, so it runs at most once.
    fn abort(self);

    /// Normal completion.
    fn finish(self) {}
}
