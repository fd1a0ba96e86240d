//! Fault-injecting fakes shared by the unit tests

use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::content::{ContentSource, ContentStore};
use crate::protocol::Status;
use crate::transfer::ResponseHandle;

#[derive(Debug, Default)]
pub struct Recorded {
    pub header: Option<(Status, u64)>,
    pub chunks: Vec<usize>,
    pub bytes: Vec<u8>,
    pub aborts: usize,
    pub finished: bool,
}

pub struct FakeHandle {
    rec: Arc<Mutex<Recorded>>,
    short_send_on: Option<usize>,
    fail_header: bool,
    send_delay: Option<Duration>,
}

impl FakeHandle {
    pub fn new() -> (Self, Arc<Mutex<Recorded>>) {
        let rec = Arc::new(Mutex::new(Recorded::default()));
        (
            FakeHandle {
                rec: Arc::clone(&rec),
                short_send_on: None,
                fail_header: false,
                send_delay: None,
            },
            rec,
        )
    }

    /// The chunk with this index is only half sent.
    pub fn short_send_on_chunk(mut self, index: usize) -> Self {
        self.short_send_on = Some(index);
        self
    }

    pub fn failing_header(mut self) -> Self {
        self.fail_header = true;
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.send_delay = Some(delay);
        self
    }
}

impl ResponseHandle for FakeHandle {
    fn send_header(&mut self, status: Status, len: u64) -> io::Result<()> {
        if let Some(d) = self.send_delay {
            std::thread::sleep(d);
        }
        if self.fail_header {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "header refused"));
        }
        self.rec.lock().header = Some((status, len));
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut rec = self.rec.lock();
        let n = if self.short_send_on == Some(rec.chunks.len()) {
            data.len() / 2
        } else {
            data.len()
        };
        rec.chunks.push(n);
        rec.bytes.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn abort(self) {
        self.rec.lock().aborts += 1;
    }

    fn finish(self) {
        self.rec.lock().finished = true;
    }
}

/// In-memory content with injectable truncation, interruptions and errors.
pub struct MemContent {
    data: Vec<u8>,
    truncate_at: Option<u64>,
    interrupts: AtomicUsize,
    fail: bool,
}

impl MemContent {
    pub fn patterned(len: usize) -> Self {
        MemContent {
            data: (0..len).map(|i| (i % 251) as u8).collect(),
            truncate_at: None,
            interrupts: AtomicUsize::new(0),
            fail: false,
        }
    }

    /// Declared length stays the same but no bytes exist past `offset`.
    pub fn truncated_at(mut self, offset: u64) -> Self {
        self.truncate_at = Some(offset);
        self
    }

    /// The first `n` reads fail with `Interrupted`.
    pub fn interrupted(self, n: usize) -> Self {
        self.interrupts.store(n, Ordering::SeqCst);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl ContentSource for MemContent {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if self
            .interrupts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "interrupted"));
        }
        if self.fail {
            return Err(io::Error::other("injected read failure"));
        }
        let end = self.truncate_at.unwrap_or(self.len()).min(self.len());
        if offset >= end {
            return Ok(0);
        }
        let n = buf.len().min((end - offset) as usize);
        let start = offset as usize;
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }
}

/// Store with one in-memory resource per path, built on demand.
pub struct MemStore {
    pub entries: Vec<(String, usize, Option<u64>)>,
    pub broken: Vec<String>,
}

impl MemStore {
    pub fn new() -> Self {
        MemStore {
            entries: Vec::new(),
            broken: Vec::new(),
        }
    }

    pub fn with(mut self, path: &str, len: usize) -> Self {
        self.entries.push((path.to_string(), len, None));
        self
    }

    pub fn with_truncated(mut self, path: &str, len: usize, at: u64) -> Self {
        self.entries.push((path.to_string(), len, Some(at)));
        self
    }

    /// Resolving this path fails as if stat had failed.
    pub fn with_broken(mut self, path: &str) -> Self {
        self.broken.push(path.to_string());
        self
    }
}

impl ContentStore for MemStore {
    type Source = MemContent;

    fn resolve(&self, path: &str) -> io::Result<Option<MemContent>> {
        if self.broken.iter().any(|b| b == path) {
            return Err(io::Error::other("injected stat failure"));
        }
        Ok(self
            .entries
            .iter()
            .find(|(p, _, _)| p == path)
            .map(|(_, len, at)| {
                let c = MemContent::patterned(*len);
                match at {
                    Some(at) => c.truncated_at(*at),
                    None => c,
                }
            }))
    }
}
