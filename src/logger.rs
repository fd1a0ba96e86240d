use anyhow::Result;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::protocol::Status;

pub trait Logger: Send + Sync {
    fn request(&self, _server: &str, _path: &str) {}
    fn outcome(&self, _path: &str, _status: Status, _received: u64, _len: u64) {}
    fn cleanup_failed(&self, _path: &Path, _msg: &str) {}
    fn cancelled(&self, _path: &str) {}
    fn served(&self, _path: &str, _bytes: u64) {}
    fn not_found(&self, _path: &str) {}
    fn aborted(&self, _path: &str, _reason: &str) {}
    fn worker_error(&self, _worker: &str, _msg: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Console output in the classic gfclient format.
pub struct ConsoleLogger {
    /// Also report server-side events (serve/not-found/abort).
    pub verbose: bool,
}

impl Logger for ConsoleLogger {
    fn request(&self, server: &str, path: &str) {
        println!("Requesting {}{}", server, path);
    }
    fn outcome(&self, _path: &str, status: Status, received: u64, len: u64) {
        println!("Status: {}", status);
        println!("Received {} of {} bytes", received, len);
    }
    fn cleanup_failed(&self, path: &Path, msg: &str) {
        eprintln!("warning: unlink failed on {}: {}", path.display(), msg);
    }
    fn cancelled(&self, path: &str) {
        eprintln!("Cancelled {}", path);
    }
    fn served(&self, path: &str, bytes: u64) {
        if self.verbose {
            println!("Served {} ({} bytes)", path, bytes);
        }
    }
    fn not_found(&self, path: &str) {
        if self.verbose {
            println!("Not found: {}", path);
        }
    }
    fn aborted(&self, path: &str, reason: &str) {
        eprintln!("Aborted {}: {}", path, reason);
    }
    fn worker_error(&self, worker: &str, msg: &str) {
        eprintln!("{}: {}", worker, msg);
    }
}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
    }
}

impl Logger for TextLogger {
    fn request(&self, server: &str, path: &str) {
        self.line(&format!("REQUEST server={} path={}", server, path));
    }
    fn outcome(&self, path: &str, status: Status, received: u64, len: u64) {
        self.line(&format!(
            "OUTCOME path={} status={} received={} len={}",
            path, status, received, len
        ));
    }
    fn cleanup_failed(&self, path: &Path, msg: &str) {
        self.line(&format!("ERROR ctx=unlink path={} msg={}", path.display(), msg));
    }
    fn cancelled(&self, path: &str) {
        self.line(&format!("CANCEL path={}", path));
    }
    fn served(&self, path: &str, bytes: u64) {
        self.line(&format!("SERVE path={path} bytes={bytes}"));
    }
    fn not_found(&self, path: &str) {
        self.line(&format!("NOT_FOUND path={path}"));
    }
    fn aborted(&self, path: &str, reason: &str) {
        self.line(&format!("ABORT path={} reason={}", path, reason));
    }
    fn worker_error(&self, worker: &str, msg: &str) {
        self.line(&format!("ERROR ctx={} msg={}", worker, msg));
    }
}

/// Sends every event to two loggers, e.g. the console and a log file.
pub struct Tee(pub Arc<dyn Logger>, pub Arc<dyn Logger>);

impl Logger for Tee {
    fn request(&self, server: &str, path: &str) {
        self.0.request(server, path);
        self.1.request(server, path);
    }
    fn outcome(&self, path: &str, status: Status, received: u64, len: u64) {
        self.0.outcome(path, status, received, len);
        self.1.outcome(path, status, received, len);
    }
    fn cleanup_failed(&self, path: &Path, msg: &str) {
        self.0.cleanup_failed(path, msg);
        self.1.cleanup_failed(path, msg);
    }
    fn cancelled(&self, path: &str) {
        self.0.cancelled(path);
        self.1.cancelled(path);
    }
    fn served(&self, path: &str, bytes: u64) {
        self.0.served(path, bytes);
        self.1.served(path, bytes);
    }
    fn not_found(&self, path: &str) {
        self.0.not_found(path);
        self.1.not_found(path);
    }
    fn aborted(&self, path: &str, reason: &str) {
        self.0.aborted(path, reason);
        self.1.aborted(path, reason);
    }
    fn worker_error(&self, worker: &str, msg: &str) {
        self.0.worker_error(worker, msg);
        self.1.worker_error(worker, msg);
    }
}

/// Pick the console logger, optionally paired with a log file. A log file
/// that cannot be opened falls back to console only.
pub fn build(verbose: bool, log_file: Option<&Path>) -> Arc<dyn Logger> {
    let console: Arc<dyn Logger> = Arc::new(ConsoleLogger { verbose });
    match log_file {
        Some(p) => match TextLogger::new(p) {
            Ok(l) => Arc::new(Tee(console, Arc::new(l))),
            Err(e) => {
                eprintln!("warning: cannot open log file {}: {}", p.display(), e);
                console
            }
        },
        None => console,
    }
}
