//! Client side: one download per task, written to a worker-owned file

use anyhow::anyhow;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::TransferError;
use crate::log::{TransferLog, TransferStatus};
use crate::logger::Logger;
use crate::pool::{TaskHandler, WorkerPool};
use crate::protocol::Status;
use crate::transfer::{Endpoint, FetchContext, Transport};
use crate::workload::Workload;

/// Longest request path a download task accepts.
pub const PATH_BUFFER_SIZE: usize = 512;

#[derive(Debug)]
pub struct DownloadTask {
    pub path: String,
    pub destination: PathBuf,
    pub endpoint: Arc<Endpoint>,
}

/// `/dir/file.txt` with counter 7 becomes `<out_dir>/dir/file.txt-000007`.
pub fn local_path(out_dir: &Path, request_path: &str, counter: usize) -> PathBuf {
    let mut chars = request_path.chars();
    chars.next();
    out_dir.join(format!("{}-{:06}", chars.as_str(), counter))
}

pub struct Downloader<X> {
    transport: X,
    logger: Arc<dyn Logger>,
    journal: Option<Arc<TransferLog>>,
}

impl<X: Transport> Downloader<X> {
    pub fn new(transport: X, logger: Arc<dyn Logger>) -> Self {
        Downloader {
            transport,
            logger,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Arc<TransferLog>) -> Self {
        self.journal = Some(journal);
        self
    }

    fn remove_partial(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != io::ErrorKind::NotFound {
                self.logger.cleanup_failed(path, &e.to_string());
            }
        }
    }

    fn record(&self, task: &DownloadTask, status: TransferStatus, received: u64, len: u64, error: Option<String>) {
        if let Some(journal) = &self.journal {
            let entry = journal.entry(&task.path, &task.destination, status, received, len, error);
            if let Err(e) = journal.add_entry(&entry) {
                self.logger.worker_error("journal", &e.to_string());
            }
        }
    }
}

impl<X: Transport> TaskHandler<DownloadTask> for Downloader<X> {
    fn process(&self, task: DownloadTask) -> Result<(), TransferError> {
        if task.path.len() > PATH_BUFFER_SIZE {
            return Err(TransferError::Rejected(format!(
                "Request path exceeded maximum of {} characters",
                PATH_BUFFER_SIZE
            )));
        }

        create_parent_dirs(&task.destination)?;
        let file = File::create(&task.destination).map_err(TransferError::Resource)?;
        let mut writer = BufWriter::new(file);

        self.logger.request(&task.endpoint.host, &task.path);
        let mut ctx = FetchContext::new(&task.path, &task.endpoint, &mut writer);
        let performed = self.transport.perform(&mut ctx);
        let (status, received, len) = (ctx.status(), ctx.bytes_received(), ctx.file_len());
        drop(ctx);

        // Closing the file before any unlink.
        let flushed = writer.flush();
        drop(writer);

        let failed = performed.is_err() || flushed.is_err();
        if failed || status != Status::Ok {
            self.remove_partial(&task.destination);
        }

        self.logger.outcome(&task.path, status, received, len);
        let error = match (&performed, &flushed) {
            (Err(e), _) => Some(e.to_string()),
            (_, Err(e)) => Some(e.to_string()),
            _ => None,
        };
        self.record(&task, TransferStatus::from_outcome(status, failed), received, len, error);

        performed?;
        flushed.map_err(TransferError::Resource)
    }

    fn abort(&self, task: DownloadTask) {
        self.logger.cancelled(&task.path);
    }
}

/// Only an "already exists" failure is tolerated; anything else means the
/// output tree is unusable and the batch cannot continue.
fn create_parent_dirs(destination: &Path) -> Result<(), TransferError> {
    let parent = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => return Ok(()),
    };
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    match builder.create(parent) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(TransferError::Fatal(
            anyhow!(e).context(format!("Unable to create directory {}", parent.display())),
        )),
    }
}

/// Enqueue `requests` downloads drawn from `workload`. Returns how many were
/// accepted; the count falls short only if the pool stopped mid-batch.
pub fn produce(
    pool: &WorkerPool<DownloadTask>,
    workload: &mut Workload,
    endpoint: Arc<Endpoint>,
    out_dir: &Path,
    requests: usize,
) -> usize {
    for counter in 0..requests {
        let path = workload.next_path().to_string();
        let task = DownloadTask {
            destination: local_path(out_dir, &path, counter),
            path,
            endpoint: Arc::clone(&endpoint),
        };
        if pool.submit(task).is_err() {
            return counter;
        }
    }
    requests
}
