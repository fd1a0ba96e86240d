use serde::{Serialize, Deserialize};
use std::path::{Path, PathBuf};
use std::fs::{OpenOptions, File};
use std::io::{BufReader, Write, BufRead};
use anyhow::{Result, Context};
use chrono::Utc;
use uuid::Uuid;

use crate::protocol::Status;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Completed,
    NotFound,
    Failed,
}

impl TransferStatus {
    pub fn from_outcome(status: Status, failed: bool) -> Self {
        match (status, failed) {
            (_, true) => TransferStatus::Failed,
            (Status::Ok, false) => TransferStatus::Completed,
            (Status::FileNotFound, false) => TransferStatus::NotFound,
            _ => TransferStatus::Failed,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TransferLogEntry {
    pub timestamp: String,
    pub batch_id: String,
    pub path: String,
    pub destination: PathBuf,
    pub status: TransferStatus,
    pub bytes_received: u64,
    pub file_len: u64,
    pub error: Option<String>,
}

/// Append-only JSONL record of finished downloads, one line per task.
pub struct TransferLog {
    log_file_path: PathBuf,
    batch_id: String,
}

impl TransferLog {
    pub fn new(log_file_path: &Path) -> Self {
        TransferLog {
            log_file_path: log_file_path.to_path_buf(),
            batch_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn entry(
        &self,
        path: &str,
        destination: &Path,
        status: TransferStatus,
        bytes_received: u64,
        file_len: u64,
        error: Option<String>,
    ) -> TransferLogEntry {
        TransferLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            batch_id: self.batch_id.clone(),
            path: path.to_string(),
            destination: destination.to_path_buf(),
            status,
            bytes_received,
            file_len,
            error,
        }
    }

    /// Each record goes out in a single append so concurrent workers never
    /// interleave lines.
    pub fn add_entry(&self, entry: &TransferLogEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)
            .context("Failed to open transfer log file")?;
        file.write_all(&line)?;
        Ok(())
    }

    pub fn read_log(&self) -> Result<Vec<TransferLogEntry>> {
        if !self.log_file_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.log_file_path)
            .context("Failed to open transfer log file for reading")?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: TransferLogEntry = serde_json::from_str(&line)?;
            entries.push(entry);
        }
        Ok(entries)
    }
}
