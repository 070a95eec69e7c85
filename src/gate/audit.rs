// SPDX-License-Identifier: Apache-2.0

//! Audit Sinks
//!
//! Every admission decision is written to an audit sink before the verdict
//! is returned. A sink that cannot accept a record makes the request fail
//! closed.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlgate_core::{AuditError, AuditRecord};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn, Level};

/// Pending writes the JSONL writer task will queue before callers wait
const WRITE_QUEUE_SIZE: usize = 1024;

/// Tracing target for records emitted by [`TracingAuditSink`]
pub const AUDIT_TARGET: &str = "sqlgate::audit";

/// Destination for audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist one record. Returning `Ok` means the record is written.
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

type WriteRequest = (String, oneshot::Sender<Result<(), AuditError>>);

/// Append-only JSON-lines file. A single writer task owns the file, so
/// concurrent requests never interleave partial lines.
pub struct JsonlAuditSink {
    path: PathBuf,
    sender: mpsc::Sender<WriteRequest>,
}

impl JsonlAuditSink {
    /// Open (or create) the log and start the writer task. Must be called
    /// from within a tokio runtime.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let (sender, receiver) = mpsc::channel(WRITE_QUEUE_SIZE);
        tokio::spawn(write_loop(file, receiver));

        info!(path = %path.display(), "Audit log opened");
        Ok(Self { path, sender })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record back from a log file. Lines that do not parse are
    /// skipped with a warning.
    pub fn read_records(path: &Path) -> Result<Vec<AuditRecord>, AuditError> {
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();

        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = number + 1, "Skipping unreadable audit line: {}", e),
            }
        }

        debug!("Loaded {} audit records from {}", records.len(), path.display());
        Ok(records)
    }
}

async fn write_loop(mut file: fs::File, mut receiver: mpsc::Receiver<WriteRequest>) {
    while let Some((line, ack)) = receiver.recv().await {
        let result = async {
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
            file.sync_data().await?;
            Ok::<(), AuditError>(())
        }
        .await;

        if let Err(e) = &result {
            error!("Failed to write audit record: {}", e);
        }
        // The requester may have timed out and gone away
        let _ = ack.send(result);
    }
    debug!("Audit writer stopped");
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let (ack, done) = oneshot::channel();
        self.sender
            .send((line, ack))
            .await
            .map_err(|_| AuditError::unavailable("audit writer is not running"))?;

        done.await
            .map_err(|_| AuditError::unavailable("audit writer dropped the record"))?
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}

/// Emits records as structured events on the [`AUDIT_TARGET`] tracing
/// target. A write fails when no subscriber accepts INFO events on that
/// target, so a missing or filtered-out subscriber denies requests.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        if !tracing::enabled!(target: AUDIT_TARGET, Level::INFO) {
            return Err(AuditError::unavailable(format!(
                "no subscriber records the {} target",
                AUDIT_TARGET
            )));
        }
        let payload = serde_json::to_string(&record)?;
        info!(
            target: AUDIT_TARGET,
            request_id = %record.request_id,
            verdict = ?record.verdict,
            rule = %record.matched_rule,
            kind = ?record.kind,
            record = %payload,
            "audit"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}
