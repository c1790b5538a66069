//! Append-only JSON lines scan store

use crate::error::{Error, Result};
use crate::store::{Scan, ScanStore, ScanSubmission, newest_first};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Scan store persisted as one JSON object per line
#[derive(Debug)]
pub struct FileScanStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileScanStore {
    /// Use `path` as the backing file; it is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::Persistence(format!(
                        "Failed to create directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Scan>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::Persistence(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };

        let mut scans = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Scan>(line) {
                Ok(scan) => scans.push(scan),
                Err(err) => tracing::warn!(
                    path = %self.path.display(),
                    line = line_no + 1,
                    "Skipping malformed scan record: {err}"
                ),
            }
        }
        Ok(scans)
    }
}

#[async_trait]
impl ScanStore for FileScanStore {
    async fn create(&self, submission: ScanSubmission) -> Result<Scan> {
        submission.validate()?;
        let scan = submission.into_scan();
        let mut line = serde_json::to_string(&scan)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        self.ensure_parent().await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                Error::Persistence(format!("Failed to open {}: {e}", self.path.display()))
            })?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Persistence(format!("Failed to append scan: {e}")))?;
        file.flush()
            .await
            .map_err(|e| Error::Persistence(format!("Failed to flush scan: {e}")))?;

        tracing::debug!(id = %scan.id, path = %self.path.display(), "Scan appended");
        Ok(scan)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Scan>> {
        let _guard = self.write_lock.lock().await;
        Ok(newest_first(self.read_all().await?, limit))
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Persistence(format!(
                "Failed to clear {}: {e}",
                self.path.display()
            ))),
        }
    }
}
