//! Scan persistence
//!
//! A [`ScanStore`] offers create / list-recent / clear over [`Scan`] records.
//! The capture session hands accepted scans to a [`ScanSink`]; [`StoreSink`]
//! adapts any store into one.

mod file;
mod memory;

pub use file::FileScanStore;
pub use memory::MemoryScanStore;

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default number of scans returned by [`ScanStore::list_recent`]
pub const DEFAULT_RECENT_LIMIT: usize = 10;

/// Payload for creating a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSubmission {
    /// Decoded barcode text
    pub content: String,
    /// Symbology tag, e.g. `pdf417`
    pub format: String,
    /// Data pattern that was active when the scan was accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl ScanSubmission {
    /// Check the payload before anything is stored
    pub fn validate(&self) -> Result<()> {
        if self.content.trim().is_empty() {
            return Err(Error::Validation("content must not be empty".to_string()));
        }
        if self.format.trim().is_empty() {
            return Err(Error::Validation("format must not be empty".to_string()));
        }
        Ok(())
    }

    /// Turn a validated submission into a stored record
    pub(crate) fn into_scan(self) -> Scan {
        Scan {
            id: Uuid::new_v4(),
            content: self.content,
            format: self.format,
            pattern: self.pattern.filter(|p| !p.is_empty()),
            timestamp: Utc::now(),
        }
    }
}

/// A persisted scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scan {
    /// Assigned identifier
    pub id: Uuid,
    /// Decoded barcode text
    pub content: String,
    /// Symbology tag
    pub format: String,
    /// Data pattern active at accept time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Time the store accepted the record
    pub timestamp: DateTime<Utc>,
}

/// Append / list / clear storage for scans
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Validate and store a scan, returning the stored record
    async fn create(&self, submission: ScanSubmission) -> Result<Scan>;

    /// Up to `limit` scans, newest first
    async fn list_recent(&self, limit: usize) -> Result<Vec<Scan>>;

    /// Remove every scan. Idempotent.
    async fn clear(&self) -> Result<()>;
}

/// Receiver of accepted scans
#[async_trait]
pub trait ScanSink: Send + Sync {
    /// Persist or broadcast a confirmed scan
    async fn submit(&self, submission: ScanSubmission) -> Result<Scan>;
}

/// [`ScanSink`] that writes into a [`ScanStore`]
#[derive(Debug, Clone)]
pub struct StoreSink<S> {
    store: S,
}

impl<S: ScanStore> StoreSink<S> {
    /// Wrap a store
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The wrapped store
    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait]
impl<S: ScanStore> ScanSink for StoreSink<S> {
    async fn submit(&self, submission: ScanSubmission) -> Result<Scan> {
        match self.store.create(submission).await {
            Ok(scan) => Ok(scan),
            Err(Error::Validation(msg)) => Err(Error::Validation(msg)),
            Err(err) => Err(Error::Persistence(err.to_string())),
        }
    }
}

/// Newest first; records with equal timestamps keep reverse insertion order.
pub(crate) fn newest_first(mut scans: Vec<Scan>, limit: usize) -> Vec<Scan> {
    scans.reverse();
    scans.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    scans.truncate(limit);
    scans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(content: &str) -> ScanSubmission {
        ScanSubmission {
            content: content.to_string(),
            format: "pdf417".to_string(),
            pattern: None,
        }
    }

    #[test]
    fn test_validation() {
        assert!(submission("@\nANSI 636014").validate().is_ok());
        assert!(matches!(
            submission("").validate(),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            submission("   ").validate(),
            Err(Error::Validation(_))
        ));

        let mut no_format = submission("x");
        no_format.format.clear();
        assert!(no_format.validate().is_err());
    }

    #[test]
    fn test_empty_pattern_is_dropped() {
        let mut sub = submission("abc");
        sub.pattern = Some(String::new());
        assert_eq!(sub.into_scan().pattern, None);
    }

    #[tokio::test]
    async fn test_store_sink_forwards() {
        let sink = StoreSink::new(MemoryScanStore::new());
        let scan = sink.submit(submission("DL123")).await.unwrap();
        assert_eq!(scan.content, "DL123");
        assert_eq!(sink.store().list_recent(10).await.unwrap().len(), 1);

        let err = sink.submit(submission("")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
