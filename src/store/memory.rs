//! In-memory scan store

use crate::error::Result;
use crate::store::{Scan, ScanStore, ScanSubmission, newest_first};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Scan store kept in process memory. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryScanStore {
    scans: Arc<RwLock<Vec<Scan>>>,
}

impl MemoryScanStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored scans
    pub async fn len(&self) -> usize {
        self.scans.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.scans.read().await.is_empty()
    }
}

#[async_trait]
impl ScanStore for MemoryScanStore {
    async fn create(&self, submission: ScanSubmission) -> Result<Scan> {
        submission.validate()?;
        let scan = submission.into_scan();
        self.scans.write().await.push(scan.clone());
        Ok(scan)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Scan>> {
        let scans = self.scans.read().await.clone();
        Ok(newest_first(scans, limit))
    }

    async fn clear(&self) -> Result<()> {
        self.scans.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::DEFAULT_RECENT_LIMIT;

    fn submission(content: &str) -> ScanSubmission {
        ScanSubmission {
            content: content.to_string(),
            format: "pdf417".to_string(),
            pattern: Some("^@".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_timestamp() {
        let store = MemoryScanStore::new();
        let a = store.create(submission("first")).await.unwrap();
        let b = store.create(submission("second")).await.unwrap();
        assert_ne!(a.id, b.id);
        assert!(b.timestamp >= a.timestamp);
        assert_eq!(a.pattern.as_deref(), Some("^@"));
    }

    #[tokio::test]
    async fn test_list_recent_newest_first_with_limit() {
        let store = MemoryScanStore::new();
        for i in 0..15 {
            store.create(submission(&format!("scan-{i}"))).await.unwrap();
        }
        let recent = store.list_recent(DEFAULT_RECENT_LIMIT).await.unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].content, "scan-14");
        assert_eq!(recent[9].content, "scan-5");
    }

    #[tokio::test]
    async fn test_empty_content_rejected_and_list_unchanged() {
        let store = MemoryScanStore::new();
        store.create(submission("kept")).await.unwrap();
        let before = store.list_recent(10).await.unwrap();

        let err = store.create(submission("")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(store.list_recent(10).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let store = MemoryScanStore::new();
        store.create(submission("a")).await.unwrap();
        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.is_empty().await);
    }
}
