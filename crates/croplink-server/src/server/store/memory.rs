use super::{ReportStore, StoredReport, check_name};
use async_trait::async_trait;
use croplink_core::{Error, Result};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;

/// In-memory [`ReportStore`] with the same contract as the file system one.
///
/// `put` inserts under a single lock, so listings never see partial
/// reports. Listing order can be reversed and listing failures injected to
/// exercise callers.
#[derive(Default)]
pub struct MemoryReportStore {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    pub reverse_listing: AtomicBool,
    pub fail_listing: AtomicBool,
    pub fail_puts: AtomicBool,
    pub put_calls: AtomicU64,
}

impl MemoryReportStore {
    /// Inserts a file directly, bypassing `put`.
    pub async fn insert(&self, name: &str, bytes: &[u8]) {
        self.files.lock().await.insert(name.to_string(), bytes.to_vec());
    }

    pub async fn names(&self) -> Vec<String> {
        self.files.lock().await.keys().cloned().collect()
    }

    pub async fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().await.get(name).cloned()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        check_name(name)?;
        self.put_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_puts.load(Ordering::Relaxed) {
            return Err(Error::storage(format!("writing {name}: No space left on device")));
        }
        let mut files = self.files.lock().await;
        if files.contains_key(name) {
            return Err(Error::storage(format!(
                "refusing to overwrite existing report {name}"
            )));
        }
        files.insert(name.to_string(), bytes);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        if self.fail_listing.load(Ordering::Relaxed) {
            return Err(Error::storage("listing memory store: Permission denied"));
        }
        let mut names: Vec<String> = self
            .files
            .lock()
            .await
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        if self.reverse_listing.load(Ordering::Relaxed) {
            names.reverse();
        }
        Ok(names)
    }

    async fn open(&self, name: &str) -> Result<StoredReport> {
        let bytes = self
            .files
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("report file {name}")))?;
        Ok(StoredReport {
            name: name.to_string(),
            len: bytes.len() as u64,
            reader: Box::new(Cursor::new(bytes)),
        })
    }
}
