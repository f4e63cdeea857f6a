//! Report storage.
//!
//! The report directory is the only coordination medium between a render
//! and the download that later looks for its output. [`ReportStore`] makes
//! that contract explicit:
//!
//! - [`put`](ReportStore::put) is atomic: a concurrent
//!   [`list`](ReportStore::list) sees the complete file or nothing.
//! - [`list`](ReportStore::list) returns names by prefix, in no particular
//!   order. Callers that need "the newest" sort by the embedded stamp.
//! - Nothing deletes files; the directory only grows.
//!
//! ## Structure
//!
//! - [`fs`] - files in a flat directory, written via temp file + hard link.
//! - [`memory`] - in-process map for tests, with controllable listing order
//!   and injectable listing failures.

pub mod fs;
#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use croplink_core::Result;
use tokio::io::AsyncRead;

/// Streamable contents of a stored report.
pub type ReportReader = Box<dyn AsyncRead + Send + Unpin>;

/// A report opened for download.
pub struct StoredReport {
    pub name: String,
    pub len: u64,
    pub reader: ReportReader,
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Short label for logs.
    fn backend_tag(&self) -> &'static str;

    /// Stores `bytes` under `name`. An existing file is never replaced; a
    /// name that is already taken is a `Storage` error.
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<()>;

    /// Names of all complete reports starting with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Opens a report for streaming. A name that vanished since it was
    /// listed is `NotFound`.
    async fn open(&self, name: &str) -> Result<StoredReport>;
}

/// Rejects names that could escape the report directory or collide with
/// temporary files.
pub(crate) fn check_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.contains("..")
    {
        return Err(croplink_core::Error::storage(format!(
            "refusing report file name `{name}`"
        )));
    }
    Ok(())
}
