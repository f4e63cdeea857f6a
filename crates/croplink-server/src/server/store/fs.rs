use super::{ReportStore, StoredReport, check_name};
use async_trait::async_trait;
use croplink_core::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};

/// Reports stored as files in one flat directory.
#[derive(Debug, Clone)]
pub struct FsReportStore {
    root: PathBuf,
}

impl FsReportStore {
    /// Uses `root` as the report directory, creating it if needed.
    pub async fn open_dir(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| Error::storage(format!("creating {}: {e}", root.display())))?;
        Ok(Self { root })
    }

    /// Publishes `dst` with a hard link so an existing report is never
    /// replaced; `rename` would overwrite it silently.
    async fn write_then_link(&self, tmp: &Path, dst: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::hard_link(tmp, dst).await
    }
}

#[async_trait]
impl ReportStore for FsReportStore {
    fn backend_tag(&self) -> &'static str {
        "fs"
    }

    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        check_name(name)?;
        // Hidden and suffixed, so it never matches a report prefix.
        let tmp = self.root.join(format!(".{name}.partial"));
        let dst = self.root.join(name);

        let published = self.write_then_link(&tmp, &dst, &bytes).await;
        let _ = fs::remove_file(&tmp).await;
        match published {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::storage(format!(
                "refusing to overwrite existing report {}",
                dst.display()
            ))),
            Err(e) => Err(Error::storage(format!("writing {}: {e}", dst.display()))),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let listing_err = |e: std::io::Error| {
            Error::storage(format!("listing {}: {e}", self.root.display()))
        };

        let mut entries = fs::read_dir(&self.root).await.map_err(listing_err)?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(listing_err)? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') || !name.starts_with(prefix) {
                continue;
            }
            if entry.file_type().await.map_err(listing_err)?.is_file() {
                names.push(name);
            }
        }
        Ok(names)
    }

    async fn open(&self, name: &str) -> Result<StoredReport> {
        check_name(name)?;
        let path = self.root.join(name);
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::not_found(format!("report file {name}")));
            }
            Err(e) => {
                return Err(Error::storage(format!("opening {}: {e}", path.display())));
            }
        };
        let len = file
            .metadata()
            .await
            .map_err(|e| Error::storage(format!("reading metadata of {}: {e}", path.display())))?
            .len();
        Ok(StoredReport {
            name: name.to_string(),
            len,
            reader: Box::new(file),
        })
    }
}
