//! File-backed document store: atomic writes for the scraper, mtime-keyed
//! snapshots for readers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::ShowtimesDocument;

/// Serializes `value` as pretty JSON and swaps it into place with a
/// temp-file rename so readers never see a truncated file.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(Error::Encode)?;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .await
        .map_err(|e| Error::persistence(&parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let temp_path = parent.join(format!(".{}.{}.tmp", file_name, std::process::id()));

    let written: std::io::Result<()> = async {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path).await;
        return Err(Error::persistence(path, e));
    }
    Ok(())
}

/// Owner of the persisted showtimes document. Only the orchestrator writes.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    path: PathBuf,
}

impl DocumentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the document; an absent or unparseable file yields an empty one.
    /// A file that exists but cannot be read is an error, so that it is
    /// never overwritten by the next persist.
    pub async fn load(&self) -> Result<ShowtimesDocument> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no existing document, starting empty");
                return Ok(ShowtimesDocument::empty());
            }
            Err(e) => return Err(Error::persistence(&self.path, e)),
        };

        match serde_json::from_str::<ShowtimesDocument>(&raw) {
            Ok(mut doc) => {
                doc.normalize();
                Ok(doc)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt document, starting empty");
                Ok(ShowtimesDocument::empty())
            }
        }
    }

    /// Full rewrite of the document with a fresh generation timestamp.
    pub async fn persist(&self, doc: &mut ShowtimesDocument) -> Result<()> {
        doc.generated_at = chrono::Local::now();
        write_json_atomic(&self.path, doc).await
    }
}

/// Read-only view of the persisted document for the web layer.
#[derive(Debug)]
pub struct DocumentSnapshot {
    path: PathBuf,
    fingerprint: Option<SystemTime>,
    document: Arc<ShowtimesDocument>,
}

impl DocumentSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fingerprint: None,
            document: Arc::new(ShowtimesDocument::empty()),
        }
    }

    pub fn current(&self) -> Arc<ShowtimesDocument> {
        Arc::clone(&self.document)
    }

    /// Reloads when the file's modification time differs from the last load.
    pub async fn reload_if_changed(&mut self) -> Arc<ShowtimesDocument> {
        let modified = match fs::metadata(&self.path).await {
            Ok(meta) => meta.modified().ok(),
            Err(_) => None,
        };
        if modified.is_none() || modified != self.fingerprint {
            self.load(modified).await;
        }
        self.current()
    }

    pub async fn force_reload(&mut self) -> Arc<ShowtimesDocument> {
        let modified = fs::metadata(&self.path)
            .await
            .ok()
            .and_then(|m| m.modified().ok());
        self.load(modified).await;
        self.current()
    }

    /// Keeps the previous document when the file cannot be read.
    async fn load(&mut self, modified: Option<SystemTime>) {
        match DocumentStore::new(&self.path).load().await {
            Ok(doc) => {
                self.document = Arc::new(doc);
                self.fingerprint = modified;
            }
            Err(e) => warn!(error = %e, "keeping previous document"),
        }
    }
}
