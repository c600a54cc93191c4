//! Persistent `title|year` → enrichment map.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::EnrichmentBlock;
use crate::store::write_json_atomic;

pub fn cache_key(title: &str, source_year: Option<&str>) -> String {
    format!("{}|{}", title, source_year.unwrap_or(""))
}

/// Title part of a cache key. Titles may themselves contain `|`.
fn key_title(key: &str) -> &str {
    key.rsplit_once('|').map(|(title, _)| title).unwrap_or(key)
}

/// Read once at startup, flushed to disk after every insertion.
#[derive(Debug)]
pub struct EnrichmentCache {
    path: PathBuf,
    entries: BTreeMap<String, EnrichmentBlock>,
}

impl EnrichmentCache {
    /// Cache that lives only in memory until the first flush.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt enrichment cache, starting empty");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        info!(path = %path.display(), entries = entries.len(), "enrichment cache loaded");
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, title: &str, source_year: Option<&str>) -> Option<&EnrichmentBlock> {
        self.entries.get(&cache_key(title, source_year))
    }

    /// Stores the block and writes the whole cache out before returning.
    pub async fn insert(
        &mut self,
        title: &str,
        source_year: Option<&str>,
        block: EnrichmentBlock,
    ) -> Result<()> {
        self.entries.insert(cache_key(title, source_year), block);
        self.flush().await
    }

    /// Drops every entry whose title matches one of `titles`, whatever year
    /// it was cached under. Returns how many entries went.
    pub fn purge_titles<'a>(&mut self, titles: impl IntoIterator<Item = &'a str>) -> usize {
        let titles: Vec<&str> = titles.into_iter().collect();
        let before = self.entries.len();
        self.entries
            .retain(|key, _| !titles.iter().any(|t| *t == key_title(key)));
        before - self.entries.len()
    }

    /// Empties the cache and removes its file.
    pub async fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::persistence(&self.path, e)),
        }
    }

    pub async fn flush(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.entries).await
    }
}
