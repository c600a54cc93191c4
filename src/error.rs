use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Everything the pipeline can fail with.
#[derive(Debug, Error)]
pub enum Error {
    #[error("http status {status} for {url}")]
    Transport { status: u16, url: String },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("source returned an error payload: {0}")]
    SourceSemantic(String),
    /// Never leaves the catalog module; downgraded to sentinel values.
    #[error("enrichment unavailable: {0}")]
    EnrichmentUnavailable(String),
    #[error("cannot write {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot encode document: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("every theater failed for {date}: {failures}")]
    DateFailed { date: NaiveDate, failures: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Persistence {
            path: path.into(),
            source,
        }
    }
}
