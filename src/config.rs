use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::Theater;
use crate::pacing::FixedPacing;

#[derive(Debug, Clone)]
pub struct Settings {
    pub theaters: Vec<Theater>,
    pub tmdb_api_key: Option<String>,
    pub movies_file: PathBuf,
    pub cache_file: PathBuf,
    pub window_days: u32,
    pub pacing: FixedPacing,
}

impl Settings {
    /// Reads settings from the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let theaters = match var("THEATERS") {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)
                .map_err(|e| Error::Config(format!("THEATERS is not a valid theater list: {e}")))?,
            _ => Vec::new(),
        };

        let window_days = u32::try_from(parse_number(&var, "SCRAPE_DAYS", 7)?)
            .map_err(|_| Error::Config("SCRAPE_DAYS is too large".into()))?;
        if window_days == 0 {
            return Err(Error::Config("SCRAPE_DAYS must be at least 1".into()));
        }

        Ok(Self {
            theaters,
            tmdb_api_key: var("TMDB_API_KEY").filter(|k| !k.trim().is_empty()),
            movies_file: var("MOVIES_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("movies.json")),
            cache_file: var("TMDB_CACHE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("tmdb_cache.json")),
            window_days,
            pacing: FixedPacing {
                between_theaters: Duration::from_millis(parse_number(&var, "THEATER_DELAY_MS", 1000)?),
                between_dates: Duration::from_millis(parse_number(&var, "DATE_DELAY_MS", 2000)?),
            },
        })
    }
}

fn parse_number(var: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64> {
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got {raw:?}"))),
        None => Ok(default),
    }
}
