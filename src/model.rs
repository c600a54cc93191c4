//! Data shapes shared by the scraper, the on-disk document and its readers.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Poster used when the source listing carries no image.
pub const PLACEHOLDER_POSTER: &str = "/static/images/nocontent.png";
/// Director shown when the source lists no credits.
pub const UNKNOWN_DIRECTOR: &str = "Inconnu";
pub const UNKNOWN_YEAR: &str = "inconnue";
pub const UNKNOWN_RATING: &str = "Note inconnue";
pub const NO_SYNOPSIS: &str = "Synopsis non disponible";

const SEARCH_BASE: &str = "https://letterboxd.com/search/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theater {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Catalog metadata overlaid on a scraped movie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentBlock {
    pub year: String,
    pub rating: String,
    pub synopsis: String,
    pub original_title: String,
}

impl EnrichmentBlock {
    /// Block used when the catalog has nothing for `title`.
    pub fn unknown(title: &str) -> Self {
        Self {
            year: UNKNOWN_YEAR.to_string(),
            rating: UNKNOWN_RATING.to_string(),
            synopsis: NO_SYNOPSIS.to_string(),
            original_title: title.to_string(),
        }
    }

    /// External search link built from the canonical title and year.
    pub fn search_url(&self) -> String {
        let query = if self.year == UNKNOWN_YEAR {
            self.original_title.clone()
        } else {
            format!("{} {}", self.original_title, self.year)
        };
        format!("{}{}/", SEARCH_BASE, urlencoding::encode(&query))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "VO")]
    Original,
    #[serde(rename = "VF")]
    Dubbed,
}

impl Language {
    /// Classifies a source audio-track bucket key.
    pub fn from_bucket_key(key: &str) -> Self {
        if key.starts_with("original") {
            Language::Original
        } else {
            Language::Dubbed
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Language::Original => "VO",
            Language::Dubbed => "VF",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowtimeRecord {
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub lang: Language,
    pub format: Option<String>,
    #[serde(default)]
    pub ticketing_url: Option<String>,
}

fn unknown_year() -> String {
    UNKNOWN_YEAR.to_string()
}

fn unknown_rating() -> String {
    UNKNOWN_RATING.to_string()
}

fn no_synopsis() -> String {
    NO_SYNOPSIS.to_string()
}

fn placeholder_poster() -> String {
    PLACEHOLDER_POSTER.to_string()
}

fn unknown_director() -> String {
    UNKNOWN_DIRECTOR.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieRecord {
    pub title: String,
    #[serde(default)]
    pub original_title: String,
    /// Release year as reported by the showtime source, used in cache keys.
    #[serde(default)]
    pub source_year: Option<String>,
    #[serde(default = "unknown_year")]
    pub release_year: String,
    #[serde(rename = "duree", default)]
    pub runtime: Option<u32>,
    #[serde(default = "unknown_rating")]
    pub rating: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(alias = "realisateur", default = "unknown_director")]
    pub director: String,
    #[serde(default = "no_synopsis")]
    pub synopsis: String,
    #[serde(rename = "affiche", default = "placeholder_poster")]
    pub poster: String,
    #[serde(rename = "wantToSee", default)]
    pub want_to_see: u64,
    #[serde(rename = "url", default)]
    pub search_url: Option<String>,
    #[serde(default)]
    pub seances: BTreeMap<String, Vec<ShowtimeRecord>>,
}

impl MovieRecord {
    pub fn apply_enrichment(&mut self, block: &EnrichmentBlock) {
        self.release_year = block.year.clone();
        self.rating = block.rating.clone();
        self.synopsis = block.synopsis.clone();
        self.original_title = block.original_title.clone();
        self.search_url = Some(block.search_url());
    }

    /// Enrichment from an earlier run is detectably incomplete.
    pub fn needs_repair(&self) -> bool {
        self.poster == PLACEHOLDER_POSTER || self.synopsis == NO_SYNOPSIS || self.synopsis.is_empty()
    }

    pub fn known_director(&self) -> Option<&str> {
        if self.director.is_empty() || self.director == UNKNOWN_DIRECTOR {
            None
        } else {
            Some(&self.director)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayDocument {
    pub date: NaiveDate,
    #[serde(default)]
    pub movies: Vec<MovieRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowtimesDocument {
    #[serde(default = "Local::now")]
    pub generated_at: DateTime<Local>,
    #[serde(default)]
    pub days: Vec<DayDocument>,
}

impl ShowtimesDocument {
    pub fn empty() -> Self {
        Self {
            generated_at: Local::now(),
            days: Vec::new(),
        }
    }

    pub fn day(&self, date: NaiveDate) -> Option<&DayDocument> {
        self.days.iter().find(|d| d.date == date)
    }

    /// Inserts or replaces the day for `day.date`, keeping days in date order.
    pub fn upsert_day(&mut self, day: DayDocument) {
        match self.days.binary_search_by_key(&day.date, |d| d.date) {
            Ok(idx) => self.days[idx] = day,
            Err(idx) => self.days.insert(idx, day),
        }
    }

    /// Sorts days and drops repeated dates, keeping the first occurrence.
    pub fn normalize(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.days.retain(|d| seen.insert(d.date));
        self.days.sort_by_key(|d| d.date);
    }
}

/// `NaiveTime` as `"HH:MM"`.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&time.format("%H:%M"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(D::Error::custom)
    }
}
