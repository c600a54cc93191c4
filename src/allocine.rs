//! Showtime listings from allocine.fr's internal JSON endpoints.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use reqwest::{Client, header};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::USER_AGENT;
use crate::error::{Error, Result};
use crate::model::{
    EnrichmentBlock, Language, MovieRecord, PLACEHOLDER_POSTER, ShowtimeRecord, Theater,
    UNKNOWN_DIRECTOR,
};

const BASE: &str = "https://www.allocine.fr";

/// "Nothing scheduled" answers; not errors.
const NO_SHOWTIME_MESSAGES: [&str; 2] = ["no.showtime.error", "next.showtime.on"];

/// Ticketing providers, most preferred first: the theater's own site, the
/// aggregator, then a third-party relay.
const PREFERRED_PROVIDERS: [&str; 3] = ["default", "allocine", "ticketing"];

/// Raw access to the showtime source. Implementations return the response
/// body of a successful request and map non-2xx statuses to `Transport`.
#[async_trait]
pub trait ShowtimeSource: Send + Sync {
    async fn showtimes_page(&self, theater_id: &str, date: NaiveDate, page: u32) -> Result<String>;

    async fn theater_search(&self, query: &str) -> Result<String>;
}

pub struct AllocineClient {
    client: Client,
}

impl AllocineClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get_text(&self, url: String) -> Result<String> {
        let resp = self
            .client
            .get(&url)
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, "application/json,text/javascript,*/*;q=0.1")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Transport {
                status: resp.status().as_u16(),
                url,
            });
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl ShowtimeSource for AllocineClient {
    async fn showtimes_page(&self, theater_id: &str, date: NaiveDate, page: u32) -> Result<String> {
        let url = format!(
            "{}/_/showtimes/theater-{}/d-{}/p-{}/",
            BASE,
            theater_id,
            date.format("%Y-%m-%d"),
            page
        );
        self.get_text(url).await
    }

    async fn theater_search(&self, query: &str) -> Result<String> {
        let url = format!("{}/_/localization_city/{}", BASE, urlencoding::encode(query));
        self.get_text(url).await
    }
}

/// One showtime together with the movie and theater it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Screening {
    pub theater: String,
    pub movie: MovieRecord,
    pub showtime: ShowtimeRecord,
}

#[derive(Debug, Deserialize)]
struct ShowtimesPage {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    results: Vec<PageResult>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(rename = "totalPages", deserialize_with = "lenient_u32")]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct PageResult {
    #[serde(default)]
    movie: Option<MoviePayload>,
    #[serde(default)]
    showtimes: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct MoviePayload {
    title: String,
    #[serde(default)]
    runtime: Option<Value>,
    #[serde(default)]
    releaseDate: Option<ReleaseDate>,
    #[serde(default)]
    genres: Vec<Genre>,
    #[serde(default)]
    stats: Option<Stats>,
    #[serde(default)]
    poster: Option<Poster>,
    #[serde(default)]
    credits: Vec<Credit>,
}

#[derive(Debug, Deserialize)]
struct ReleaseDate {
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Genre {
    translate: String,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Stats {
    #[serde(default)]
    wantToSeeCount: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Poster {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Credit {
    #[serde(default)]
    person: Option<Person>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Person {
    #[serde(default)]
    firstName: Option<String>,
    #[serde(default)]
    lastName: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct ShowtimePayload {
    startsAt: String,
    #[serde(default)]
    projection: Option<Vec<String>>,
    #[serde(default)]
    experience: Option<Vec<String>>,
    #[serde(default)]
    data: Option<ShowtimeData>,
}

#[derive(Debug, Default, Deserialize)]
struct ShowtimeData {
    #[serde(default)]
    ticketing: Vec<Ticketing>,
}

#[derive(Debug, Deserialize)]
struct Ticketing {
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    urls: Vec<String>,
}

fn lenient_u32<'de, D: serde::Deserializer<'de>>(d: D) -> std::result::Result<u32, D::Error> {
    use serde::de::Error as _;
    match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| D::Error::custom(format!("bad page number {n}"))),
        Value::String(s) => s.trim().parse().map_err(D::Error::custom),
        other => Err(D::Error::custom(format!("bad page number {other}"))),
    }
}

/// All showtimes of `theater` on `date`, every page included. The page
/// count reported by the first page bounds the walk.
pub async fn fetch_showtimes(
    source: &dyn ShowtimeSource,
    theater: &Theater,
    date: NaiveDate,
) -> Result<Vec<Screening>> {
    let mut screenings = Vec::new();
    let mut page = 1;
    let mut total_pages = None;

    loop {
        let body = source.showtimes_page(&theater.id, date, page).await?;
        let parsed: ShowtimesPage = serde_json::from_str(&body)
            .map_err(|e| Error::MalformedResponse(format!("theater {} page {}: {}", theater.id, page, e)))?;

        if let Some(message) = parsed.message.as_deref()
            && NO_SHOWTIME_MESSAGES.contains(&message)
        {
            debug!(theater = %theater.name, %date, message, "no showtimes");
            break;
        }

        if let Some(err) = parsed.error.as_ref()
            && is_truthy(err)
        {
            return Err(Error::SourceSemantic(body));
        }

        for result in &parsed.results {
            let Some(payload) = result.movie.as_ref() else {
                continue;
            };
            let movie = movie_record(payload);
            for (key, bucket) in &result.showtimes {
                let Value::Array(entries) = bucket else {
                    continue;
                };
                let lang = Language::from_bucket_key(key);
                for entry in entries {
                    let payload: ShowtimePayload = serde_json::from_value(entry.clone())
                        .map_err(|e| Error::MalformedResponse(format!("showtime: {e}")))?;
                    screenings.push(Screening {
                        theater: theater.name.clone(),
                        movie: movie.clone(),
                        showtime: showtime_record(&payload, lang)?,
                    });
                }
            }
        }

        let last = *total_pages.get_or_insert(parsed.pagination.map_or(1, |p| p.total_pages));
        if page >= last {
            break;
        }
        page += 1;
    }

    Ok(screenings)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Un-enriched movie as listed by the source.
fn movie_record(payload: &MoviePayload) -> MovieRecord {
    let source_year = payload
        .releaseDate
        .as_ref()
        .and_then(|r| r.date.as_deref())
        .and_then(|d| d.split('-').next())
        .filter(|y| !y.is_empty())
        .map(str::to_string);

    let poster = payload
        .poster
        .as_ref()
        .and_then(|p| p.url.clone())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| PLACEHOLDER_POSTER.to_string());

    let director = match payload.credits.first() {
        None => UNKNOWN_DIRECTOR.to_string(),
        Some(credit) => {
            let person = credit.person.as_ref();
            let first = person.and_then(|p| p.firstName.as_deref()).unwrap_or("");
            let last = person.and_then(|p| p.lastName.as_deref()).unwrap_or("");
            format!("{} {}", first, last).trim_start().to_string()
        }
    };

    let mut movie = MovieRecord {
        title: payload.title.clone(),
        original_title: String::new(),
        source_year,
        release_year: String::new(),
        runtime: payload.runtime.as_ref().and_then(runtime_minutes),
        rating: String::new(),
        genres: payload.genres.iter().map(|g| g.translate.clone()).collect(),
        director,
        synopsis: String::new(),
        poster,
        want_to_see: payload
            .stats
            .as_ref()
            .and_then(|s| s.wantToSeeCount)
            .unwrap_or(0),
        search_url: None,
        seances: Default::default(),
    };
    movie.apply_enrichment(&EnrichmentBlock::unknown(&payload.title));
    movie
}

/// Minutes from either a plain number or text like `"1h 52min"`.
fn runtime_minutes(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse() {
                return Some(n);
            }
            let (hours, rest) = match s.split_once('h') {
                Some((h, rest)) => (h.trim().parse::<u32>().ok()?, rest),
                None => (0, s),
            };
            let rest = rest.trim().trim_end_matches("min").trim();
            let minutes = if rest.is_empty() { 0 } else { rest.parse::<u32>().ok()? };
            hours.checked_mul(60)?.checked_add(minutes)
        }
        _ => None,
    }
}

fn showtime_record(payload: &ShowtimePayload, lang: Language) -> Result<ShowtimeRecord> {
    Ok(ShowtimeRecord {
        time: start_time(&payload.startsAt)?,
        lang,
        format: format_tags(
            payload.projection.as_deref().unwrap_or_default(),
            payload.experience.as_deref().unwrap_or_default(),
        ),
        ticketing_url: payload
            .data
            .as_ref()
            .and_then(|d| ticketing_url(&d.ticketing)),
    })
}

fn start_time(starts_at: &str) -> Result<NaiveTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(starts_at, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.time());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(starts_at) {
        return Ok(dt.time());
    }
    Err(Error::MalformedResponse(format!("bad startsAt {starts_at:?}")))
}

/// `"IMAX, 3D, 4DX"` in that fixed order, or `None` without markers.
fn format_tags(projection: &[String], experience: &[String]) -> Option<String> {
    let has = |list: &[String], marker: &str| list.iter().any(|m| m == marker);
    let mut tags = Vec::new();
    if has(projection, "IMAX") {
        tags.push("IMAX");
    }
    if has(projection, "F_3D") {
        tags.push("3D");
    }
    if has(experience, "E_4DX") {
        tags.push("4DX");
    }
    if tags.is_empty() {
        None
    } else {
        Some(tags.join(", "))
    }
}

fn ticketing_url(ticketing: &[Ticketing]) -> Option<String> {
    let first_url = |t: &Ticketing| t.urls.iter().find(|u| !u.is_empty()).cloned();
    PREFERRED_PROVIDERS
        .iter()
        .find_map(|wanted| {
            ticketing
                .iter()
                .filter(|t| t.provider.as_deref() == Some(*wanted))
                .find_map(first_url)
        })
        .or_else(|| ticketing.iter().find_map(first_url))
}

/// Resolves a theater from a free-text name via the source's city search.
pub async fn find_theater(source: &dyn ShowtimeSource, query: &str) -> Result<Option<Theater>> {
    #[derive(Deserialize)]
    struct SearchResponse {
        values: SearchValues,
    }

    #[derive(Deserialize)]
    struct SearchValues {
        #[serde(default)]
        theaters: Vec<TheaterEdge>,
    }

    #[derive(Deserialize)]
    struct TheaterEdge {
        node: TheaterNode,
    }

    #[derive(Deserialize)]
    #[allow(non_snake_case)]
    struct TheaterNode {
        internalId: Value,
        name: String,
        #[serde(default)]
        latitude: Option<f64>,
        #[serde(default)]
        longitude: Option<f64>,
    }

    let body = source.theater_search(query).await?;
    let parsed: SearchResponse =
        serde_json::from_str(&body).map_err(|e| Error::MalformedResponse(format!("theater search: {e}")))?;

    Ok(parsed.values.theaters.into_iter().next().map(|edge| {
        let node = edge.node;
        let id = match node.internalId {
            Value::String(s) => s,
            other => other.to_string(),
        };
        Theater {
            id,
            name: node.name,
            latitude: node.latitude.unwrap_or_default(),
            longitude: node.longitude.unwrap_or_default(),
        }
    }))
}
