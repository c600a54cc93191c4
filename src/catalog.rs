//! Movie metadata lookup against TMDB, fronted by the enrichment cache.

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::USER_AGENT;
use crate::cache::EnrichmentCache;
use crate::error::{Error, Result};
use crate::model::{EnrichmentBlock, NO_SYNOPSIS, UNKNOWN_RATING, UNKNOWN_YEAR};

const TMDB_BASE: &str = "https://api.themoviedb.org/3";
const LANGUAGE: &str = "fr-FR";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchHit {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
}

impl SearchHit {
    fn known_release_date(&self) -> Option<&str> {
        self.release_date.as_deref().filter(|d| !d.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovieDetails {
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub original_title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrewMember {
    pub name: String,
    #[serde(default)]
    pub job: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credits {
    #[serde(default)]
    pub crew: Vec<CrewMember>,
}

/// External movie catalog.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn search_movie(&self, title: &str, year: Option<&str>) -> Result<Vec<SearchHit>>;
    async fn movie_details(&self, id: u64) -> Result<MovieDetails>;
    async fn movie_credits(&self, id: u64) -> Result<Credits>;
}

pub struct TmdbClient {
    client: Client,
    api_key: String,
}

impl TmdbClient {
    pub fn new(client: Client, api_key: String) -> Self {
        Self { client, api_key }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, extra: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", TMDB_BASE, path);
        let mut params = vec![("api_key", self.api_key.as_str()), ("language", LANGUAGE)];
        params.extend_from_slice(extra);

        let resp = self
            .client
            .get(&url)
            .header(header::USER_AGENT, USER_AGENT)
            .query(&params)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Transport {
                status: resp.status().as_u16(),
                url,
            });
        }
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| Error::MalformedResponse(format!("{url}: {e}")))
    }
}

#[async_trait]
impl CatalogApi for TmdbClient {
    async fn search_movie(&self, title: &str, year: Option<&str>) -> Result<Vec<SearchHit>> {
        #[derive(Deserialize)]
        struct SearchResponse {
            #[serde(default)]
            results: Vec<SearchHit>,
        }

        let mut params = vec![("query", title)];
        if let Some(year) = year {
            params.push(("year", year));
        }
        let resp: SearchResponse = self.get("/search/movie", &params).await?;
        Ok(resp.results)
    }

    async fn movie_details(&self, id: u64) -> Result<MovieDetails> {
        self.get(&format!("/movie/{id}"), &[]).await
    }

    async fn movie_credits(&self, id: u64) -> Result<Credits> {
        self.get(&format!("/movie/{id}/credits"), &[]).await
    }
}

/// Outcome of a lookup. Callers that only need display data use
/// [`Lookup::into_block`], which maps `Unresolved` to the sentinel block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Resolved(EnrichmentBlock),
    Unresolved,
}

impl Lookup {
    pub fn into_block(self, title: &str) -> EnrichmentBlock {
        match self {
            Lookup::Resolved(block) => block,
            Lookup::Unresolved => EnrichmentBlock::unknown(title),
        }
    }
}

/// Cache-first enrichment. Owns the cache for the duration of a run.
pub struct Enricher {
    catalog: Option<Box<dyn CatalogApi>>,
    cache: EnrichmentCache,
}

impl Enricher {
    /// `catalog` is `None` when no API key is configured: every lookup is
    /// then unresolved and nothing is cached.
    pub fn new(catalog: Option<Box<dyn CatalogApi>>, cache: EnrichmentCache) -> Self {
        Self { catalog, cache }
    }

    pub fn cache(&self) -> &EnrichmentCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut EnrichmentCache {
        &mut self.cache
    }

    pub async fn enrich(
        &mut self,
        title: &str,
        source_year: Option<&str>,
        director: Option<&str>,
    ) -> EnrichmentBlock {
        self.lookup(title, source_year, director).await.into_block(title)
    }

    pub async fn lookup(
        &mut self,
        title: &str,
        source_year: Option<&str>,
        director: Option<&str>,
    ) -> Lookup {
        if let Some(block) = self.cache.get(title, source_year) {
            debug!(title, "enrichment cache hit");
            return if *block == EnrichmentBlock::unknown(title) {
                Lookup::Unresolved
            } else {
                Lookup::Resolved(block.clone())
            };
        }

        let Some(catalog) = self.catalog.as_deref() else {
            return Lookup::Unresolved;
        };

        let lookup = match resolve(catalog, title, source_year, director).await {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!(title, error = %e, "catalog lookup failed");
                Lookup::Unresolved
            }
        };

        let block = lookup.clone().into_block(title);
        if let Err(e) = self.cache.insert(title, source_year, block).await {
            warn!(title, error = %e, "cannot persist enrichment cache");
        }
        lookup
    }
}

async fn resolve(
    catalog: &dyn CatalogApi,
    title: &str,
    source_year: Option<&str>,
    director: Option<&str>,
) -> Result<Lookup> {
    let hits = catalog.search_movie(title, source_year).await?;
    let Some(hit) = pick_candidate(catalog, &hits, source_year, director).await else {
        info!(title, "no catalog match");
        return Ok(Lookup::Unresolved);
    };

    let details = catalog.movie_details(hit.id).await?;
    Ok(Lookup::Resolved(build_block(title, hit, &details)))
}

async fn pick_candidate<'a>(
    catalog: &dyn CatalogApi,
    hits: &'a [SearchHit],
    source_year: Option<&str>,
    director: Option<&str>,
) -> Option<&'a SearchHit> {
    let first = hits.first()?;

    if let Some(year) = source_year {
        return Some(
            hits.iter()
                .find(|h| h.known_release_date().is_some_and(|d| d.starts_with(year)))
                .unwrap_or(first),
        );
    }

    if let Some(director) = director {
        for hit in hits {
            match catalog.movie_credits(hit.id).await {
                Ok(credits) if directed_by(&credits, director) => return Some(hit),
                Ok(_) => {}
                Err(e) => warn!(id = hit.id, error = %e, "cannot fetch credits"),
            }
        }
    }

    hits.iter()
        .filter(|h| h.known_release_date().is_some())
        .max_by(|a, b| a.known_release_date().cmp(&b.known_release_date()))
        .or(Some(first))
}

fn directed_by(credits: &Credits, director: &str) -> bool {
    let wanted = director.to_lowercase();
    credits
        .crew
        .iter()
        .filter(|c| c.job == "Director")
        .any(|c| {
            let name = c.name.to_lowercase();
            name.contains(&wanted) || wanted.contains(&name)
        })
}

fn build_block(title: &str, hit: &SearchHit, details: &MovieDetails) -> EnrichmentBlock {
    let year = hit
        .known_release_date()
        .and_then(|d| d.split('-').next())
        .filter(|y| !y.is_empty())
        .unwrap_or(UNKNOWN_YEAR)
        .to_string();
    let rating = match hit.vote_average {
        Some(v) if v != 0.0 => format!("{:.1}", v),
        _ => UNKNOWN_RATING.to_string(),
    };
    let synopsis = details
        .overview
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(NO_SYNOPSIS)
        .to_string();
    let original_title = details
        .original_title
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or(title)
        .to_string();

    EnrichmentBlock {
        year,
        rating,
        synopsis,
        original_title,
    }
}
