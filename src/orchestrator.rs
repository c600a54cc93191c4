//! Incremental, resumable scrape over a rolling window of dates.
//!
//! A run loads the persisted document, trims it to the current window,
//! works out which dates are missing or carry incomplete enrichment, purges
//! the matching cache entries and re-fetches those dates in ascending order.
//! The whole document is persisted after every date, so an interrupted run
//! loses at most the date it was working on.

use std::collections::{BTreeSet, HashMap};

use chrono::{Days, NaiveDate};
use tracing::{error, info, warn};

use crate::aggregate::aggregate;
use crate::allocine::{Screening, ShowtimeSource, fetch_showtimes};
use crate::catalog::Enricher;
use crate::error::{Error, Result};
use crate::model::{DayDocument, EnrichmentBlock, MovieRecord, ShowtimesDocument, Theater};
use crate::pacing::{PaceStep, Pacer};
use crate::store::DocumentStore;

/// Dates `[today, today + days - 1]`.
pub fn rolling_window(today: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..days)
        .filter_map(|offset| today.checked_add_days(Days::new(u64::from(offset))))
        .collect()
}

/// What a run has to do, derived from the persisted document alone.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Document trimmed to the window, without the days due for re-fetch.
    pub document: ShowtimesDocument,
    pub missing: BTreeSet<NaiveDate>,
    pub stale: BTreeSet<NaiveDate>,
    /// `(title, source year)` of movies whose enrichment looks incomplete.
    pub stale_movies: BTreeSet<(String, Option<String>)>,
}

impl Plan {
    /// Dates to fetch, ascending.
    pub fn to_fetch(&self) -> Vec<NaiveDate> {
        self.missing.union(&self.stale).copied().collect()
    }
}

pub fn plan(mut existing: ShowtimesDocument, today: NaiveDate, window_days: u32, force: bool) -> Plan {
    let window = rolling_window(today, window_days);

    if force {
        return Plan {
            document: ShowtimesDocument {
                generated_at: existing.generated_at,
                days: Vec::new(),
            },
            missing: window.into_iter().collect(),
            stale: BTreeSet::new(),
            stale_movies: BTreeSet::new(),
        };
    }

    existing.normalize();
    existing.days.retain(|d| window.contains(&d.date));

    let missing: BTreeSet<NaiveDate> = window
        .iter()
        .copied()
        .filter(|date| existing.day(*date).is_none())
        .collect();

    let mut stale = BTreeSet::new();
    let mut stale_movies = BTreeSet::new();
    for day in &existing.days {
        for movie in day.movies.iter().filter(|m| m.needs_repair()) {
            stale.insert(day.date);
            stale_movies.insert((movie.title.clone(), movie.source_year.clone()));
        }
    }
    existing.days.retain(|d| !stale.contains(&d.date));

    Plan {
        document: existing,
        missing,
        stale,
        stale_movies,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub fetched: Vec<NaiveDate>,
    pub stale: Vec<NaiveDate>,
    pub purged_cache_entries: usize,
    pub days: usize,
}

pub struct Orchestrator {
    source: Box<dyn ShowtimeSource>,
    enricher: Enricher,
    store: DocumentStore,
    pacer: Box<dyn Pacer>,
    theaters: Vec<Theater>,
    window_days: u32,
}

impl Orchestrator {
    pub fn new(
        source: Box<dyn ShowtimeSource>,
        enricher: Enricher,
        store: DocumentStore,
        pacer: Box<dyn Pacer>,
        theaters: Vec<Theater>,
        window_days: u32,
    ) -> Self {
        Self {
            source,
            enricher,
            store,
            pacer,
            theaters,
            window_days,
        }
    }

    pub fn enricher_mut(&mut self) -> &mut Enricher {
        &mut self.enricher
    }

    pub async fn run(&mut self, today: NaiveDate, force: bool) -> Result<RunSummary> {
        let existing = self.store.load().await?;
        let plan = plan(existing, today, self.window_days, force);
        let to_fetch = plan.to_fetch();

        let mut summary = RunSummary {
            stale: plan.stale.iter().copied().collect(),
            ..Default::default()
        };

        if !plan.stale_movies.is_empty() {
            let cache = self.enricher.cache_mut();
            summary.purged_cache_entries =
                cache.purge_titles(plan.stale_movies.iter().map(|(title, _)| title.as_str()));
            cache.flush().await?;
            info!(
                dates = plan.stale.len(),
                movies = plan.stale_movies.len(),
                purged = summary.purged_cache_entries,
                "incomplete enrichment found, cache entries purged"
            );
        }

        let mut document = plan.document;

        if to_fetch.is_empty() {
            info!("all dates present, nothing to fetch");
            self.store.persist(&mut document).await?;
            summary.days = document.days.len();
            return Ok(summary);
        }

        info!(dates = to_fetch.len(), force, "fetching");
        for (i, date) in to_fetch.iter().copied().enumerate() {
            if i > 0 {
                self.pacer.pause(PaceStep::BetweenDates).await;
            }

            let movies = match self.scrape_date(date).await {
                Ok(movies) => movies,
                Err(e) => {
                    error!(%date, error = %e, "date failed, saving progress");
                    if let Err(persist_err) = self.store.persist(&mut document).await {
                        error!(error = %persist_err, "cannot save progress");
                    }
                    return Err(e);
                }
            };

            info!(%date, movies = movies.len(), "date scraped");
            document.upsert_day(DayDocument { date, movies });
            self.store.persist(&mut document).await?;
            summary.fetched.push(date);
        }

        summary.days = document.days.len();
        Ok(summary)
    }

    async fn scrape_date(&mut self, date: NaiveDate) -> Result<Vec<MovieRecord>> {
        let mut screenings = Vec::new();
        let mut failures = Vec::new();

        for (i, theater) in self.theaters.iter().enumerate() {
            if i > 0 {
                self.pacer.pause(PaceStep::BetweenTheaters).await;
            }
            match fetch_showtimes(self.source.as_ref(), theater, date).await {
                Ok(found) => {
                    info!(theater = %theater.name, %date, showtimes = found.len(), "theater fetched");
                    screenings.extend(found);
                }
                Err(e) => {
                    warn!(theater = %theater.name, %date, error = %e, "theater skipped");
                    failures.push(format!("{}: {}", theater.name, e));
                }
            }
        }

        if !self.theaters.is_empty() && failures.len() == self.theaters.len() {
            return Err(Error::DateFailed {
                date,
                failures: failures.join("; "),
            });
        }

        self.enrich(&mut screenings).await;
        Ok(aggregate(screenings))
    }

    /// Looks each distinct movie up once and overlays the result.
    async fn enrich(&mut self, screenings: &mut [Screening]) {
        let mut blocks: HashMap<(String, Option<String>), EnrichmentBlock> = HashMap::new();
        for screening in screenings.iter_mut() {
            let movie = &mut screening.movie;
            let key = (movie.title.clone(), movie.source_year.clone());
            if !blocks.contains_key(&key) {
                let block = self
                    .enricher
                    .enrich(&movie.title, movie.source_year.as_deref(), movie.known_director())
                    .await;
                blocks.insert(key.clone(), block);
            }
            if let Some(block) = blocks.get(&key) {
                movie.apply_enrichment(block);
            }
        }
    }
}
