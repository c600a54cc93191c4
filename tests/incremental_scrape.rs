use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use cinema_showtimes::allocine::ShowtimeSource;
use cinema_showtimes::cache::EnrichmentCache;
use cinema_showtimes::catalog::{CatalogApi, Credits, Enricher, MovieDetails, SearchHit};
use cinema_showtimes::model::{
    DayDocument, EnrichmentBlock, MovieRecord, PLACEHOLDER_POSTER, ShowtimesDocument, Theater,
};
use cinema_showtimes::orchestrator::Orchestrator;
use cinema_showtimes::pacing::{NoPacing, PaceStep, Pacer};
use cinema_showtimes::store::DocumentStore;
use cinema_showtimes::{Error, Result};
use serde_json::json;
use tempfile::tempdir;

#[derive(Default)]
struct SourceState {
    failing_dates: HashSet<NaiveDate>,
    failing_theaters: HashSet<String>,
    requests: Mutex<Vec<(String, NaiveDate)>>,
}

#[derive(Clone, Default)]
struct FakeSource(Arc<SourceState>);

impl FakeSource {
    fn requested_dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<_> = self.0.requests.lock().expect("lock").iter().map(|(_, d)| *d).collect();
        dates.dedup();
        dates
    }

    fn request_count(&self) -> usize {
        self.0.requests.lock().expect("lock").len()
    }
}

#[async_trait]
impl ShowtimeSource for FakeSource {
    async fn showtimes_page(&self, theater_id: &str, date: NaiveDate, _page: u32) -> Result<String> {
        self.0
            .requests
            .lock()
            .expect("lock")
            .push((theater_id.to_string(), date));
        if self.0.failing_dates.contains(&date) || self.0.failing_theaters.contains(theater_id) {
            return Err(Error::Transport {
                status: 503,
                url: format!("theater-{theater_id}/d-{date}"),
            });
        }
        Ok(json!({
            "message": null,
            "error": false,
            "pagination": {"page": 1, "totalPages": 1},
            "results": [{
                "movie": {
                    "title": "Dune",
                    "runtime": 155,
                    "releaseDate": {"date": "2021-09-15"},
                    "genres": [{"translate": "Science-fiction"}],
                    "stats": {"wantToSeeCount": 300},
                    "poster": {"url": "https://img/dune.jpg"},
                    "credits": [{"person": {"firstName": "Denis", "lastName": "Villeneuve"}}]
                },
                "showtimes": {
                    "original": [{"startsAt": format!("{date}T20:00:00"), "projection": ["IMAX"],
                                  "data": {"ticketing": [{"provider": "default", "urls": ["https://book/1"]}]}}]
                }
            }]
        })
        .to_string())
    }

    async fn theater_search(&self, _query: &str) -> Result<String> {
        Ok(json!({"values": {"theaters": []}}).to_string())
    }
}

#[derive(Clone, Default)]
struct FakeCatalog {
    searches: Arc<AtomicUsize>,
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn search_movie(&self, _title: &str, _year: Option<&str>) -> Result<Vec<SearchHit>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(vec![SearchHit {
            id: 438631,
            title: Some("Dune".into()),
            release_date: Some("2021-09-15".into()),
            vote_average: Some(7.8),
        }])
    }

    async fn movie_details(&self, _id: u64) -> Result<MovieDetails> {
        Ok(MovieDetails {
            overview: Some("Arrakis.".into()),
            original_title: Some("Dune".into()),
        })
    }

    async fn movie_credits(&self, _id: u64) -> Result<Credits> {
        Ok(Credits::default())
    }
}

#[derive(Clone, Default)]
struct RecordingPacer(Arc<Mutex<Vec<PaceStep>>>);

#[async_trait]
impl Pacer for RecordingPacer {
    async fn pause(&self, step: PaceStep) {
        self.0.lock().expect("lock").push(step);
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18).expect("date")
}

fn day(offset: u64) -> NaiveDate {
    today().checked_add_days(Days::new(offset)).expect("date")
}

fn theaters() -> Vec<Theater> {
    vec![
        Theater {
            id: "P0671".into(),
            name: "Pathé Bellecour".into(),
            latitude: 45.75,
            longitude: 4.83,
        },
        Theater {
            id: "C0015".into(),
            name: "Comoedia".into(),
            latitude: 45.74,
            longitude: 4.84,
        },
    ]
}

fn orchestrator(dir: &Path, source: FakeSource, catalog: FakeCatalog, cache: EnrichmentCache) -> Orchestrator {
    Orchestrator::new(
        Box::new(source),
        Enricher::new(Some(Box::new(catalog)), cache),
        DocumentStore::new(dir.join("movies.json")),
        Box::new(NoPacing),
        theaters(),
        7,
    )
}

fn complete_movie(title: &str) -> MovieRecord {
    serde_json::from_value(json!({
        "title": title,
        "original_title": title,
        "source_year": "2024",
        "release_year": "2024",
        "rating": "6.9",
        "synopsis": "Déjà enrichi.",
        "affiche": "https://img/old.jpg",
        "wantToSee": 10
    }))
    .expect("movie")
}

async fn seed(dir: &Path, days: Vec<DayDocument>) -> ShowtimesDocument {
    let store = DocumentStore::new(dir.join("movies.json"));
    let mut doc = ShowtimesDocument::empty();
    for d in days {
        doc.upsert_day(d);
    }
    store.persist(&mut doc).await.expect("seed");
    doc
}

#[tokio::test]
async fn only_missing_days_are_fetched() {
    let dir = tempdir().expect("tempdir");
    let existing = seed(
        dir.path(),
        (0..5)
            .map(|i| DayDocument {
                date: day(i),
                movies: vec![complete_movie("Anora")],
            })
            .collect(),
    )
    .await;

    let source = FakeSource::default();
    let mut orch = orchestrator(
        dir.path(),
        source.clone(),
        FakeCatalog::default(),
        EnrichmentCache::empty(dir.path().join("cache.json")),
    );
    let summary = orch.run(today(), false).await.expect("run");

    assert_eq!(summary.fetched, vec![day(5), day(6)]);
    assert_eq!(source.requested_dates(), vec![day(5), day(6)]);

    let doc = DocumentStore::new(dir.path().join("movies.json")).load().await.expect("load");
    let dates: Vec<_> = doc.days.iter().map(|d| d.date).collect();
    assert_eq!(dates, (0..7).map(day).collect::<Vec<_>>());
    assert_eq!(&doc.days[..5], &existing.days[..]);

    let dune = &doc.days[5].movies[0];
    assert_eq!(dune.title, "Dune");
    assert_eq!(dune.synopsis, "Arrakis.");
    assert_eq!(dune.release_year, "2021");
    assert_eq!(dune.director, "Denis Villeneuve");
    assert_eq!(dune.seances.len(), 2);
    let show = &dune.seances["Comoedia"][0];
    assert_eq!(show.format.as_deref(), Some("IMAX"));
    assert_eq!(show.ticketing_url.as_deref(), Some("https://book/1"));
}

#[tokio::test]
async fn second_run_changes_nothing_but_the_timestamp() {
    let dir = tempdir().expect("tempdir");
    let source = FakeSource::default();
    let catalog = FakeCatalog::default();
    let path = dir.path().join("cache.json");

    let mut first = orchestrator(dir.path(), source.clone(), catalog.clone(), EnrichmentCache::open(&path).await);
    first.run(today(), false).await.expect("first run");
    let after_first = DocumentStore::new(dir.path().join("movies.json")).load().await.expect("load");
    let requests = source.request_count();
    assert_eq!(requests, 14);
    assert_eq!(catalog.searches.load(Ordering::SeqCst), 1);

    let mut second = orchestrator(dir.path(), source.clone(), catalog.clone(), EnrichmentCache::open(&path).await);
    let summary = second.run(today(), false).await.expect("second run");
    let after_second = DocumentStore::new(dir.path().join("movies.json")).load().await.expect("load");

    assert!(summary.fetched.is_empty());
    assert_eq!(source.request_count(), requests);
    assert_eq!(catalog.searches.load(Ordering::SeqCst), 1);
    assert_eq!(after_first.days, after_second.days);
    assert_eq!(
        serde_json::to_string(&after_first.days).expect("json"),
        serde_json::to_string(&after_second.days).expect("json")
    );
}

#[tokio::test]
async fn placeholder_poster_day_is_refetched_and_cache_purged() {
    let dir = tempdir().expect("tempdir");
    let mut broken = complete_movie("Dune");
    broken.poster = PLACEHOLDER_POSTER.to_string();
    broken.source_year = Some("2021".into());
    seed(
        dir.path(),
        (0..7)
            .map(|i| DayDocument {
                date: day(i),
                movies: if i == 2 { vec![broken.clone()] } else { vec![complete_movie("Anora")] },
            })
            .collect(),
    )
    .await;

    let mut cache = EnrichmentCache::empty(dir.path().join("cache.json"));
    let stale_block = EnrichmentBlock::unknown("Dune");
    cache.insert("Dune", Some("2021"), stale_block.clone()).await.expect("insert");
    cache.insert("Dune", Some("2020"), stale_block.clone()).await.expect("insert");
    cache.insert("Anora", Some("2024"), stale_block).await.expect("insert");

    let source = FakeSource::default();
    let catalog = FakeCatalog::default();
    let mut orch = orchestrator(dir.path(), source.clone(), catalog.clone(), cache);
    let summary = orch.run(today(), false).await.expect("run");

    assert_eq!(summary.stale, vec![day(2)]);
    assert_eq!(summary.fetched, vec![day(2)]);
    assert_eq!(summary.purged_cache_entries, 2);
    assert_eq!(catalog.searches.load(Ordering::SeqCst), 1);

    let cache = orch.enricher_mut().cache();
    assert_eq!(cache.get("Dune", Some("2020")), None);
    assert_eq!(cache.get("Dune", Some("2021")).map(|b| b.synopsis.as_str()), Some("Arrakis."));
    assert!(cache.get("Anora", Some("2024")).is_some());

    let doc = DocumentStore::new(dir.path().join("movies.json")).load().await.expect("load");
    assert_eq!(doc.days.len(), 7);
    assert_eq!(doc.days[2].movies[0].poster, "https://img/dune.jpg");
}

#[tokio::test]
async fn failed_date_keeps_earlier_progress_and_resumes() {
    let dir = tempdir().expect("tempdir");
    let failing = FakeSource(Arc::new(SourceState {
        failing_dates: HashSet::from([day(3)]),
        ..Default::default()
    }));
    let mut orch = orchestrator(
        dir.path(),
        failing,
        FakeCatalog::default(),
        EnrichmentCache::empty(dir.path().join("cache.json")),
    );
    let err = orch.run(today(), false).await.expect_err("date 3 fails");
    assert!(matches!(err, Error::DateFailed { date, .. } if date == day(3)));

    let doc = DocumentStore::new(dir.path().join("movies.json")).load().await.expect("load");
    let dates: Vec<_> = doc.days.iter().map(|d| d.date).collect();
    assert_eq!(dates, vec![day(0), day(1), day(2)]);

    let healthy = FakeSource::default();
    let mut orch = orchestrator(
        dir.path(),
        healthy.clone(),
        FakeCatalog::default(),
        EnrichmentCache::empty(dir.path().join("cache.json")),
    );
    let summary = orch.run(today(), false).await.expect("resume");
    assert_eq!(summary.fetched, (3..7).map(day).collect::<Vec<_>>());
    assert_eq!(summary.days, 7);
}

#[tokio::test]
async fn one_failing_theater_only_drops_its_showtimes() {
    let dir = tempdir().expect("tempdir");
    let source = FakeSource(Arc::new(SourceState {
        failing_theaters: HashSet::from(["P0671".to_string()]),
        ..Default::default()
    }));
    let mut orch = orchestrator(
        dir.path(),
        source,
        FakeCatalog::default(),
        EnrichmentCache::empty(dir.path().join("cache.json")),
    );
    orch.run(today(), false).await.expect("run");

    let doc = DocumentStore::new(dir.path().join("movies.json")).load().await.expect("load");
    assert_eq!(doc.days.len(), 7);
    for d in &doc.days {
        let theaters: Vec<_> = d.movies[0].seances.keys().cloned().collect();
        assert_eq!(theaters, vec!["Comoedia".to_string()]);
    }
}

#[tokio::test]
async fn stale_window_days_are_trimmed_and_force_refetches_all() {
    let dir = tempdir().expect("tempdir");
    let yesterday = today().pred_opt().expect("date");
    seed(
        dir.path(),
        std::iter::once(yesterday)
            .chain((0..7).map(day))
            .map(|date| DayDocument {
                date,
                movies: vec![complete_movie("Anora")],
            })
            .collect(),
    )
    .await;

    let source = FakeSource::default();
    let mut orch = orchestrator(
        dir.path(),
        source.clone(),
        FakeCatalog::default(),
        EnrichmentCache::empty(dir.path().join("cache.json")),
    );
    let summary = orch.run(today(), false).await.expect("run");
    assert!(summary.fetched.is_empty());
    assert_eq!(source.request_count(), 0);
    let doc = DocumentStore::new(dir.path().join("movies.json")).load().await.expect("load");
    assert_eq!(doc.days.first().map(|d| d.date), Some(today()));
    assert_eq!(doc.days.len(), 7);

    let summary = orch.run(today(), true).await.expect("forced run");
    assert_eq!(summary.fetched.len(), 7);
    let doc = DocumentStore::new(dir.path().join("movies.json")).load().await.expect("load");
    assert!(doc.days.iter().all(|d| d.movies[0].title == "Dune"));
}

#[tokio::test]
async fn pacing_between_theaters_and_dates() {
    let dir = tempdir().expect("tempdir");
    let pacer = RecordingPacer::default();
    let mut orch = Orchestrator::new(
        Box::new(FakeSource::default()),
        Enricher::new(None, EnrichmentCache::empty(dir.path().join("cache.json"))),
        DocumentStore::new(dir.path().join("movies.json")),
        Box::new(pacer.clone()),
        theaters(),
        3,
    );
    orch.run(today(), false).await.expect("run");

    let steps = pacer.0.lock().expect("lock").clone();
    assert_eq!(
        steps,
        vec![
            PaceStep::BetweenTheaters,
            PaceStep::BetweenDates,
            PaceStep::BetweenTheaters,
            PaceStep::BetweenDates,
            PaceStep::BetweenTheaters,
        ]
    );

    let doc = DocumentStore::new(dir.path().join("movies.json")).load().await.expect("load");
    assert_eq!(doc.days[0].movies[0].synopsis, "Synopsis non disponible");
}
