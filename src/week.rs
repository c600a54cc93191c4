//! Shapes the persisted document takes on its way to the week page.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Days, NaiveDate};
use serde::Serialize;

use crate::model::{MovieRecord, ShowtimeRecord, ShowtimesDocument};

const WEEKDAYS: [&str; 7] = ["lun", "mar", "mer", "jeu", "ven", "sam", "dim"];
const MONTHS: [&str; 12] = [
    "janv", "févr", "mars", "avr", "mai", "juin", "juil", "août", "sept", "oct", "nov", "déc",
];

/// One entry of the date strip at the top of the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayTab {
    pub jour: &'static str,
    pub chiffre: u32,
    pub mois: &'static str,
    pub choisi: bool,
    pub index: usize,
}

/// Short French label, e.g. `"lun 19 oct"`.
pub fn day_label(date: NaiveDate) -> String {
    format!(
        "{} {} {}",
        WEEKDAYS[date.weekday().num_days_from_monday() as usize],
        date.day(),
        MONTHS[date.month0() as usize]
    )
}

/// Date strip for `days` days from `today`, with `selected` clamped into range.
pub fn day_tabs(today: NaiveDate, days: usize, selected: i64) -> Vec<DayTab> {
    let last = days.saturating_sub(1) as i64;
    let selected = selected.clamp(0, last) as usize;
    (0..days)
        .filter_map(|i| today.checked_add_days(Days::new(i as u64)).map(|d| (i, d)))
        .map(|(index, date)| DayTab {
            jour: WEEKDAYS[date.weekday().num_days_from_monday() as usize],
            chiffre: date.day(),
            mois: MONTHS[date.month0() as usize],
            choisi: index == selected,
            index,
        })
        .collect()
}

/// A movie across several days: day label → theater → showtimes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekMovie {
    #[serde(flatten)]
    pub movie: MovieRecord,
    pub days: BTreeMap<String, BTreeMap<String, Vec<ShowtimeRecord>>>,
}

/// Merges the movies of the selected dates by title. Dates absent from the
/// document contribute nothing.
pub fn merge_days(doc: &ShowtimesDocument, dates: &[NaiveDate]) -> Vec<WeekMovie> {
    let mut merged: Vec<WeekMovie> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for date in dates {
        let Some(day) = doc.day(*date) else {
            continue;
        };
        let label = day_label(*date);
        for movie in &day.movies {
            let idx = *index.entry(movie.title.as_str()).or_insert_with(|| {
                let mut shared = movie.clone();
                shared.seances.clear();
                merged.push(WeekMovie {
                    movie: shared,
                    days: BTreeMap::new(),
                });
                merged.len() - 1
            });
            let bucket = merged[idx].days.entry(label.clone()).or_default();
            for (theater, showtimes) in &movie.seances {
                bucket
                    .entry(theater.clone())
                    .or_default()
                    .extend(showtimes.iter().cloned());
            }
        }
    }

    merged.sort_by(|a, b| b.movie.want_to_see.cmp(&a.movie.want_to_see));
    merged
}
