use std::collections::HashMap;

use crate::allocine::Screening;
use crate::model::MovieRecord;

/// Folds one date's screenings into per-movie records, most wanted first.
///
/// Movies are identified by title; the first screening seen for a title
/// supplies the shared fields. Showtimes keep their input order within each
/// theater bucket.
pub fn aggregate(screenings: Vec<Screening>) -> Vec<MovieRecord> {
    let mut movies: Vec<MovieRecord> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for Screening {
        theater,
        movie,
        showtime,
    } in screenings
    {
        let idx = *index.entry(movie.title.clone()).or_insert_with(|| {
            let mut movie = movie;
            movie.seances.clear();
            movies.push(movie);
            movies.len() - 1
        });
        movies[idx].seances.entry(theater).or_default().push(showtime);
    }

    // sort_by is stable: ties keep first-seen order
    movies.sort_by(|a, b| b.want_to_see.cmp(&a.want_to_see));
    movies
}
