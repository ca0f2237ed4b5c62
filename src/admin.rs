//! Maintenance commands over an existing movie store.

use std::io::{self, BufRead, Write};

use tracing::info;

use crate::error::StoreError;
use crate::movie_store::DedupStore;
use crate::record::StoredMovie;

pub const DEFAULT_TOP: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct StoreSummary {
    pub total: usize,
    pub top: Vec<StoredMovie>,
}

pub fn summarize<S: DedupStore>(store: &S, top_n: usize) -> Result<StoreSummary, StoreError> {
    let total = store.count()?;
    let top = if total == 0 { Vec::new() } else { store.top_by_rating(top_n)? };
    Ok(StoreSummary { total, top })
}

/// Prints the stored total and the best rated movies.
pub fn report<S: DedupStore, W: Write>(
    store: &S,
    collection: &str,
    top_n: usize,
    out: &mut W,
) -> io::Result<StoreSummary> {
    let summary = summarize(store, top_n).map_err(io::Error::other)?;

    writeln!(out, "{}", "-".repeat(50))?;
    writeln!(out, "Collection : {collection}")?;
    writeln!(out, "Movies     : {}", summary.total)?;
    writeln!(out, "{}", "-".repeat(50))?;

    if summary.top.is_empty() {
        writeln!(out, "No movies stored.")?;
        return Ok(summary);
    }

    writeln!(out, "Top {} by rating:", summary.top.len())?;
    for movie in &summary.top {
        writeln!(out, "  {} ({})", movie.title, movie.year.as_deref().unwrap_or("?"))?;
        writeln!(out, "    rating {:.1} | director {}", movie.rating, movie.director)?;
        writeln!(out, "    {}", movie.url)?;
    }
    Ok(summary)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WipeOutcome {
    AlreadyEmpty,
    Cancelled,
    Removed(usize),
}

/// Deletes every stored movie once the operator confirms with `y`.
pub fn wipe<S, R, W>(store: &S, assume_yes: bool, input: &mut R, out: &mut W) -> io::Result<WipeOutcome>
where
    S: DedupStore,
    R: BufRead,
    W: Write,
{
    let count = store.count().map_err(io::Error::other)?;
    writeln!(out, "Current movie count: {count}")?;
    if count == 0 {
        writeln!(out, "Store is already empty.")?;
        return Ok(WipeOutcome::AlreadyEmpty);
    }

    if !assume_yes {
        write!(out, "All movies will be deleted. Are you sure? (y/n): ")?;
        out.flush()?;
        let mut answer = String::new();
        input.read_line(&mut answer)?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            writeln!(out, "Cancelled.")?;
            return Ok(WipeOutcome::Cancelled);
        }
    }

    let removed = store.wipe().map_err(io::Error::other)?;
    info!(removed, "store wiped");
    writeln!(out, "Deleted {removed} movies.")?;
    Ok(WipeOutcome::Removed(removed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movie_store::{MemoryMovieStore, KEY_FIELD};
    use crate::record::CandidateRecord;

    fn seeded(ratings: &[f64]) -> MemoryMovieStore {
        let store = MemoryMovieStore::new();
        store.ensure_unique_key(KEY_FIELD).unwrap();
        for (i, rating) in ratings.iter().enumerate() {
            let record = CandidateRecord {
                title: format!("Movie {i}"),
                year: Some("2001".into()),
                rating: Some(*rating),
                url: Some(format!("https://films.test/title/tt{i}/")),
            }
            .enrich(Some("Someone".into()));
            store.upsert(&record).unwrap();
        }
        store
    }

    #[test]
    fn report_lists_best_first() {
        let store = seeded(&[8.1, 9.3, 8.7, 8.0]);
        let mut out = Vec::new();

        let summary = report(&store, "top_movies", DEFAULT_TOP, &mut out).unwrap();

        assert_eq!(summary.total, 4);
        let ratings: Vec<f64> = summary.top.iter().map(|m| m.rating).collect();
        assert_eq!(ratings, vec![9.3, 8.7, 8.1]);
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Movies     : 4"));
        assert!(printed.contains("Movie 1 (2001)"));
    }

    #[test]
    fn report_on_empty_store() {
        let store = MemoryMovieStore::new();
        let mut out = Vec::new();
        let summary = report(&store, "top_movies", 3, &mut out).unwrap();
        assert_eq!(summary.total, 0);
        assert!(String::from_utf8(out).unwrap().contains("No movies stored."));
    }

    #[test]
    fn wipe_needs_confirmation() {
        let store = seeded(&[9.0, 8.5]);
        let mut out = Vec::new();

        let outcome = wipe(&store, false, &mut "n\n".as_bytes(), &mut out).unwrap();
        assert_eq!(outcome, WipeOutcome::Cancelled);
        assert_eq!(store.count().unwrap(), 2);

        let outcome = wipe(&store, false, &mut "Y\n".as_bytes(), &mut out).unwrap();
        assert_eq!(outcome, WipeOutcome::Removed(2));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn wipe_empty_store_skips_prompt() {
        let store = MemoryMovieStore::new();
        let mut out = Vec::new();
        let outcome = wipe(&store, false, &mut "".as_bytes(), &mut out).unwrap();
        assert_eq!(outcome, WipeOutcome::AlreadyEmpty);
        assert!(!String::from_utf8(out).unwrap().contains("(y/n)"));
    }

    #[test]
    fn assume_yes_skips_prompt() {
        let store = seeded(&[9.0]);
        let mut out = Vec::new();
        let outcome = wipe(&store, true, &mut "".as_bytes(), &mut out).unwrap();
        assert_eq!(outcome, WipeOutcome::Removed(1));
    }
}
