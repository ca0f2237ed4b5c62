use serde::{Deserialize, Serialize};
use url::Url;

pub const UNKNOWN: &str = "Unknown";

/// A movie as seen on a list page, before its detail page is fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub title: String,
    /// Raw release year text; list pages sometimes carry ranges or suffixes.
    pub year: Option<String>,
    pub rating: Option<f64>,
    /// Absolute, canonical detail URL.
    pub url: Option<String>,
}

impl CandidateRecord {
    /// Rating used by admission rules. A missing rating counts as zero.
    pub fn effective_rating(&self) -> f64 {
        self.rating.unwrap_or(0.0)
    }

    /// Leading four-digit year, if the raw text starts with one.
    pub fn release_year(&self) -> Option<i32> {
        let year = self.year.as_deref()?.trim();
        let digits: String = year.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.len() == 4 { digits.parse().ok() } else { None }
    }

    pub fn enrich(self, director: Option<String>) -> EnrichedRecord {
        let director = director
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string());
        EnrichedRecord { candidate: self, director }
    }
}

/// A candidate merged with what its detail page told us.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub candidate: CandidateRecord,
    pub director: String,
}

impl EnrichedRecord {
    pub fn key(&self) -> Option<String> {
        self.candidate.url.as_deref().map(canonical_url)
    }

    pub fn to_stored(&self) -> Option<StoredMovie> {
        let url = self.key().filter(|k| !k.is_empty())?;
        Some(StoredMovie {
            title: self.candidate.title.clone(),
            year: self.candidate.year.clone(),
            rating: self.candidate.effective_rating(),
            director: self.director.clone(),
            url,
        })
    }
}

/// Persisted shape, unique by `url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMovie {
    pub title: String,
    pub year: Option<String>,
    pub rating: f64,
    pub director: String,
    pub url: String,
}

/// Strips query string and fragment so tracking variants of a detail URL share one key.
pub fn canonical_url(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        let end = url.find(['?', '#']).unwrap_or(url.len());
        return url[..end].to_string();
    };

    parsed.set_fragment(None);
    parsed.set_query(None);
    parsed.to_string()
}

/// Resolves a (possibly relative) href against the page it was found on.
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let joined = match Url::parse(href) {
        Ok(absolute) => absolute,
        Err(_) => Url::parse(base).ok()?.join(href).ok()?,
    };
    if joined.scheme() == "http" || joined.scheme() == "https" {
        Some(canonical_url(joined.as_str()))
    } else {
        None
    }
}
